//! Per-turn duplicate-call suppression.
//!
//! Grounded in `internal/functions/dedupprovider.go`'s
//! `CallLoopPreventingProvider`, generalized per spec §4.5: the signature
//! includes the call's canonicalized arguments (minus `rationale`), not just
//! the function name, so two different argument sets to the same tool are
//! not considered duplicates.

use std::collections::BTreeSet;

use serde_json::Value;

/// Canonicalize a JSON object for signature comparison: sort keys, drop
/// `rationale`, and serialize compactly. Order-independent and
/// whitespace-independent.
fn canonical_args(args: &Value) -> String {
    let Some(map) = args.as_object() else {
        return args.to_string();
    };
    let mut sorted = serde_json::Map::new();
    for (k, v) in map {
        if k == "rationale" {
            continue;
        }
        sorted.insert(k.clone(), v.clone());
    }
    serde_json::Value::Object(sorted).to_string()
}

/// Per-turn registry of (name, args)-signatures seen so far, and the set of
/// tool names banned for the remainder of the turn after a repeat.
#[derive(Default)]
pub struct CallGuard {
    banned: BTreeSet<String>,
    seen: BTreeSet<String>,
}

impl CallGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time a (name, args) signature is seen in
    /// this turn; `false` on every repeat, at which point `name` is added to
    /// the ban list for the rest of the turn.
    pub fn is_allowed(&mut self, name: &str, args: &Value) -> bool {
        let signature = format!("{name}({})", canonical_args(args));
        if self.seen.contains(&signature) {
            tracing::warn!(tool = name, "disabling tool temporarily due to duplicate call");
            self.banned.insert(name.to_string());
            return false;
        }
        self.seen.insert(signature);
        true
    }

    /// Whether `name` is currently banned for this turn.
    #[must_use]
    pub fn is_banned(&self, name: &str) -> bool {
        self.banned.contains(name)
    }

    /// Filter a tool-name list down to the ones not currently banned.
    pub fn visible_tools<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        names.into_iter().filter(|n| !self.is_banned(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn second_identical_call_is_rejected_first_is_allowed() {
        let mut guard = CallGuard::new();
        let args = json!({"location": "Berlin"});
        assert!(guard.is_allowed("getWeather", &args));
        assert!(!guard.is_allowed("getWeather", &args));
    }

    #[test]
    fn banned_name_stays_banned_regardless_of_args() {
        let mut guard = CallGuard::new();
        let args = json!({"location": "Berlin"});
        assert!(guard.is_allowed("getWeather", &args));
        assert!(!guard.is_allowed("getWeather", &args));
        assert!(!guard.is_allowed("getWeather", &json!({"location": "Paris"})));
        assert!(guard.is_banned("getWeather"));
    }

    #[test]
    fn different_args_are_not_duplicates() {
        let mut guard = CallGuard::new();
        assert!(guard.is_allowed("getWeather", &json!({"location": "Berlin"})));
        assert!(guard.is_allowed("getWeather", &json!({"location": "Paris"})));
    }

    #[test]
    fn rationale_is_excluded_from_the_signature() {
        let mut guard = CallGuard::new();
        assert!(guard.is_allowed("getWeather", &json!({"location": "Berlin", "rationale": "a"})));
        assert!(!guard.is_allowed("getWeather", &json!({"location": "Berlin", "rationale": "b"})));
    }

    #[test]
    fn visible_tools_excludes_banned_names() {
        let mut guard = CallGuard::new();
        let args = json!({});
        guard.is_allowed("a", &args);
        guard.is_allowed("a", &args);
        let visible = guard.visible_tools(["a", "b"]);
        assert_eq!(visible, vec!["b"]);
    }
}
