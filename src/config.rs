//! Configuration: CLI flags (with `VUI_<UPPER_SNAKE>` env-var fallback via
//! `clap`'s `env` feature) and the YAML config file.
//!
//! Grounded in `pkg/config/config.go`/`loader.go`: the file is parsed as
//! YAML, round-tripped through a `serde_json::Value`, and re-decoded with
//! `#[serde(deny_unknown_fields)]` so unknown keys are a hard error, matching
//! the original's `yaml.Unmarshal` → `json.Marshal` → strict
//! `json.Decoder.DisallowUnknownFields` pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VuiError};

/// CLI flags, each overridable by the environment variable
/// `VUI_<UPPER_SNAKE_CASE_OF_FLAG>` per spec §6.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "vui", about = "Real-time voice-assistant orchestration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the YAML config file.
    #[arg(long, env = "VUI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of the OpenAI-compatible chat/STT/TTS server.
    #[arg(long, env = "VUI_SERVER_URL")]
    pub server_url: Option<String>,

    /// `HOST:PORT` the HTTP/WebSocket broadcast server listens on.
    #[arg(long, env = "VUI_LISTEN", default_value = "0.0.0.0:8089")]
    pub listen: String,

    /// Directory of static files served at `GET /`.
    #[arg(long, env = "VUI_WEB_DIR")]
    pub web_dir: Option<PathBuf>,

    /// Serve over TLS.
    #[arg(long, env = "VUI_TLS")]
    pub tls: bool,

    /// TLS certificate path (required when `--tls` is set).
    #[arg(long, env = "VUI_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key path (required when `--tls` is set).
    #[arg(long, env = "VUI_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Input audio device name or numeric id.
    #[arg(long, env = "VUI_INPUT_DEVICE")]
    pub input_device: Option<String>,

    /// Output audio device name or numeric id.
    #[arg(long, env = "VUI_OUTPUT_DEVICE")]
    pub output_device: Option<String>,

    /// Minimum RMS volume (of 32767) treated as speech by the energy VAD.
    #[arg(long, env = "VUI_MIN_VOLUME")]
    pub min_volume: Option<i32>,

    /// Enable voice-activity detection.
    #[arg(long, env = "VUI_VAD")]
    pub vad: Option<bool>,

    /// Path to a VAD model (reserved; the in-tree VAD is energy-based).
    #[arg(long, env = "VUI_VAD_MODEL")]
    pub vad_model: Option<PathBuf>,

    /// STT model name passed to the transcription endpoint.
    #[arg(long, env = "VUI_STT_MODEL")]
    pub stt_model: Option<String>,

    /// TTS model name passed to the speech-synthesis endpoint.
    #[arg(long, env = "VUI_TTS_MODEL")]
    pub tts_model: Option<String>,

    /// Chat-completion model name.
    #[arg(long, env = "VUI_CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Sampling temperature for chat completions.
    #[arg(long, env = "VUI_TEMPERATURE")]
    pub temperature: Option<f32>,

    /// Wake word the utterance must contain to be admitted as a turn.
    #[arg(long, env = "VUI_WAKE_WORD")]
    pub wake_word: Option<String>,

    /// Log level.
    #[arg(long, env = "VUI_LOG_LEVEL", default_value = "INFO")]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Run the live microphone→speaker conversation loop.
    Chat,
    /// Run the HTTP/WebSocket audio broadcast server.
    Serve,
    /// List available input/output audio devices.
    Devices,
}

/// Device selection and sample-rate/volume settings for the `cpal`
/// capture/playback adapters, resolved from CLI flags (§6) with defaults
/// matching the 16 kHz mono pipeline used throughout (STT input, TTS/
/// broadcast output).
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Device name or numeric id; `None` selects the host default.
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    /// Frames per emitted [`crate::pipeline::messages::AudioChunk`].
    pub buffer_size: u32,
    /// Minimum RMS (of 32767) the energy VAD treats as speech.
    pub min_volume: i32,
    pub vad_enabled: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            input_device: None,
            output_device: None,
            input_sample_rate: 16_000,
            output_sample_rate: 16_000,
            buffer_size: 1600,
            min_volume: 500,
            vad_enabled: true,
        }
    }
}

impl AudioConfig {
    /// Resolve from CLI flags, falling back to [`AudioConfig::default`] for
    /// anything the user left unset.
    #[must_use]
    pub fn from_cli(cli: &Cli) -> Self {
        let default = AudioConfig::default();
        AudioConfig {
            input_device: cli.input_device.clone(),
            output_device: cli.output_device.clone(),
            min_volume: cli.min_volume.unwrap_or(default.min_volume),
            vad_enabled: cli.vad.unwrap_or(default.vad_enabled),
            ..default
        }
    }
}

/// The YAML config file's schema. Every field rejects unknown siblings at
/// the struct level via `#[serde(deny_unknown_fields)]`, applied through
/// `load()`'s JSON round-trip (`deny_unknown_fields` itself only affects
/// `serde_json`, not `serde_yaml`, hence the round-trip).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VuiConfig {
    #[serde(default, rename = "serverURL")]
    pub server_url: String,
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default, rename = "chatModel")]
    pub chat_model: String,
    #[serde(default, rename = "sttModel")]
    pub stt_model: String,
    #[serde(default, rename = "ttsModel")]
    pub tts_model: String,
    #[serde(default, rename = "wakeWord")]
    pub wake_word: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default, rename = "introPrompt")]
    pub intro_prompt: String,
    /// Lines joined by `\n` to form the system prompt; `{wakeWord}` is
    /// substituted with `wake_word`.
    #[serde(default)]
    pub prompt: Vec<String>,
    #[serde(default)]
    pub functions: Vec<FunctionDefinition>,
    #[serde(default)]
    pub agents: Vec<AgentDefinition>,
}

impl VuiConfig {
    /// Render the system prompt: join `prompt` lines, substitute
    /// `{wakeWord}`.
    #[must_use]
    pub fn system_prompt(&self) -> String {
        render_prompt_template(&self.prompt.join("\n"), &self.wake_word)
    }
}

/// Substitute `{wakeWord}` in a prompt template. Grounded in
/// `internal/vui/prompttpl.go`.
#[must_use]
pub fn render_prompt_template(prompt: &str, wake_word: &str) -> String {
    prompt.replace("{wakeWord}", wake_word)
}

/// A tool exposed to the model: OpenAI function-definition fields plus the
/// sandboxed execution spec. Grounded in `pkg/config.FunctionDefinition`,
/// which embeds `Container` directly rather than nesting it under a key;
/// `serde(flatten)` would defeat `deny_unknown_fields` here (a known serde
/// limitation), so the container fields are listed inline instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON-schema `parameters` object, passed through verbatim to the
    /// upstream chat API's `functions` field.
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
    pub image: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
    /// Timeout in seconds; 0 means "use the 60s default".
    #[serde(default)]
    pub timeout: u64,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl FunctionDefinition {
    #[must_use]
    pub fn container(&self) -> ContainerSpec {
        ContainerSpec {
            image: self.image.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            timeout: self.timeout,
        }
    }
}

/// The sandboxed execution spec for a function: image, optional entrypoint
/// override, argv, environment, and timeout.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub image: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: std::collections::BTreeMap<String, String>,
    /// Timeout in seconds; 0 means "use the 60s default".
    pub timeout: u64,
}

impl ContainerSpec {
    #[must_use]
    pub fn timeout_duration(&self) -> Duration {
        if self.timeout == 0 { Duration::from_secs(60) } else { Duration::from_secs(self.timeout) }
    }
}

/// A nested agent: its own name/description/prompt/tool list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Lines joined by `\n` to form the agent's own system prompt.
    #[serde(default)]
    pub prompt: Vec<String>,
    #[serde(default)]
    pub tools: Vec<FunctionDefinition>,
}

/// The fully resolved set of values the binary actually runs with: CLI
/// flags (and their `VUI_*` env fallback, handled by `clap` itself) take
/// precedence over the YAML config file, which in turn falls back to
/// built-in defaults. Grounded in the same precedence `pkg/config/loader.go`
/// documents for the original CLI/file merge.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub stt_model: String,
    pub tts_model: String,
    pub wake_word: String,
    pub temperature: f32,
    pub system_prompt: String,
    pub functions: Vec<FunctionDefinition>,
    pub agents: Vec<AgentDefinition>,
    pub listen: String,
    pub web_dir: Option<PathBuf>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub audio: AudioConfig,
}

impl Settings {
    /// Merge CLI flags over an (optional) loaded config file. A flag that
    /// was explicitly passed always wins; otherwise the file's value is
    /// used, and if neither is set the built-in default applies.
    #[must_use]
    pub fn resolve(cli: &Cli, file: VuiConfig) -> Self {
        let wake_word = cli.wake_word.clone().unwrap_or(file.wake_word.clone());
        let system_prompt = render_prompt_template(&file.prompt.join("\n"), &wake_word);
        Settings {
            server_url: cli.server_url.clone().unwrap_or(file.server_url),
            api_key: file.api_key,
            chat_model: cli.chat_model.clone().unwrap_or(file.chat_model),
            stt_model: cli.stt_model.clone().unwrap_or(file.stt_model),
            tts_model: cli.tts_model.clone().unwrap_or(file.tts_model),
            wake_word,
            temperature: cli.temperature.unwrap_or(if file.temperature == 0.0 { 0.7 } else { file.temperature }),
            system_prompt,
            functions: file.functions,
            agents: file.agents,
            listen: cli.listen.clone(),
            web_dir: cli.web_dir.clone(),
            tls_cert: cli.tls_cert.clone(),
            tls_key: cli.tls_key.clone(),
            audio: AudioConfig::from_cli(cli),
        }
    }
}

/// Load and strictly validate a YAML config file: parse to a generic JSON
/// value, then decode into [`VuiConfig`] with `deny_unknown_fields`
/// semantics enforced by construction (top-level and nested structs all
/// carry the attribute).
pub fn load(path: &std::path::Path) -> Result<VuiConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| VuiError::Config(format!("read config {}: {e}", path.display())))?;
    parse(&text)
}

/// Parse YAML config text (split out from [`load`] for testing without
/// touching the filesystem).
pub fn parse(yaml_text: &str) -> Result<VuiConfig> {
    let value: serde_json::Value =
        serde_yaml::from_str(yaml_text).map_err(|e| VuiError::Config(format!("parse YAML: {e}")))?;
    serde_json::from_value(value).map_err(|e| VuiError::Config(format!("unknown or invalid config field: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses() {
        let cfg = parse(
            r"
serverURL: http://localhost:8080
wakeWord: Computer
prompt:
  - 'You are {wakeWord}.'
",
        )
        .unwrap();
        assert_eq!(cfg.server_url, "http://localhost:8080");
        assert_eq!(cfg.system_prompt(), "You are Computer.");
    }

    #[test]
    fn unknown_top_level_field_is_rejected() {
        let err = parse("serverURL: http://x\nbogusField: 1\n").unwrap_err();
        assert!(matches!(err, VuiError::Config(_)));
    }

    #[test]
    fn unknown_function_field_is_rejected() {
        let yaml = r"
functions:
  - name: getWeather
    image: alpine:3
    notAField: true
";
        assert!(parse(yaml).is_err());
    }

    #[test]
    fn function_definition_round_trips_container_spec() {
        let yaml = r"
functions:
  - name: getWeather
    description: looks up the weather
    image: tools/weather:latest
    args: ['--city']
    env:
      API_KEY: abc
    timeout: 30
";
        let cfg = parse(yaml).unwrap();
        assert_eq!(cfg.functions.len(), 1);
        let f = &cfg.functions[0];
        assert_eq!(f.image, "tools/weather:latest");
        assert_eq!(f.container().timeout_duration(), Duration::from_secs(30));
    }

    #[test]
    fn default_timeout_is_sixty_seconds() {
        let spec = ContainerSpec { image: "x".into(), timeout: 0, ..Default::default() };
        assert_eq!(spec.timeout_duration(), Duration::from_secs(60));
    }

    #[test]
    fn cli_flag_overrides_config_file_value() {
        use clap::Parser;
        let cli = Cli::parse_from(["vui", "--wake-word", "Robot"]);
        let file = parse("wakeWord: Computer\nprompt: ['You are {wakeWord}.']\n").unwrap();
        let settings = Settings::resolve(&cli, file);
        assert_eq!(settings.wake_word, "Robot");
        assert_eq!(settings.system_prompt, "You are Robot.");
    }

    #[test]
    fn config_file_value_used_when_no_cli_flag_given() {
        use clap::Parser;
        let cli = Cli::parse_from(["vui"]);
        let file = parse("wakeWord: Computer\nprompt: ['You are {wakeWord}.']\n").unwrap();
        let settings = Settings::resolve(&cli, file);
        assert_eq!(settings.wake_word, "Computer");
        assert_eq!(settings.system_prompt, "You are Computer.");
    }

    #[test]
    fn agents_parse_with_their_own_tools() {
        let yaml = r"
agents:
  - name: researcher
    description: does research
    prompt: ['You research things.']
    tools:
      - name: webSearch
        image: tools/search:latest
";
        let cfg = parse(yaml).unwrap();
        assert_eq!(cfg.agents.len(), 1);
        assert_eq!(cfg.agents[0].tools[0].name, "webSearch");
    }
}
