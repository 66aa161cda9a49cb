//! The streaming pipeline: stage wiring, bounded queue capacities, and the
//! fan-in merge utility. Grounded in `internal/chat/merge.go`
//! (`MergeCompletionRequests`), generalized from Go channels to
//! `tokio::sync::mpsc`.

pub mod admitter;
pub mod agent;
pub mod messages;
pub mod orchestrator;
pub mod sentence;
pub mod session;
pub mod soundgen;
pub mod tool_runner;
pub mod tts_stage;
pub mod wake_gate;

use tokio::sync::mpsc;

/// Queue capacities from spec §5, named so each stage wiring site reads as
/// documentation.
pub mod capacity {
    pub const TRANSCRIPTION_TO_GATE: usize = 10;
    pub const GATE_TO_ADMITTER: usize = 5;
    pub const ADMITTER_TO_ORCHESTRATOR: usize = 50;
    pub const ORCHESTRATOR_TO_REASSEMBLER: usize = 50;
    pub const REASSEMBLER_TO_TTS: usize = 10;
    pub const TTS_TO_SINK: usize = 10;
    pub const BROADCAST_SUBSCRIPTION: usize = 10;
}

/// Fan multiple same-typed receivers into one, closing the output only
/// after every input has closed. Mirrors `MergeCompletionRequests`'
/// wait-group-then-close shape using a `JoinSet` instead of per-source
/// goroutines plus a `WaitGroup`.
pub fn merge<T: Send + 'static>(sources: Vec<mpsc::Receiver<T>>, capacity: usize) -> mpsc::Receiver<T> {
    let (tx, rx) = mpsc::channel(capacity);
    let mut set = tokio::task::JoinSet::new();
    for mut src in sources {
        let tx = tx.clone();
        set.spawn(async move {
            while let Some(item) = src.recv().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
    }
    tokio::spawn(async move {
        while set.join_next().await.is_some() {}
        drop(tx);
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn merge_forwards_all_items_from_all_sources() {
        let (tx1, rx1) = mpsc::channel(4);
        let (tx2, rx2) = mpsc::channel(4);
        tx1.send(1).await.unwrap();
        tx1.send(2).await.unwrap();
        tx2.send(3).await.unwrap();
        drop(tx1);
        drop(tx2);

        let mut merged = merge(vec![rx1, rx2], 8);
        let mut got = Vec::new();
        while let Some(v) = merged.recv().await {
            got.push(v);
        }
        got.sort_unstable();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn merge_closes_output_only_after_all_inputs_close() {
        let (tx1, rx1) = mpsc::channel::<i32>(4);
        let (tx2, rx2) = mpsc::channel::<i32>(4);
        let mut merged = merge(vec![rx1, rx2], 8);

        drop(tx1);
        // Give the merge task a chance to observe the first closed source;
        // the merged channel must still be open because tx2 is alive.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        tx2.send(42).await.unwrap();
        assert_eq!(merged.recv().await, Some(42));
        drop(tx2);
        assert_eq!(merged.recv().await, None);
    }
}
