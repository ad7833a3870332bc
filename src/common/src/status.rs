use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

/// One line of user feedback, e.g. "Process chrome (PID: 4312) terminated".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Clonable handle the reconciler and command executor push status lines
/// through. Rendering is the consumer's concern; if nobody is draining
/// the channel the line is dropped rather than blocking a command.
#[derive(Clone)]
pub struct StatusRecorder {
    tx: mpsc::Sender<StatusMessage>,
}

impl StatusRecorder {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StatusMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (StatusRecorder { tx }, rx)
    }

    pub fn push(&self, text: impl Into<String>) {
        let message = StatusMessage {
            text: text.into(),
            at: Utc::now(),
        };
        if let Err(e) = self.tx.try_send(message) {
            debug!("status line dropped: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order() {
        let (recorder, mut rx) = StatusRecorder::channel(8);
        recorder.push("first");
        recorder.push("second");
        assert_eq!(rx.recv().await.unwrap().text, "first");
        assert_eq!(rx.recv().await.unwrap().text, "second");
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (recorder, mut rx) = StatusRecorder::channel(1);
        recorder.push("kept");
        recorder.push("dropped");
        assert_eq!(rx.recv().await.unwrap().text, "kept");
        assert!(rx.try_recv().is_err());
    }
}
