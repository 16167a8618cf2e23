use tokio::time::Instant;

/// A payload awaiting (re-)delivery to the secondary engine, plus enough
/// bookkeeping to decide when to try it again and how to report it if it
/// never succeeds.
#[derive(Debug, Clone)]
pub struct QueuedItem<T> {
    pub payload: T,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Instant,
}

impl<T> QueuedItem<T> {
    pub fn first_attempt(payload: T) -> Self {
        QueuedItem {
            payload,
            attempt_count: 1,
            last_error: None,
            next_attempt_at: Instant::now(),
        }
    }
}
