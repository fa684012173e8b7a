use derive_more::Display;

/// Lifecycle of one task as seen by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TaskStatus {
    Started,
    Running,
    Completed,
    Failed,
}

/// Fire-and-forget progress signal delivered to the UI layer. The worker
/// never waits for acknowledgment.
#[derive(Debug, Clone)]
pub struct TaskProgress {
    /// Fresh, monotonically increasing per process; distinguishes the
    /// notifications of concurrent tasks.
    pub notification_id: u64,
    pub package_name: String,
    pub status: TaskStatus,
    pub message: String,
}
