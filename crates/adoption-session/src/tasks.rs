use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TaskKind {
    ProactiveRefresh,
    UnreadPoller,
}

/// Owns a spawned background task; the task is aborted when this is dropped
#[derive(Debug)]
pub(crate) struct TaskHandle {
    task: JoinHandle<()>,
}

impl TaskHandle {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
