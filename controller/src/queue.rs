use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

/// One pending GPU allocation request, submitted by an operator through
/// the admin surface so staff can see who is waiting. This is a
/// process-local display aid, not a scheduler — the spec explicitly
/// excludes real GPU scheduling/allocation from the core (§1 Non-goals).
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    pub id: String,
    pub username: String,
    pub note: String,
    pub submitted_at: String,
}

/// Process-local FIFO of [`QueueItem`]s. Guarded by a plain mutex — it is
/// never read from or written to on the billing ingest path (§5).
#[derive(Debug, Default)]
pub struct GpuQueue {
    items: Mutex<VecDeque<QueueItem>>,
}

impl GpuQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: QueueItem) {
        self.items.lock().expect("gpu queue lock poisoned").push_back(item);
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut items = self.items.lock().expect("gpu queue lock poisoned");
        let before = items.len();
        items.retain(|i| i.id != id);
        items.len() != before
    }

    pub fn list(&self) -> Vec<QueueItem> {
        self.items
            .lock()
            .expect("gpu queue lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("gpu queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
