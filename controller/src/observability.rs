use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use gpuops_common::Action;

/// Plain-text counters exposed on `GET /metrics` (§6). Never consulted on
/// the billing hot path — the ingest pipeline only ever increments these
/// after its transaction has committed.
#[derive(Debug, Default)]
pub struct Counters {
    accepted_reports: AtomicU64,
    duplicate_reports: AtomicU64,
    usage_rows: AtomicU64,
    actions_by_type: Mutex<HashMap<&'static str, u64>>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted_report(&self, usage_rows_written: u64) {
        self.accepted_reports.fetch_add(1, Ordering::Relaxed);
        self.usage_rows
            .fetch_add(usage_rows_written, Ordering::Relaxed);
    }

    pub fn record_duplicate_report(&self) {
        self.duplicate_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actions(&self, actions: &[Action]) {
        let mut map = self.actions_by_type.lock().expect("actions_by_type lock poisoned");
        for action in actions {
            *map.entry(action_type_name(action)).or_insert(0) += 1;
        }
    }

    /// Render in the flat `name value` per-line format the spec's
    /// `GET /metrics` calls for (§6).
    pub fn render(&self, queue_length: usize) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "accepted_reports {}\n",
            self.accepted_reports.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "duplicate_reports {}\n",
            self.duplicate_reports.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "usage_rows {}\n",
            self.usage_rows.load(Ordering::Relaxed)
        ));

        let map = self.actions_by_type.lock().expect("actions_by_type lock poisoned");
        let mut kinds: Vec<_> = map.keys().copied().collect();
        kinds.sort_unstable();
        for kind in kinds {
            out.push_str(&format!("actions_by_type{{type=\"{kind}\"}} {}\n", map[kind]));
        }

        out.push_str(&format!("queue_length {queue_length}\n"));
        out
    }
}

fn action_type_name(action: &Action) -> &'static str {
    match action {
        Action::Notify { .. } => "notify",
        Action::BlockUser { .. } => "block_user",
        Action::UnblockUser { .. } => "unblock_user",
        Action::KillProcess { .. } => "kill_process",
        Action::SetCpuQuota { .. } => "set_cpu_quota",
    }
}
