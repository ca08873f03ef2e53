use serde::{Deserialize, Serialize};

/// An enforcement action the controller hands back to the agent. Tagged by
/// `type` on the wire so the agent can dispatch on it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Notify {
        username: String,
        message: String,
    },
    BlockUser {
        username: String,
        reason: String,
    },
    UnblockUser {
        username: String,
    },
    KillProcess {
        username: String,
        pids: Vec<i32>,
        reason: String,
    },
    SetCpuQuota {
        username: String,
        cpu_quota_percent: f64,
        reason: String,
    },
}

impl Action {
    pub fn username(&self) -> &str {
        match self {
            Action::Notify { username, .. }
            | Action::BlockUser { username, .. }
            | Action::UnblockUser { username }
            | Action::KillProcess { username, .. }
            | Action::SetCpuQuota { username, .. } => username,
        }
    }
}
