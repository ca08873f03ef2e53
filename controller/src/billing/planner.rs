use chrono::{DateTime, Utc};
use gpuops_common::Action;
use serde::{Deserialize, Serialize};

/// A billing account's derived status, in descending order of standing.
/// Always a pure function of balance and the configured thresholds —
/// never written independently (§3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Normal,
    Warning,
    Limited,
    Blocked,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Normal => "normal",
            Status::Warning => "warning",
            Status::Limited => "limited",
            Status::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "warning" => Status::Warning,
            "limited" => Status::Limited,
            "blocked" => Status::Blocked,
            _ => Status::Normal,
        }
    }
}

/// Derive status from balance and the warning/limited thresholds (§4.2).
/// Thresholds are strictly less-than on the upper bound: equality falls
/// into the higher tier. Requires `warning_threshold > limited_threshold
/// >= 0`, enforced by [`crate::config::AppConfig::validate`].
pub fn status_for_balance(balance: f64, warning_threshold: f64, limited_threshold: f64) -> Status {
    if balance < 0.0 {
        Status::Blocked
    } else if balance < limited_threshold {
        Status::Limited
    } else if balance < warning_threshold {
        Status::Warning
    } else {
        Status::Normal
    }
}

/// Inputs the action planner needs about a billing account after a debit,
/// decoupled from the DB row so the function stays pure and testable
/// without a database.
pub struct UserAfterDebit {
    pub username: String,
    pub balance: f64,
    pub status: Status,
    pub blocked_at: Option<DateTime<Utc>>,
}

/// Pure function mapping (prev_status, user_after, pids, grace, cpu
/// control settings) to the ordered list of actions to hand back to the
/// agent (§4.2, §5 "Ordering"). `pids` are the PIDs observed in *this*
/// report for the *local* username this plan addresses — the caller
/// invokes this once per local username sharing a billing account, so
/// enforcement always targets an addressable local account (§4.1 step 8).
#[allow(clippy::too_many_arguments)]
pub fn decide_actions(
    now: DateTime<Utc>,
    prev_status: Status,
    user: &UserAfterDebit,
    local_username: &str,
    grace_seconds: i64,
    pids: &[i32],
    cpu_control: Option<CpuControlConfig>,
) -> Vec<Action> {
    let new_status = user.status;
    let mut actions = Vec::new();

    let de_escalated = matches!(prev_status, Status::Limited | Status::Blocked)
        && matches!(new_status, Status::Normal | Status::Warning);

    if de_escalated {
        actions.push(Action::UnblockUser {
            username: local_username.to_string(),
        });
    }

    match new_status {
        Status::Warning if prev_status != Status::Warning => {
            actions.push(Action::Notify {
                username: local_username.to_string(),
                message: format_balance_message("Balance warning", user.balance),
            });
        }
        Status::Limited if prev_status != Status::Limited => {
            actions.push(Action::BlockUser {
                username: local_username.to_string(),
                reason: format_balance_message(
                    "Insufficient balance, new GPU jobs blocked",
                    user.balance,
                ),
            });
        }
        Status::Blocked if prev_status != Status::Blocked => {
            actions.push(Action::Notify {
                username: local_username.to_string(),
                message: format_balance_message(
                    "Account overdrawn, GPU jobs will be terminated after grace period",
                    user.balance,
                ),
            });
        }
        _ => {}
    }

    // set_cpu_quota precedes kill_process within a report (§5 "Ordering").
    if let Some(cfg) = cpu_control {
        match new_status {
            Status::Limited => actions.push(Action::SetCpuQuota {
                username: local_username.to_string(),
                cpu_quota_percent: cfg.limited_percent,
                reason: "Insufficient balance, CPU usage limited".to_string(),
            }),
            Status::Blocked => actions.push(Action::SetCpuQuota {
                username: local_username.to_string(),
                cpu_quota_percent: cfg.blocked_percent,
                reason: "Overdrawn, CPU usage strictly limited".to_string(),
            }),
            Status::Normal | Status::Warning if de_escalated => {
                actions.push(Action::SetCpuQuota {
                    username: local_username.to_string(),
                    cpu_quota_percent: 0.0,
                    reason: "Balance restored, CPU limit removed".to_string(),
                })
            }
            _ => {}
        }
    }

    if new_status == Status::Blocked {
        if let Some(blocked_at) = user.blocked_at {
            let elapsed = (now - blocked_at).num_seconds();
            if grace_seconds > 0 && elapsed >= grace_seconds && !pids.is_empty() {
                actions.push(Action::KillProcess {
                    username: local_username.to_string(),
                    pids: pids.to_vec(),
                    reason: format_balance_message(
                        "Overdrawn past grace period, GPU processes terminated",
                        user.balance,
                    ),
                });
            }
        }
    }

    actions
}

#[derive(Debug, Clone, Copy)]
pub struct CpuControlConfig {
    pub limited_percent: f64,
    pub blocked_percent: f64,
}

/// Format a user-facing notification message: "<prefix> (balance: X.XX)".
pub fn format_balance_message(prefix: &str, balance: f64) -> String {
    format!("{} (balance: {:.2})", prefix.trim(), balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(balance: f64, status: Status, blocked_at: Option<DateTime<Utc>>) -> UserAfterDebit {
        UserAfterDebit {
            username: "alice".into(),
            balance,
            status,
            blocked_at,
        }
    }

    #[test]
    fn status_thresholds_are_strictly_less_than_on_upper_bound() {
        assert_eq!(status_for_balance(-0.01, 50.0, 10.0), Status::Blocked);
        assert_eq!(status_for_balance(0.0, 50.0, 10.0), Status::Limited);
        assert_eq!(status_for_balance(9.99, 50.0, 10.0), Status::Limited);
        assert_eq!(status_for_balance(10.0, 50.0, 10.0), Status::Warning);
        assert_eq!(status_for_balance(49.99, 50.0, 10.0), Status::Warning);
        assert_eq!(status_for_balance(50.0, 50.0, 10.0), Status::Normal);
    }

    #[test]
    fn de_escalation_emits_unblock() {
        let now = Utc::now();
        let u = user(60.0, Status::Normal, None);
        let actions = decide_actions(now, Status::Limited, &u, "alice", 600, &[], None);
        assert!(matches!(actions[0], Action::UnblockUser { .. }));
    }

    #[test]
    fn kill_only_after_grace_with_pids() {
        let now = Utc::now();
        let blocked_at = now - Duration::minutes(11);
        let u = user(-1.0, Status::Blocked, Some(blocked_at));
        let actions = decide_actions(now, Status::Blocked, &u, "alice", 600, &[123], None);
        let kill = actions
            .iter()
            .find(|a| matches!(a, Action::KillProcess { .. }))
            .expect("kill_process expected");
        match kill {
            Action::KillProcess { pids, .. } => assert_eq!(pids, &vec![123]),
            _ => unreachable!(),
        }
    }

    #[test]
    fn no_kill_before_grace_elapses() {
        let now = Utc::now();
        let blocked_at = now - Duration::minutes(5);
        let u = user(-1.0, Status::Blocked, Some(blocked_at));
        let actions = decide_actions(now, Status::Blocked, &u, "alice", 600, &[123], None);
        assert!(!actions.iter().any(|a| matches!(a, Action::KillProcess { .. })));
    }

    #[test]
    fn no_kill_with_empty_pids_even_past_grace() {
        let now = Utc::now();
        let blocked_at = now - Duration::minutes(20);
        let u = user(-1.0, Status::Blocked, Some(blocked_at));
        let actions = decide_actions(now, Status::Blocked, &u, "alice", 600, &[], None);
        assert!(!actions.iter().any(|a| matches!(a, Action::KillProcess { .. })));
    }

    #[test]
    fn no_immediate_kill_on_entry_to_blocked_when_grace_is_zero() {
        // blocked_at == now, so elapsed == 0 == grace_seconds; without the
        // grace_seconds > 0 guard this would fire a kill in the same
        // report a user enters blocked, contradicting §4.2 "No immediate kill."
        let now = Utc::now();
        let u = user(-1.0, Status::Blocked, Some(now));
        let actions = decide_actions(now, Status::Warning, &u, "alice", 0, &[123], None);
        assert!(!actions.iter().any(|a| matches!(a, Action::KillProcess { .. })));
    }

    #[test]
    fn notify_only_on_transition_into_warning() {
        let now = Utc::now();
        let u = user(20.0, Status::Warning, None);
        let first = decide_actions(now, Status::Normal, &u, "alice", 600, &[], None);
        assert!(first.iter().any(|a| matches!(a, Action::Notify { .. })));

        let repeat = decide_actions(now, Status::Warning, &u, "alice", 600, &[], None);
        assert!(!repeat.iter().any(|a| matches!(a, Action::Notify { .. })));
    }

    #[test]
    fn cpu_control_emits_quota_on_limited_and_clears_on_deescalation() {
        let now = Utc::now();
        let cfg = CpuControlConfig {
            limited_percent: 50.0,
            blocked_percent: 10.0,
        };

        let limited_user = user(5.0, Status::Limited, None);
        let actions = decide_actions(now, Status::Normal, &limited_user, "alice", 600, &[], Some(cfg));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetCpuQuota { cpu_quota_percent, .. } if *cpu_quota_percent == 50.0
        )));

        let restored_user = user(60.0, Status::Normal, None);
        let actions = decide_actions(now, Status::Limited, &restored_user, "alice", 600, &[], Some(cfg));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetCpuQuota { cpu_quota_percent, .. } if *cpu_quota_percent == 0.0
        )));
    }

    #[test]
    fn blocked_emits_notify_once_on_entry() {
        let now = Utc::now();
        let u = user(-1.0, Status::Blocked, Some(now));
        let first = decide_actions(now, Status::Warning, &u, "alice", 600, &[], None);
        assert!(first.iter().any(|a| matches!(a, Action::Notify { .. })));

        let repeat = decide_actions(now, Status::Blocked, &u, "alice", 600, &[], None);
        assert!(!repeat.iter().any(|a| matches!(a, Action::Notify { .. })));
    }
}
