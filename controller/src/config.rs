use anyhow::Result;
use subtle::ConstantTimeEq;

/// Immutable configuration snapshot. Built once at startup and passed by
/// reference into the billing engine and HTTP handlers — never read as a
/// process-wide singleton, so a given report is always priced and gated
/// against the thresholds that were in effect when the process started.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind address (e.g. "0.0.0.0:8080")
    pub listen_addr: String,

    /// SQLite database URL
    pub database_url: String,

    /// Shared secret the agent presents via `X-Agent-Token`.
    pub agent_token: String,

    /// Bearer token accepted for admin bootstrap, alongside session cookies.
    pub admin_token: Option<String>,

    /// Balance below which status becomes `warning` (must exceed limited_threshold).
    pub warning_threshold: f64,

    /// Balance below which status becomes `limited` (must be >= 0).
    pub limited_threshold: f64,

    /// CPU price per 100% core-minute, used when the price table has no `CPU_CORE` row.
    pub default_cpu_price_per_core_minute: f64,

    /// GPU price per minute for a model with no matching price-table prefix.
    pub default_gpu_price_per_minute: f64,

    /// Fallback interval, in seconds, used when a report's `interval_seconds`
    /// is missing or outside (0, 600].
    pub default_interval_seconds: i64,

    /// Starting balance for a billing account created lazily on first reference.
    pub default_balance: f64,

    /// Seconds a user must remain continuously blocked before `kill_process`
    /// is eligible to fire.
    pub kill_grace_period_seconds: i64,

    /// When set, compute and log billing as usual but never subtract from balance.
    pub dry_run: bool,

    /// Emit `set_cpu_quota` actions on limited/blocked/de-escalation transitions.
    pub enable_cpu_control: bool,

    /// CPU quota percent applied while a user is `limited`.
    pub cpu_limit_percent_limited: f64,

    /// CPU quota percent applied while a user is `blocked`.
    pub cpu_limit_percent_blocked: f64,

    /// Admin session lifetime.
    pub session_hours: i64,

    /// Set the `Secure` flag on the admin session cookie.
    pub cookie_secure: bool,

    /// Username for a lazily-created first admin account, alongside
    /// `bootstrap_admin_password`. Only consulted at startup, and only
    /// when the `admin_users` table is empty.
    pub bootstrap_admin_username: Option<String>,

    /// Password for the lazily-created first admin account.
    pub bootstrap_admin_password: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:///var/lib/gpuops/controller.db".into()),
            agent_token: std::env::var("AGENT_TOKEN").unwrap_or_default(),
            admin_token: std::env::var("ADMIN_TOKEN").ok().filter(|s| !s.is_empty()),
            warning_threshold: std::env::var("WARNING_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50.0),
            limited_threshold: std::env::var("LIMITED_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            default_cpu_price_per_core_minute: std::env::var("CPU_PRICE_PER_CORE_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.01),
            default_gpu_price_per_minute: std::env::var("DEFAULT_GPU_PRICE_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.1),
            default_interval_seconds: std::env::var("DEFAULT_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            default_balance: std::env::var("DEFAULT_BALANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            kill_grace_period_seconds: std::env::var("KILL_GRACE_PERIOD_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
            dry_run: std::env::var("DRY_RUN")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            enable_cpu_control: std::env::var("ENABLE_CPU_CONTROL")
                .map(|v| !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            cpu_limit_percent_limited: std::env::var("CPU_LIMIT_PERCENT_LIMITED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50.0),
            cpu_limit_percent_blocked: std::env::var("CPU_LIMIT_PERCENT_BLOCKED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            session_hours: std::env::var("SESSION_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            cookie_secure: std::env::var("COOKIE_SECURE")
                .map(|v| !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            bootstrap_admin_username: std::env::var("ADMIN_BOOTSTRAP_USER")
                .ok()
                .filter(|s| !s.is_empty()),
            bootstrap_admin_password: std::env::var("ADMIN_BOOTSTRAP_PASSWORD")
                .ok()
                .filter(|s| !s.is_empty()),
        })
    }

    /// Range-check the threshold/percent/interval fields. Mirrors the
    /// original daemon's startup `Validate()` pass — a misconfigured
    /// threshold pair or out-of-range quota percent fails startup instead
    /// of silently mispricing every report.
    pub fn validate(&self) -> Result<(), String> {
        if self.limited_threshold < 0.0 {
            return Err("limited_threshold must be >= 0".into());
        }
        if self.warning_threshold <= self.limited_threshold {
            return Err("warning_threshold must be greater than limited_threshold".into());
        }
        if self.default_interval_seconds <= 0 || self.default_interval_seconds > 600 {
            return Err("default_interval_seconds must be in (0, 600]".into());
        }
        if !(1.0..=100.0).contains(&self.cpu_limit_percent_limited) {
            return Err("cpu_limit_percent_limited must be in [1, 100]".into());
        }
        if !(1.0..=100.0).contains(&self.cpu_limit_percent_blocked) {
            return Err("cpu_limit_percent_blocked must be in [1, 100]".into());
        }
        if self.kill_grace_period_seconds < 0 {
            return Err("kill_grace_period_seconds must be >= 0".into());
        }
        Ok(())
    }

    /// Constant-time comparison against the configured agent token, to
    /// avoid leaking the token length/prefix through response timing.
    pub fn validate_agent_token(&self, provided: &str) -> bool {
        !self.agent_token.is_empty()
            && bool::from(self.agent_token.as_bytes().ct_eq(provided.as_bytes()))
    }

    /// Constant-time comparison against the configured admin bootstrap token.
    pub fn validate_admin_token(&self, provided: &str) -> bool {
        match &self.admin_token {
            Some(t) => !t.is_empty() && bool::from(t.as_bytes().ct_eq(provided.as_bytes())),
            None => false,
        }
    }

    /// Normalize a raw `interval_seconds` from a report per spec §4.1: use
    /// it if present and in (0, 600], else fall back to the configured
    /// default. A reported value of exactly 0 falls back too (Open
    /// Question (b) in SPEC_FULL.md, resolved the same way as
    /// out-of-range).
    pub fn normalize_interval_seconds(&self, reported: Option<i64>) -> i64 {
        match reported {
            Some(v) if v > 0 && v <= 600 => v,
            _ => self.default_interval_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: "sqlite::memory:".into(),
            agent_token: "agent-secret".into(),
            admin_token: None,
            warning_threshold: 50.0,
            limited_threshold: 10.0,
            default_cpu_price_per_core_minute: 0.01,
            default_gpu_price_per_minute: 0.1,
            default_interval_seconds: 60,
            default_balance: 10.0,
            kill_grace_period_seconds: 600,
            dry_run: false,
            enable_cpu_control: true,
            cpu_limit_percent_limited: 50.0,
            cpu_limit_percent_blocked: 10.0,
            session_hours: 24,
            cookie_secure: true,
            bootstrap_admin_username: None,
            bootstrap_admin_password: None,
        }
    }

    // -----------------------------------------------------------------------
    // validate
    // -----------------------------------------------------------------------

    #[test]
    fn validate_accepts_defaults() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_negative_limited_threshold() {
        let cfg = AppConfig {
            limited_threshold: -1.0,
            ..base_config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_warning_not_greater_than_limited() {
        let cfg = AppConfig {
            warning_threshold: 10.0,
            limited_threshold: 10.0,
            ..base_config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_interval_out_of_range() {
        let too_high = AppConfig {
            default_interval_seconds: 601,
            ..base_config()
        };
        assert!(too_high.validate().is_err());

        let zero = AppConfig {
            default_interval_seconds: 0,
            ..base_config()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn validate_rejects_cpu_percent_out_of_range() {
        let cfg = AppConfig {
            cpu_limit_percent_limited: 0.0,
            ..base_config()
        };
        assert!(cfg.validate().is_err());

        let cfg = AppConfig {
            cpu_limit_percent_blocked: 150.0,
            ..base_config()
        };
        assert!(cfg.validate().is_err());
    }

    // -----------------------------------------------------------------------
    // validate_agent_token / validate_admin_token
    // -----------------------------------------------------------------------

    #[test]
    fn validate_agent_token_correct() {
        let cfg = base_config();
        assert!(cfg.validate_agent_token("agent-secret"));
    }

    #[test]
    fn validate_agent_token_wrong() {
        let cfg = base_config();
        assert!(!cfg.validate_agent_token("wrong"));
    }

    #[test]
    fn validate_agent_token_empty_configured_rejects_everything() {
        let cfg = AppConfig {
            agent_token: "".into(),
            ..base_config()
        };
        assert!(!cfg.validate_agent_token(""));
    }

    #[test]
    fn validate_admin_token_none_configured_rejects() {
        let cfg = base_config();
        assert!(!cfg.validate_admin_token("anything"));
    }

    #[test]
    fn validate_admin_token_correct() {
        let cfg = AppConfig {
            admin_token: Some("top-secret".into()),
            ..base_config()
        };
        assert!(cfg.validate_admin_token("top-secret"));
        assert!(!cfg.validate_admin_token("wrong"));
    }

    // -----------------------------------------------------------------------
    // normalize_interval_seconds
    // -----------------------------------------------------------------------

    #[test]
    fn normalize_interval_seconds_uses_reported_value_in_range() {
        let cfg = base_config();
        assert_eq!(cfg.normalize_interval_seconds(Some(120)), 120);
    }

    #[test]
    fn normalize_interval_seconds_falls_back_on_zero() {
        let cfg = base_config();
        assert_eq!(cfg.normalize_interval_seconds(Some(0)), 60);
    }

    #[test]
    fn normalize_interval_seconds_falls_back_on_out_of_range() {
        let cfg = base_config();
        assert_eq!(cfg.normalize_interval_seconds(Some(601)), 60);
        assert_eq!(cfg.normalize_interval_seconds(Some(-5)), 60);
    }

    #[test]
    fn normalize_interval_seconds_falls_back_on_missing() {
        let cfg = base_config();
        assert_eq!(cfg.normalize_interval_seconds(None), 60);
    }
}
