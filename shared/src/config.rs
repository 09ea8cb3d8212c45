//! Runtime configuration (spec §6, §9).
//!
//! The source repo this spec was distilled from kept these as process-global
//! singletons; spec §9 calls that out for re-architecture. `Settings` is a
//! plain value constructed once at startup and passed into every
//! constructor that needs a tunable — nothing here is a `static`.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Haversine shortlist size (spec §4.2 stage 2).
    pub n_haversine: usize,
    /// Road-route shortlist size / max offers per round (spec §4.2 stage 3).
    pub n_final: usize,
    /// Distance filtering cap in km, bypassed for WEI fleet (spec §4.2).
    pub d_max_km: f64,
    /// Road-time filtering cap in minutes, bypassed for WEI fleet.
    pub t_max_min: f64,
    /// Per-driver response window in seconds (spec §4.3, §4.4, §5).
    pub t_round_secs: u64,
    /// ETA-compensation accumulation window in seconds (spec §9 open question).
    pub compensation_granularity_secs: u64,
    /// Scheduled-converter tick cadence in seconds (spec §4.7).
    pub t_check_secs: u64,
    /// Expiry-reminder lookahead in minutes (spec §4.7 step 1).
    pub t_remind_mins: i64,
    /// Scheduled->instant conversion lookahead in minutes (spec §4.7 step 2).
    pub t_convert_mins: i64,
    /// Max concurrent reminder sends (spec §4.7 step 1).
    pub reminder_concurrency: usize,
    /// Whether the (driver, pickup-address) blacklist is consulted at all.
    pub blacklist_enabled: bool,
    /// Blacklist entry TTL in seconds.
    pub blacklist_ttl_secs: u64,

    pub postgres_url: String,
    pub redis_url: String,
    pub nats_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            n_haversine: 15,
            n_final: 5,
            d_max_km: 15.0,
            t_max_min: 20.0,
            t_round_secs: 19,
            compensation_granularity_secs: 30,
            t_check_secs: 60,
            t_remind_mins: 60,
            t_convert_mins: 20,
            reminder_concurrency: 10,
            blacklist_enabled: true,
            blacklist_ttl_secs: 30 * 60,
            postgres_url: "postgres://localhost/dispatch".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            nats_url: "nats://localhost:4222".to_string(),
        }
    }
}

impl Settings {
    /// Load defaults layered with environment variables prefixed
    /// `DISPATCH_` (e.g. `DISPATCH_T_ROUND_SECS=19`).
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::Environment::with_prefix("DISPATCH").separator("__"))
            .build()?;

        settings
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))
    }

    pub fn t_round(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.t_round_secs)
    }

    pub fn t_check(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.t_check_secs)
    }
}
