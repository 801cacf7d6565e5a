use config::{Config, ConfigError, File};
use serde::Deserialize;

use crate::engine::commission::RateTable;

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Log {
    pub file: String,
    pub level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Reward {
    /// Anchors the daily quota window; minutes east of UTC.
    pub timezone_offset_minutes: i32,
    /// Well-known catalog id every user falls back to.
    pub trial_plan_id: String,
    pub trial_days: i64,
    /// When false, a job can be claimed once per reward period.
    pub allow_repeat_claims: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub postgres: Postgres,
    pub log: Log,
    pub reward: Reward,
    #[serde(default)]
    pub rates: RateTable,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config.toml"))
            .build()?;

        config.try_deserialize()
    }
}
