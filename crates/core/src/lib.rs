pub mod alert;
pub mod display;
pub mod domain;
pub mod notify;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    use crate::time::trigger::TriggerTime;

    const DEFAULT_STATE_PATH: &str = "invest_alert_state.json";
    const DEFAULT_ICON: &str = "/icon-192.png";
    const KST_OFFSET_MINUTES: i32 = crate::time::kr_market::KST_OFFSET_SECS / 60;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum NotifyBackend {
        Desktop,
        Log,
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub state_path: PathBuf,
        pub catalog_path: Option<PathBuf>,
        pub morning_at: TriggerTime,
        pub evening_at: TriggerTime,
        pub utc_offset_minutes: i32,
        pub poll_secs: u64,
        pub grace_minutes: u32,
        pub market_days_only: bool,
        pub notify_backend: NotifyBackend,
        pub notify_permission_granted: bool,
        pub notify_icon: String,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                database_url: None,
                sentry_dsn: None,
                state_path: PathBuf::from(DEFAULT_STATE_PATH),
                catalog_path: None,
                morning_at: TriggerTime::MORNING,
                evening_at: TriggerTime::EVENING,
                utc_offset_minutes: KST_OFFSET_MINUTES,
                poll_secs: 60,
                grace_minutes: 1,
                market_days_only: false,
                notify_backend: NotifyBackend::Desktop,
                notify_permission_granted: true,
                notify_icon: DEFAULT_ICON.to_string(),
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let defaults = Self::default();

            let morning_at = match env_nonempty("MORNING_ALERT_AT") {
                Some(s) => s.parse::<TriggerTime>().context("invalid MORNING_ALERT_AT")?,
                None => defaults.morning_at,
            };
            let evening_at = match env_nonempty("EVENING_ALERT_AT") {
                Some(s) => s.parse::<TriggerTime>().context("invalid EVENING_ALERT_AT")?,
                None => defaults.evening_at,
            };

            let utc_offset_minutes = parse_env("ALERT_UTC_OFFSET_MINUTES")?
                .unwrap_or(defaults.utc_offset_minutes);
            anyhow::ensure!(
                (-14 * 60..=14 * 60).contains(&utc_offset_minutes),
                "ALERT_UTC_OFFSET_MINUTES out of range: {utc_offset_minutes}"
            );

            let poll_secs = parse_env("ALERT_POLL_SECS")?.unwrap_or(defaults.poll_secs);
            anyhow::ensure!(poll_secs >= 1, "ALERT_POLL_SECS must be >= 1");

            let grace_minutes =
                parse_env("ALERT_GRACE_MINUTES")?.unwrap_or(defaults.grace_minutes);
            anyhow::ensure!(
                (1..=60).contains(&grace_minutes),
                "ALERT_GRACE_MINUTES must be 1..=60 (got {grace_minutes})"
            );

            let notify_backend = match env_nonempty("NOTIFY_BACKEND").as_deref() {
                None | Some("desktop") => NotifyBackend::Desktop,
                Some("log") => NotifyBackend::Log,
                Some(other) => anyhow::bail!("unknown NOTIFY_BACKEND: {other}"),
            };

            let notify_permission_granted = match env_nonempty("NOTIFY_PERMISSION").as_deref() {
                None | Some("granted") => true,
                Some("denied") => false,
                Some(other) => anyhow::bail!("unknown NOTIFY_PERMISSION: {other}"),
            };

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                state_path: env_nonempty("STATE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.state_path),
                catalog_path: env_nonempty("CATALOG_PATH").map(PathBuf::from),
                morning_at,
                evening_at,
                utc_offset_minutes,
                poll_secs,
                grace_minutes,
                market_days_only: parse_env("ALERT_MARKET_DAYS_ONLY")?
                    .unwrap_or(defaults.market_days_only),
                notify_backend,
                notify_permission_granted,
                notify_icon: env_nonempty("NOTIFY_ICON").unwrap_or(defaults.notify_icon),
            })
        }

        pub fn utc_offset(&self) -> anyhow::Result<chrono::FixedOffset> {
            chrono::FixedOffset::east_opt(self.utc_offset_minutes * 60)
                .context("invalid ALERT_UTC_OFFSET_MINUTES")
        }
    }

    fn env_nonempty(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn parse_env<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env_nonempty(key) {
            Some(s) => s
                .parse::<T>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("invalid {key}={s}: {e}")),
            None => Ok(None),
        }
    }
}
