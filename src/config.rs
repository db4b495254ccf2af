use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, ensure};
use tracing::warn;

pub const MAX_BOOKING_HORIZON_DAYS: i64 = 365;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub clinic_utc_offset_minutes: i32,
    pub booking_horizon_days: i64,
    pub reminder_interval: Duration,
    pub live_send_timeout: Duration,
    pub messaging_gateway_url: Option<String>,
    pub fcm_project_id: Option<String>,
    pub fcm_access_token: Option<String>,
}

/// Unset or blank means `default`; anything else must parse.
fn parse_setting<T>(key: &str, raw: Option<&str>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|e| anyhow!("{key}={value:?} is invalid: {e}")),
    }
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    parse_setting(key, env::var(key).ok().as_deref(), default)
}

fn check_horizon(days: i64) -> anyhow::Result<i64> {
    ensure!(
        (1..=MAX_BOOKING_HORIZON_DAYS).contains(&days),
        "BOOKING_HORIZON_DAYS must be between 1 and {MAX_BOOKING_HORIZON_DAYS}, got {days}"
    );
    Ok(days)
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        let reminder_secs: u64 = parse_or("REMINDER_INTERVAL_SECS", 60)?;
        let live_ms: u64 = parse_or("LIVE_SEND_TIMEOUT_MS", 1000)?;
        let clinic_utc_offset_minutes: i32 = parse_or("CLINIC_UTC_OFFSET_MINUTES", 120)?;
        ensure!(
            clinic_utc_offset_minutes.abs() < 24 * 60,
            "CLINIC_UTC_OFFSET_MINUTES must be within one day, got {clinic_utc_offset_minutes}"
        );
        let booking_horizon_days = check_horizon(parse_or("BOOKING_HORIZON_DAYS", 14)?)?;

        let messaging_gateway_url = non_empty("MESSAGING_GATEWAY_URL");
        if messaging_gateway_url.is_none() {
            warn!("MESSAGING_GATEWAY_URL not set, direct messages are disabled");
        }

        let fcm_project_id = non_empty("FCM_PROJECT_ID");
        let fcm_access_token = non_empty("FCM_ACCESS_TOKEN");
        if fcm_project_id.is_none() || fcm_access_token.is_none() {
            warn!("FCM_PROJECT_ID / FCM_ACCESS_TOKEN not set, push notifications are disabled");
        }

        Ok(Self {
            database_url,
            bind_addr,
            clinic_utc_offset_minutes,
            booking_horizon_days,
            reminder_interval: Duration::from_secs(reminder_secs.max(1)),
            live_send_timeout: Duration::from_millis(live_ms.max(1)),
            messaging_gateway_url,
            fcm_project_id,
            fcm_access_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_or_blank_settings_use_the_default() {
        assert_eq!(parse_setting("X", None, 14i64).unwrap(), 14);
        assert_eq!(parse_setting("X", Some("  "), 14i64).unwrap(), 14);
        assert_eq!(parse_setting("X", Some(" 21 "), 14i64).unwrap(), 21);
    }

    #[test]
    fn malformed_settings_are_errors() {
        let err = parse_setting("REMINDER_INTERVAL_SECS", Some("1m"), 60u64).unwrap_err();
        assert!(err.to_string().contains("REMINDER_INTERVAL_SECS"));
        assert!(parse_setting("BOOKING_HORIZON_DAYS", Some("-"), 14i64).is_err());
    }

    #[test]
    fn horizon_must_be_in_range() {
        assert_eq!(check_horizon(14).unwrap(), 14);
        assert!(check_horizon(0).is_err());
        assert!(check_horizon(i64::MAX).is_err());
    }
}
