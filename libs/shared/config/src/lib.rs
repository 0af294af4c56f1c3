use std::env;
use std::time::Duration;
use tracing::warn;

const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 12;
const DEFAULT_APPOINTMENT_DURATION_MINUTES: i32 = 30;
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub upstream_timeout_secs: u64,
    pub default_appointment_duration_minutes: i32,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            upstream_timeout_secs: parse_or_default("UPSTREAM_TIMEOUT_SECS", DEFAULT_UPSTREAM_TIMEOUT_SECS),
            default_appointment_duration_minutes: parse_or_default(
                "DEFAULT_APPOINTMENT_DURATION_MINUTES",
                DEFAULT_APPOINTMENT_DURATION_MINUTES,
            ),
            port: parse_or_default("PORT", DEFAULT_PORT),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "anon".to_string(),
            supabase_jwt_secret: "secret".to_string(),
            upstream_timeout_secs: 12,
            default_appointment_duration_minutes: 30,
            port: 3000,
        }
    }

    #[test]
    fn test_is_configured_requires_supabase_values() {
        let config = base_config();
        assert!(config.is_configured());

        let mut missing_secret = base_config();
        missing_secret.supabase_jwt_secret.clear();
        assert!(!missing_secret.is_configured());
    }

    #[test]
    fn test_upstream_timeout_duration() {
        let config = base_config();
        assert_eq!(config.upstream_timeout(), Duration::from_secs(12));
    }

    #[test]
    fn test_parse_or_default_falls_back_for_unset_key() {
        let value: u64 = parse_or_default("CLINIC_PORTAL_TEST_UNSET_KEY", 7);
        assert_eq!(value, 7);
    }
}
