use std::{env, fmt::Display, net::SocketAddr, str::FromStr};

use chrono::{Days, NaiveDate};

use crate::error::AppError;

/// Date rules applied to every booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicy {
    /// Earliest allowed start, in days after the server's current date.
    pub min_lead_days: i64,
    /// Shortest allowed trip length in days.
    pub min_duration_days: i64,
}

/// Upper bound for either booking rule, about a century.
pub const MAX_POLICY_DAYS: i64 = 36_500;
/// Sessions last at most a year.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;

impl BookingPolicy {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(0..=MAX_POLICY_DAYS).contains(&self.min_lead_days) {
            return Err(AppError::Config(format!(
                "invalid BOOKING_MIN_LEAD_DAYS: {} (expected 0 to {MAX_POLICY_DAYS})",
                self.min_lead_days
            )));
        }
        if !(1..=MAX_POLICY_DAYS).contains(&self.min_duration_days) {
            return Err(AppError::Config(format!(
                "invalid BOOKING_MIN_DURATION_DAYS: {} (expected 1 to {MAX_POLICY_DAYS})",
                self.min_duration_days
            )));
        }
        Ok(())
    }

    /// First start date allowed when the server date is `today`.
    pub fn earliest_start(&self, today: NaiveDate) -> NaiveDate {
        let lead = Days::new(self.min_lead_days.clamp(0, MAX_POLICY_DAYS) as u64);
        today.checked_add_days(lead).unwrap_or(NaiveDate::MAX)
    }
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            min_lead_days: 1,
            min_duration_days: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub listen_addr: SocketAddr,
    pub cookie_secret: String,
    pub session_ttl_hours: i64,
    pub booking: BookingPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://fleet.db?mode=rwc".to_string());
        let db_max_connections = parse_var("DB_MAX_CONNECTIONS", 10)?;
        let listen_addr: SocketAddr = parse_var("APP_LISTEN_ADDR", ([127, 0, 0, 1], 3000).into())?;

        let cookie_secret = env::var("COOKIE_SECRET")
            .unwrap_or_else(|_| "change-me-fleet-booking-cookie-secret".to_string());

        let session_ttl_hours = parse_var("SESSION_TTL_HOURS", 24 * 7)?;

        let defaults = BookingPolicy::default();
        let booking = BookingPolicy {
            min_lead_days: parse_var("BOOKING_MIN_LEAD_DAYS", defaults.min_lead_days)?,
            min_duration_days: parse_var("BOOKING_MIN_DURATION_DAYS", defaults.min_duration_days)?,
        };

        let config = Self {
            database_url,
            db_max_connections,
            listen_addr,
            cookie_secret,
            session_ttl_hours,
            booking,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make date arithmetic overflow later on.
    pub fn validate(&self) -> Result<(), AppError> {
        self.booking.validate()?;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&self.session_ttl_hours) {
            return Err(AppError::Config(format!(
                "invalid SESSION_TTL_HOURS: {} (expected 1 to {MAX_SESSION_TTL_HOURS})",
                self.session_ttl_hours
            )));
        }
        if self.db_max_connections == 0 {
            return Err(AppError::Config("invalid DB_MAX_CONNECTIONS: 0".into()));
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|err| AppError::Config(format!("invalid {name}: {err}"))),
        Err(_) => Ok(default),
    }
}
