//! Trip booking.
//!
//! A booking is admitted only when it starts no earlier than the policy's lead
//! time, spans at least the policy's minimum duration, and its half-open
//! `[start, end)` interval overlaps no non-completed trip of the same truck or
//! of the same driver. The rules are checked in that order and the first
//! violation is reported.
//!
//! [`book_trip`] runs the check and the insert inside one transaction. The
//! schema carries triggers that abort an overlapping insert, so a booking that
//! races past the check fails with [`BookingError::ConcurrentConflict`] instead
//! of committing a double booking.

use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{FromRow, SqliteExecutor};
use thiserror::Error;
use tracing::{info, warn};

use crate::{config::BookingPolicy, db::DbPool, services::fleet};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub origin: String,
    pub destination: String,
    pub dates: DateRange,
    pub truck_id: i64,
    pub driver_id: i64,
}

/// A trip still holding its truck and driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct ActiveTrip {
    pub id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ActiveTrip {
    pub fn dates(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Please fill in the {0} field.")]
    MissingField(&'static str),
    #[error("Invalid {field} '{value}': dates must use the YYYY-MM-DD format.")]
    MalformedDate { field: &'static str, value: String },
    #[error("Invalid {0}: please pick one from the list.")]
    MalformedId(&'static str),
    #[error("Invalid date: trips can start on {earliest} at the earliest.")]
    StartTooSoon { earliest: NaiveDate },
    #[error("Trip is too short: bookings must last at least {min_days} days, not {requested_days}.")]
    TooShort { min_days: i64, requested_days: i64 },
    #[error("Truck is already booked for trip #{trip_id} during those dates.")]
    TruckConflict { trip_id: i64 },
    #[error("Driver is already assigned to trip #{trip_id} during those dates.")]
    DriverConflict { trip_id: i64 },
    #[error("Truck #{0} does not exist.")]
    UnknownTruck(i64),
    #[error("Driver #{0} does not exist.")]
    UnknownDriver(i64),
    #[error("Could not find a client profile for your user.")]
    NoClientProfile,
    #[error("That truck or driver was just booked by someone else. Please try again.")]
    ConcurrentConflict,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Raw `POST /book_trip` form. Every field is optional on the wire so that a
/// missing one surfaces as a [`BookingError`] rather than an extractor rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingForm {
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub truck_id: String,
    #[serde(default)]
    pub driver_id: String,
}

impl BookingForm {
    pub fn parse(&self) -> Result<BookingRequest, BookingError> {
        let origin = required_text("origin", &self.origin)?;
        let destination = required_text("destination", &self.destination)?;
        let start = parse_date("start_date", &self.start_date)?;
        let end = parse_date("end_date", &self.end_date)?;
        let truck_id = parse_id("truck_id", &self.truck_id)?;
        let driver_id = parse_id("driver_id", &self.driver_id)?;
        Ok(BookingRequest {
            origin,
            destination,
            dates: DateRange::new(start, end),
            truck_id,
            driver_id,
        })
    }
}

fn required_text(field: &'static str, raw: &str) -> Result<String, BookingError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BookingError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, BookingError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BookingError::MissingField(field));
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT).map_err(|_| BookingError::MalformedDate {
        field,
        value: trimmed.to_string(),
    })
}

fn parse_id(field: &'static str, raw: &str) -> Result<i64, BookingError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BookingError::MissingField(field));
    }
    trimmed
        .parse()
        .map_err(|_| BookingError::MalformedId(field))
}

/// First trip in `trips` whose dates overlap `requested`.
pub fn find_conflict(requested: &DateRange, trips: &[ActiveTrip]) -> Option<i64> {
    trips
        .iter()
        .find(|trip| requested.overlaps(&trip.dates()))
        .map(|trip| trip.id)
}

/// Decides whether a trip over `dates` may be booked. `truck_trips` and
/// `driver_trips` are the non-completed trips of the requested truck and driver.
pub fn validate_booking(
    dates: &DateRange,
    today: NaiveDate,
    policy: &BookingPolicy,
    truck_trips: &[ActiveTrip],
    driver_trips: &[ActiveTrip],
) -> Result<(), BookingError> {
    let earliest = policy.earliest_start(today);
    if dates.start < earliest {
        return Err(BookingError::StartTooSoon { earliest });
    }

    let requested_days = dates.days();
    if requested_days < policy.min_duration_days {
        return Err(BookingError::TooShort {
            min_days: policy.min_duration_days,
            requested_days,
        });
    }

    if let Some(trip_id) = find_conflict(dates, truck_trips) {
        return Err(BookingError::TruckConflict { trip_id });
    }
    if let Some(trip_id) = find_conflict(dates, driver_trips) {
        return Err(BookingError::DriverConflict { trip_id });
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Truck,
    Driver,
}

impl Resource {
    fn active_trips_query(&self) -> &'static str {
        match self {
            Resource::Truck => {
                "SELECT id, start_date, end_date FROM trip \
                 WHERE truck_id = ?1 AND status <> 'Completed' AND (?2 IS NULL OR id <> ?2) \
                 ORDER BY start_date"
            }
            Resource::Driver => {
                "SELECT id, start_date, end_date FROM trip \
                 WHERE driver_id = ?1 AND status <> 'Completed' AND (?2 IS NULL OR id <> ?2) \
                 ORDER BY start_date"
            }
        }
    }
}

/// Non-completed trips holding `resource` number `id`, optionally leaving one trip out.
pub async fn active_trips<'e, E>(
    executor: E,
    resource: Resource,
    id: i64,
    exclude_trip: Option<i64>,
) -> Result<Vec<ActiveTrip>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as(resource.active_trips_query())
        .bind(id)
        .bind(exclude_trip)
        .fetch_all(executor)
        .await
}

/// Validates and stores a booking for the client profile of `user_id`,
/// returning the new trip id.
pub async fn book_trip(
    db: &DbPool,
    today: NaiveDate,
    policy: &BookingPolicy,
    user_id: i64,
    request: &BookingRequest,
) -> Result<i64, BookingError> {
    let mut tx = db.begin().await?;

    let client = fleet::client_for_user(&mut *tx, user_id)
        .await?
        .ok_or(BookingError::NoClientProfile)?;
    if !fleet::truck_exists(&mut *tx, request.truck_id).await? {
        return Err(BookingError::UnknownTruck(request.truck_id));
    }
    if !fleet::driver_exists(&mut *tx, request.driver_id).await? {
        return Err(BookingError::UnknownDriver(request.driver_id));
    }

    let truck_trips = active_trips(&mut *tx, Resource::Truck, request.truck_id, None).await?;
    let driver_trips = active_trips(&mut *tx, Resource::Driver, request.driver_id, None).await?;
    if let Err(err) = validate_booking(&request.dates, today, policy, &truck_trips, &driver_trips) {
        warn!("booking by user {user_id} rejected: {err}");
        return Err(err);
    }

    let trip_id = sqlx::query(
        "INSERT INTO trip (origin, destination, start_date, end_date, status, truck_id, driver_id, client_id) \
         VALUES (?1, ?2, ?3, ?4, 'Scheduled', ?5, ?6, ?7)",
    )
    .bind(&request.origin)
    .bind(&request.destination)
    .bind(request.dates.start)
    .bind(request.dates.end)
    .bind(request.truck_id)
    .bind(request.driver_id)
    .bind(client.id)
    .execute(&mut *tx)
    .await
    .map_err(classify_write_error)?
    .last_insert_rowid();

    tx.commit().await.map_err(classify_write_error)?;

    info!(
        "trip #{trip_id} booked for client {} ({} -> {}, {} to {}, truck {}, driver {})",
        client.id,
        request.origin,
        request.destination,
        request.dates.start,
        request.dates.end,
        request.truck_id,
        request.driver_id
    );
    Ok(trip_id)
}

/// Overlap triggers and lock contention both mean another booking got there first.
fn classify_write_error(err: sqlx::Error) -> BookingError {
    let lost_race = match &err {
        sqlx::Error::Database(db_err) => {
            is_overlap_or_busy(db_err.message(), db_err.code().as_deref())
        }
        _ => false,
    };
    if lost_race {
        warn!("booking lost a race: {err}");
        BookingError::ConcurrentConflict
    } else {
        BookingError::Database(err)
    }
}

fn is_overlap_or_busy(message: &str, code: Option<&str>) -> bool {
    message.contains("trip overlap") || matches!(code, Some("5") | Some("517"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, DATE_FORMAT).unwrap()
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(date(start), date(end))
    }

    fn trip(id: i64, start: &str, end: &str) -> ActiveTrip {
        ActiveTrip {
            id,
            start_date: date(start),
            end_date: date(end),
        }
    }

    fn today() -> NaiveDate {
        date("2025-10-01")
    }

    #[test]
    fn admits_a_week_long_trip_starting_tomorrow() {
        let dates = range("2025-10-02", "2025-10-09");
        validate_booking(&dates, today(), &BookingPolicy::default(), &[], &[]).unwrap();
    }

    #[test]
    fn rejects_start_today_or_earlier() {
        for start in ["2025-10-01", "2025-09-30", "2024-01-01"] {
            let dates = DateRange::new(date(start), date("2025-12-31"));
            let err = validate_booking(&dates, today(), &BookingPolicy::default(), &[], &[])
                .unwrap_err();
            assert!(
                matches!(err, BookingError::StartTooSoon { earliest } if earliest == date("2025-10-02")),
                "{start}: {err:?}"
            );
        }
    }

    #[test]
    fn start_rule_wins_over_every_other_rule() {
        let dates = range("2025-09-30", "2025-10-01");
        let blocking = [trip(1, "2025-09-01", "2025-12-01")];
        let err = validate_booking(&dates, today(), &BookingPolicy::default(), &blocking, &blocking)
            .unwrap_err();
        assert!(matches!(err, BookingError::StartTooSoon { .. }));
    }

    #[test]
    fn rejects_trips_shorter_than_a_week() {
        let dates = range("2025-10-10", "2025-10-16");
        let err = validate_booking(&dates, today(), &BookingPolicy::default(), &[], &[]).unwrap_err();
        assert!(matches!(
            err,
            BookingError::TooShort {
                min_days: 7,
                requested_days: 6
            }
        ));
    }

    #[test]
    fn rejects_end_before_start_as_too_short() {
        let dates = range("2025-10-20", "2025-10-10");
        let err = validate_booking(&dates, today(), &BookingPolicy::default(), &[], &[]).unwrap_err();
        assert!(matches!(err, BookingError::TooShort { requested_days: -10, .. }));
    }

    #[test]
    fn truck_conflict_names_the_blocking_trip() {
        let dates = range("2025-10-15", "2025-10-25");
        let truck_trips = [trip(7, "2025-09-01", "2025-09-10"), trip(1, "2025-10-10", "2025-10-20")];
        let err = validate_booking(&dates, today(), &BookingPolicy::default(), &truck_trips, &[])
            .unwrap_err();
        assert!(matches!(err, BookingError::TruckConflict { trip_id: 1 }));
        assert!(err.to_string().contains("#1"));
    }

    #[test]
    fn truck_is_checked_before_driver() {
        let dates = range("2025-10-15", "2025-10-25");
        let truck_trips = [trip(3, "2025-10-10", "2025-10-20")];
        let driver_trips = [trip(4, "2025-10-20", "2025-10-30")];
        let err = validate_booking(
            &dates,
            today(),
            &BookingPolicy::default(),
            &truck_trips,
            &driver_trips,
        )
        .unwrap_err();
        assert!(matches!(err, BookingError::TruckConflict { trip_id: 3 }));
    }

    #[test]
    fn driver_conflict_names_the_blocking_trip() {
        let dates = range("2025-10-15", "2025-10-25");
        let driver_trips = [trip(9, "2025-10-24", "2025-11-05")];
        let err = validate_booking(&dates, today(), &BookingPolicy::default(), &[], &driver_trips)
            .unwrap_err();
        assert!(matches!(err, BookingError::DriverConflict { trip_id: 9 }));
    }

    #[test]
    fn back_to_back_trips_do_not_overlap() {
        let dates = range("2025-10-20", "2025-10-27");
        let before = [trip(1, "2025-10-10", "2025-10-20")];
        let after = [trip(2, "2025-10-27", "2025-11-03")];
        validate_booking(&dates, today(), &BookingPolicy::default(), &before, &after).unwrap();
    }

    #[test]
    fn enclosing_and_enclosed_intervals_overlap() {
        let outer = range("2025-10-01", "2025-10-31");
        let inner = range("2025-10-10", "2025-10-12");
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn policy_is_honoured() {
        let policy = BookingPolicy {
            min_lead_days: 3,
            min_duration_days: 2,
        };
        let too_soon = range("2025-10-03", "2025-10-10");
        assert!(matches!(
            validate_booking(&too_soon, today(), &policy, &[], &[]),
            Err(BookingError::StartTooSoon { .. })
        ));
        let short_but_fine = range("2025-10-04", "2025-10-06");
        validate_booking(&short_but_fine, today(), &policy, &[], &[]).unwrap();
    }

    #[test]
    fn form_parses_trimmed_fields() {
        let form = BookingForm {
            origin: " Chennai ".into(),
            destination: "Bangalore".into(),
            start_date: "2025-10-10".into(),
            end_date: " 2025-10-20".into(),
            truck_id: "1".into(),
            driver_id: "2 ".into(),
        };
        let request = form.parse().unwrap();
        assert_eq!(request.origin, "Chennai");
        assert_eq!(request.dates, range("2025-10-10", "2025-10-20"));
        assert_eq!((request.truck_id, request.driver_id), (1, 2));
    }

    #[test]
    fn form_reports_each_bad_field() {
        let valid = BookingForm {
            origin: "Mumbai".into(),
            destination: "Pune".into(),
            start_date: "2025-10-10".into(),
            end_date: "2025-10-20".into(),
            truck_id: "1".into(),
            driver_id: "1".into(),
        };

        let missing_origin = BookingForm {
            origin: "  ".into(),
            ..valid.clone()
        };
        assert!(matches!(
            missing_origin.parse(),
            Err(BookingError::MissingField("origin"))
        ));

        let bad_date = BookingForm {
            start_date: "10/10/2025".into(),
            ..valid.clone()
        };
        assert!(matches!(
            bad_date.parse(),
            Err(BookingError::MalformedDate { field: "start_date", .. })
        ));

        let impossible_date = BookingForm {
            end_date: "2025-02-30".into(),
            ..valid.clone()
        };
        assert!(matches!(
            impossible_date.parse(),
            Err(BookingError::MalformedDate { field: "end_date", .. })
        ));

        let bad_truck = BookingForm {
            truck_id: "truck-1".into(),
            ..valid
        };
        assert!(matches!(
            bad_truck.parse(),
            Err(BookingError::MalformedId("truck_id"))
        ));
    }

    #[test]
    fn huge_lead_time_rejects_without_panicking() {
        let policy = BookingPolicy {
            min_lead_days: 10_000_000_000_000,
            min_duration_days: 7,
        };
        let dates = DateRange::new(date("2025-10-10"), date("2025-10-17"));
        assert!(matches!(
            validate_booking(&dates, today(), &policy, &[], &[]),
            Err(BookingError::StartTooSoon { .. })
        ));
    }

    #[test]
    fn overlap_trigger_messages_are_races() {
        assert!(is_overlap_or_busy("trip overlap: truck double-booked", Some("1811")));
        assert!(is_overlap_or_busy("database is locked", Some("5")));
        assert!(!is_overlap_or_busy("FOREIGN KEY constraint failed", Some("787")));
    }
}
