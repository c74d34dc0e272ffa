//! Trip lifecycle after booking: listings, client cancellation, admin status changes.

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    db::DbPool,
    models::{
        fleet::Shipment,
        trip::{Trip, TripOverview, TripStatus},
    },
    services::booking::{self, Resource},
};

const TRIP_COLUMNS: &str =
    "id, origin, destination, start_date, end_date, status, truck_id, driver_id, client_id";

#[derive(Debug, Error)]
pub enum TripError {
    #[error("Trip #{0} does not exist.")]
    NotFound(i64),
    #[error("You are not allowed to cancel trip #{0}.")]
    NotOwner(i64),
    #[error("Trip #{id} is {status} and can no longer be cancelled.")]
    NotCancellable { id: i64, status: TripStatus },
    #[error("Invalid status '{0}'. Choose Scheduled, In Progress, Completed or Cancelled.")]
    InvalidStatus(String),
    #[error("Trip #{id} cannot leave Completed: it would overlap trip #{other}.")]
    ReopenConflict { id: i64, other: i64 },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub async fn get_trip(db: &DbPool, trip_id: i64) -> Result<Option<Trip>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {TRIP_COLUMNS} FROM trip WHERE id = ?1"))
        .bind(trip_id)
        .fetch_optional(db)
        .await
}

pub async fn list_client_trips(db: &DbPool, client_id: i64) -> Result<Vec<Trip>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {TRIP_COLUMNS} FROM trip WHERE client_id = ?1 ORDER BY start_date DESC, id DESC"
    ))
    .bind(client_id)
    .fetch_all(db)
    .await
}

pub async fn list_all_trips(db: &DbPool) -> Result<Vec<TripOverview>, sqlx::Error> {
    sqlx::query_as(
        "SELECT t.id, t.origin, t.destination, t.start_date, t.end_date, t.status, c.client_name \
         FROM trip t JOIN client c ON t.client_id = c.id \
         ORDER BY t.start_date DESC, t.id DESC",
    )
    .fetch_all(db)
    .await
}

pub async fn shipments_for_trip(db: &DbPool, trip_id: i64) -> Result<Vec<Shipment>, sqlx::Error> {
    sqlx::query_as("SELECT id, trip_id, goods_id, quantity FROM shipment WHERE trip_id = ?1 ORDER BY id")
        .bind(trip_id)
        .fetch_all(db)
        .await
}

/// Cancels a trip on behalf of the client owning it and drops its shipments.
/// Returns the number of shipments removed.
pub async fn cancel_trip(db: &DbPool, user_id: i64, trip_id: i64) -> Result<u64, TripError> {
    let mut tx = db.begin().await?;

    let row: Option<(TripStatus, i64)> = sqlx::query_as(
        "SELECT t.status, c.user_id FROM trip t JOIN client c ON t.client_id = c.id WHERE t.id = ?1",
    )
    .bind(trip_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some((status, owner_user_id)) = row else {
        return Err(TripError::NotFound(trip_id));
    };
    if owner_user_id != user_id {
        warn!("user {user_id} tried to cancel trip #{trip_id} owned by user {owner_user_id}");
        return Err(TripError::NotOwner(trip_id));
    }
    if !status.is_cancellable() {
        return Err(TripError::NotCancellable {
            id: trip_id,
            status,
        });
    }

    let removed = sqlx::query("DELETE FROM shipment WHERE trip_id = ?1")
        .bind(trip_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("UPDATE trip SET status = ?1 WHERE id = ?2")
        .bind(TripStatus::Cancelled)
        .bind(trip_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("trip #{trip_id} cancelled by user {user_id}, {removed} shipment(s) removed");
    Ok(removed)
}

/// Sets the status of a trip. `raw_status` must be one of the four lifecycle
/// values; anything else leaves the trip untouched. Returns the previous status.
pub async fn update_trip_status(
    db: &DbPool,
    trip_id: i64,
    raw_status: &str,
) -> Result<TripStatus, TripError> {
    let status: TripStatus = raw_status
        .parse()
        .map_err(|_| TripError::InvalidStatus(raw_status.to_string()))?;

    let mut tx = db.begin().await?;
    let trip: Option<Trip> = sqlx::query_as(&format!("SELECT {TRIP_COLUMNS} FROM trip WHERE id = ?1"))
        .bind(trip_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(trip) = trip else {
        return Err(TripError::NotFound(trip_id));
    };
    if trip.status == status {
        return Ok(trip.status);
    }

    if !trip.status.blocks_resources() && status.blocks_resources() {
        let dates = booking::DateRange::new(trip.start_date, trip.end_date);
        for (resource, id) in [(Resource::Truck, trip.truck_id), (Resource::Driver, trip.driver_id)] {
            let others = booking::active_trips(&mut *tx, resource, id, Some(trip.id)).await?;
            if let Some(other) = booking::find_conflict(&dates, &others) {
                return Err(TripError::ReopenConflict { id: trip.id, other });
            }
        }
    }

    sqlx::query("UPDATE trip SET status = ?1 WHERE id = ?2")
        .bind(status)
        .bind(trip_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("trip #{trip_id} status {} -> {}", trip.status, status);
    Ok(trip.status)
}
