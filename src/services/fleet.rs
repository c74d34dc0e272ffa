use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor};

use crate::{
    db::DbPool,
    models::fleet::{Client, Driver, Maintenance, Truck},
};

pub async fn client_for_user<'e, E>(executor: E, user_id: i64) -> Result<Option<Client>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as(
        "SELECT id, client_name, billing_address, contact_person, user_id FROM client WHERE user_id = ?1",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

pub async fn truck_exists<'e, E>(executor: E, truck_id: i64) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM truck WHERE id = ?1")
        .bind(truck_id)
        .fetch_optional(executor)
        .await?;
    Ok(found.is_some())
}

pub async fn driver_exists<'e, E>(executor: E, driver_id: i64) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM driver WHERE id = ?1")
        .bind(driver_id)
        .fetch_optional(executor)
        .await?;
    Ok(found.is_some())
}

pub async fn list_trucks(db: &DbPool) -> Result<Vec<Truck>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, registration_num, model, capacity_tons, owner_id FROM truck ORDER BY id",
    )
    .fetch_all(db)
    .await
}

pub async fn list_drivers(db: &DbPool) -> Result<Vec<Driver>, sqlx::Error> {
    sqlx::query_as("SELECT id, first_name, last_name, license_number FROM driver ORDER BY id")
        .fetch_all(db)
        .await
}

pub async fn list_maintenance(db: &DbPool) -> Result<Vec<Maintenance>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, truck_id, maintenance_date, description FROM maintenance \
         ORDER BY maintenance_date DESC",
    )
    .fetch_all(db)
    .await
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdminStats {
    pub total_users: i64,
    pub ongoing_trips: i64,
    pub scheduled_trips: i64,
    pub trucks: i64,
    pub drivers: i64,
}

pub async fn admin_stats(db: &DbPool) -> Result<AdminStats, sqlx::Error> {
    let total_users = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await?;
    let ongoing_trips = sqlx::query_scalar("SELECT COUNT(*) FROM trip WHERE status = 'In Progress'")
        .fetch_one(db)
        .await?;
    let scheduled_trips = sqlx::query_scalar("SELECT COUNT(*) FROM trip WHERE status = 'Scheduled'")
        .fetch_one(db)
        .await?;
    let trucks = sqlx::query_scalar("SELECT COUNT(*) FROM truck")
        .fetch_one(db)
        .await?;
    let drivers = sqlx::query_scalar("SELECT COUNT(*) FROM driver")
        .fetch_one(db)
        .await?;
    Ok(AdminStats {
        total_users,
        ongoing_trips,
        scheduled_trips,
        trucks,
        drivers,
    })
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

pub async fn list_users(db: &DbPool) -> Result<Vec<UserSummary>, sqlx::Error> {
    sqlx::query_as("SELECT id, username, role, created_at FROM users ORDER BY id")
        .fetch_all(db)
        .await
}
