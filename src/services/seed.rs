//! Demo fleet used by `fleet-seed` and by the tests.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::info;

use crate::{auth, db::DbPool, error::AppError, models::user::UserRole};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const CLIENT_USERNAME: &str = "rajesh_k";
pub const CLIENT_PASSWORD: &str = "user123";

/// Children first so foreign keys never dangle mid-way.
const TABLES: [&str; 10] = [
    "sessions",
    "shipment",
    "maintenance",
    "trip",
    "client",
    "users",
    "truck",
    "driver",
    "goods",
    "owner",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub trucks: usize,
    pub drivers: usize,
    pub trips: usize,
    pub shipments: usize,
}

/// Wipes every table and loads the demo fleet, all in one transaction.
pub async fn reset_and_seed(db: &DbPool, now: DateTime<Utc>) -> Result<SeedSummary, AppError> {
    let admin_hash = auth::hash_password(ADMIN_PASSWORD)?;
    let client_hash = auth::hash_password(CLIENT_PASSWORD)?;

    let mut tx = db.begin().await?;
    for table in TABLES {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?;
    }
    // Restart AUTOINCREMENT ids so a fresh seed always numbers from 1.
    sqlx::query("DELETE FROM sqlite_sequence")
        .execute(&mut *tx)
        .await?;
    info!("old data cleared");

    let conn: &mut SqliteConnection = &mut tx;
    let speedy = insert(
        &mut *conn,
        sqlx::query("INSERT INTO owner (name, contact_info, address) VALUES (?1, ?2, ?3)")
            .bind("Speedy Logistics")
            .bind("contact@speedy.com")
            .bind("123 Logistics Lane, Chennai"),
    )
    .await?;
    let bharat = insert(
        &mut *conn,
        sqlx::query("INSERT INTO owner (name, contact_info, address) VALUES (?1, ?2, ?3)")
            .bind("Bharat Transport")
            .bind("bharat@bt.com")
            .bind("45 MG Road, Mumbai"),
    )
    .await?;

    let mut users = 0;
    let mut client_user = 0;
    for (username, hash, role) in [
        (ADMIN_USERNAME, &admin_hash, UserRole::Admin),
        (CLIENT_USERNAME, &client_hash, UserRole::User),
    ] {
        let id = insert(
            &mut *conn,
            sqlx::query(
                "INSERT INTO users (username, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(username)
            .bind(hash)
            .bind(role.as_str())
            .bind(now),
        )
        .await?;
        if role == UserRole::User {
            client_user = id;
        }
        users += 1;
    }

    let client = insert(
        &mut *conn,
        sqlx::query(
            "INSERT INTO client (client_name, billing_address, contact_person, user_id) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind("Global Electronics")
        .bind("789 Tech Park, Pune")
        .bind("Priya Sharma")
        .bind(client_user),
    )
    .await?;

    let mut drivers = Vec::new();
    for (first, last, license) in [("Rajesh", "Kumar", "DL123XYZ"), ("Anil", "Mehta", "MH56ABC")] {
        let id = insert(
            &mut *conn,
            sqlx::query("INSERT INTO driver (first_name, last_name, license_number) VALUES (?1, ?2, ?3)")
                .bind(first)
                .bind(last)
                .bind(license),
        )
        .await?;
        drivers.push(id);
    }

    let mut trucks = Vec::new();
    for (registration, model, tons, owner) in [
        ("TN-01-AB-1234", "Tata Ultra", 10, speedy),
        ("MH-12-XY-9876", "Ashok Leyland Dost", 8, bharat),
    ] {
        let id = insert(
            &mut *conn,
            sqlx::query(
                "INSERT INTO truck (registration_num, model, capacity_tons, owner_id) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(registration)
            .bind(model)
            .bind(tons)
            .bind(owner),
        )
        .await?;
        trucks.push(id);
    }

    let mut goods = Vec::new();
    for (name, kind) in [("Electronic Components", "Fragile"), ("Cement Bags", "Construction")] {
        let id = insert(
            &mut *conn,
            sqlx::query("INSERT INTO goods (name, goods_type) VALUES (?1, ?2)")
                .bind(name)
                .bind(kind),
        )
        .await?;
        goods.push(id);
    }

    let mut trips = Vec::new();
    for (origin, destination, start, end, slot) in [
        ("Chennai", "Bangalore", (2025, 10, 10), (2025, 10, 17), 0),
        ("Mumbai", "Pune", (2025, 10, 15), (2025, 10, 22), 1),
    ] {
        let id = insert(
            &mut *conn,
            sqlx::query(
                "INSERT INTO trip (origin, destination, start_date, end_date, status, truck_id, driver_id, client_id) \
                 VALUES (?1, ?2, ?3, ?4, 'Scheduled', ?5, ?6, ?7)",
            )
            .bind(origin)
            .bind(destination)
            .bind(ymd(start)?)
            .bind(ymd(end)?)
            .bind(trucks[slot])
            .bind(drivers[slot])
            .bind(client),
        )
        .await?;
        trips.push(id);
    }

    for (truck, date, description) in [
        (trucks[0], (2025, 9, 1), "Oil Change"),
        (trucks[1], (2025, 9, 10), "Brake Inspection"),
    ] {
        insert(
            &mut *conn,
            sqlx::query(
                "INSERT INTO maintenance (truck_id, maintenance_date, description) VALUES (?1, ?2, ?3)",
            )
            .bind(truck)
            .bind(ymd(date)?)
            .bind(description),
        )
        .await?;
    }

    let shipments = [
        (trips[0], goods[0], 100),
        (trips[1], goods[1], 200),
        (trips[0], goods[1], 50),
        (trips[1], goods[0], 75),
        (trips[1], goods[1], 150),
    ];
    for (trip, good, quantity) in shipments {
        insert(
            &mut *conn,
            sqlx::query("INSERT INTO shipment (trip_id, goods_id, quantity) VALUES (?1, ?2, ?3)")
                .bind(trip)
                .bind(good)
                .bind(quantity),
        )
        .await?;
    }

    tx.commit().await?;

    let summary = SeedSummary {
        users,
        trucks: trucks.len(),
        drivers: drivers.len(),
        trips: trips.len(),
        shipments: shipments.len(),
    };
    info!("demo data inserted: {summary:?}");
    Ok(summary)
}

async fn insert<'q>(
    conn: &mut SqliteConnection,
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
) -> Result<i64, sqlx::Error> {
    Ok(query.execute(conn).await?.last_insert_rowid())
}

fn ymd((year, month, day): (i32, u32, u32)) -> Result<NaiveDate, AppError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| AppError::Config(format!("invalid seed date {year}-{month}-{day}")))
}
