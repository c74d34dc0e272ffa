use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::{DateTime, Local, Utc};
use serde::Deserialize;

use crate::{
    error::AppError,
    flash::{self, Flash},
    models::trip::{TripOverview, TripStatus},
    routes::{format_date, invalid_trip_id, parse_trip_id, public::unavailable},
    services::{
        fleet::{self, AdminStats},
        trips::{self, TripError},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard))
        .route("/update_trip_status/:id", post(update_trip_status))
}

struct StatusOption {
    value: &'static str,
    selected: bool,
}

struct AdminTripRow {
    id: i64,
    origin: String,
    destination: String,
    start_date: String,
    end_date: String,
    status: String,
    client_name: String,
    status_options: Vec<StatusOption>,
}

impl From<TripOverview> for AdminTripRow {
    fn from(trip: TripOverview) -> Self {
        let status_options = TripStatus::ALL
            .into_iter()
            .map(|status| StatusOption {
                value: status.as_str(),
                selected: status == trip.status,
            })
            .collect();
        Self {
            id: trip.id,
            origin: trip.origin,
            destination: trip.destination,
            start_date: format_date(trip.start_date),
            end_date: format_date(trip.end_date),
            status: trip.status.to_string(),
            client_name: trip.client_name,
            status_options,
        }
    }
}

struct AdminUserRow {
    id: i64,
    username: String,
    role: String,
    created_at: String,
}

struct MaintenanceRow {
    truck_id: i64,
    date: String,
    description: String,
}

#[derive(Template)]
#[template(path = "admin.html")]
struct AdminDashboardTemplate {
    flash: Option<Flash>,
    stats: AdminStats,
    users: Vec<AdminUserRow>,
    trips: Vec<AdminTripRow>,
    maintenance: Vec<MaintenanceRow>,
}

async fn dashboard(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<Response, AppError> {
    let stats = fleet::admin_stats(&state.db).await?;
    let users = fleet::list_users(&state.db)
        .await?
        .into_iter()
        .map(|user| AdminUserRow {
            id: user.id,
            username: user.username,
            role: user.role,
            created_at: format_timestamp(user.created_at),
        })
        .collect();
    let trips = trips::list_all_trips(&state.db)
        .await?
        .into_iter()
        .map(AdminTripRow::from)
        .collect();
    let maintenance = fleet::list_maintenance(&state.db)
        .await?
        .into_iter()
        .map(|record| MaintenanceRow {
            truck_id: record.truck_id,
            date: format_date(record.maintenance_date),
            description: record.description.unwrap_or_else(|| "–".into()),
        })
        .collect();

    let (jar, flash) = flash::take(jar);
    let page = AdminDashboardTemplate {
        flash,
        stats,
        users,
        trips,
        maintenance,
    };
    Ok((jar, AskamaTemplateResponse::into_response(page)).into_response())
}

#[derive(Deserialize)]
struct StatusForm {
    #[serde(default)]
    status: String,
}

async fn update_trip_status(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Path(raw_id): Path<String>,
    Form(form): Form<StatusForm>,
) -> Result<Response, AppError> {
    let Some(trip_id) = parse_trip_id(&raw_id) else {
        return Ok(invalid_trip_id(jar, &raw_id, "/admin"));
    };
    let response = match trips::update_trip_status(&state.db, trip_id, form.status.trim()).await {
        Ok(_) => flash::redirect(
            jar,
            Flash::success(format!("Trip #{trip_id} is now {}.", form.status.trim())),
            "/admin",
        ),
        Err(TripError::Database(err)) => unavailable(jar, "/admin", err),
        Err(err) => flash::redirect(jar, Flash::danger(err.to_string()), "/admin"),
    };
    Ok(response)
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%d.%m.%Y %H:%M")
        .to_string()
}
