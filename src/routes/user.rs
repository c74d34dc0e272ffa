use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;

use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    flash::{self, Flash},
    models::{
        fleet::{Driver, Truck},
        trip::Trip,
    },
    routes::{format_date, invalid_trip_id, parse_trip_id, public::unavailable},
    services::{
        booking::{self, BookingError, BookingForm},
        fleet,
        trips::{self, TripError},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/book_trip", post(book_trip))
        .route("/cancel_trip/:id", post(cancel_trip))
}

struct BookingRow {
    id: i64,
    origin: String,
    destination: String,
    start_date: String,
    end_date: String,
    status: String,
    cancellable: bool,
}

impl From<Trip> for BookingRow {
    fn from(trip: Trip) -> Self {
        Self {
            id: trip.id,
            origin: trip.origin,
            destination: trip.destination,
            start_date: format_date(trip.start_date),
            end_date: format_date(trip.end_date),
            status: trip.status.to_string(),
            cancellable: trip.status.is_cancellable(),
        }
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    flash: Option<Flash>,
    username: String,
    has_client: bool,
    bookings: Vec<BookingRow>,
    trucks: Vec<Truck>,
    drivers: Vec<Driver>,
    earliest_start: String,
    min_duration_days: i64,
}

async fn dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: PrivateCookieJar,
) -> Result<Response, AppError> {
    let client = fleet::client_for_user(&state.db, user.id).await?;
    let bookings = match &client {
        Some(client) => trips::list_client_trips(&state.db, client.id).await?,
        None => Vec::new(),
    };
    let trucks = fleet::list_trucks(&state.db).await?;
    let drivers = fleet::list_drivers(&state.db).await?;
    let policy = state.config.booking;

    let (jar, flash) = flash::take(jar);
    let page = DashboardTemplate {
        flash,
        username: user.username.clone(),
        has_client: client.is_some(),
        bookings: bookings.into_iter().map(BookingRow::from).collect(),
        trucks,
        drivers,
        earliest_start: format_date(policy.earliest_start(state.today())),
        min_duration_days: policy.min_duration_days,
    };
    Ok((jar, AskamaTemplateResponse::into_response(page)).into_response())
}

async fn book_trip(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: PrivateCookieJar,
    Form(form): Form<BookingForm>,
) -> Result<Response, AppError> {
    let outcome = match form.parse() {
        Ok(request) => {
            booking::book_trip(
                &state.db,
                state.today(),
                &state.config.booking,
                user.id,
                &request,
            )
            .await
        }
        Err(err) => Err(err),
    };

    let response = match outcome {
        Ok(trip_id) => flash::redirect(
            jar,
            Flash::success(format!("New trip #{trip_id} booked successfully!")),
            "/dashboard",
        ),
        Err(BookingError::Database(err)) => unavailable(jar, "/dashboard", err),
        Err(err) => flash::redirect(jar, Flash::danger(err.to_string()), "/dashboard"),
    };
    Ok(response)
}

async fn cancel_trip(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: PrivateCookieJar,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let Some(trip_id) = parse_trip_id(&raw_id) else {
        return Ok(invalid_trip_id(jar, &raw_id, "/dashboard"));
    };
    let response = match trips::cancel_trip(&state.db, user.id, trip_id).await {
        Ok(_) => flash::redirect(
            jar,
            Flash::success(format!("Trip #{trip_id} has been cancelled.")),
            "/dashboard",
        ),
        Err(err @ TripError::NotCancellable { .. }) => {
            flash::redirect(jar, Flash::warning(err.to_string()), "/dashboard")
        }
        Err(TripError::Database(err)) => unavailable(jar, "/dashboard", err),
        Err(err) => flash::redirect(jar, Flash::danger(err.to_string()), "/dashboard"),
    };
    Ok(response)
}
