pub mod admin;
pub mod public;
pub mod user;

use axum::{middleware, response::Response, Router};
use axum_extra::extract::cookie::PrivateCookieJar;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    auth::{self, Capability, Gate},
    flash::{self, Flash},
    state::AppState,
};

pub fn create_router(state: AppState) -> Router {
    let user_gate = Gate::new(state.clone(), Capability::User);
    let admin_gate = Gate::new(state.clone(), Capability::Admin);

    Router::new()
        .merge(public::router())
        .merge(
            user::router().route_layer(middleware::from_fn_with_state(user_gate, auth::authorize)),
        )
        .nest(
            "/admin",
            admin::router()
                .route_layer(middleware::from_fn_with_state(admin_gate, auth::authorize)),
        )
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Renders a date the way the forms expect it back.
pub(crate) fn format_date(date: chrono::NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Trip ids arrive as raw path segments so a malformed one can still be flashed.
pub(crate) fn parse_trip_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok().filter(|id| *id > 0)
}

pub(crate) fn invalid_trip_id(jar: PrivateCookieJar, raw: &str, to: &str) -> Response {
    flash::redirect(jar, Flash::danger(format!("'{raw}' is not a valid trip id.")), to)
}
