use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::Deserialize;
use tracing::{error, info};

use crate::{
    auth::{self, Registration},
    error::AppError,
    flash::{self, Flash},
    models::user::UserRole,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/login", get(login_form).post(login_submit))
        .route("/register", get(register_form).post(register_submit))
        .route("/logout", get(logout))
}

async fn landing() -> Redirect {
    Redirect::to("/dashboard")
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    flash: Option<Flash>,
}

async fn login_form(jar: PrivateCookieJar) -> Response {
    let (jar, flash) = flash::take(jar);
    (jar, AskamaTemplateResponse::into_response(LoginTemplate { flash })).into_response()
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn login_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match auth::authenticate_user(&state.db, &form.username, &form.password).await {
        Ok(user) => user,
        Err(AppError::Unauthorized) => {
            info!("failed login for {:?}", form.username);
            return flash::redirect(
                jar,
                Flash::danger("Login Unsuccessful. Please check username and password"),
                "/login",
            );
        }
        Err(err) => return unavailable(jar, "/login", err),
    };

    let session_id = match auth::create_session(
        &state.db,
        user.id,
        state.clock.now_utc(),
        state.config.session_ttl_hours,
    )
    .await
    {
        Ok(id) => id,
        Err(err) => return unavailable(jar, "/login", err),
    };

    info!("user {} logged in", user.username);
    let landing = if user.role == UserRole::Admin {
        "/admin"
    } else {
        "/dashboard"
    };
    flash::redirect(
        auth::apply_session_cookie(jar, &session_id),
        Flash::success("Logged in successfully!"),
        landing,
    )
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    flash: Option<Flash>,
}

async fn register_form(jar: PrivateCookieJar) -> Response {
    let (jar, flash) = flash::take(jar);
    (jar, AskamaTemplateResponse::into_response(RegisterTemplate { flash })).into_response()
}

#[derive(Deserialize)]
struct RegisterForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    client_name: String,
    billing_address: Option<String>,
    contact_person: Option<String>,
}

async fn register_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(form): Form<RegisterForm>,
) -> Response {
    let registration = Registration {
        username: form.username,
        password: form.password,
        client_name: form.client_name,
        billing_address: normalize_optional(form.billing_address),
        contact_person: normalize_optional(form.contact_person),
    };

    match auth::register_user(&state.db, state.clock.now_utc(), &registration).await {
        Ok(_) => flash::redirect(
            jar,
            Flash::success("Your account has been created! You can now log in."),
            "/login",
        ),
        Err(AppError::BadRequest(message)) => {
            flash::redirect(jar, Flash::danger(message), "/register")
        }
        Err(err) => unavailable(jar, "/register", err),
    }
}

async fn logout(State(state): State<AppState>, jar: PrivateCookieJar) -> Response {
    if let Some(cookie) = jar.get(auth::SESSION_COOKIE) {
        if let Err(err) = auth::destroy_session(&state.db, cookie.value()).await {
            error!("could not drop session on logout: {err}");
        }
    }
    flash::redirect(
        auth::clear_session_cookie(jar),
        Flash::info("You have been logged out."),
        "/login",
    )
}

/// Infrastructure failures still end in a flash and a redirect.
pub(crate) fn unavailable(jar: PrivateCookieJar, to: &str, err: impl std::fmt::Debug) -> Response {
    error!("request failed: {err:?}");
    flash::redirect(
        jar,
        Flash::danger("The service is temporarily unavailable. Please try again later."),
        to,
    )
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
