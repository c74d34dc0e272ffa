use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use rand_core::OsRng;
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    flash::{self, Flash},
    models::{session::Session, user::{User, UserRole}},
    state::AppState,
};

pub const SESSION_COOKIE: &str = "fleet_session";

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub username: String,
    pub role: UserRole,
}

impl From<User> for AuthenticatedUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            role: user.role(),
            username: user.username,
        }
    }
}

/// Handlers behind [`authorize`] read the logged-in user with this extractor.
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// What a route group demands of the logged-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    User,
    Admin,
}

impl Capability {
    pub fn permits(&self, role: UserRole) -> bool {
        match self {
            Capability::User => true,
            Capability::Admin => role == UserRole::Admin,
        }
    }
}

/// State handed to [`authorize`]: the app plus the capability the routes behind it need.
#[derive(Clone)]
pub struct Gate {
    state: AppState,
    capability: Capability,
}

impl Gate {
    pub fn new(state: AppState, capability: Capability) -> Self {
        Self { state, capability }
    }
}

/// The one authorization middleware. Resolves the session cookie, enforces the
/// gate's capability, and hands the user to handlers as an [`AuthenticatedUser`].
pub async fn authorize(State(gate): State<Gate>, mut request: Request, next: Next) -> Response {
    let state = &gate.state;
    let jar = PrivateCookieJar::from_headers(request.headers(), state.cookie_key.clone());

    let user = match jar.get(SESSION_COOKIE) {
        Some(cookie) => match load_session_user(&state.db, cookie.value(), state.clock.now_utc()).await {
            Ok(user) => user,
            Err(err) => return err.into_response(),
        },
        None => None,
    };

    let Some(user) = user else {
        debug!("anonymous request to {} redirected to login", request.uri().path());
        return flash::redirect(
            clear_session_cookie(jar),
            Flash::info("Please log in to access this page."),
            "/login",
        );
    };

    if !gate.capability.permits(user.role) {
        warn!(
            "user {} ({}) denied access to {}",
            user.username,
            user.role,
            request.uri().path()
        );
        return flash::redirect(
            jar,
            Flash::danger("You do not have permission to access this page."),
            "/dashboard",
        );
    }

    request.extensions_mut().insert(user);
    next.run(request).await
}

/// Profile captured on the registration form.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub client_name: String,
    pub billing_address: Option<String>,
    pub contact_person: Option<String>,
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::PasswordHash(err.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        warn!("stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Creates a `user` account and its client profile together.
pub async fn register_user(
    db: &DbPool,
    now: DateTime<Utc>,
    registration: &Registration,
) -> Result<AuthenticatedUser, AppError> {
    let username = registration.username.trim();
    if username.is_empty() || registration.password.is_empty() {
        return Err(AppError::BadRequest(
            "Username and password are required.".into(),
        ));
    }
    let client_name = registration.client_name.trim();
    if client_name.is_empty() {
        return Err(AppError::BadRequest("Client name is required.".into()));
    }

    let password_hash = hash_password(&registration.password)?;

    let mut tx = db.begin().await?;
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?1")
        .bind(username)
        .fetch_optional(&mut *tx)
        .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest(
            "Username already exists. Please choose a different one.".into(),
        ));
    }

    let user_id = sqlx::query(
        "INSERT INTO users (username, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(username)
    .bind(&password_hash)
    .bind(UserRole::User.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    sqlx::query(
        "INSERT INTO client (client_name, billing_address, contact_person, user_id) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(client_name)
    .bind(registration.billing_address.as_deref())
    .bind(registration.contact_person.as_deref())
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("registered user {username} (id {user_id})");

    Ok(AuthenticatedUser {
        id: user_id,
        username: username.to_string(),
        role: UserRole::User,
    })
}

/// Unknown usernames and wrong passwords are indistinguishable to the caller.
pub async fn authenticate_user(
    db: &DbPool,
    username: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let user: Option<User> = sqlx::query_as(
        "SELECT id, username, password_hash, role, created_at FROM users WHERE username = ?1",
    )
    .bind(username.trim())
    .fetch_optional(db)
    .await?;

    match user {
        Some(user) if verify_password(password, &user.password_hash) => Ok(user.into()),
        _ => Err(AppError::Unauthorized),
    }
}

pub async fn create_session(
    db: &DbPool,
    user_id: i64,
    now: DateTime<Utc>,
    ttl_hours: i64,
) -> Result<String, AppError> {
    let session = Session {
        id: Uuid::new_v4().to_string(),
        user_id,
        created_at: now,
        last_seen_at: now,
        expires_at: Some(now + Duration::hours(ttl_hours)),
    };
    sqlx::query(
        "INSERT INTO sessions (id, user_id, created_at, last_seen_at, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(session.created_at)
    .bind(session.last_seen_at)
    .bind(session.expires_at)
    .execute(db)
    .await?;
    Ok(session.id)
}

pub async fn destroy_session(db: &DbPool, session_id: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sessions WHERE id = ?1")
        .bind(session_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Resolves a session id to its user, dropping the session if it has expired.
pub async fn load_session_user(
    db: &DbPool,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<AuthenticatedUser>, AppError> {
    let session: Option<Session> = sqlx::query_as(
        "SELECT id, user_id, created_at, last_seen_at, expires_at FROM sessions WHERE id = ?1",
    )
    .bind(session_id)
    .fetch_optional(db)
    .await?;
    let Some(session) = session else {
        return Ok(None);
    };
    if session.is_expired(now) {
        destroy_session(db, &session.id).await?;
        return Ok(None);
    }

    let row = sqlx::query("SELECT id, username, role FROM users WHERE id = ?1")
        .bind(session.user_id)
        .fetch_optional(db)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    sqlx::query("UPDATE sessions SET last_seen_at = ?1 WHERE id = ?2")
        .bind(now)
        .bind(&session.id)
        .execute(db)
        .await?;

    Ok(Some(AuthenticatedUser {
        id: row.get("id"),
        username: row.get("username"),
        role: row.get::<String, _>("role").parse().unwrap_or_default(),
    }))
}

pub fn apply_session_cookie(jar: PrivateCookieJar, session_id: &str) -> PrivateCookieJar {
    jar.add(
        Cookie::build((SESSION_COOKIE, session_id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

pub fn clear_session_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}
