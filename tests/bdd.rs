use std::{collections::HashMap, fmt, fs::File, net::SocketAddr, sync::Arc};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use cucumber::{given, then, when, World as _};
use fleet::{
    auth::{self, AuthenticatedUser, Registration},
    clock::FixedClock,
    config::{AppConfig, BookingPolicy},
    db::{init_pool, migrate},
    models::trip::TripStatus,
    services::{
        booking::{self, BookingForm},
        trips,
    },
    state::AppState,
};
use tempfile::TempDir;

#[derive(Debug, cucumber::World, Default)]
struct FleetWorld {
    state: Option<TestState>,
    clients: HashMap<String, AuthenticatedUser>,
    booked: Vec<i64>,
    last_booking: Option<Result<i64, String>>,
    last_error: Option<String>,
}

impl FleetWorld {
    fn app_state(&self) -> &AppState {
        self.state
            .as_ref()
            .expect("state must be initialised first")
            .app()
    }

    fn client(&self, name: &str) -> &AuthenticatedUser {
        self.clients
            .get(name)
            .unwrap_or_else(|| panic!("client {name} must be registered first"))
    }

    fn trip_id(&self, ordinal: &str) -> i64 {
        let index = match ordinal {
            "first" => 0,
            "second" => 1,
            "third" => 2,
            other => panic!("unsupported ordinal {other}"),
        };
        *self
            .booked
            .get(index)
            .unwrap_or_else(|| panic!("no {ordinal} trip was booked"))
    }
}

struct TestState {
    app: AppState,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new(today: NaiveDate) -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let db_path = root.path().join("bdd.sqlite");
        File::create(&db_path)?;
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url: database_url.clone(),
            db_max_connections: 4,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cookie_secret: "bdd-cookie-secret".into(),
            session_ttl_hours: 1,
            booking: BookingPolicy::default(),
        };

        let db = init_pool(&config.database_url, config.db_max_connections).await?;
        migrate(&db).await?;

        let app = AppState::with_clock(config, db, Arc::new(FixedClock::new(today)));
        Ok(Self { app, _root: root })
    }

    fn app(&self) -> &AppState {
        &self.app
    }
}

fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("feature dates use YYYY-MM-DD")
}

#[given(regex = r#"^today is "([^"]+)" and the fleet has (\d+) trucks and (\d+) drivers$"#)]
async fn given_fleet(world: &mut FleetWorld, today: String, trucks: usize, drivers: usize) {
    world.state = Some(TestState::new(date(&today)).await.expect("state"));
    world.clients.clear();
    world.booked.clear();
    world.last_booking = None;
    world.last_error = None;

    let db = &world.app_state().db;
    for n in 1..=trucks {
        sqlx::query("INSERT INTO truck (registration_num, model, capacity_tons) VALUES (?1, 'Tata Ultra', 10)")
            .bind(format!("TN-01-AB-{n:04}"))
            .execute(db)
            .await
            .expect("insert truck");
    }
    for n in 1..=drivers {
        sqlx::query("INSERT INTO driver (first_name, last_name) VALUES (?1, 'Kumar')")
            .bind(format!("Driver{n}"))
            .execute(db)
            .await
            .expect("insert driver");
    }
}

#[given(regex = r#"^a client "([^"]+)" with password "([^"]+)"$"#)]
async fn given_client(world: &mut FleetWorld, username: String, password: String) {
    let registration = Registration {
        username: username.clone(),
        password,
        client_name: format!("{username} Logistics"),
        billing_address: None,
        contact_person: Some(username.clone()),
    };
    let user = auth::register_user(&world.app_state().db, Utc::now(), &registration)
        .await
        .expect("register client");
    world.clients.insert(username, user);
}

#[given(regex = r"^the (first|second|third) trip carries (\d+) shipments$")]
async fn given_shipments(world: &mut FleetWorld, ordinal: String, count: usize) {
    let trip_id = world.trip_id(&ordinal);
    let db = &world.app_state().db;
    let goods_id = sqlx::query("INSERT INTO goods (name, goods_type) VALUES ('Cement Bags', 'Construction')")
        .execute(db)
        .await
        .expect("insert goods")
        .last_insert_rowid();
    for quantity in 1..=count {
        sqlx::query("INSERT INTO shipment (trip_id, goods_id, quantity) VALUES (?1, ?2, ?3)")
            .bind(trip_id)
            .bind(goods_id)
            .bind(quantity as i64 * 10)
            .execute(db)
            .await
            .expect("insert shipment");
    }
}

#[when(
    regex = r#"^"([^"]+)" books a trip from "([^"]*)" to "([^"]*)" with truck (\d+) and driver (\d+)$"#
)]
async fn when_book(
    world: &mut FleetWorld,
    username: String,
    start: String,
    end: String,
    truck: i64,
    driver: i64,
) {
    let user_id = world.client(&username).id;
    let form = BookingForm {
        origin: "Chennai".into(),
        destination: "Bangalore".into(),
        start_date: start,
        end_date: end,
        truck_id: truck.to_string(),
        driver_id: driver.to_string(),
    };
    let state = world.app_state();
    let outcome = match form.parse() {
        Ok(request) => {
            booking::book_trip(
                &state.db,
                state.today(),
                &state.config.booking,
                user_id,
                &request,
            )
            .await
        }
        Err(err) => Err(err),
    };
    let outcome = outcome.map_err(|err| err.to_string());
    if let Ok(trip_id) = outcome {
        world.booked.push(trip_id);
    }
    world.last_booking = Some(outcome);
}

#[given(
    regex = r#"^"([^"]+)" books a trip from "([^"]*)" to "([^"]*)" with truck (\d+) and driver (\d+)$"#
)]
async fn given_booked(
    world: &mut FleetWorld,
    username: String,
    start: String,
    end: String,
    truck: i64,
    driver: i64,
) {
    when_book(world, username, start, end, truck, driver).await;
    if let Some(Err(message)) = &world.last_booking {
        panic!("background booking rejected: {message}");
    }
}

#[when(regex = r#"^"([^"]+)" cancels the (first|second|third) trip$"#)]
async fn when_cancel(world: &mut FleetWorld, username: String, ordinal: String) {
    let user_id = world.client(&username).id;
    let trip_id = world.trip_id(&ordinal);
    world.last_error = trips::cancel_trip(&world.app_state().db, user_id, trip_id)
        .await
        .err()
        .map(|err| err.to_string());
}

#[when(regex = r#"^the admin sets the status of the (first|second|third) trip to "([^"]*)"$"#)]
async fn when_set_status(world: &mut FleetWorld, ordinal: String, status: String) {
    let trip_id = world.trip_id(&ordinal);
    world.last_error = trips::update_trip_status(&world.app_state().db, trip_id, &status)
        .await
        .err()
        .map(|err| err.to_string());
}

#[then("the booking is accepted")]
async fn then_accepted(world: &mut FleetWorld) {
    match world.last_booking.as_ref().expect("a booking was attempted") {
        Ok(_) => {}
        Err(message) => panic!("booking rejected: {message}"),
    }
}

#[then(regex = r#"^the booking is rejected with "([^"]+)"$"#)]
async fn then_rejected(world: &mut FleetWorld, expected: String) {
    match world.last_booking.as_ref().expect("a booking was attempted") {
        Ok(trip_id) => panic!("booking unexpectedly accepted as trip #{trip_id}"),
        Err(message) => assert!(
            message.contains(&expected),
            "expected {expected:?} in {message:?}"
        ),
    }
}

#[then(regex = r"^the booking is rejected with a (truck|driver) conflict naming the (first|second|third) trip$")]
async fn then_conflict(world: &mut FleetWorld, resource: String, ordinal: String) {
    let trip_id = world.trip_id(&ordinal);
    let message = match world.last_booking.as_ref().expect("a booking was attempted") {
        Ok(id) => panic!("booking unexpectedly accepted as trip #{id}"),
        Err(message) => message,
    };
    let resource = if resource == "truck" { "Truck" } else { "Driver" };
    assert!(message.starts_with(resource), "{message}");
    assert!(message.contains(&format!("#{trip_id} ")), "{message}");
}

#[then(regex = r"^(\d+) trips? (?:is|are) stored$")]
async fn then_trip_count(world: &mut FleetWorld, expected: i64) {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trip")
        .fetch_one(&world.app_state().db)
        .await
        .expect("count trips");
    assert_eq!(count, expected);
}

#[then("no two active trips sharing a truck or driver overlap")]
async fn then_no_overlap(world: &mut FleetWorld) {
    let rows: Vec<(i64, NaiveDate, NaiveDate, i64, i64)> = sqlx::query_as(
        "SELECT id, start_date, end_date, truck_id, driver_id FROM trip WHERE status <> 'Completed'",
    )
    .fetch_all(&world.app_state().db)
    .await
    .expect("load trips");
    for (i, a) in rows.iter().enumerate() {
        for b in &rows[i + 1..] {
            let shares = a.3 == b.3 || a.4 == b.4;
            let overlaps = a.1 < b.2 && a.2 > b.1;
            assert!(!(shares && overlaps), "trips #{} and #{} overlap", a.0, b.0);
        }
    }
}

#[then(regex = r#"^the request is refused with "([^"]+)"$"#)]
async fn then_refused(world: &mut FleetWorld, expected: String) {
    let message = world.last_error.as_ref().expect("the request should have failed");
    assert!(message.contains(&expected), "expected {expected:?} in {message:?}");
}

#[then("the request succeeds")]
async fn then_succeeds(world: &mut FleetWorld) {
    if let Some(message) = &world.last_error {
        panic!("request failed: {message}");
    }
}

#[then(regex = r#"^the (first|second|third) trip has status "([^"]+)"$"#)]
async fn then_status(world: &mut FleetWorld, ordinal: String, expected: String) {
    let trip_id = world.trip_id(&ordinal);
    let trip = trips::get_trip(&world.app_state().db, trip_id)
        .await
        .expect("load trip")
        .expect("trip exists");
    let expected: TripStatus = expected.parse().expect("feature uses a valid status");
    assert_eq!(trip.status, expected);
}

#[then(regex = r"^the (first|second|third) trip has (\d+) shipments$")]
async fn then_shipments(world: &mut FleetWorld, ordinal: String, expected: usize) {
    let trip_id = world.trip_id(&ordinal);
    let shipments = trips::shipments_for_trip(&world.app_state().db, trip_id)
        .await
        .expect("load shipments");
    assert_eq!(shipments.len(), expected);
}

#[then(regex = r#"^"([^"]+)" can log in with password "([^"]+)"$"#)]
async fn then_can_login(world: &mut FleetWorld, username: String, password: String) {
    let authed = auth::authenticate_user(&world.app_state().db, &username, &password)
        .await
        .expect("authentication");
    assert_eq!(authed.username, username);
}

#[then(regex = r#"^"([^"]+)" cannot log in with password "([^"]+)"$"#)]
async fn then_cannot_login(world: &mut FleetWorld, username: String, password: String) {
    let result = auth::authenticate_user(&world.app_state().db, &username, &password).await;
    assert!(result.is_err(), "login should have failed");
}

#[then(regex = r#"^registering "([^"]+)" again is refused with "([^"]+)"$"#)]
async fn then_duplicate_refused(world: &mut FleetWorld, username: String, expected: String) {
    let registration = Registration {
        username,
        password: "another".into(),
        client_name: "Copycat Ltd".into(),
        ..Registration::default()
    };
    let err = auth::register_user(&world.app_state().db, Utc::now(), &registration)
        .await
        .expect_err("duplicate registration must fail");
    assert!(err.to_string().contains(&expected), "{err}");
}

#[tokio::main]
async fn main() {
    FleetWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}
