use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};

use roombook::catalog::StaticCatalog;
use roombook::clock::ManualClock;
use roombook::engine::Engine;
use roombook::model::Ms;
use roombook::wire;

const PASSWORD: &str = "roombook";
/// 2030-01-15T09:00:00Z
const NOW: Ms = 1_894_698_000_000;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<Engine>, Arc<ManualClock>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let catalog = StaticCatalog::from_json(
        r#"[{"id":"R1","name":"Ada Lovelace"},{"id":"R2","name":"Grace Hopper"}]"#,
    )
    .unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let engine = Arc::new(Engine::ephemeral(Arc::new(catalog), clock.clone()));

    let server_engine = engine.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = server_engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine, PASSWORD.to_string(), None).await;
            });
        }
    });

    (addr, engine, clock)
}

fn client_config(addr: SocketAddr, user: &str, password: &str) -> Config {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("roombook")
        .user(user)
        .password(password);
    config
}

async fn connect(addr: SocketAddr, user: &str) -> Client {
    let (client, connection) = client_config(addr, user, PASSWORD)
        .connect(NoTls)
        .await
        .unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

fn rows(messages: Vec<SimpleQueryMessage>) -> Vec<SimpleQueryRow> {
    messages
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

fn insert_sql(room: &str, start: &str, end: &str) -> String {
    format!(r#"INSERT INTO reservations (room_id, start, "end") VALUES ('{room}', '{start}', '{end}')"#)
}

async fn insert(client: &Client, room: &str, start: &str, end: &str) -> Result<SimpleQueryRow, tokio_postgres::Error> {
    let mut created = rows(client.simple_query(&insert_sql(room, start, end)).await?);
    assert_eq!(created.len(), 1);
    Ok(created.remove(0))
}

async fn expect_sqlstate(client: &Client, sql: &str, state: &SqlState) {
    let err = client.simple_query(sql).await.unwrap_err();
    assert_eq!(err.code(), Some(state), "{sql}: {err:?}");
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn insert_returns_created_row() {
    let (addr, engine, _clock) = start_test_server().await;
    let client = connect(addr, "alice").await;

    let row = insert(&client, "R1", "2030-01-15T10:00:00Z", "2030-01-15T11:00:00Z")
        .await
        .unwrap();
    assert_eq!(row.get("room_id"), Some("R1"));
    assert_eq!(row.get("user_id"), Some("alice"));
    assert_eq!(row.get("start"), Some("2030-01-15T10:00:00.000Z"));
    assert_eq!(row.get("end"), Some("2030-01-15T11:00:00.000Z"));
    assert_eq!(row.get("created_at"), Some("2030-01-15T09:00:00.000Z"));

    let id = row.get("id").unwrap().parse().unwrap();
    let stored = engine.get(id).await.unwrap();
    assert_eq!(stored.user_id, "alice");
}

#[tokio::test]
async fn overlapping_insert_is_exclusion_violation() {
    let (addr, _engine, _clock) = start_test_server().await;
    let alice = connect(addr, "alice").await;
    let bob = connect(addr, "bob").await;

    insert(&alice, "R1", "2030-01-15T10:00:00Z", "2030-01-15T11:00:00Z")
        .await
        .unwrap();
    expect_sqlstate(
        &bob,
        &insert_sql("R1", "2030-01-15T10:30:00Z", "2030-01-15T11:30:00Z"),
        &SqlState::EXCLUSION_VIOLATION,
    )
    .await;

    // Back-to-back is fine, and so is the same slot in another room.
    insert(&bob, "R1", "2030-01-15T11:00:00Z", "2030-01-15T12:00:00Z")
        .await
        .unwrap();
    insert(&bob, "R2", "2030-01-15T10:00:00Z", "2030-01-15T11:00:00Z")
        .await
        .unwrap();
}

#[tokio::test]
async fn rejections_map_to_sqlstates() {
    let (addr, _engine, _clock) = start_test_server().await;
    let client = connect(addr, "alice").await;

    expect_sqlstate(
        &client,
        &insert_sql("R9", "2030-01-15T10:00:00Z", "2030-01-15T11:00:00Z"),
        &SqlState::NO_DATA_FOUND,
    )
    .await;
    expect_sqlstate(
        &client,
        &insert_sql("R1", "tomorrow", "2030-01-15T11:00:00Z"),
        &SqlState::INVALID_DATETIME_FORMAT,
    )
    .await;
    expect_sqlstate(
        &client,
        &insert_sql("R1", "2030-01-15T08:00:00Z", "2030-01-15T08:30:00Z"),
        &SqlState::INVALID_PARAMETER_VALUE,
    )
    .await;
    expect_sqlstate(
        &client,
        &insert_sql("R1", "2030-01-15T10:00:00Z", "2030-01-15T10:05:00Z"),
        &SqlState::INVALID_PARAMETER_VALUE,
    )
    .await;
    expect_sqlstate(&client, "SELEKT * FROM rooms", &SqlState::SYNTAX_ERROR).await;
    expect_sqlstate(&client, "SELECT * FROM bookings", &SqlState::SYNTAX_ERROR).await;
}

#[tokio::test]
async fn quota_is_forbidden() {
    let (addr, _engine, _clock) = start_test_server().await;
    let client = connect(addr, "alice").await;

    insert(&client, "R1", "2030-01-15T10:00:00Z", "2030-01-15T11:00:00Z")
        .await
        .unwrap();
    insert(&client, "R2", "2030-01-15T10:00:00Z", "2030-01-15T11:00:00Z")
        .await
        .unwrap();
    expect_sqlstate(
        &client,
        &insert_sql("R1", "2030-01-16T10:00:00Z", "2030-01-16T11:00:00Z"),
        &SqlState::INSUFFICIENT_PRIVILEGE,
    )
    .await;
}

#[tokio::test]
async fn quota_frees_up_as_time_passes() {
    let (addr, _engine, clock) = start_test_server().await;
    let client = connect(addr, "alice").await;

    insert(&client, "R1", "2030-01-15T09:00:00Z", "2030-01-15T10:00:00Z")
        .await
        .unwrap();
    insert(&client, "R2", "2030-01-15T09:00:00Z", "2030-01-15T10:00:00Z")
        .await
        .unwrap();

    clock.set(NOW + 3_600_000);
    insert(&client, "R1", "2030-01-15T10:00:00Z", "2030-01-15T11:00:00Z")
        .await
        .unwrap();
}

#[tokio::test]
async fn cancel_requires_owner() {
    let (addr, engine, _clock) = start_test_server().await;
    let alice = connect(addr, "alice").await;
    let bob = connect(addr, "bob").await;

    let row = insert(&alice, "R1", "2030-01-15T10:00:00Z", "2030-01-15T11:00:00Z")
        .await
        .unwrap();
    let delete = format!("DELETE FROM reservations WHERE id = '{}'", row.get("id").unwrap());

    expect_sqlstate(&bob, &delete, &SqlState::INSUFFICIENT_PRIVILEGE).await;
    assert_eq!(engine.reservation_count().await, 1);

    alice.simple_query(&delete).await.unwrap();
    assert_eq!(engine.reservation_count().await, 0);

    expect_sqlstate(&alice, &delete, &SqlState::NO_DATA_FOUND).await;
}

#[tokio::test]
async fn select_reservations_with_filters() {
    let (addr, _engine, _clock) = start_test_server().await;
    let alice = connect(addr, "alice").await;
    let bob = connect(addr, "bob").await;

    insert(&alice, "R1", "2030-01-15T10:00:00Z", "2030-01-15T11:00:00Z")
        .await
        .unwrap();
    insert(&bob, "R1", "2030-01-16T10:00:00Z", "2030-01-16T11:00:00Z")
        .await
        .unwrap();
    insert(&bob, "R2", "2030-01-15T10:00:00Z", "2030-01-15T11:00:00Z")
        .await
        .unwrap();

    let all = rows(alice.simple_query("SELECT * FROM reservations").await.unwrap());
    assert_eq!(all.len(), 3);

    let r1 = rows(
        alice
            .simple_query("SELECT * FROM reservations WHERE room_id = 'R1'")
            .await
            .unwrap(),
    );
    assert_eq!(r1.len(), 2);
    assert!(r1.iter().all(|r| r.get("room_id") == Some("R1")));

    let day_one = rows(
        alice
            .simple_query(
                r#"SELECT * FROM reservations WHERE room_id = 'R1' AND start >= '2030-01-15T00:00:00Z' AND "end" <= '2030-01-16T00:00:00Z'"#,
            )
            .await
            .unwrap(),
    );
    assert_eq!(day_one.len(), 1);
    assert_eq!(day_one[0].get("user_id"), Some("alice"));

    // Overlap, not containment: both 10:00-11:00 bookings cover 10:30-10:45.
    let mid_morning = rows(
        alice
            .simple_query(
                r#"SELECT * FROM reservations WHERE "end" > '2030-01-15T10:30:00Z' AND start < '2030-01-15T10:45:00Z'"#,
            )
            .await
            .unwrap(),
    );
    let rooms: Vec<&str> = mid_morning.iter().map(|r| r.get("room_id").unwrap()).collect();
    assert_eq!(rooms, ["R1", "R2"]);

    let inverted = rows(
        alice
            .simple_query(
                r#"SELECT * FROM reservations WHERE start >= '2030-01-15T10:45:00Z' AND "end" <= '2030-01-15T10:30:00Z'"#,
            )
            .await
            .unwrap(),
    );
    assert!(inverted.is_empty());

    expect_sqlstate(
        &alice,
        "SELECT * FROM reservations WHERE start >= 'yesterday'",
        &SqlState::INVALID_DATETIME_FORMAT,
    )
    .await;
}

#[tokio::test]
async fn select_rooms_lists_catalog() {
    let (addr, _engine, _clock) = start_test_server().await;
    let client = connect(addr, "alice").await;

    let rooms = rows(client.simple_query("SELECT * FROM rooms").await.unwrap());
    let listed: Vec<(&str, &str)> = rooms
        .iter()
        .map(|r| (r.get("id").unwrap(), r.get("name").unwrap()))
        .collect();
    assert_eq!(listed, [("R1", "Ada Lovelace"), ("R2", "Grace Hopper")]);
}

#[tokio::test]
async fn extended_protocol_with_parameters() {
    let (addr, _engine, _clock) = start_test_server().await;
    let client = connect(addr, "alice").await;

    let created = client
        .query(
            r#"INSERT INTO reservations (room_id, start, "end") VALUES ($1, $2, $3)"#,
            &[&"R2", &"2030-01-15T13:00:00Z", &"2030-01-15T14:30:00Z"],
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    let id: String = created[0].get("id");
    let user: String = created[0].get("user_id");
    assert_eq!(user, "alice");

    let found = client
        .query("SELECT * FROM reservations WHERE room_id = $1", &[&"R2"])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get::<_, String>("id"), id);

    let deleted = client
        .execute("DELETE FROM reservations WHERE id = $1", &[&id.as_str()])
        .await
        .unwrap();
    assert_eq!(deleted, 1);
}

#[tokio::test]
async fn wrong_password_is_refused() {
    let (addr, _engine, _clock) = start_test_server().await;
    let result = client_config(addr, "alice", "not-the-password")
        .connect(NoTls)
        .await;
    assert!(result.is_err());
}
