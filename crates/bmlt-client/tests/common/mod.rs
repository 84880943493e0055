//! Shared fixtures: a wiremock Root Server and a session wired to it.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bmlt_client::{ChannelObserver, Event, Notification, Session, SessionConfig};
use bmlt_protocol::STANDARD_MEETING_KEYS;
use bmlt_transport::{GatewayConfig, TlsConfig};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

pub const CLIENT_JSON: &str = "/main_server/client_interface/json/";
pub const ADMIN_JSON: &str = "/main_server/local_server/server_admin/json.php";
pub const LANGUAGES: &str = "/main_server/client_interface/json/GetLangs.php";
pub const CONTACT: &str = "/main_server/client_interface/contact.php";

/// Server info with the given change depth
pub fn server_info(change_depth: u32) -> Value {
    json!([{
        "version": "2.16.4",
        "versionInt": "2016004",
        "available_keys": STANDARD_MEETING_KEYS.join(",") + ",contact_email_1",
        "changesPerMeeting": change_depth.to_string(),
        "distanceUnits": "mi",
        "centerLatitude": "34.23",
        "centerLongitude": "-118.56",
        "centerZoom": "9",
        "defaultDuration": "01:00:00",
        "nativeLang": "en",
        "langs": "en,es",
        "regionBias": "us",
        "charSet": "UTF-8",
        "semanticAdmin": "1",
        "emailEnabled": "1",
        "emailIncludesServiceBodies": "1"
    }])
}

pub fn formats() -> Value {
    json!([
        {"id": "1", "key_string": "O", "name_string": "Open", "description_string": "Anyone may attend", "lang": "en", "world_id": "OPEN"},
        {"id": "2", "key_string": "C", "name_string": "Closed", "description_string": "Members only", "lang": "en", "world_id": "CLOSED"},
        {"id": "1", "key_string": "A", "name_string": "Abierta", "description_string": "", "lang": "es", "world_id": "OPEN"}
    ])
}

/// Region 1 with areas 2 and 3; area 3 hangs under an unpublished parent
pub fn service_bodies() -> Value {
    json!([
        {"id": "1", "parent_id": "0", "name": "Region", "description": "", "type": "RS"},
        {"id": "2", "parent_id": "1", "name": "North Area", "description": "", "type": "AS"},
        {"id": "3", "parent_id": "77", "name": "South Area", "description": "", "type": "AS"}
    ])
}

pub fn languages() -> Value {
    json!({"languages": [
        {"key": "en", "name": "English", "default": true},
        {"key": "es", "name": "Español"}
    ]})
}

pub fn meeting(id: u64, service_body: u64) -> Value {
    json!({
        "id_bigint": id.to_string(),
        "service_body_bigint": service_body.to_string(),
        "weekday_tinyint": "2",
        "start_time": "19:00:00",
        "duration_time": "01:00:00",
        "meeting_name": format!("Meeting {id}"),
        "formats": "O",
        "published": "1",
        "location_text": "Community Hall",
        "location_municipality": "Springfield",
        "latitude": "34.2",
        "longitude": "-118.5"
    })
}

pub fn permissions(rows: &[(u64, u8)]) -> Value {
    let rows: Vec<Value> = rows
        .iter()
        .map(|(id, level)| json!({"id": id.to_string(), "name": format!("Body {id}"), "permissions": level.to_string()}))
        .collect();
    json!({ "service_body": rows })
}

pub fn change(change_id: u64, meeting_id: u64, epoch: i64, before: Option<Value>, after: Option<Value>) -> Value {
    let mut data = serde_json::Map::new();
    if let Some(before) = before {
        data.insert("before".into(), before);
    }
    if let Some(after) = after {
        data.insert("after".into(), after);
    }
    json!({
        "change_id": change_id.to_string(),
        "date_int": epoch.to_string(),
        "user_name": "admin",
        "service_body_id": "2",
        "meeting_id": meeting_id.to_string(),
        "meeting_exists": "1",
        "details": "changed",
        "json_data": Value::Object(data)
    })
}

pub fn client(switcher: &str) -> MockBuilder {
    Mock::given(method("GET"))
        .and(path(CLIENT_JSON))
        .and(query_param("switcher", switcher))
}

pub fn admin(action: &str) -> MockBuilder {
    Mock::given(method("GET"))
        .and(path(ADMIN_JSON))
        .and(query_param("admin_action", action))
}

pub fn json_response(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

pub fn text_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(body)
}

/// A wiremock server playing a Root Server under `/main_server`
pub struct MockRoot {
    pub server: MockServer,
}

impl MockRoot {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Start and mount a complete, valid reference data set
    pub async fn with_reference_data(change_depth: u32) -> Self {
        let root = Self::start().await;
        root.mount_server_info(server_info(change_depth)).await;
        client("GetFormats").respond_with(json_response(formats())).mount(&root.server).await;
        client("GetServiceBodies")
            .respond_with(json_response(service_bodies()))
            .mount(&root.server)
            .await;
        Mock::given(method("GET"))
            .and(path(LANGUAGES))
            .respond_with(json_response(languages()))
            .mount(&root.server)
            .await;
        root
    }

    pub async fn mount_server_info(&self, info: Value) {
        client("GetServerInfo").respond_with(json_response(info)).mount(&self.server).await;
    }

    pub fn uri(&self) -> String {
        format!("{}/main_server", self.server.uri())
    }

    /// Accept the login `user`/`password` with a session cookie and grant
    /// `rows` of permissions; refuse every other password
    pub async fn mount_admin(&self, user: &str, password: &str, rows: &[(u64, u8)]) {
        admin("login")
            .and(query_param("c_comdef_admin_login", user))
            .and(query_param("c_comdef_admin_password", password))
            .respond_with(text_response("OK").insert_header("set-cookie", "PHPSESSID=abc123; path=/"))
            .with_priority(1)
            .mount(&self.server)
            .await;
        admin("login")
            .respond_with(text_response("NOT AUTHORIZED"))
            .with_priority(5)
            .mount(&self.server)
            .await;
        admin("get_permissions")
            .respond_with(json_response(permissions(rows)))
            .mount(&self.server)
            .await;
        admin("logout").respond_with(text_response("BYE")).mount(&self.server).await;
    }

    /// Answer lookups of one meeting id
    pub async fn mount_meeting(&self, id: u64, service_body: u64) {
        client("GetSearchResults")
            .and(query_param("meeting_ids[]", id.to_string()))
            .respond_with(json_response(json!([meeting(id, service_body)])))
            .with_priority(2)
            .mount(&self.server)
            .await;
    }
}

/// Route session logs to the test output; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Session config accepting the mock's plain loopback HTTP
pub fn loopback_config() -> SessionConfig {
    SessionConfig::default().with_gateway(GatewayConfig::default().with_tls(TlsConfig::loopback()))
}

/// Connect to `root` and collect notifications through a channel
pub fn connect(root: &MockRoot) -> (Session, UnboundedReceiver<Notification>) {
    connect_uri(&root.uri())
}

pub fn connect_uri(uri: &str) -> (Session, UnboundedReceiver<Notification>) {
    init_tracing();
    let (observer, receiver) = ChannelObserver::new();
    let session = Session::builder()
        .config(loopback_config())
        .observer(Arc::new(observer))
        .connect(uri);
    (session, receiver)
}

/// Connect and wait for `server_validated(true)`
pub async fn ready_session(root: &MockRoot) -> (Session, UnboundedReceiver<Notification>) {
    let (session, mut receiver) = connect(root);
    let first = next(&mut receiver).await;
    assert_eq!(first.event, Event::ServerValidated(true), "bootstrap should succeed");
    (session, receiver)
}

/// Next notification, failing the test after five seconds
pub async fn next(receiver: &mut UnboundedReceiver<Notification>) -> Notification {
    tokio::time::timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("notification within five seconds")
        .expect("dispatcher still running")
}

/// Next `n` notifications
pub async fn take(receiver: &mut UnboundedReceiver<Notification>, n: usize) -> Vec<Notification> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(next(receiver).await);
    }
    out
}

/// Assert nothing more arrives for a short while
pub async fn assert_quiet(receiver: &mut UnboundedReceiver<Notification>) {
    let extra = tokio::time::timeout(Duration::from_millis(200), receiver.recv()).await;
    assert!(extra.is_err(), "unexpected notification: {extra:?}");
}
