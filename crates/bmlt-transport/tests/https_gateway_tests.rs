//! HttpsGateway against a mock Root Server.
//!
//! wiremock serves plain HTTP on 127.0.0.1, so every gateway here is built
//! with the loopback opt-in.

use std::time::Duration;

use bmlt_protocol::{Operation, Params};
use bmlt_transport::{
    Credential, Gateway, GatewayConfig, GatewayRequest, HttpsGateway, PayloadBody, TimeoutConfig,
    TlsConfig, TransportError,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn loopback_config() -> GatewayConfig {
    GatewayConfig::default().with_tls(TlsConfig::loopback())
}

async fn gateway_for(server: &MockServer) -> HttpsGateway {
    HttpsGateway::new(&format!("{}/main_server/", server.uri()), loopback_config())
        .expect("loopback gateway builds")
}

#[tokio::test]
async fn test_plain_http_refused_without_opt_in() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = HttpsGateway::new(&server.uri(), GatewayConfig::default()).unwrap_err();
    assert!(matches!(err, TransportError::InsecureUri(_)));
}

#[tokio::test]
async fn test_json_request_with_ordered_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/main_server/client_interface/json/"))
        .and(query_param("switcher", "GetSearchResults"))
        .and(query_param("services[]", "4"))
        .and(query_param("weekdays[]", "-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id_bigint": "12"}])))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let params = Params::new()
        .with("services[]", 4)
        .with("weekdays[]", -1);
    let payload = gateway
        .request(GatewayRequest::new(Operation::Search, params))
        .await
        .unwrap();

    assert_eq!(payload.as_json(), Some(&json!([{"id_bigint": "12"}])));
    assert!(payload.credential.is_none());

    let metrics = gateway.metrics();
    assert_eq!(metrics.requests, 1);
    assert_eq!(metrics.failures, 0);
    assert!(metrics.bytes_received > 0);
}

#[tokio::test]
async fn test_login_captures_cookie_and_replays_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/main_server/local_server/server_admin/json.php"))
        .and(query_param("admin_action", "login"))
        .and(query_param("c_comdef_admin_login", "alice"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "PHPSESSID=s3cr3t; path=/; HttpOnly")
                .set_body_string("OK\n"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("admin_action", "get_permissions"))
        .and(header("cookie", "PHPSESSID=s3cr3t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"service_body": []})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let login = gateway
        .request(GatewayRequest::new(
            Operation::Login,
            Params::new()
                .with("c_comdef_admin_login", "alice")
                .with("c_comdef_admin_password", "pw"),
        ))
        .await
        .unwrap();

    assert_eq!(login.body, PayloadBody::Text("OK".to_string()));
    let credential = login.credential.expect("cookie captured");
    assert_eq!(credential, Credential::new("PHPSESSID=s3cr3t"));

    let permissions = gateway
        .request(
            GatewayRequest::new(Operation::Permissions, Params::new())
                .with_credential(Some(credential)),
        )
        .await
        .unwrap();
    assert_eq!(permissions.as_json(), Some(&json!({"service_body": []})));
}

#[tokio::test]
async fn test_languages_path_has_no_selector() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/main_server/client_interface/json/GetLangs.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"languages": [{"key": "en", "name": "English", "default": true}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let payload = gateway
        .request(GatewayRequest::new(Operation::Languages, Params::new()))
        .await
        .unwrap();
    assert!(payload.as_json().is_some());
}

#[tokio::test]
async fn test_http_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server).await;
    let err = gateway
        .request(GatewayRequest::new(Operation::Formats, Params::new()))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransportError::HttpStatus {
            operation: Operation::Formats,
            status: 500
        }
    );
    assert!(err.is_retryable());
    assert_eq!(gateway.metrics().failures, 1);
}

#[tokio::test]
async fn test_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("[]")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = loopback_config().with_timeout(TimeoutConfig {
        connect: Duration::from_secs(1),
        request: Duration::from_millis(200),
    });
    let gateway = HttpsGateway::new(&server.uri(), config).unwrap();
    let err = gateway
        .request(GatewayRequest::new(Operation::ServerInfo, Params::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::RequestTimeout { operation: Operation::ServerInfo, .. }));
}

#[tokio::test]
async fn test_connection_refused() {
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };

    let gateway = HttpsGateway::new(&uri, loopback_config()).unwrap();
    let err = gateway
        .request(GatewayRequest::new(Operation::ServerInfo, Params::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::ConnectionFailed(_)), "{err:?}");
}

#[tokio::test]
async fn test_oversized_response_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
        .mount(&server)
        .await;

    let mut config = loopback_config();
    config.max_response_size = Some(1024);
    let gateway = HttpsGateway::new(&server.uri(), config).unwrap();
    let err = gateway
        .request(GatewayRequest::new(Operation::Search, Params::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::ResponseTooLarge { limit: 1024, .. }));
}
