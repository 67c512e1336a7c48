//! AccessClient against an in-process stub of the access API
//!
//! Each stub serves one response shape so the same underlying data can be
//! checked through every list container the service has been seen to use.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use portcullis_connect::{
    AccessApi, AccessClient, ClientConfig, ConnectError, EndpointSpec, EndpointUpdate,
    PolicySpec, ServiceType, ShellAuth, ShellAuthMode, UpstreamTarget,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

const TOKEN: &str = "test-token";

#[derive(Clone, Copy)]
enum Shape {
    Bare,
    List,
    Keyed,
}

#[derive(Clone)]
struct Stub {
    shape: Shape,
    bodies: Arc<Mutex<Vec<Value>>>,
}

fn sockets() -> Value {
    json!([
        {"socket_id": "s-1", "name": "shell-c1234567", "socket_type": "ssh",
         "dnsname": "shell-c1234567.edge.example.net"},
        {"socket_id": "s-2", "name": "desktop-c1234567", "socket_type": "vnc"},
        {"id": "s-3", "name": "web-ffff0000", "socket_type": "http"}
    ])
}

fn wrap(shape: Shape, key: &str, items: Value) -> Value {
    match shape {
        Shape::Bare => items,
        Shape::List => json!({ "list": items }),
        Shape::Keyed => {
            let mut map = serde_json::Map::new();
            map.insert(key.to_string(), items);
            Value::Object(map)
        }
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", TOKEN))
        .unwrap_or(false)
}

async fn list_sockets(State(stub): State<Stub>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "no token"})));
    }
    (StatusCode::OK, Json(wrap(stub.shape, "sockets", sockets())))
}

async fn create_socket(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    stub.bodies.lock().unwrap().push(body.clone());
    Json(json!({
        "socket_id": "s-new",
        "name": body["name"],
        "socket_type": body["socket_type"],
        "dnsname": "new.edge.example.net"
    }))
}

async fn update_socket(
    State(stub): State<Stub>,
    Path(_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    stub.bodies.lock().unwrap().push(body.clone());
    // Some service versions echo the record without any identifier
    Json(json!({ "name": "shell-c1234567", "upstream": body["upstream"] }))
}

async fn delete_socket(Path(_id): Path<String>) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn attach(
    State(stub): State<Stub>,
    Path(_id): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    stub.bodies.lock().unwrap().push(body);
    StatusCode::OK
}

async fn list_policies(State(stub): State<Stub>) -> Json<Value> {
    let items = json!([
        {"policy_id": "p-1", "name": "user-policy-dev-example-com", "socket_count": 2},
        {"id": "p-2", "name": "engineering"}
    ]);
    Json(wrap(stub.shape, "policies", items))
}

async fn create_policy() -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"error": "identity lookups are restricted"})),
    )
}

async fn policy_sockets(State(stub): State<Stub>, Path(id): Path<String>) -> Response {
    match id.as_str() {
        // Container key this client does not know about
        "p-items" => Json(json!({"items": [{"socket_id": "s-1"}]})).into_response(),
        "p-empty" => StatusCode::OK.into_response(),
        _ => Json(wrap(
            stub.shape,
            "sockets",
            json!([{"socket_id": "s-1"}, {"socket_id": "s-2"}]),
        ))
        .into_response(),
    }
}

async fn spawn_stub(shape: Shape) -> (AccessClient, Stub) {
    let (client, stub, _addr) = spawn_stub_at(shape, TOKEN).await;
    (client, stub)
}

async fn spawn_stub_at(shape: Shape, token: &str) -> (AccessClient, Stub, SocketAddr) {
    let stub = Stub {
        shape,
        bodies: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/api/v1/sockets", get(list_sockets).post(create_socket))
        .route(
            "/api/v1/socket/:id",
            put(update_socket).delete(delete_socket),
        )
        .route("/api/v1/socket/:id/policy", put(attach))
        .route("/api/v1/policies", get(list_policies).post(create_policy))
        .route("/api/v1/policy/:id/sockets", get(policy_sockets))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = AccessClient::new(ClientConfig::new(
        format!("http://{}/api/v1", addr),
        token,
    ))
    .unwrap();

    (client, stub, addr)
}

#[tokio::test]
async fn test_list_shapes_yield_same_collection() {
    let mut results = Vec::new();
    for shape in [Shape::Bare, Shape::List, Shape::Keyed] {
        let (client, _stub) = spawn_stub(shape).await;
        results.push(
            client
                .list_endpoints_by_name_prefix("")
                .await
                .expect("list sockets"),
        );
    }

    assert_eq!(results[0].len(), 3);
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], results[2]);
    assert_eq!(results[0][0].id, "s-1");
    assert_eq!(results[0][0].service_type, Some(ServiceType::Shell));
}

#[tokio::test]
async fn test_prefix_and_name_lookup() {
    let (client, _stub) = spawn_stub(Shape::Keyed).await;

    let owned = client
        .list_endpoints_by_name_prefix("desktop-")
        .await
        .unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].id, "s-2");

    let found = client
        .find_endpoint_by_name("shell-c1234567")
        .await
        .unwrap()
        .expect("shell socket exists");
    assert_eq!(
        found.public_address.as_deref(),
        Some("shell-c1234567.edge.example.net")
    );

    assert!(client
        .find_endpoint_by_name("shell-c12345")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_create_and_update_bodies() {
    let (client, stub) = spawn_stub(Shape::Bare).await;

    let spec = EndpointSpec {
        name: "shell-c1234567".to_string(),
        service_type: ServiceType::Shell,
        connector_ids: vec!["conn-1".to_string()],
        upstream: UpstreamTarget::new("172.17.0.4", 22),
        shell_auth: None,
    };
    let created = client.create_endpoint(&spec).await.unwrap();
    assert_eq!(created.id, "s-new");
    assert_eq!(created.public_address.as_deref(), Some("new.edge.example.net"));

    let updated = client
        .update_endpoint(
            "s-1",
            &EndpointUpdate {
                upstream: UpstreamTarget::new("172.17.0.9", 2222),
                shell_auth: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.id, "s-1");
    assert_eq!(updated.upstream.unwrap().port, 2222);

    let bodies = stub.bodies.lock().unwrap().clone();
    assert_eq!(bodies[0]["socket_type"], "ssh");
    assert_eq!(bodies[0]["connector_ids"], json!(["conn-1"]));
    // Updates never resend type or connectors
    assert!(bodies[1].get("socket_type").is_none());
    assert!(bodies[1].get("connector_ids").is_none());
}

#[tokio::test]
async fn test_update_body_carries_shell_auth_only_when_set() {
    let (client, stub) = spawn_stub(Shape::Bare).await;

    client
        .update_endpoint(
            "s-1",
            &EndpointUpdate {
                upstream: UpstreamTarget::new("172.17.0.9", 22),
                shell_auth: Some(ShellAuth {
                    username: "root".to_string(),
                    mode: ShellAuthMode::Certificate,
                }),
            },
        )
        .await
        .unwrap();
    client
        .update_endpoint(
            "s-3",
            &EndpointUpdate {
                upstream: UpstreamTarget::new("172.17.0.9", 8080),
                shell_auth: None,
            },
        )
        .await
        .unwrap();

    let bodies = stub.bodies.lock().unwrap().clone();
    assert_eq!(
        bodies[0]["ssh"],
        json!({"username": "root", "authentication_type": "certificate"})
    );
    assert_eq!(bodies[0]["upstream"]["port"], 22);
    assert!(bodies[1].get("ssh").is_none());
}

#[tokio::test]
async fn test_unreadable_attachment_listing_is_not_zero() {
    let (client, _stub) = spawn_stub(Shape::List).await;

    let err = client.count_endpoint_attachments("p-items").await.unwrap_err();
    assert!(matches!(err, ConnectError::UnexpectedShape { .. }));

    let err = client.count_endpoint_attachments("p-empty").await.unwrap_err();
    assert!(matches!(err, ConnectError::UnexpectedShape { .. }));

    assert_eq!(client.count_endpoint_attachments("p-1").await.unwrap(), 2);
}

#[tokio::test]
async fn test_policies_and_attachments() {
    let (client, stub) = spawn_stub(Shape::List).await;

    let policies = client.list_policies().await.unwrap();
    assert_eq!(policies.len(), 2);
    assert_eq!(policies[0].id, "p-1");
    assert_eq!(policies[0].embedded_attachment_count(), Some(2));
    assert_eq!(policies[1].embedded_attachment_count(), None);

    let personal = client
        .find_policy_by_name("user-policy-dev-example-com")
        .await
        .unwrap();
    assert!(personal.is_some());

    assert_eq!(client.count_endpoint_attachments("p-1").await.unwrap(), 2);

    client
        .attach_policies("s-1", &["p-1".to_string(), "p-2".to_string()])
        .await
        .unwrap();
    let bodies = stub.bodies.lock().unwrap().clone();
    assert_eq!(
        bodies[0],
        json!({"actions": [{"action": "add", "id": "p-1"}, {"action": "add", "id": "p-2"}]})
    );

    client.delete_endpoint("s-1").await.unwrap();
}

#[tokio::test]
async fn test_error_statuses_surface() {
    let (client, _stub) = spawn_stub(Shape::Bare).await;

    let err = client
        .create_policy(&PolicySpec::personal("dev@example.com"))
        .await
        .unwrap_err();
    assert!(err.is_permission_denied());
    assert!(matches!(err, ConnectError::UnexpectedStatus { .. }));

    let (wrong_token, _stub, _addr) = spawn_stub_at(Shape::Bare, "wrong-token").await;
    let err = wrong_token.list_endpoints().await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
}
