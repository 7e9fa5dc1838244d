//! Tests for the Hetzner gateway against a scripted loopback HTTP server.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::{HetznerClient, shared_client};
use crate::gateway::{ActionHandle, Gateway, GatewayError, InstanceRequest, PowerAction};

/// Serves one canned response per connection, in order, and returns the raw
/// requests it received.
async fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|err| panic!("bind listener: {err}"));
    let addr = listener
        .local_addr()
        .unwrap_or_else(|err| panic!("listener addr: {err}"));

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener
                .accept()
                .await
                .unwrap_or_else(|err| panic!("accept: {err}"));
            requests.push(read_request(&mut stream).await);
            let response = format!(
                "HTTP/1.1 {status} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .await
                .unwrap_or_else(|err| panic!("write response: {err}"));
            stream.shutdown().await.ok();
        }
        requests
    });

    (format!("http://{addr}"), handle)
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let read = stream
            .read(&mut chunk)
            .await
            .unwrap_or_else(|err| panic!("read request: {err}"));
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        let text = String::from_utf8_lossy(&buffer).into_owned();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buffer.len() >= head_end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

fn client(base_url: &str) -> HetznerClient {
    HetznerClient::new("tok")
        .with_base_url(base_url)
        .with_action_timing(Duration::from_millis(1), Duration::from_millis(500))
}

fn request() -> InstanceRequest {
    InstanceRequest::builder()
        .name("node-1")
        .server_type("cx11")
        .image("ubuntu-20.04")
        .location("nbg1")
        .build()
        .unwrap_or_else(|err| panic!("request fixture: {err}"))
}

#[tokio::test]
async fn upload_key_posts_bearer_authenticated_payload() {
    let (base, server) = serve(vec![(
        201,
        r#"{"ssh_key":{"id":7,"name":"rancher-node-1","public_key":"ssh-rsa AAAA"}}"#,
    )])
    .await;

    let id = client(&base)
        .upload_key("rancher-node-1", "ssh-rsa AAAA")
        .await
        .unwrap_or_else(|err| panic!("upload should succeed: {err}"));
    assert_eq!(id, 7);

    let requests = server.await.unwrap_or_else(|err| panic!("server task: {err}"));
    let raw = requests.first().unwrap_or_else(|| panic!("no request captured"));
    assert!(raw.starts_with("POST /ssh_keys "), "request: {raw}");
    assert!(
        raw.to_ascii_lowercase().contains("authorization: bearer tok"),
        "request: {raw}"
    );
    assert!(raw.contains(r#""public_key":"ssh-rsa AAAA""#), "request: {raw}");
}

#[tokio::test]
async fn upload_key_reports_conflict() {
    let (base, _server) = serve(vec![(
        409,
        r#"{"error":{"code":"uniqueness_error","message":"SSH key with the same fingerprint already exists"}}"#,
    )])
    .await;

    let err = client(&base)
        .upload_key("rancher-node-1", "ssh-rsa AAAA")
        .await
        .expect_err("duplicate key should fail");
    assert!(matches!(err, GatewayError::Conflict { .. }), "got {err:?}");
}

#[tokio::test]
async fn create_instance_returns_server_and_action() {
    let (base, server) = serve(vec![(
        201,
        r#"{"server":{"id":42,"status":"initializing","public_net":{"ipv4":null}},"action":{"id":900,"status":"running","error":null},"next_actions":[]}"#,
    )])
    .await;

    let created = client(&base)
        .create_instance(&request(), 7)
        .await
        .unwrap_or_else(|err| panic!("create should succeed: {err}"));
    assert_eq!(created.id, 42);
    assert_eq!(created.action, Some(ActionHandle { id: 900 }));

    let requests = server.await.unwrap_or_else(|err| panic!("server task: {err}"));
    let raw = requests.first().unwrap_or_else(|| panic!("no request captured"));
    assert!(raw.contains(r#""ssh_keys":[7]"#), "request: {raw}");
    assert!(raw.contains(r#""server_type":"cx11""#), "request: {raw}");
    assert!(raw.contains(r#""location":"nbg1""#), "request: {raw}");
}

#[tokio::test]
async fn get_instance_parses_public_ipv4() {
    let (base, _server) = serve(vec![(
        200,
        r#"{"server":{"id":42,"status":"running","public_net":{"ipv4":{"ip":"203.0.113.5","blocked":false}}}}"#,
    )])
    .await;

    let snapshot = client(&base)
        .get_instance(42)
        .await
        .unwrap_or_else(|err| panic!("get should succeed: {err}"));
    assert_eq!(snapshot.public_ipv4, Some(Ipv4Addr::new(203, 0, 113, 5)));
    assert_eq!(snapshot.status, "running");
}

#[tokio::test]
async fn get_instance_maps_missing_server_to_not_found() {
    let (base, _server) = serve(vec![(
        404,
        r#"{"error":{"code":"not_found","message":"server with ID '42' not found"}}"#,
    )])
    .await;

    let err = client(&base)
        .get_instance(42)
        .await
        .expect_err("missing server should fail");
    assert!(err.is_not_found(), "got {err:?}");
}

#[tokio::test]
async fn await_action_polls_until_success() {
    let (base, server) = serve(vec![
        (200, r#"{"action":{"id":900,"status":"running","error":null}}"#),
        (200, r#"{"action":{"id":900,"status":"success","error":null}}"#),
    ])
    .await;

    client(&base)
        .await_action(ActionHandle { id: 900 })
        .await
        .unwrap_or_else(|err| panic!("action should succeed: {err}"));

    let requests = server.await.unwrap_or_else(|err| panic!("server task: {err}"));
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|raw| raw.starts_with("GET /actions/900 ")));
}

#[tokio::test]
async fn await_action_surfaces_action_error() {
    let (base, _server) = serve(vec![(
        200,
        r#"{"action":{"id":900,"status":"error","error":{"code":"action_failed","message":"image unavailable"}}}"#,
    )])
    .await;

    let err = client(&base)
        .await_action(ActionHandle { id: 900 })
        .await
        .expect_err("failed action should error");
    assert_eq!(
        err,
        GatewayError::ActionFailed {
            action_id: 900,
            message: String::from("action_failed: image unavailable"),
        }
    );
}

#[tokio::test]
async fn delete_key_accepts_empty_no_content_response() {
    let (base, server) = serve(vec![(204, "")]).await;

    client(&base)
        .delete_key(7)
        .await
        .unwrap_or_else(|err| panic!("delete should succeed: {err}"));

    let requests = server.await.unwrap_or_else(|err| panic!("server task: {err}"));
    let raw = requests.first().unwrap_or_else(|| panic!("no request captured"));
    assert!(raw.starts_with("DELETE /ssh_keys/7 "), "request: {raw}");
}

#[tokio::test]
async fn power_posts_action_path() {
    let (base, server) = serve(vec![(
        201,
        r#"{"action":{"id":901,"status":"running","error":null}}"#,
    )])
    .await;

    let handle = client(&base)
        .power(42, PowerAction::Reboot)
        .await
        .unwrap_or_else(|err| panic!("reboot should succeed: {err}"));
    assert_eq!(handle, ActionHandle { id: 901 });

    let requests = server.await.unwrap_or_else(|err| panic!("server task: {err}"));
    let raw = requests.first().unwrap_or_else(|| panic!("no request captured"));
    assert!(
        raw.starts_with("POST /servers/42/actions/reboot "),
        "request: {raw}"
    );
}

#[tokio::test]
async fn unreachable_api_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|err| panic!("bind listener: {err}"));
    let addr = listener
        .local_addr()
        .unwrap_or_else(|err| panic!("listener addr: {err}"));
    drop(listener);

    let err = client(&format!("http://{addr}"))
        .get_instance(42)
        .await
        .expect_err("closed port should fail");
    assert!(matches!(err, GatewayError::Transient { .. }), "got {err:?}");
}

#[test]
fn debug_output_redacts_token() {
    let rendered = format!("{:?}", HetznerClient::new("super-secret"));
    assert!(!rendered.contains("super-secret"), "rendered: {rendered}");
}

#[test]
fn failed_client_build_is_reported_not_replaced() {
    let built: Result<reqwest::Client, String> = Err(String::from("no TLS backend"));

    let err = shared_client(&built).expect_err("broken client should not be used");

    assert_eq!(
        err,
        GatewayError::Client {
            message: String::from("no TLS backend")
        }
    );
}

#[test]
fn built_client_is_shared() {
    let built: Result<reqwest::Client, String> = Ok(reqwest::Client::new());

    let client = shared_client(&built).unwrap_or_else(|err| panic!("client: {err}"));
    assert!(built.as_ref().is_ok_and(|shared| std::ptr::eq(shared, client)));
}
