use scenelink::cmd::CommandFn;
use scenelink::host::{ObjectKind, SceneObject};
use scenelink::{Client, Config, DemoHost, Endpoint, ExitCause, Host};

use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A running endpoint on its own "main thread", the way a host embeds it.
struct TestEndpoint {
    addr: SocketAddr,
    exit: scenelink::ExitFlag,
    main_thread: String,
    thread: Option<JoinHandle<()>>,
}

impl TestEndpoint {
    fn client(&self) -> Client {
        Client::new(self.addr.to_string())
    }
}

impl Drop for TestEndpoint {
    fn drop(&mut self) {
        self.exit.request(ExitCause::Signal);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn start_endpoint() -> TestEndpoint {
    start_endpoint_with(DemoHost::new(), |_| {})
}

fn start_endpoint_with(
    host: DemoHost,
    setup: impl FnOnce(&mut Endpoint) + Send + 'static,
) -> TestEndpoint {
    let mut config = Config::default();
    config.port = 0;
    config.tick_period_ms = 5;

    let (ready_tx, ready_rx) = mpsc::channel();
    let thread = std::thread::spawn(move || {
        let mut host = host;
        let mut endpoint = Endpoint::new(config).expect("endpoint builds");
        setup(&mut endpoint);
        if let Err(err) = endpoint.start() {
            let _ = ready_tx.send(Err(err.to_string()));
            return;
        }
        let addr = endpoint.local_addr().expect("listening address");
        let main_thread = format!("{:?}", std::thread::current().id());
        let _ = ready_tx.send(Ok((addr, endpoint.exit_flag(), main_thread)));
        let _ = endpoint.run(&mut host);
    });

    let (addr, exit, main_thread) = ready_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("endpoint thread reported in")
        .expect("endpoint started");

    TestEndpoint {
        addr,
        exit,
        main_thread,
        thread: Some(thread),
    }
}

/// Send raw bytes and return whatever the server writes before closing.
async fn send_raw(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    buf
}

#[tokio::test]
async fn scene_info_reports_the_default_scene() {
    let server = start_endpoint();
    let info = server.client().scene_info().await.unwrap();

    assert_eq!(info["name"], "Scene");
    assert_eq!(info["object_count"], 3);
    assert_eq!(info["materials_count"], 1);

    let objects = info["objects"].as_array().unwrap();
    assert!(objects.len() <= 10);
    assert_eq!(objects[0]["name"], "Cube");
    assert_eq!(objects[0]["type"], "MESH");
}

#[tokio::test]
async fn scene_listing_is_capped_while_the_count_is_not() {
    let mut host = DemoHost::new();
    for i in 0..12 {
        host.add_object(SceneObject {
            name: format!("Grid.{:03}", i),
            kind: ObjectKind::Empty,
            location: [i as f64, 0.0, 0.0],
            rotation_euler: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
            visible: true,
            materials: vec![],
            mesh: None,
        });
    }

    let server = start_endpoint_with(host, |_| {});
    let info = server.client().scene_info().await.unwrap();

    // 3 default objects plus the 12 seeded ones.
    assert_eq!(info["object_count"], 15);
    assert_eq!(info["objects"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn execute_code_round_trips_captured_stdout() {
    let server = start_endpoint();
    let result = server.client().execute_code("print(1+2)").await.unwrap();

    assert_eq!(result["executed"], true);
    assert_eq!(result["result"], "3\n");
}

#[tokio::test]
async fn object_info_reports_the_full_transform() {
    let server = start_endpoint();
    let info = server.client().object_info("Cube").await.unwrap();

    assert_eq!(info["type"], "MESH");
    assert_eq!(info["location"], json!([0.0, 0.0, 0.0]));
    assert_eq!(info["visible"], true);
    assert_eq!(info["materials"], json!(["Material"]));
    assert_eq!(info["mesh"]["vertices"], 8);
    assert_eq!(info["mesh"]["edges"], 12);
    assert_eq!(info["mesh"]["polygons"], 6);
}

#[tokio::test]
async fn missing_object_error_names_the_object() {
    let server = start_endpoint();
    let err = server
        .client()
        .object_info("__does_not_exist__")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("__does_not_exist__"));
}

#[tokio::test]
async fn unknown_command_error_names_the_type() {
    let server = start_endpoint();
    let err = server
        .client()
        .command("frobnicate", Map::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("unknown command type"));
    assert!(err.to_string().contains("frobnicate"));
}

#[tokio::test]
async fn missing_params_violate_preconditions() {
    let server = start_endpoint();
    let err = server
        .client()
        .command("execute_code", Map::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("missing required parameter"));
}

#[tokio::test]
async fn malformed_json_gets_a_parse_error_reply() {
    let server = start_endpoint();
    let raw = send_raw(server.addr, b"{not json").await;

    let reply: Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(reply["status"], "error");
    assert!(!reply["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn non_object_top_level_is_invalid() {
    let server = start_endpoint();
    let raw = send_raw(server.addr, b"[1, 2, 3]").await;

    let reply: Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(reply["status"], "error");
    assert!(reply["message"]
        .as_str()
        .unwrap()
        .contains("JSON object"));
}

#[tokio::test]
async fn empty_connection_is_dropped_silently() {
    let server = start_endpoint();
    let raw = send_raw(server.addr, b"").await;
    assert!(raw.is_empty());

    // The endpoint is unbothered and keeps serving.
    let info = server.client().scene_info().await.unwrap();
    assert_eq!(info["object_count"], 3);
}

#[tokio::test]
async fn legacy_code_payload_executes() {
    let server = start_endpoint();
    let raw = send_raw(server.addr, br#"{"code":"print('legacy')"}"#).await;

    let reply: Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(reply["status"], "success");
    assert_eq!(reply["result"]["result"], "legacy\n");
}

#[tokio::test]
async fn legacy_message_alone_is_not_a_command() {
    let server = start_endpoint();
    let raw = send_raw(server.addr, br#"{"message":"hello from a legacy client"}"#).await;

    let reply: Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(reply["status"], "error");
    assert!(reply["message"].as_str().unwrap().contains("missing command type"));
}

#[tokio::test]
async fn concurrent_code_executes_in_submission_order() {
    let server = start_endpoint();
    let slow = server.client();
    let fast = server.client();

    let started = Instant::now();
    let first = tokio::spawn(async move {
        slow.execute_code("import time; time.sleep(0.5); print('A')")
            .await
    });

    // Give the slow request time to be accepted and queued first.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = tokio::spawn(async move { fast.execute_code("print('B')").await });

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    let elapsed = started.elapsed();

    assert_eq!(first["result"], "A\n");
    assert_eq!(second["result"], "B\n");
    // The second fragment could not start until the first left the main
    // thread, so the whole exchange is bounded below by the sleep.
    assert!(elapsed >= Duration::from_millis(500), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn screenshot_is_unsupported_headless() {
    let server = start_endpoint();
    let err = server.client().screenshot(None, None, None).await.unwrap_err();

    assert!(err.to_string().contains("background"));
}

#[tokio::test]
async fn screenshot_writes_the_requested_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("viewport.png");
    let server = start_endpoint_with(DemoHost::with_ui(), |_| {});

    let result = server
        .client()
        .screenshot(Some(800), Some(path.to_str().unwrap()), None)
        .await
        .unwrap();

    assert_eq!(result["width"], 800);
    assert_eq!(result["height"], 450);
    assert_eq!(result["format"], "png");
    assert_eq!(result["filepath"], path.to_str().unwrap());

    let written = std::fs::read(&path).unwrap();
    assert!(written.starts_with(b"\x89PNG"));
}

#[tokio::test]
async fn screenshot_returns_inline_data_without_a_filepath() {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    let server = start_endpoint_with(DemoHost::with_ui(), |_| {});
    let result = server.client().screenshot(Some(400), None, None).await.unwrap();

    let data = BASE64.decode(result["data"].as_str().unwrap()).unwrap();
    assert!(data.starts_with(b"\x89PNG"));
}

#[tokio::test]
async fn provider_commands_run_on_the_main_thread() {
    let probe: CommandFn = Arc::new(|_host: &mut dyn Host, _params: Map<String, Value>| {
        Ok(json!(format!("{:?}", std::thread::current().id())))
    });
    let server = start_endpoint_with(DemoHost::new(), move |endpoint| {
        assert!(endpoint.register_handler("thread_probe", probe).unwrap());
    });

    let first = server.client().command("thread_probe", Map::new()).await.unwrap();
    let second = server.client().command("thread_probe", Map::new()).await.unwrap();

    assert_eq!(first.as_str().unwrap(), server.main_thread);
    assert_eq!(second.as_str().unwrap(), server.main_thread);
}

#[tokio::test]
async fn shutdown_reply_precedes_listener_close() {
    let mut server = start_endpoint();

    let result = server.client().shutdown().await.unwrap();
    assert_eq!(result["shutdown"], "initiated");

    // The keep-alive loop observes the exit request and unwinds.
    server.thread.take().unwrap().join().unwrap();

    // The listener is gone and the port is free for a fresh bind.
    assert!(TcpStream::connect(server.addr).await.is_err());
    std::net::TcpListener::bind(server.addr).unwrap();
}

#[tokio::test]
async fn legacy_quit_sentinel_shuts_the_server_down() {
    let mut server = start_endpoint();

    let raw = send_raw(server.addr, br#"{"code":"quit_blender()"}"#).await;
    let reply: Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(reply["status"], "success");
    assert_eq!(reply["result"]["shutdown"], "initiated");

    server.thread.take().unwrap().join().unwrap();
    assert!(TcpStream::connect(server.addr).await.is_err());
}

#[test]
fn start_is_idempotent_and_stop_releases_state() {
    let mut config = Config::default();
    config.port = 0;

    let mut endpoint = Endpoint::new(config).unwrap();
    assert_eq!(endpoint.state(), scenelink::ServerState::Stopped);

    endpoint.start().unwrap();
    let addr = endpoint.local_addr().unwrap();
    assert_eq!(endpoint.state(), scenelink::ServerState::Running);

    // A second start is a no-op success and keeps the same listener.
    endpoint.start().unwrap();
    assert_eq!(endpoint.local_addr(), Some(addr));

    endpoint.stop();
    assert_eq!(endpoint.state(), scenelink::ServerState::Stopped);
    assert_eq!(endpoint.local_addr(), None);

    // And the instance can go again after a stop.
    endpoint.start().unwrap();
    assert_eq!(endpoint.state(), scenelink::ServerState::Running);
    endpoint.stop();
}

#[test]
fn registration_is_refused_once_running() {
    let mut config = Config::default();
    config.port = 0;

    let mut endpoint = Endpoint::new(config).unwrap();
    endpoint.start().unwrap();

    let late: CommandFn = Arc::new(|_host: &mut dyn Host, _params: Map<String, Value>| {
        Ok(json!(null))
    });
    assert!(endpoint.register_handler("too_late", late).is_err());

    endpoint.stop();
}
