//! Tool dispatch integration tests

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use aryan_core::tools::{HostEvent, Peripheral, PeripheralAction, Theme, ToolCall, ToolDispatcher};
use aryan_core::voice::OutputBus;
use aryan_core::{LogEntry, LogKind, Observers};

mod common;

use common::FakeHost;

struct Fixture {
    dispatcher: ToolDispatcher,
    host: Arc<FakeHost>,
    output: OutputBus,
    logs: Arc<Mutex<Vec<LogEntry>>>,
    actions: Arc<Mutex<Vec<String>>>,
}

fn fixture() -> Fixture {
    let host = FakeHost::new();
    let observers = Arc::new(Observers::new());
    let logs = Arc::new(Mutex::new(Vec::new()));
    let actions = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&logs);
    observers.on_log(move |e| sink.lock().unwrap().push(e));
    let sink = Arc::clone(&actions);
    observers.on_tool_action(move |name| sink.lock().unwrap().push(name.to_string()));

    let output = OutputBus::default();
    let dispatcher = ToolDispatcher::new(host.clone(), observers, output.clone())
        .with_search_url("https://search.example/?q=")
        .with_location_timeout(Duration::from_secs(5));

    Fixture {
        dispatcher,
        host,
        output,
        logs,
        actions,
    }
}

async fn call(f: &Fixture, name: &str, args: Value) -> Value {
    f.dispatcher
        .dispatch(&ToolCall::new("id-1", name, args))
        .await
        .to_response()
}

fn ok() -> Value {
    json!({ "result": { "status": "ok" } })
}

#[tokio::test]
async fn test_open_website() {
    let f = fixture();
    let response = call(&f, "open_website", json!({ "url": "https://example.com" })).await;
    assert_eq!(response, ok());
    assert_eq!(f.host.opened(), vec!["https://example.com".to_string()]);
}

#[tokio::test]
async fn test_search_web_encodes_query() {
    let f = fixture();
    let response = call(&f, "search_web", json!({ "query": "rust async & tokio" })).await;
    assert_eq!(response, ok());
    assert_eq!(
        f.host.opened(),
        vec!["https://search.example/?q=rust%20async%20%26%20tokio".to_string()]
    );
}

#[tokio::test]
async fn test_launch_app_notifies_host() {
    let f = fixture();
    let mut events = f.dispatcher.subscribe();

    let response = call(&f, "launch_app", json!({ "appName": "Spotify" })).await;

    assert_eq!(
        response,
        json!({ "result": { "status": "Launched Spotify in sandbox mode" } })
    );
    assert_eq!(
        events.try_recv().unwrap(),
        HostEvent::AppLaunched {
            app_name: "Spotify".into()
        }
    );
}

#[tokio::test]
async fn test_system_diagnostics_reports_metrics() {
    let f = fixture();
    let mut events = f.dispatcher.subscribe();

    let response = call(&f, "get_system_diagnostics", json!({})).await;

    let result = &response["result"];
    assert!(result["cpu"].as_str().unwrap().ends_with('%'));
    assert!(result["ram"].as_str().unwrap().ends_with("MB / 16GB"));
    assert_eq!(result["processes"].as_array().unwrap().len(), 4);
    assert!(matches!(
        events.try_recv().unwrap(),
        HostEvent::MetricsUpdated(_)
    ));
}

#[tokio::test]
async fn test_control_hardware() {
    let f = fixture();
    let mut events = f.dispatcher.subscribe();

    let response = call(
        &f,
        "control_hardware",
        json!({ "peripheral": "camera", "action": "off" }),
    )
    .await;

    assert_eq!(
        response,
        json!({ "result": { "status": "camera adjusted to off" } })
    );
    assert_eq!(
        events.try_recv().unwrap(),
        HostEvent::PeripheralControl {
            peripheral: Peripheral::Camera,
            action: PeripheralAction::Off,
        }
    );
}

#[tokio::test]
async fn test_set_screen_mode() {
    let f = fixture();
    let mut events = f.dispatcher.subscribe();

    assert_eq!(call(&f, "set_screen_mode", json!({ "mode": "light" })).await, ok());
    assert_eq!(
        events.try_recv().unwrap(),
        HostEvent::ThemeChange { mode: Theme::Light }
    );
}

#[tokio::test]
async fn test_battery_status() {
    let f = fixture();
    let response = call(&f, "get_battery_status", json!({})).await;
    assert_eq!(
        response,
        json!({ "result": { "level": 76.0, "charging": true } })
    );
}

#[tokio::test]
async fn test_battery_unavailable_is_error_result() {
    let f = fixture();
    f.host.no_battery.store(true, Ordering::SeqCst);

    let response = call(&f, "get_battery_status", json!({})).await;

    assert_eq!(response, json!({ "result": { "error": "battery unavailable" } }));
    let logs = f.logs.lock().unwrap();
    assert!(logs.iter().any(|e| e.kind == Some(LogKind::Error)
        && e.message == "get_battery_status failed: battery unavailable"));
}

#[tokio::test]
async fn test_device_location() {
    let f = fixture();
    let response = call(&f, "get_device_location", json!({})).await;
    assert_eq!(
        response,
        json!({ "result": { "lat": 28.6139, "lon": 77.209 } })
    );
}

#[tokio::test(start_paused = true)]
async fn test_device_location_times_out() {
    let f = fixture();
    f.host.hang_location.store(true, Ordering::SeqCst);

    let started = tokio::time::Instant::now();
    let response = call(&f, "get_device_location", json!({})).await;

    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert_eq!(
        response,
        json!({ "result": { "error": "location request timed out" } })
    );
    assert_eq!(*f.actions.lock().unwrap(), vec!["get_device_location".to_string()]);
}

#[tokio::test]
async fn test_set_volume_clamps_gain() {
    let f = fixture();

    assert_eq!(call(&f, "set_volume", json!({ "level": 25 })).await, ok());
    assert!((f.output.gain() - 0.25).abs() < 1e-6);

    call(&f, "set_volume", json!({ "level": 250 })).await;
    assert!((f.output.gain() - 1.0).abs() < f32::EPSILON);

    call(&f, "set_volume", json!({ "level": -10 })).await;
    assert!(f.output.gain().abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_set_brightness_passes_level_through() {
    let f = fixture();
    let mut events = f.dispatcher.subscribe();

    assert_eq!(call(&f, "set_brightness", json!({ "level": 60 })).await, ok());
    assert_eq!(
        events.try_recv().unwrap(),
        HostEvent::BrightnessChange { level: 60.0 }
    );
}

#[tokio::test]
async fn test_write_notebook_appends_and_replaces() {
    let f = fixture();
    *f.host.note.lock().unwrap() = "first".to_string();
    let mut events = f.dispatcher.subscribe();

    let response = call(
        &f,
        "write_notebook",
        json!({ "content": "second", "mode": "append" }),
    )
    .await;
    assert_eq!(response, json!({ "result": { "status": "Notebook updated" } }));
    assert_eq!(
        events.try_recv().unwrap(),
        HostEvent::NoteUpdated {
            content: "first\nsecond".into()
        }
    );

    call(
        &f,
        "write_notebook",
        json!({ "content": "fresh", "mode": "replace" }),
    )
    .await;
    assert_eq!(
        events.try_recv().unwrap(),
        HostEvent::NoteUpdated {
            content: "fresh".into()
        }
    );
}

#[tokio::test]
async fn test_send_message() {
    let f = fixture();
    let mut events = f.dispatcher.subscribe();

    let response = call(
        &f,
        "send_message",
        json!({ "recipient": "Riya", "content": "running late" }),
    )
    .await;

    assert_eq!(
        response,
        json!({ "result": { "status": "Message sent via Aryan Messenger" } })
    );
    match events.try_recv().unwrap() {
        HostEvent::MessageSent(message) => {
            assert_eq!(message.recipient, "Riya");
            assert_eq!(message.content, "running late");
            assert!(!message.timestamp.is_empty());
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_shutdown_system() {
    let f = fixture();
    let mut events = f.dispatcher.subscribe();

    assert_eq!(call(&f, "shutdown_system", json!({})).await, ok());
    assert_eq!(events.try_recv().unwrap(), HostEvent::ShutdownRequested);
}

#[tokio::test]
async fn test_unknown_tool_returns_ok() {
    let f = fixture();
    assert_eq!(call(&f, "make_coffee", json!({ "sugar": 2 })).await, ok());
    assert_eq!(*f.actions.lock().unwrap(), vec!["make_coffee".to_string()]);
}

#[tokio::test]
async fn test_missing_argument_is_error_result() {
    let f = fixture();
    let response = call(&f, "open_website", json!({})).await;

    assert!(
        response["result"]["error"]
            .as_str()
            .unwrap()
            .contains("missing `url`")
    );
    assert!(f.host.opened().is_empty());
}

#[tokio::test]
async fn test_every_dispatch_is_logged_with_call_id() {
    let f = fixture();
    call(&f, "shutdown_system", json!({})).await;

    let logs = f.logs.lock().unwrap();
    let entry = logs
        .iter()
        .find(|e| e.kind == Some(LogKind::Tool))
        .unwrap();
    assert_eq!(entry.message, "System Action: shutdown_system");
    assert_eq!(entry.id, "id-1");
}
