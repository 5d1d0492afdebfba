//! Unit tests for data models module
//!
//! Validates wire names, origin parsing, clamping of performance readings
//! and the topic/event mapping.

use super::*;
use serde_json::json;

fn fixed_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

#[test]
fn test_log_entry_serialization() {
    let entry = LogEntry {
        level: LogLevel::Warn,
        payload: vec![json!("disk low"), json!({"pct": 5})],
        origin: Origin::Host,
        timestamp: fixed_time(),
    };

    let value = serde_json::to_value(&entry).unwrap();
    assert_eq!(value["level"], "warn");
    assert_eq!(value["origin"], "host");
    assert_eq!(value["payload"], json!(["disk low", {"pct": 5}]));
    assert_eq!(value["timestamp"], "2024-05-01T12:00:00Z");
}

#[test]
fn test_origin_round_trip_forms() {
    assert_eq!(Origin::Host.to_string(), "host");
    assert_eq!(Origin::Renderer(7).to_string(), "renderer-7");
    assert_eq!("renderer-12".parse::<Origin>().unwrap(), Origin::Renderer(12));
    assert_eq!("host".parse::<Origin>().unwrap(), Origin::Host);
}

#[test]
fn test_origin_rejects_malformed_values() {
    assert!("main".parse::<Origin>().is_err());
    assert!("renderer-".parse::<Origin>().is_err());
    assert!("renderer--1".parse::<Origin>().is_err());
    assert!(serde_json::from_value::<Origin>(json!("renderer-x")).is_err());
}

#[test]
fn test_origin_accepts_only_canonical_ids() {
    assert!("renderer-+5".parse::<Origin>().is_err());
    assert!("renderer-05".parse::<Origin>().is_err());
    assert!("renderer- 5".parse::<Origin>().is_err());
    assert!(serde_json::from_value::<Origin>(json!("renderer-007")).is_err());
    assert_eq!("renderer-0".parse::<Origin>().unwrap(), Origin::Renderer(0));
    assert_eq!("renderer-50".parse::<Origin>().unwrap(), Origin::Renderer(50));
}

#[test]
fn test_ipc_message_wire_names() {
    let message = IpcMessage {
        channel: "sum".to_string(),
        direction: Direction::OriginToHost,
        kind: MessageKind::Request,
        sender_id: 3,
        payload: vec![json!(2), json!(3)],
        timestamp: fixed_time(),
        invocation_id: None,
    };

    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(value["direction"], "origin-to-host");
    assert_eq!(value["kind"], "request");
    assert_eq!(value["senderId"], 3);
    // Absent ids are omitted entirely
    assert!(value.get("invocationId").is_none());
}

#[test]
fn test_ipc_message_invocation_id_serialized_when_present() {
    let id = Uuid::new_v4();
    let message = IpcMessage {
        channel: "sum".to_string(),
        direction: Direction::HostToOrigin,
        kind: MessageKind::ResponseOk,
        sender_id: 1,
        payload: vec![json!(5)],
        timestamp: fixed_time(),
        invocation_id: Some(id),
    };

    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(value["kind"], "response-ok");
    assert_eq!(value["invocationId"], json!(id.to_string()));

    let back: IpcMessage = serde_json::from_value(value).unwrap();
    assert_eq!(back, message);
}

#[test]
fn test_message_kind_direction() {
    assert_eq!(MessageKind::FireAndForget.direction(), Direction::OriginToHost);
    assert_eq!(MessageKind::Request.direction(), Direction::OriginToHost);
    assert_eq!(MessageKind::ResponseOk.direction(), Direction::HostToOrigin);
    assert_eq!(MessageKind::ResponseError.direction(), Direction::HostToOrigin);
}

#[test]
fn test_process_usage_clamps_invalid_readings() {
    let usage = ProcessUsage::new(-3.0, f64::NAN);
    assert_eq!(usage.cpu, 0.0);
    assert_eq!(usage.memory, 0.0);

    let usage = ProcessUsage::new(12.5, f64::INFINITY);
    assert_eq!(usage.cpu, 12.5);
    assert_eq!(usage.memory, 0.0);
}

#[test]
fn test_topic_names() {
    assert_eq!(Topic::Log.as_str(), "log");
    assert_eq!(Topic::IpcMessage.as_str(), "ipc-message");
    assert_eq!(Topic::PerformanceSample.as_str(), "performance-sample");
    assert_eq!("ipc-message".parse::<Topic>().unwrap(), Topic::IpcMessage);
    assert!("console".parse::<Topic>().is_err());
}

#[test]
fn test_event_topic_and_tagging() {
    let sample = PerformanceSample {
        main: ProcessUsage::new(4.0, 90.0),
        renderer: ProcessUsage::new(10.0, 180.0),
        timestamp: fixed_time(),
    };
    let event = Event::from(sample.clone());
    assert_eq!(event.topic(), Topic::PerformanceSample);
    assert_eq!(event.timestamp(), fixed_time());

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["topic"], "performance-sample");
    assert_eq!(value["data"]["main"]["memory"], 90.0);
}

#[test]
fn test_log_level_all_is_complete() {
    let names: Vec<&str> = LogLevel::ALL.iter().map(|l| l.as_str()).collect();
    assert_eq!(names, vec!["debug", "log", "info", "warn", "error"]);
}
