//! Classification of incoming Phoenix messages into feed events.

use tracing::{debug, info, warn};

use crate::status::PresenceRecord;
use crate::store::FeedEvent;

use super::types::PhoenixMessage;

/// What the socket loop should do with one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Inbound {
    /// Forward to the subscriber.
    Feed(FeedEvent),
    /// Reply to a heartbeat with the given ref.
    HeartbeatReply(Option<String>),
    Ignored,
}

/// Interpret `msg`. `join_ref` is the ref of our `phx_join`, so its reply can
/// be told apart from other replies on the same topic.
pub(crate) fn classify(msg: &PhoenixMessage, topic: &str, join_ref: &str) -> Inbound {
    if msg.topic == "phoenix" {
        return match msg.event.as_str() {
            "phx_reply" => Inbound::HeartbeatReply(msg.msg_ref.clone()),
            _ => Inbound::Ignored,
        };
    }
    if msg.topic != topic {
        debug!(topic = %msg.topic, "message for unknown topic");
        return Inbound::Ignored;
    }

    match msg.event.as_str() {
        "phx_reply" if msg.msg_ref.as_deref() == Some(join_ref) => {
            match msg.payload.get("status").and_then(|s| s.as_str()) {
                Some("ok") => {
                    debug!(topic, "join acknowledged");
                    Inbound::Feed(FeedEvent::Acknowledged)
                }
                status => {
                    let reason = reply_reason(&msg.payload);
                    warn!(topic, status = ?status, %reason, "join rejected");
                    Inbound::Feed(FeedEvent::Error(format!("join rejected: {reason}")))
                }
            }
        }
        "phx_reply" => Inbound::Ignored,
        "phx_error" => {
            warn!(topic, "channel error");
            Inbound::Feed(FeedEvent::Error("channel error".to_string()))
        }
        "phx_close" => {
            info!(topic, "channel closed");
            Inbound::Feed(FeedEvent::Error("channel closed".to_string()))
        }
        "system" => {
            let status = msg.payload.get("status").and_then(|s| s.as_str());
            let message = msg
                .payload
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown system message");
            if status == Some("error") {
                warn!(topic, %message, "realtime system error");
                Inbound::Feed(FeedEvent::Error(message.to_string()))
            } else {
                debug!(topic, %message, "realtime system message");
                Inbound::Ignored
            }
        }
        "postgres_changes" => parse_change(&msg.payload),
        _ => {
            debug!(topic, event = %msg.event, "unhandled Phoenix event");
            Inbound::Ignored
        }
    }
}

fn reply_reason(payload: &serde_json::Value) -> String {
    payload
        .get("response")
        .and_then(|r| r.get("reason"))
        .and_then(|r| r.as_str())
        .unwrap_or("unknown error")
        .to_string()
}

/// Supabase sends row changes as
/// `{ "data": { "type": "UPDATE", "record": { .. }, .. }, "ids": [..] }`.
fn parse_change(payload: &serde_json::Value) -> Inbound {
    let data = &payload["data"];
    match data["type"].as_str() {
        Some("INSERT") | Some("UPDATE") => {}
        other => {
            debug!(kind = ?other, "ignoring row change");
            return Inbound::Ignored;
        }
    }
    match serde_json::from_value::<PresenceRecord>(data["record"].clone()) {
        Ok(record) => Inbound::Feed(FeedEvent::Change(record)),
        Err(e) => {
            warn!(error = %e, "undecodable presence row in change event");
            Inbound::Ignored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;
    use serde_json::json;

    const TOPIC: &str = "realtime:presence";

    fn is_error(inbound: &Inbound) -> bool {
        matches!(inbound, Inbound::Feed(FeedEvent::Error(_)))
    }

    fn msg(topic: &str, event: &str, payload: serde_json::Value, r: Option<&str>) -> PhoenixMessage {
        PhoenixMessage {
            topic: topic.into(),
            event: event.into(),
            payload,
            msg_ref: r.map(String::from),
        }
    }

    #[test]
    fn join_ok_acknowledges() {
        let m = msg(TOPIC, "phx_reply", json!({"status": "ok", "response": {}}), Some("3"));
        assert_eq!(classify(&m, TOPIC, "3"), Inbound::Feed(FeedEvent::Acknowledged));
    }

    #[test]
    fn reply_to_other_ref_is_ignored() {
        let m = msg(TOPIC, "phx_reply", json!({"status": "ok"}), Some("9"));
        assert_eq!(classify(&m, TOPIC, "3"), Inbound::Ignored);
    }

    #[test]
    fn join_error_is_terminal() {
        let m = msg(
            TOPIC,
            "phx_reply",
            json!({"status": "error", "response": {"reason": "unauthorized"}}),
            Some("3"),
        );
        let inbound = classify(&m, TOPIC, "3");
        assert_eq!(
            inbound,
            Inbound::Feed(FeedEvent::Error("join rejected: unauthorized".into()))
        );
        assert!(is_error(&inbound));
    }

    #[test]
    fn heartbeat_reply_carries_ref() {
        let m = msg("phoenix", "phx_reply", json!({"status": "ok"}), Some("12"));
        assert_eq!(
            classify(&m, TOPIC, "3"),
            Inbound::HeartbeatReply(Some("12".into()))
        );
    }

    #[test]
    fn channel_error_and_close() {
        for event in ["phx_error", "phx_close"] {
            let m = msg(TOPIC, event, json!({}), None);
            assert!(is_error(&classify(&m, TOPIC, "3")), "{event}");
        }
    }

    #[test]
    fn system_messages() {
        let ok = msg(TOPIC, "system", json!({"status": "ok", "message": "Subscribed"}), None);
        assert_eq!(classify(&ok, TOPIC, "3"), Inbound::Ignored);

        let err = msg(
            TOPIC,
            "system",
            json!({"status": "error", "message": "replication slot busy"}),
            None,
        );
        assert_eq!(
            classify(&err, TOPIC, "3"),
            Inbound::Feed(FeedEvent::Error("replication slot busy".into()))
        );
    }

    #[test]
    fn update_becomes_change() {
        let m = msg(
            TOPIC,
            "postgres_changes",
            json!({
                "data": {
                    "type": "UPDATE",
                    "schema": "public",
                    "table": "presence",
                    "record": {
                        "user_id": "u1",
                        "status": "away",
                        "last_seen": "2024-05-01T12:00:00+00:00"
                    },
                    "old_record": {"user_id": "u1"}
                },
                "ids": [1]
            }),
            None,
        );
        match classify(&m, TOPIC, "3") {
            Inbound::Feed(FeedEvent::Change(record)) => {
                assert_eq!(record.user_id, "u1");
                assert_eq!(record.status, Status::Away);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn delete_and_bad_rows_are_ignored() {
        let delete = msg(
            TOPIC,
            "postgres_changes",
            json!({"data": {"type": "DELETE", "old_record": {"user_id": "u1"}}}),
            None,
        );
        assert_eq!(classify(&delete, TOPIC, "3"), Inbound::Ignored);

        let bad = msg(
            TOPIC,
            "postgres_changes",
            json!({"data": {"type": "INSERT", "record": {"user_id": "u1", "status": "busy"}}}),
            None,
        );
        assert_eq!(classify(&bad, TOPIC, "3"), Inbound::Ignored);
    }

    #[test]
    fn foreign_topic_is_ignored() {
        let m = msg("realtime:other", "phx_error", json!({}), None);
        assert_eq!(classify(&m, TOPIC, "3"), Inbound::Ignored);
    }
}
