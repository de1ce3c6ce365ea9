//! Row-change subscription over Supabase Realtime (Phoenix Channels v1).
//!
//! Each subscription owns one WebSocket. The socket task never reconnects:
//! any failure ends the subscription with an error event and the caller's
//! health policy decides when to try again.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::status::PresenceFilter;
use crate::store::{ChangeFeed, ChangeSubscription, FeedEvent};

use super::handler::{classify, Inbound};
use super::types::{PhoenixMessage, SupabaseConfig};

const SUBSCRIPTION_BUFFER: usize = 256;

/// Monotonically increasing ref counter for Phoenix messages.
static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

/// [`ChangeFeed`] backed by Supabase Realtime `postgres_changes`.
#[derive(Debug, Clone)]
pub struct SupabaseChangeFeed {
    config: SupabaseConfig,
}

impl SupabaseChangeFeed {
    pub fn new(config: SupabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ChangeFeed for SupabaseChangeFeed {
    async fn subscribe_changes(
        &self,
        filter: &PresenceFilter,
    ) -> Result<ChangeSubscription, TransportError> {
        if self.config.project_ref.is_empty() {
            return Err(TransportError::Refused("no Supabase project configured".into()));
        }
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        tokio::spawn(socket_task(
            self.config.clone(),
            filter.clone(),
            tx,
            cancel.clone(),
        ));
        Ok(ChangeSubscription::new(rx, cancel))
    }
}

// ---------------------------------------------------------------------------
// Socket task
// ---------------------------------------------------------------------------

async fn socket_task(
    config: SupabaseConfig,
    filter: PresenceFilter,
    tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
) {
    let url = config.ws_url();
    info!(url = %url.split('?').next().unwrap_or(""), "connecting to Supabase Realtime");

    let connected = tokio::select! {
        _ = cancel.cancelled() => return,
        r = tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(url.as_str())) => r,
    };
    let ws = match connected {
        Ok(Ok((ws, _))) => ws,
        Ok(Err(e)) => {
            warn!(error = %e, "failed to connect to Supabase Realtime");
            let _ = tx.send(FeedEvent::Error(format!("connect failed: {e}"))).await;
            return;
        }
        Err(_elapsed) => {
            warn!("Supabase Realtime connect timed out");
            let _ = tx.send(FeedEvent::Error("connect timed out".into())).await;
            return;
        }
    };

    let (mut write, mut read) = ws.split();
    let topic = config.topic();
    let join_ref = next_ref();
    let join = PhoenixMessage::new(&topic, "phx_join", config.join_payload(&filter), join_ref.clone());
    if let Err(e) = send_message(&mut write, &join).await {
        let _ = tx.send(FeedEvent::Error(format!("join send failed: {e}"))).await;
        return;
    }

    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;
    let mut pending_heartbeat: Option<String> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let leave = PhoenixMessage::new(&topic, "phx_leave", serde_json::json!({}), next_ref());
                let _ = send_message(&mut write, &leave).await;
                let _ = write.send(WsMessage::Close(None)).await;
                debug!(%topic, "subscription torn down");
                return;
            }
            _ = heartbeat.tick() => {
                if pending_heartbeat.is_some() {
                    warn!("Realtime heartbeat unanswered");
                    let _ = tx.send(FeedEvent::Timeout).await;
                    break;
                }
                let r = next_ref();
                let beat = PhoenixMessage::new("phoenix", "heartbeat", serde_json::json!({}), r.clone());
                if let Err(e) = send_message(&mut write, &beat).await {
                    let _ = tx.send(FeedEvent::Error(format!("heartbeat send failed: {e}"))).await;
                    break;
                }
                pending_heartbeat = Some(r);
            }
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let Ok(msg) = serde_json::from_str::<PhoenixMessage>(&text) else {
                        debug!(text = %text.as_str(), "unrecognized message from Supabase");
                        continue;
                    };
                    match classify(&msg, &topic, &join_ref) {
                        Inbound::HeartbeatReply(r) => {
                            if r.is_some() && r == pending_heartbeat {
                                pending_heartbeat = None;
                            }
                        }
                        Inbound::Ignored => {}
                        Inbound::Feed(event) => {
                            let terminal = matches!(event, FeedEvent::Error(_));
                            if tx.send(event).await.is_err() || terminal {
                                break;
                            }
                        }
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Supabase Realtime closed connection");
                    let _ = tx.send(FeedEvent::Error("connection closed".into())).await;
                    break;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    let _ = tx.send(FeedEvent::Error(e.to_string())).await;
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    let _ = write.send(WsMessage::Close(None)).await;
}

async fn send_message<S>(write: &mut S, msg: &PhoenixMessage) -> Result<(), String>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    write
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_are_unique() {
        let a = next_ref();
        let b = next_ref();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn missing_project_is_refused() {
        let feed = SupabaseChangeFeed::new(SupabaseConfig::default());
        let err = feed.subscribe_changes(&PresenceFilter::All).await.unwrap_err();
        assert!(matches!(err, TransportError::Refused(_)));
    }
}
