use async_trait::async_trait;
use clubfeed_schema::{
    JoinConfig, PhoenixFrame, PostgresChangePayload,
    realtime::{
        EVENT_CLOSE, EVENT_ERROR, EVENT_POSTGRES_CHANGES, EVENT_REPLY, EVENT_SYSTEM, PHOENIX_TOPIC,
    },
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, interval_at, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::{ChannelSignal, ChannelSpec, ChannelStatus, RealtimeTransport, Subscription};
use crate::error::BackendError;

const PROTOCOL_VSN: &str = "1.0.0";
const SIGNAL_BUFFER: usize = 256;
const JOIN_REF: &str = "1";

/// Phoenix-channel client for the hosted realtime service. Each subscription owns one socket.
#[derive(Clone)]
pub struct SupabaseRealtime {
    socket_url: Url,
    access_token: Arc<str>,
    heartbeat: Duration,
    join_timeout: Duration,
}

impl SupabaseRealtime {
    pub fn new(
        base_url: &Url,
        anon_key: &str,
        access_token: Option<&str>,
        heartbeat: Duration,
        join_timeout: Duration,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            socket_url: socket_url(base_url, anon_key)?,
            access_token: Arc::from(
                access_token
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .unwrap_or(anon_key),
            ),
            heartbeat,
            join_timeout,
        })
    }

    pub fn socket_url(&self) -> &Url {
        &self.socket_url
    }
}

/// `https://x.supabase.co` -> `wss://x.supabase.co/realtime/v1/websocket?apikey=..&vsn=1.0.0`.
fn socket_url(base_url: &Url, anon_key: &str) -> Result<Url, BackendError> {
    let mut url = base_url.join("realtime/v1/websocket")?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(BackendError::Protocol(format!(
                "unsupported realtime url scheme: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| BackendError::Protocol(format!("cannot switch url scheme to {scheme}")))?;
    url.query_pairs_mut()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", PROTOCOL_VSN);
    Ok(url)
}

#[async_trait]
impl RealtimeTransport for SupabaseRealtime {
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, BackendError> {
        let (ws, _resp) = connect_async(self.socket_url.as_str()).await?;
        let (mut sink, stream) = ws.split();

        let topic = format!("realtime:{}", spec.name);
        let config = JoinConfig::postgres_changes(spec.postgres_filters());
        let join = PhoenixFrame::join(&topic, &config, &self.access_token, JOIN_REF);
        sink.send(Message::Text(serde_json::to_string(&join)?))
            .await?;
        debug!(topic = %topic, "Realtime join sent");

        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        let (close_tx, close_rx) = oneshot::channel();

        tokio::spawn(run_channel(
            ChannelIo { sink, stream },
            topic,
            signal_tx,
            close_rx,
            self.heartbeat,
            self.join_timeout,
        ));

        Ok(Subscription::new(signal_rx, close_tx))
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct ChannelIo {
    sink: futures::stream::SplitSink<WsStream, Message>,
    stream: futures::stream::SplitStream<WsStream>,
}

/// What a single inbound frame means for the channel.
#[derive(Debug, PartialEq)]
enum FrameAction {
    Ignore,
    Emit(ChannelSignal),
    /// Emit then stop reading; the channel is gone.
    Finish(ChannelStatus),
}

fn interpret_frame(frame: PhoenixFrame, topic: &str, join_ref: &str) -> FrameAction {
    if frame.topic != topic {
        return FrameAction::Ignore;
    }

    match frame.event.as_str() {
        EVENT_REPLY => {
            if frame.reference.as_deref() != Some(join_ref) {
                return FrameAction::Ignore;
            }
            match frame.reply() {
                Some(reply) if reply.is_ok() => {
                    FrameAction::Emit(ChannelSignal::Status(ChannelStatus::Subscribed))
                }
                Some(reply) => FrameAction::Finish(ChannelStatus::ChannelError(
                    reason_of(&reply.response).unwrap_or_else(|| "join rejected".to_string()),
                )),
                None => FrameAction::Finish(ChannelStatus::ChannelError(
                    "malformed join reply".to_string(),
                )),
            }
        }
        EVENT_SYSTEM => {
            let failed = frame
                .payload
                .get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| s == "error");
            if failed {
                FrameAction::Finish(ChannelStatus::ChannelError(
                    reason_of(&frame.payload).unwrap_or_else(|| "system error".to_string()),
                ))
            } else {
                FrameAction::Ignore
            }
        }
        EVENT_POSTGRES_CHANGES => {
            let decoded = serde_json::from_value::<PostgresChangePayload>(frame.payload)
                .and_then(PostgresChangePayload::into_notification_change);
            match decoded {
                Ok(Some(change)) => FrameAction::Emit(ChannelSignal::Change(change)),
                Ok(None) => FrameAction::Ignore,
                Err(e) => {
                    warn!(topic, error = %e, "Dropping undecodable postgres change");
                    FrameAction::Ignore
                }
            }
        }
        EVENT_ERROR => FrameAction::Finish(ChannelStatus::ChannelError(
            reason_of(&frame.payload).unwrap_or_else(|| "channel crashed".to_string()),
        )),
        EVENT_CLOSE => FrameAction::Finish(ChannelStatus::Closed),
        _ => FrameAction::Ignore,
    }
}

fn is_heartbeat_reply(frame: &PhoenixFrame, pending: Option<&str>) -> bool {
    frame.topic == PHOENIX_TOPIC
        && frame.event == EVENT_REPLY
        && pending.is_some_and(|r| frame.reference.as_deref() == Some(r))
}

fn reason_of(payload: &Value) -> Option<String> {
    ["reason", "message"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

async fn run_channel(
    mut io: ChannelIo,
    topic: String,
    signals: mpsc::Sender<ChannelSignal>,
    mut close_rx: oneshot::Receiver<()>,
    heartbeat: Duration,
    join_timeout: Duration,
) {
    let mut heartbeat_tick = interval_at(Instant::now() + heartbeat, heartbeat);
    let join_deadline = sleep(join_timeout);
    tokio::pin!(join_deadline);
    let mut joined = false;
    let mut next_ref: u64 = 1;
    // Ref of the last heartbeat sent and not yet answered.
    let mut pending_heartbeat: Option<String> = None;

    let final_status = loop {
        tokio::select! {
            _ = &mut close_rx => {
                next_ref += 1;
                let leave = PhoenixFrame::leave(&topic, &next_ref.to_string());
                if let Ok(text) = serde_json::to_string(&leave) {
                    let _ = io.sink.send(Message::Text(text)).await;
                }
                let _ = io.sink.close().await;
                debug!(topic = %topic, "Realtime channel left");
                return;
            }
            () = &mut join_deadline, if !joined => {
                break ChannelStatus::TimedOut;
            }
            _ = heartbeat_tick.tick() => {
                if let Some(unanswered) = pending_heartbeat.take() {
                    warn!(topic = %topic, reference = %unanswered, "Heartbeat unanswered, dropping socket");
                    break ChannelStatus::ChannelError("heartbeat timeout".to_string());
                }
                next_ref += 1;
                let reference = next_ref.to_string();
                let beat = PhoenixFrame::heartbeat(&reference);
                let sent = match serde_json::to_string(&beat) {
                    Ok(text) => io.sink.send(Message::Text(text)).await.map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                if let Err(e) = sent {
                    break ChannelStatus::ChannelError(format!("heartbeat failed: {e}"));
                }
                pending_heartbeat = Some(reference);
            }
            msg = io.stream.next() => {
                let text = match msg {
                    None => break ChannelStatus::Closed,
                    Some(Err(e)) => break ChannelStatus::ChannelError(e.to_string()),
                    Some(Ok(Message::Close(_))) => break ChannelStatus::Closed,
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                };

                let frame: PhoenixFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Dropping malformed realtime frame");
                        continue;
                    }
                };

                if is_heartbeat_reply(&frame, pending_heartbeat.as_deref()) {
                    pending_heartbeat = None;
                    continue;
                }

                match interpret_frame(frame, &topic, JOIN_REF) {
                    FrameAction::Ignore => {}
                    FrameAction::Emit(signal) => {
                        if signal == ChannelSignal::Status(ChannelStatus::Subscribed) {
                            joined = true;
                            info!(topic = %topic, "Realtime channel joined");
                        }
                        if signals.send(signal).await.is_err() {
                            return;
                        }
                    }
                    FrameAction::Finish(status) => break status,
                }
            }
        }
    };

    debug!(topic = %topic, status = %final_status, "Realtime channel finished");
    let _ = signals.send(ChannelSignal::Status(final_status)).await;
    let _ = io.sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TOPIC: &str = "realtime:notifications-42";

    fn frame(event: &str, payload: Value, reference: Option<&str>) -> PhoenixFrame {
        PhoenixFrame {
            topic: TOPIC.to_string(),
            event: event.to_string(),
            payload,
            reference: reference.map(str::to_string),
            join_ref: None,
        }
    }

    #[test]
    fn socket_url_switches_to_websocket_scheme() {
        let base = Url::parse("https://demo.supabase.co").unwrap();
        let url = socket_url(&base, "anon").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://demo.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );

        let local = Url::parse("http://127.0.0.1:54321").unwrap();
        assert_eq!(socket_url(&local, "k").unwrap().scheme(), "ws");
    }

    #[test]
    fn ok_join_reply_means_subscribed() {
        let f = frame(EVENT_REPLY, json!({"status": "ok", "response": {}}), Some("1"));
        assert_eq!(
            interpret_frame(f, TOPIC, JOIN_REF),
            FrameAction::Emit(ChannelSignal::Status(ChannelStatus::Subscribed))
        );
    }

    #[test]
    fn replies_to_other_refs_are_ignored() {
        let f = frame(EVENT_REPLY, json!({"status": "ok", "response": {}}), Some("9"));
        assert_eq!(interpret_frame(f, TOPIC, JOIN_REF), FrameAction::Ignore);
    }

    #[test]
    fn heartbeat_reply_must_match_pending_ref() {
        let mut reply = frame(EVENT_REPLY, json!({"status": "ok", "response": {}}), Some("4"));
        reply.topic = PHOENIX_TOPIC.to_string();

        assert!(is_heartbeat_reply(&reply, Some("4")));
        assert!(!is_heartbeat_reply(&reply, Some("5")));
        assert!(!is_heartbeat_reply(&reply, None));
    }

    #[test]
    fn rejected_join_finishes_with_channel_error() {
        let f = frame(
            EVENT_REPLY,
            json!({"status": "error", "response": {"reason": "unauthorized"}}),
            Some("1"),
        );
        assert_eq!(
            interpret_frame(f, TOPIC, JOIN_REF),
            FrameAction::Finish(ChannelStatus::ChannelError("unauthorized".to_string()))
        );
    }

    #[test]
    fn system_error_and_close_end_the_channel() {
        let f = frame(
            EVENT_SYSTEM,
            json!({"status": "error", "message": "replication slot busy"}),
            None,
        );
        assert_eq!(
            interpret_frame(f, TOPIC, JOIN_REF),
            FrameAction::Finish(ChannelStatus::ChannelError(
                "replication slot busy".to_string()
            ))
        );

        let f = frame(EVENT_CLOSE, json!({}), None);
        assert_eq!(
            interpret_frame(f, TOPIC, JOIN_REF),
            FrameAction::Finish(ChannelStatus::Closed)
        );
    }

    #[test]
    fn frames_for_other_topics_are_ignored() {
        let mut f = frame(EVENT_CLOSE, json!({}), None);
        f.topic = "realtime:someone-else".to_string();
        assert_eq!(interpret_frame(f, TOPIC, JOIN_REF), FrameAction::Ignore);
    }
}
