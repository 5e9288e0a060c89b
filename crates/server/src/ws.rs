//! Twilio Media Streams WebSocket endpoint
//!
//! Twilio connects here when an outbound call is answered. Event flow:
//! `connected` → `start` (carrying the stream/call SIDs and the scenario
//! id as a custom parameter) → `media` frames → `stop` or close. The
//! handler waits for `start`, resolves the scenario, then hands the socket
//! to a [`CallSession`]: a reader task translates incoming messages into
//! engine events, and a writer task serializes outbound `media`/`clear`
//! messages.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use callprobe_config::{all_scenarios, get_scenario, CallSettings, DeepgramSettings};
use callprobe_core::{Error, InboundEvent, MediaSink, Result, Scenario, SttSessionConfig};
use callprobe_pipeline::{CallSession, SessionTiming};

use crate::state::AppState;

const DEFAULT_SCENARIO: &str = "new_patient_scheduling";

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum TwilioInbound {
    Connected,
    Start { start: StartPayload },
    Media { media: MediaPayload },
    Stop,
    Mark,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StartPayload {
    #[serde(rename = "streamSid")]
    stream_sid: String,
    #[serde(rename = "callSid")]
    call_sid: Option<String>,
    #[serde(rename = "customParameters", default)]
    custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    payload: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum TwilioOutbound<'a> {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: &'a str,
        media: OutboundMedia,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: &'a str,
    },
}

#[derive(Debug, Serialize)]
struct OutboundMedia {
    payload: String,
}

pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("media stream connected");
    let (ws_tx, mut ws_rx) = socket.split();

    let Some(start) = wait_for_start(&mut ws_rx).await else {
        warn!("media stream ended before start event");
        return;
    };

    let scenario = resolve_scenario(&start);
    info!(
        stream_sid = %start.stream_sid,
        call_sid = ?start.call_sid,
        scenario = %scenario.id,
        "call started"
    );
    crate::metrics::record_session_started(&scenario.id);

    // Writer task: single owner of the socket's send half.
    let (out_tx, out_rx) = mpsc::channel::<Message>(256);
    let writer = tokio::spawn(write_loop(ws_tx, out_rx));

    let media = Arc::new(WsMediaSink {
        stream_sid: start.stream_sid.clone(),
        outgoing: out_tx,
    });

    // Reader task: translate the rest of the stream into engine events.
    let (in_tx, in_rx) = mpsc::channel::<InboundEvent>(256);
    let reader = tokio::spawn(read_loop(ws_rx, in_tx));

    let session = CallSession::new(
        Arc::clone(&scenario),
        start.stream_sid.clone(),
        start.call_sid.clone(),
        Arc::clone(&state.services),
        media,
        session_timing(&state.settings.call),
        stt_session_config(&state.settings.deepgram),
    );
    let ctx = session.context();
    session.run(in_rx).await;

    let transcript = ctx.finish_transcript();
    crate::metrics::record_session_finished(
        &scenario.id,
        &transcript
            .end_reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        transcript.duration_seconds(),
    );

    reader.abort();
    drop(writer);
}

/// Read until the start event arrives; Twilio sends `connected` first.
async fn wait_for_start(ws_rx: &mut SplitStream<WebSocket>) -> Option<StartPayload> {
    while let Some(message) = ws_rx.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        };
        match serde_json::from_str(&text) {
            Ok(TwilioInbound::Start { start }) => return Some(start),
            Ok(TwilioInbound::Connected) => debug!("transport protocol connected"),
            Ok(other) => debug!(?other, "unexpected pre-start event"),
            Err(e) => warn!(error = %e, "unparseable pre-start message"),
        }
    }
    None
}

fn resolve_scenario(start: &StartPayload) -> Arc<Scenario> {
    let requested = start
        .custom_parameters
        .get("scenario_id")
        .map(String::as_str)
        .unwrap_or(DEFAULT_SCENARIO);

    let scenario = get_scenario(requested).unwrap_or_else(|| {
        warn!(scenario = requested, "unknown scenario, using default");
        &all_scenarios()[0]
    });
    Arc::new(scenario.clone())
}

async fn read_loop(mut ws_rx: SplitStream<WebSocket>, events: mpsc::Sender<InboundEvent>) {
    while let Some(message) = ws_rx.next().await {
        let event = match message {
            Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                Ok(TwilioInbound::Media { media }) => match BASE64.decode(&media.payload) {
                    Ok(audio) => Some(InboundEvent::Media(audio)),
                    Err(e) => {
                        warn!(error = %e, "undecodable media payload");
                        None
                    }
                },
                Ok(TwilioInbound::Stop) => Some(InboundEvent::Stop),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "unparseable media stream message");
                    None
                }
            },
            Ok(Message::Close(frame)) => {
                Some(InboundEvent::Closed {
                    code: frame.map(|f| u16::from(f.code)),
                })
            }
            Ok(_) => None,
            Err(e) => Some(InboundEvent::Failed(e.to_string())),
        };

        if let Some(event) = event {
            let terminal = !matches!(event, InboundEvent::Media(_));
            if events.send(event).await.is_err() || terminal {
                break;
            }
        }
    }
    debug!("media stream reader exiting");
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outgoing: mpsc::Receiver<Message>,
) {
    while let Some(message) = outgoing.recv().await {
        if let Err(e) = ws_tx.send(message).await {
            error!(error = %e, "media stream write failed");
            break;
        }
    }
    debug!("media stream writer exiting");
}

/// Outbound transport surface handed to the engine
struct WsMediaSink {
    stream_sid: String,
    outgoing: mpsc::Sender<Message>,
}

impl WsMediaSink {
    async fn send(&self, message: &TwilioOutbound<'_>) -> Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| Error::Transport(format!("failed to encode message: {e}")))?;
        self.outgoing
            .send(Message::Text(json))
            .await
            .map_err(|_| Error::Transport("writer closed".to_string()))
    }
}

#[async_trait]
impl MediaSink for WsMediaSink {
    async fn send_audio(&self, frame: &[u8]) -> Result<()> {
        self.send(&TwilioOutbound::Media {
            stream_sid: &self.stream_sid,
            media: OutboundMedia {
                payload: BASE64.encode(frame),
            },
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.send(&TwilioOutbound::Clear {
            stream_sid: &self.stream_sid,
        })
        .await
    }
}

fn session_timing(call: &CallSettings) -> SessionTiming {
    SessionTiming {
        frame_duration: Duration::from_millis(call.frame_duration_ms),
        settle_delay: Duration::from_millis(call.settle_delay_ms),
        hangup_grace: Duration::from_millis(call.hangup_grace_ms),
        silence_threshold: Duration::from_millis(call.silence_threshold_ms),
        keepalive_poll: Duration::from_millis(call.keepalive_poll_ms),
        idle_frame_interval: Duration::from_millis(call.idle_frame_interval_ms),
    }
}

fn stt_session_config(deepgram: &DeepgramSettings) -> SttSessionConfig {
    SttSessionConfig {
        sample_rate: 8000,
        endpointing_ms: deepgram.endpointing_ms,
        utterance_end_ms: deepgram.utterance_end_ms,
    }
}
