//! Deepgram streaming speech-to-text over WebSocket
//!
//! One `/v1/listen` connection per call. Inbound μ-law audio is forwarded
//! as binary frames; `Results` and `UtteranceEnd` messages are translated
//! into the engine's transcription events. A periodic `KeepAlive` message
//! prevents Deepgram from dropping the connection during long silences.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use callprobe_core::{Error, Result, SttSessionConfig, SttStream, Transcriber, TranscriptEvent};

const LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(8);

/// Streaming STT driver backed by Deepgram's listen API
pub struct DeepgramTranscriber {
    api_key: String,
    model: String,
}

impl DeepgramTranscriber {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

fn build_listen_url(model: &str, config: &SttSessionConfig) -> Result<Url> {
    let mut url =
        Url::parse(LISTEN_URL).map_err(|e| Error::Transcription(format!("invalid URL: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("model", model);
        query.append_pair("encoding", "mulaw");
        query.append_pair("sample_rate", &config.sample_rate.to_string());
        query.append_pair("channels", "1");
        query.append_pair("punctuate", "true");
        query.append_pair("interim_results", "false");
        query.append_pair("endpointing", &config.endpointing_ms.to_string());
        query.append_pair("utterance_end_ms", &config.utterance_end_ms.to_string());
        query.append_pair("vad_events", "true");
    }
    Ok(url)
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    async fn open(
        &self,
        config: SttSessionConfig,
        events: mpsc::Sender<TranscriptEvent>,
    ) -> Result<Box<dyn SttStream>> {
        let url = build_listen_url(&self.model, &config)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Transcription(format!("invalid request: {e}")))?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.api_key))
            .map_err(|e| Error::Transcription(format!("invalid API key: {e}")))?;
        request.headers_mut().insert("Authorization", auth);

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| Error::Transcription(format!("failed to connect: {e}")))?;
        info!(model = %self.model, "deepgram STT connected");

        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        tokio::spawn(drive_session(socket, audio_rx, events, shutdown.clone()));

        Ok(Box::new(DeepgramSttSession {
            outgoing: audio_tx,
            shutdown,
        }))
    }
}

struct DeepgramSttSession {
    outgoing: mpsc::UnboundedSender<Message>,
    shutdown: CancellationToken,
}

#[async_trait]
impl SttStream for DeepgramSttSession {
    async fn push_audio(&self, audio: &[u8]) -> Result<()> {
        self.outgoing
            .send(Message::Binary(audio.to_vec()))
            .map_err(|_| Error::ChannelClosed)
    }

    async fn close(&self) {
        let _ = self
            .outgoing
            .send(Message::Text(r#"{"type":"CloseStream"}"#.to_string()));
        self.shutdown.cancel();
        info!("deepgram STT closed");
    }
}

async fn drive_session(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    events: mpsc::Sender<TranscriptEvent>,
    shutdown: CancellationToken,
) {
    let (mut sink, mut stream) = socket.split();
    let mut keepalive = interval(KEEPALIVE_INTERVAL);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            Some(message) = outgoing.recv() => {
                if let Err(e) = sink.send(message).await {
                    warn!(error = %e, "failed to send to deepgram");
                    break;
                }
            }

            _ = keepalive.tick() => {
                let ping = Message::Text(r#"{"type":"KeepAlive"}"#.to_string());
                if sink.send(ping).await.is_err() {
                    break;
                }
            }

            message = stream.next() => match message {
                None => {
                    info!("deepgram STT stream ended");
                    break;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "deepgram STT receive error");
                    break;
                }
                Some(Ok(Message::Text(text))) => {
                    if handle_message(&text, &events).await.is_err() {
                        // engine side went away; nothing left to deliver to
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "deepgram STT socket closed");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    debug!("deepgram STT driver exiting");
}

/// Shape of Deepgram listen messages the driver cares about
#[derive(Debug, Deserialize)]
struct ListenMessage {
    #[serde(rename = "type")]
    message_type: String,
    channel: Option<ListenChannel>,
    is_final: Option<bool>,
    speech_final: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    transcript: String,
}

async fn handle_message(text: &str, events: &mpsc::Sender<TranscriptEvent>) -> Result<()> {
    let message: ListenMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "unparseable deepgram message");
            return Ok(());
        }
    };

    match message.message_type.as_str() {
        "Results" => {
            let transcript = message
                .channel
                .as_ref()
                .and_then(|c| c.alternatives.first())
                .map(|a| a.transcript.trim())
                .unwrap_or_default();

            if message.is_final.unwrap_or(false) && !transcript.is_empty() {
                events
                    .send(TranscriptEvent::PartialFinal(transcript.to_string()))
                    .await
                    .map_err(|_| Error::ChannelClosed)?;
            }
            if message.speech_final.unwrap_or(false) {
                events
                    .send(TranscriptEvent::TurnBoundary)
                    .await
                    .map_err(|_| Error::ChannelClosed)?;
            }
        }
        "UtteranceEnd" => {
            events
                .send(TranscriptEvent::TurnBoundary)
                .await
                .map_err(|_| Error::ChannelClosed)?;
        }
        "Metadata" | "SpeechStarted" => {}
        other => debug!(message_type = other, "unhandled deepgram message"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_url_parameters() {
        let url = build_listen_url("nova-2", &SttSessionConfig::default()).unwrap();
        let url = url.to_string();
        assert!(url.starts_with("wss://api.deepgram.com/v1/listen?"));
        assert!(url.contains("model=nova-2"));
        assert!(url.contains("encoding=mulaw"));
        assert!(url.contains("sample_rate=8000"));
        assert!(url.contains("interim_results=false"));
        assert!(url.contains("endpointing=300"));
        assert!(url.contains("utterance_end_ms=1200"));
    }

    #[tokio::test]
    async fn test_final_results_become_fragments() {
        let (tx, mut rx) = mpsc::channel(8);
        let json = r#"{
            "type": "Results",
            "channel": { "alternatives": [{ "transcript": "Hi I need an appointment", "confidence": 0.98 }] },
            "is_final": true,
            "speech_final": false
        }"#;

        handle_message(json, &tx).await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            TranscriptEvent::PartialFinal("Hi I need an appointment".into())
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_speech_final_also_ends_the_turn() {
        let (tx, mut rx) = mpsc::channel(8);
        let json = r#"{
            "type": "Results",
            "channel": { "alternatives": [{ "transcript": "thanks." }] },
            "is_final": true,
            "speech_final": true
        }"#;

        handle_message(json, &tx).await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            TranscriptEvent::PartialFinal("thanks.".into())
        );
        assert_eq!(rx.try_recv().unwrap(), TranscriptEvent::TurnBoundary);
    }

    #[tokio::test]
    async fn test_utterance_end_is_a_turn_boundary() {
        let (tx, mut rx) = mpsc::channel(8);
        handle_message(r#"{"type": "UtteranceEnd", "last_word_end": 3.1}"#, &tx)
            .await
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), TranscriptEvent::TurnBoundary);
    }

    #[tokio::test]
    async fn test_interim_and_empty_results_are_ignored() {
        let (tx, mut rx) = mpsc::channel(8);
        let interim = r#"{
            "type": "Results",
            "channel": { "alternatives": [{ "transcript": "partial words" }] },
            "is_final": false,
            "speech_final": false
        }"#;
        handle_message(interim, &tx).await.unwrap();

        let empty = r#"{
            "type": "Results",
            "channel": { "alternatives": [{ "transcript": "  " }] },
            "is_final": true,
            "speech_final": false
        }"#;
        handle_message(empty, &tx).await.unwrap();

        assert!(rx.try_recv().is_err());
    }
}
