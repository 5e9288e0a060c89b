//! Deepgram streaming text-to-speech
//!
//! POSTs to `/v1/speak` and yields the raw μ-law byte stream as it
//! arrives, so playback can start before synthesis finishes.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::debug;

use callprobe_core::{Error, Result, SpeechSynthesizer};

const SPEAK_URL: &str = "https://api.deepgram.com/v1/speak";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Streaming TTS driver backed by Deepgram's speak API
pub struct DeepgramSpeech {
    api_key: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

impl DeepgramSpeech {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Synthesis(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            http,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for DeepgramSpeech {
    async fn synthesize_stream(
        &self,
        text: &str,
        voice: &str,
    ) -> Result<BoxStream<'static, Result<Vec<u8>>>> {
        debug!(voice, chars = text.len(), "starting synthesis");

        let response = self
            .http
            .post(SPEAK_URL)
            .query(&[
                ("model", voice),
                ("encoding", "mulaw"),
                ("sample_rate", "8000"),
                ("container", "none"),
            ])
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&SpeakRequest { text })
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("speak request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Synthesis(format!("speak request rejected: {e}")))?;

        let stream = response
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(|e| Error::Synthesis(format!("speak stream failed: {e}")))
            .boxed();

        Ok(stream)
    }
}
