//! Shared application state

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use callprobe_config::Settings;
use callprobe_core::Result;
use callprobe_pipeline::Services;
use callprobe_services::{
    DeepgramSpeech, DeepgramTranscriber, FileTranscriptSink, OpenAiResponder, TwilioCallControl,
};

/// Everything the handlers need: settings, the collaborator registry, and
/// the metrics recorder. Built once at startup; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub public_url: Arc<String>,
    pub services: Arc<Services>,
    pub twilio: Arc<TwilioCallControl>,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(
        settings: Settings,
        public_url: String,
        metrics: PrometheusHandle,
    ) -> Result<Self> {
        let twilio = Arc::new(TwilioCallControl::new(
            &settings.twilio.account_sid,
            &settings.twilio.auth_token,
            &settings.twilio.from_number,
        )?);

        let services = Arc::new(Services {
            transcriber: Arc::new(DeepgramTranscriber::new(
                &settings.deepgram.api_key,
                &settings.deepgram.stt_model,
            )),
            responder: Arc::new(OpenAiResponder::new(
                &settings.openai.api_key,
                &settings.openai.model,
                settings.openai.max_tokens,
                settings.openai.temperature,
            )?),
            synthesizer: Arc::new(DeepgramSpeech::new(&settings.deepgram.api_key)?),
            call_control: twilio.clone(),
            transcripts: Arc::new(FileTranscriptSink::new(&settings.call.transcripts_dir)),
        });

        Ok(Self {
            settings: Arc::new(settings),
            public_url: Arc::new(public_url),
            services,
            twilio,
            metrics,
        })
    }
}
