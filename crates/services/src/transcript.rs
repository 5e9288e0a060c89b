//! File-based transcript persistence
//!
//! Each call is written twice under `transcripts/<scenario_id>/`: a
//! machine-readable JSON document and a human-readable TXT rendering.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use callprobe_core::{CallTranscript, Error, Result, Speaker, TranscriptSink};

pub struct FileTranscriptSink {
    root: PathBuf,
}

impl FileTranscriptSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn speaker_label(speaker: Speaker) -> &'static str {
    match speaker {
        Speaker::Agent => "AI Agent",
        Speaker::Bot => "Patient Bot",
    }
}

fn render_text(transcript: &CallTranscript) -> String {
    let mut out = String::new();
    out.push_str(&format!("Call Transcript - {}\n", transcript.scenario_name));
    out.push_str(&format!(
        "Date     : {}\n",
        transcript.started_at.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!(
        "Duration : {:.1}s\n",
        transcript.duration_seconds()
    ));
    out.push_str(&format!("Scenario : {}\n", transcript.scenario_id));
    if let Some(reason) = transcript.end_reason {
        out.push_str(&format!("Ended    : {reason}\n"));
    }
    out.push_str(&"=".repeat(64));
    out.push_str("\n\n");

    for turn in &transcript.turns {
        out.push_str(&format!(
            "[{}]: {}\n\n",
            speaker_label(turn.speaker),
            turn.text
        ));
    }
    out
}

#[async_trait]
impl TranscriptSink for FileTranscriptSink {
    async fn persist(&self, transcript: &CallTranscript) -> Result<()> {
        let dir = self.root.join(&transcript.scenario_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Transcript(format!("failed to create {}: {e}", dir.display())))?;

        let base = format!(
            "{}_{}",
            transcript.started_at.format("%Y%m%d_%H%M%S"),
            transcript.scenario_id
        );

        let json_path = dir.join(format!("{base}.json"));
        let json = serde_json::to_string_pretty(transcript)
            .map_err(|e| Error::Transcript(format!("failed to serialize transcript: {e}")))?;
        tokio::fs::write(&json_path, json)
            .await
            .map_err(|e| Error::Transcript(format!("failed to write {}: {e}", json_path.display())))?;

        let txt_path = dir.join(format!("{base}.txt"));
        tokio::fs::write(&txt_path, render_text(transcript))
            .await
            .map_err(|e| Error::Transcript(format!("failed to write {}: {e}", txt_path.display())))?;

        info!(
            path = %json_path.display(),
            messages = transcript.turns.len(),
            duration_secs = transcript.duration_seconds(),
            "transcript saved"
        );
        Ok(())
    }
}
