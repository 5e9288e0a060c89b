//! Public URL resolution
//!
//! Twilio must reach this server over HTTPS. Either `PUBLIC_URL` is set
//! explicitly, or a locally running ngrok tunnel is auto-detected through
//! its inspection API.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use callprobe_config::Settings;

const NGROK_API: &str = "http://localhost:4040/api/tunnels";

#[derive(Debug, Deserialize)]
struct TunnelList {
    tunnels: Vec<Tunnel>,
}

#[derive(Debug, Deserialize)]
struct Tunnel {
    proto: String,
    public_url: String,
}

fn first_https(list: TunnelList) -> Option<String> {
    list.tunnels
        .into_iter()
        .find(|t| t.proto == "https")
        .map(|t| t.public_url)
}

async fn detect_ngrok() -> Option<String> {
    let response = reqwest::Client::new()
        .get(NGROK_API)
        .timeout(Duration::from_secs(2))
        .send()
        .await
        .ok()?;
    let list: TunnelList = response.json().await.ok()?;
    first_https(list)
}

/// Explicit `public_url` setting, falling back to ngrok auto-detection.
pub async fn resolve_public_url(settings: &Settings) -> Option<String> {
    if let Some(url) = &settings.server.public_url {
        if !url.is_empty() {
            return Some(url.clone());
        }
    }
    debug!("no public URL configured, probing ngrok");
    detect_ngrok().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picks_the_https_tunnel() {
        let list: TunnelList = serde_json::from_str(
            r#"{
                "tunnels": [
                    { "proto": "http", "public_url": "http://abc.ngrok.app" },
                    { "proto": "https", "public_url": "https://abc.ngrok.app" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            first_https(list).as_deref(),
            Some("https://abc.ngrok.app")
        );
    }

    #[test]
    fn test_no_https_tunnel() {
        let list: TunnelList =
            serde_json::from_str(r#"{ "tunnels": [] }"#).unwrap();
        assert_eq!(first_https(list), None);
    }
}
