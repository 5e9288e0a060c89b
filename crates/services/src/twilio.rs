//! Twilio call control
//!
//! Places outbound calls whose TwiML bridges the answered call onto our
//! Media Streams WebSocket, fetches call status, and hangs calls up.
//! Hangup is best effort; callers log failures and move on.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use callprobe_core::{CallControl, Error, Result};

const API_BASE: &str = "https://api.twilio.com";
/// Seconds Twilio waits for the callee to answer
const ANSWER_TIMEOUT_SECS: u32 = 30;

pub struct TwilioCallControl {
    account_sid: String,
    auth_token: String,
    from_number: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    status: String,
}

/// TwiML connecting the answered call to the media-stream endpoint, with
/// the scenario id passed through as a custom parameter.
fn stream_twiml(public_url: &str, scenario_id: &str) -> String {
    let host = public_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    format!(
        "<Response><Connect>\
         <Stream url=\"wss://{host}/media-stream\">\
         <Parameter name=\"scenario_id\" value=\"{scenario_id}\"/>\
         </Stream>\
         </Connect></Response>"
    )
}

impl TwilioCallControl {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::CallControl(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
            http,
        })
    }

    fn calls_url(&self) -> String {
        format!(
            "{API_BASE}/2010-04-01/Accounts/{}/Calls.json",
            self.account_sid
        )
    }

    fn call_url(&self, call_sid: &str) -> String {
        format!(
            "{API_BASE}/2010-04-01/Accounts/{}/Calls/{call_sid}.json",
            self.account_sid
        )
    }

    /// Place an outbound call to the target number. Returns the call SID.
    pub async fn make_call(
        &self,
        public_url: &str,
        scenario_id: &str,
        to: &str,
        max_duration_secs: u32,
    ) -> Result<String> {
        let twiml = stream_twiml(public_url, scenario_id);
        info!(to, scenario_id, "placing call");

        let params: Vec<(&str, String)> = vec![
            ("To", to.to_string()),
            ("From", self.from_number.clone()),
            ("Twiml", twiml),
            ("Timeout", ANSWER_TIMEOUT_SECS.to_string()),
            ("TimeLimit", max_duration_secs.to_string()),
            ("Record", "true".to_string()),
            ("RecordingChannels", "dual".to_string()),
            ("StatusCallback", format!("{public_url}/call-status")),
            ("StatusCallbackEvent", "completed".to_string()),
        ];

        let call: CallResource = self
            .http
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::CallControl(format!("call request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::CallControl(format!("call request rejected: {e}")))?
            .json()
            .await
            .map_err(|e| Error::CallControl(format!("unparseable call resource: {e}")))?;

        info!(call_sid = %call.sid, "call created");
        Ok(call.sid)
    }

    /// Fetch the current status of a call
    pub async fn call_status(&self, call_sid: &str) -> Result<String> {
        let call: CallResource = self
            .http
            .get(self.call_url(call_sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| Error::CallControl(format!("status request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::CallControl(format!("status request rejected: {e}")))?
            .json()
            .await
            .map_err(|e| Error::CallControl(format!("unparseable call resource: {e}")))?;

        Ok(call.status)
    }
}

#[async_trait]
impl CallControl for TwilioCallControl {
    async fn terminate(&self, call_sid: &str) -> Result<()> {
        debug!(call_sid, "requesting hangup");
        self.http
            .post(self.call_url(call_sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Status", "completed")])
            .send()
            .await
            .map_err(|e| Error::CallControl(format!("hangup request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::CallControl(format!("hangup request rejected: {e}")))?;
        info!(call_sid, "call hung up");
        Ok(())
    }
}
