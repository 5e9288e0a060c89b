//! callprobe server
//!
//! Serves the Twilio Media Streams WebSocket that carries live call audio
//! and the REST surface used to trigger and inspect test calls.

pub mod http;
pub mod metrics;
pub mod public_url;
pub mod state;
pub mod ws;

pub use http::create_router;
pub use public_url::resolve_public_url;
pub use state::AppState;
