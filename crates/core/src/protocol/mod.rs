//! Socket wire contract between the capture client and the relay.
//!
//! Client → server: one binary message per frame, `name_len | name | blob`.
//! Server → client: one JSON text message per result, `{"event", "data"}`.

pub mod dispatcher;
pub mod envelope;
pub mod server_event;
