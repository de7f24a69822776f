//! HTTP/WebSocket transport for the inbox client.
//!
//! [`InboxApi`] wraps the backend REST surface, [`push`] runs the WebSocket
//! push loop, and [`spawn_runtime`] ties both to the command/event channels
//! defined in `inbox-core`.

pub mod api;
pub mod push;
pub mod runtime;

pub use api::{DEFAULT_BASE_URL, InboxApi};
pub use push::{decode_frame, run_push_loop};
pub use runtime::{InboxRuntimeHandle, RuntimeConfig, spawn_runtime};
