//! Line-delimited JSON IPC: request/response envelopes, the method router
//! and one handler module per method family.

mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
