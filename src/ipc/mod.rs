//! JSON-lines protocol: request types, shared state, dispatch by method
//! family.

mod handlers;
mod helpers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
