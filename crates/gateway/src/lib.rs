//! Gateway components: hosted browser sessions and the HTTP/SSE surface.

pub mod request;
pub mod server;
pub mod session;

/// Chat request body.
pub use request::ChatRequest;
/// axum router, shared state and serve loop.
pub use server::{AppState, router, serve};
/// Hosted browser provider interface and the Steel client.
pub use session::{BrowserProvider, ConnectedPage, SteelClient};
