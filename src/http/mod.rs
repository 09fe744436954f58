//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request-id / trace / timeout layers)
//!     → request.rs (immutable RequestContext snapshot)
//!     → access control → render supervision
//!     → response.rs (redirect, forbidden, streamed HTML, error page)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestContext, X_REQUEST_ID};
pub use server::{AppState, Collaborators, GateServer, GateService, SetupError};
