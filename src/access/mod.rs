//! Per-origin access control.
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → credential.rs (query token, session cookie)
//!     → decision.rs (state machine, sequential authority calls)
//!         → authority.rs (public check, credential validation)
//!     → AccessDecision (exactly one per request)
//! ```
//!
//! # Design Decisions
//! - Asset paths and non-production deployments never reach the authority
//! - Public status is checked first and always wins
//! - Every authority failure has an explicit fallback transition
//! - Nothing is cached between requests

pub mod authority;
pub mod credential;
pub mod decision;

pub use authority::{AuthError, Authority, HttpAuthority, Validation};
pub use credential::{Credential, Credentials};
pub use decision::{AccessDecision, AccessGate, AccessSettings, DegradeReason};
