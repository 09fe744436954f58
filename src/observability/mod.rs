//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!     → telemetry.rs (out-of-band diagnostic events, request-correlated)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Diagnostic sink (JSON POST per event)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through logs and telemetry alike
//! - Nothing here can fail or delay a request

pub mod logging;
pub mod metrics;
pub mod telemetry;

pub use telemetry::{EventKind, RequestTelemetry, Telemetry, TelemetryEvent};
