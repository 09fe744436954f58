//! Streaming render subsystem.
//!
//! # Data Flow
//! ```text
//! User-Agent
//!     → classifier.rs (crawler or interactive → RenderMode)
//! RequestContext + RenderMode
//!     → supervisor.rs (readiness vs. deadline race)
//!         → engine.rs contract (events, body chunks, abort)
//!         → upstream.rs (default engine: upstream HTML server)
//!     → RenderOutcome (exactly one per render)
//! ```
//!
//! # Design Decisions
//! - Crawlers never see a partial document
//! - Browsers get the shell as early as possible
//! - The engine is injected; the supervisor owns all timing policy

pub mod classifier;
pub mod engine;
pub mod supervisor;
pub mod upstream;

pub use classifier::{BotClassifier, Classification, ModeSelector, PatternClassifier};
pub use engine::{
    RenderEngine, RenderError, RenderEvent, RenderHandle, RenderHead, RenderMode, RenderRequest,
    RenderSink,
};
pub use supervisor::{RenderOutcome, RenderSupervisor};
pub use upstream::UpstreamEngine;
