//! Render Gate Library
//!
//! Per-origin access control in front of a streaming HTML renderer.

pub mod access;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod render;

pub use config::GateConfig;
pub use http::GateServer;
pub use lifecycle::Shutdown;
