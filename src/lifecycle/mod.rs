//! Session orchestration and lifecycle management.
//!
//! This module contains the infrastructure around the framework:
//!
//! - **Session management**: wiring connection, scheduler and clients; switching workspaces; shutdown
//! - **Configuration**: defaults, TOML file, environment overrides
//! - **Observability setup**: initializing tracing and logging
//!
//! # Main Components
//!
//! - [`Session`] - the per-session orchestrator
//! - [`SdkConfig`] - session configuration
//! - [`setup_tracing`] - initializes the tracing/logging infrastructure

pub mod config;
pub mod session;
pub mod tracing;

pub use self::config::*;
pub use self::session::*;
pub use self::tracing::*;
