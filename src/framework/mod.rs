//! Generic remote-resource framework.
//!
//! This module provides the building blocks every concrete resource type is
//! built on: typed handles over remote records, per-parent caches with alias
//! resolution, and the dual-mode scheduler that decides when remote writes
//! happen.
//!
//! # Main Components
//!
//! - [`Resource`] / [`ResourceEntity`] - handle to one remote record, and the trait typed wrappers implement
//! - [`ResourceCache`] - the children of one type under one parent, indexed by id and alias
//! - [`Scheduler`] / [`ExecutionContext`] - immediate vs batched execution, conflict keys, finalizers
//! - [`ResourceClient`] - the child verbs, routed through the scheduler
//! - [`Transport`] - the contract a host application implements to reach the remote API
//! - [`SdkError`] - common error types
//!
//! # Testing
//!
//! See the [`mock`] module for an in-memory transport.

pub mod cache;
pub mod client;
pub mod context;
pub mod error;
pub mod mock;
pub mod resource;
pub mod scheduler;
pub mod transport;

pub use cache::{AddRequest, Lookup, ResourceCache};
pub use client::ResourceClient;
pub use context::{ConflictKey, ExecutionContext, Job};
pub use error::{CacheError, ConflictError, SdkError, SdkResult, TransportError};
pub use resource::{Alias, AliasField, Resource, ResourceEntity, ResourceSchema};
pub use scheduler::{Call, Outcome, Scheduler};
pub use transport::{Connection, Method, Transport};
