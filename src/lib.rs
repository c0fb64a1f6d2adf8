//! # Resource SDK
//!
//! > **A client-side SDK for a remote, hierarchical resource API.**
//!
//! The remote side exposes records arranged as a tree
//! (business → app → workspace → reports → charts, and so on). This crate gives
//! scripts typed handles over those records, a per-parent cache that lets them
//! be addressed by human-friendly aliases, and a scheduler that decides whether
//! a write is sent now or batched until a flush.
//!
//! ## Core Concepts
//!
//! ### Resources and caches
//! A [`Resource`](framework::Resource) is a cheap, cloneable handle to one remote
//! record. Children of one type under one parent live in a
//! [`ResourceCache`](framework::ResourceCache), indexed by id and by alias. With
//! caching enabled the same record is always the same handle, so changes made
//! through one reference are visible through every other.
//!
//! ### Immediate vs batched execution
//! The [`Scheduler`](framework::Scheduler) runs in one of two modes:
//! -   **Immediate**: every write runs when it is submitted.
//! -   **Batched**: writes are queued into an [`ExecutionContext`](framework::ExecutionContext)
//!     and run concurrently on the next flush. Two writes to the same slot in one
//!     batch are a [`ConflictError`](framework::ConflictError). Finalizers (for
//!     example a dashboard relayout) run once, after every queued write settled.
//!
//! Reads always flush first, so they observe every write issued before them.
//!
//! ### Mocking
//! [`MockTransport`](framework::mock::MockTransport) stands in for the remote
//! API in tests and in the demo binary.
//!
//! ## Module Tour
//!
//! ### 1. The Engine ([`framework`])
//! Generic plumbing: resources, caches, the scheduler, the transport contract
//! and the error types.
//!
//! ### 2. The Model ([`model`])
//! Typed wrappers for each resource type and the report variant registry.
//!
//! ### 3. The Interface ([`clients`])
//! Domain clients ([`WorkspaceClient`](clients::WorkspaceClient),
//! [`ReportClient`](clients::ReportClient)) wrapping the generic
//! [`ResourceClient`](framework::ResourceClient).
//!
//! ### 4. The Orchestrator ([`lifecycle`])
//! [`Session`](lifecycle::Session) wires everything together;
//! [`SdkConfig`](lifecycle::SdkConfig) and tracing setup live here too.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the demo with info logs
//! RUST_LOG=info cargo run
//!
//! # Run the tests
//! cargo test
//! ```

pub mod clients;
pub mod framework;
pub mod lifecycle;
pub mod model;
