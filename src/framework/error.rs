//! # SDK Errors
//!
//! This module defines the error taxonomy shared by the cache, the scheduler and
//! the domain clients. Each layer has its own `thiserror` enum, and [`SdkError`]
//! composes them with `#[from]` so that `?` works across layer boundaries.
//!
//! A lookup that finds nothing is **not** an error: `get` returns `Ok(None)`.
//! Only callers that insist on a value (see
//! [`ResourceClient::require_child`](crate::framework::ResourceClient::require_child))
//! turn absence into [`SdkError::NotFound`].

use crate::framework::context::ConflictKey;
use crate::framework::transport::Method;
use std::path::PathBuf;
use uuid::Uuid;

/// Result type alias used by every fallible SDK operation.
pub type SdkResult<T> = Result<T, SdkError>;

/// Errors raised by a [`ResourceCache`](crate::framework::ResourceCache).
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CacheError {
    /// The alias is already registered in a cache running in cache mode.
    #[error("{resource_type} with alias {alias} already exists")]
    AliasExists { resource_type: String, alias: String },

    /// The identifier is already cached; re-adding would break the collection.
    #[error("{resource_type} {id} is already cached")]
    AlreadyCached { resource_type: String, id: Uuid },

    /// Deletion was requested by explicit identifier but nothing matched.
    #[error("{resource_type} {id} not found")]
    NotFound { resource_type: String, id: Uuid },
}

/// Errors raised by the [`Scheduler`](crate::framework::Scheduler) while queueing.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConflictError {
    /// Two operations in one pending batch target the same remote slot.
    /// The whole batch has been discarded.
    #[error("conflicting operations on {key}: pending batch of {discarded} operation(s) aborted")]
    DuplicateKey { key: ConflictKey, discarded: usize },
}

/// A failed call to the remote API, as reported by the [`Transport`](crate::framework::Transport).
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
#[error("{method} {path} failed with status {status}: {message}")]
pub struct TransportError {
    pub method: Method,
    pub path: String,
    pub status: u16,
    pub message: String,
}

impl TransportError {
    pub fn new(method: Method, path: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            status,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// All errors that can occur in the SDK.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `resolve` refused to create a record without its mandatory fields.
    #[error("cannot create {resource_type}: missing mandatory field(s) {fields:?}")]
    MissingFields {
        resource_type: String,
        fields: Vec<String>,
    },

    /// A caller required a resource that does not exist.
    #[error("{resource_type} {key} not found")]
    NotFound { resource_type: String, key: String },

    /// The API was called in a way that can never succeed.
    #[error("usage error: {0}")]
    Usage(String),

    #[error("{parent} does not declare child type {child}")]
    UnknownChild { parent: String, child: String },

    #[error("unknown report type: {0}")]
    UnknownReportType(String),

    /// The remote answered with a body the SDK cannot interpret.
    #[error("malformed response from {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl SdkError {
    pub fn decode(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn usage(reason: impl Into<String>) -> Self {
        Self::Usage(reason.into())
    }

    /// True when the remote reported the addressed record as missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_not_found(),
            Self::NotFound { .. } | Self::Cache(CacheError::NotFound { .. }) => true,
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
