//! Type-safe wrappers around [`ResourceClient`](crate::framework::ResourceClient).

pub mod entity_client;
pub mod report_client;
pub mod workspace_client;

pub use entity_client::*;
pub use report_client::*;
pub use workspace_client::*;
