//! Concrete resource types implementing [`ResourceEntity`](crate::framework::ResourceEntity).
//!
//! ```text
//! Business
//!  └── App            (alias: name)
//!       └── Workspace (alias: name)
//!            ├── MenuPath (alias: path)
//!            ├── Dataset  (alias: name)
//!            └── Report   (alias: name, variant by `reportType`)
//!                 └── Chart (alias: (path, tab, order))
//! ```
//!
//! Each type is a thin wrapper around a [`Resource`](crate::framework::Resource)
//! handle; field and child-cache accessors are generated by [`resource_entity!`].

use crate::framework::{SdkError, SdkResult};
use serde::Serialize;
use serde_json::{Map, Value};

/// Declares a typed wrapper around a `Resource` bound to a static schema.
///
/// ```ignore
/// resource_entity! {
///     Workspace => WORKSPACE {
///         fields { name: "name" }
///         children { menu_paths: MENU_PATH }
///     }
/// }
/// ```
///
/// generates `Workspace::name()`, `Workspace::set_name(..)` and
/// `Workspace::menu_paths_cache()`.
macro_rules! resource_entity {
    (
        $(#[$meta:meta])*
        $name:ident => $schema:ident {
            fields { $($field:ident : $key:literal),* $(,)? }
            children { $($child:ident : $child_schema:ident),* $(,)? }
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        pub struct $name($crate::framework::Resource);

        impl $crate::framework::ResourceEntity for $name {
            fn schema() -> &'static $crate::framework::ResourceSchema {
                &$schema
            }

            fn from_resource(resource: $crate::framework::Resource) -> $crate::framework::SdkResult<Self> {
                $crate::model::expect_type(&resource, &$schema)?;
                Ok(Self(resource))
            }

            fn resource(&self) -> &$crate::framework::Resource {
                &self.0
            }
        }

        impl $name {
            $(
                pub fn $field(&self) -> Option<String> {
                    self.0.get_str($key)
                }

                paste::paste! {
                    pub fn [<set_ $field>](&self, value: impl Into<serde_json::Value>) {
                        self.0.set($key, value)
                    }
                }
            )*

            $(
                paste::paste! {
                    pub fn [<$child _cache>](&self) -> $crate::framework::SdkResult<$crate::framework::ResourceCache> {
                        self.0.children(&$child_schema)
                    }
                }
            )*
        }
    };
}

pub mod hierarchy;
pub mod report;
pub mod schema;

pub use hierarchy::*;
pub use report::*;
pub use schema::*;

pub(crate) fn expect_type(
    resource: &crate::framework::Resource,
    schema: &crate::framework::ResourceSchema,
) -> SdkResult<()> {
    if resource.resource_type() == schema.resource_type {
        Ok(())
    } else {
        Err(SdkError::usage(format!(
            "expected a {}, got a {}",
            schema.resource_type,
            resource.resource_type()
        )))
    }
}

/// Serializes a create/update DTO into record fields. `None` fields are skipped
/// by the DTOs themselves.
pub fn to_params<T: Serialize>(value: &T) -> SdkResult<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(SdkError::usage(format!(
            "record fields must serialize to an object, got {}",
            other
        ))),
    }
}
