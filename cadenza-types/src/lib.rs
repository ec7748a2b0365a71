//! # cadenza-types
//!
//! Shared type definitions for the Cadenza composition editor.
//! This crate holds the entity schemas, the node-type catalog, change entries
//! and the pure reducers that fold them into a change summary. It is used by
//! both cadenza-core (model store, change log, dispatch) and cadenza-audio
//! (live audio mirror).

pub mod catalog;
pub mod change;
pub mod reduce;
pub mod schema;
pub mod snapshot;
pub mod state;
pub mod summary;

pub use catalog::{NodeGroup, NodeType, NodeTypeSpec, PropertySpec};
pub use change::{ChangeEntry, ChangeKind};
pub use schema::{SchemaError, Validate};
pub use snapshot::{CompositionSnapshot, LoadedComposition};
pub use summary::{ChangeSummary, Pending};

// Re-export all state types at crate root for convenience
pub use state::*;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub fn new(id: u64) -> Self {
                Self(id)
            }
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Stable external key of a composition (assigned by the storage service).
    CompositionId
);
entity_id!(
    /// Client-generated identifier of an audio node, stable for the node's lifetime.
    NodeId
);
entity_id!(
    /// Identifier of a connection between two node sockets.
    EdgeId
);
entity_id!(
    /// Identifier of a music layer (a lane of keys).
    LayerId
);
entity_id!(
    /// Identifier of a single scheduled note event.
    KeyId
);
