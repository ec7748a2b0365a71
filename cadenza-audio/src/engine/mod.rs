pub mod backend;
pub mod node_registry;

pub use backend::{
    AudioBackend, BackendError, BackendResult, NoteEvent, NullBackend, SharedTestBackend,
    TestBackend, TestOp, UnitId,
};
pub use node_registry::{LiveConnection, LiveUnit, NodeRegistry};
