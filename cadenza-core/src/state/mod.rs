pub mod composition;
pub mod selection;

pub use composition::{CompositionStore, RemovedLayer, RemovedNode};
pub use selection::{PlaybackState, SelectionSet, SelectionState};
