mod composition;
mod edge;
mod music;
mod node;

pub use composition::{CompositionMeta, MetadataPatch, DEFAULT_BPM, MAX_BPM, MIN_BPM};
pub use edge::{AudioEdge, SocketRef};
pub use music::{KeyDraft, KeyPatch, LayerPatch, MusicKey, MusicLayer, MAX_NOTE};
pub use node::{AudioNode, NodePatch, Position, MAX_LABEL_LEN};
