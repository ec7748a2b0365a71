use serde::{Deserialize, Serialize};

use crate::{EdgeId, NodeId};

/// One end of a connection: a node and a socket index on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SocketRef {
    pub node_id: NodeId,
    pub socket: u8,
}

impl SocketRef {
    pub fn new(node_id: NodeId, socket: u8) -> Self {
        Self { node_id, socket }
    }
}

/// Directed connection from a source output socket to a target input socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEdge {
    pub id: EdgeId,
    pub source: SocketRef,
    pub target: SocketRef,
}

impl AudioEdge {
    pub fn touches(&self, node_id: NodeId) -> bool {
        self.source.node_id == node_id || self.target.node_id == node_id
    }
}
