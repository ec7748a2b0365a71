//! Live audio mirror.
//!
//! Keeps a set of constructed units and connections consistent with the
//! composition graph. The mirror stays dormant until the first user gesture
//! resumes the audio context; it then builds every unit in bulk and from then
//! on applies each change entry as it arrives.
//!
//! Everything past activation is fire-and-forget: backend failures and
//! references to units that no longer exist are logged and skipped.

use cadenza_types::schema::validate_sockets;
use cadenza_types::{AudioEdge, AudioNode, ChangeEntry, EdgeId, NodeId, NodePatch, NodeType};

use crate::destination::SharedDestination;
use crate::engine::{AudioBackend, BackendResult, LiveConnection, LiveUnit, NodeRegistry, UnitId};
use crate::playback::Transport;
use crate::units::{note_frequency, unit_def};

/// First unit id handed out by a mirror.
const FIRST_UNIT_ID: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Uninitialized,
    Available,
}

pub struct AudioMirror {
    pub(crate) backend: Box<dyn AudioBackend>,
    destination: SharedDestination,
    state: MirrorState,
    pub(crate) registry: NodeRegistry,
    next_unit_id: u32,
    /// Output node whose properties drive the shared destination.
    destination_owner: Option<NodeId>,
    pub(crate) transport: Transport,
}

impl AudioMirror {
    pub fn new(backend: Box<dyn AudioBackend>, destination: SharedDestination) -> Self {
        Self {
            backend,
            destination,
            state: MirrorState::Uninitialized,
            registry: NodeRegistry::new(),
            next_unit_id: FIRST_UNIT_ID,
            destination_owner: None,
            transport: Transport::default(),
        }
    }

    pub fn state(&self) -> MirrorState {
        self.state
    }

    pub fn is_available(&self) -> bool {
        self.state == MirrorState::Available
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Live unit standing in for a node, if any.
    pub fn unit_for(&self, node_id: NodeId) -> Option<UnitId> {
        self.registry.unit(node_id).map(|u| u.unit)
    }

    /// Resume the audio context and build the whole graph.
    ///
    /// A refused resume leaves the mirror uninitialized so a later gesture can
    /// try again. Activating an available mirror does nothing.
    pub fn activate<'a, N, E>(&mut self, nodes: N, edges: E) -> BackendResult
    where
        N: IntoIterator<Item = &'a AudioNode>,
        E: IntoIterator<Item = &'a AudioEdge>,
    {
        if self.is_available() {
            return Ok(());
        }
        self.backend.resume()?;
        self.state = MirrorState::Available;

        for node in nodes {
            self.add_node(node);
        }
        for edge in edges {
            self.add_edge(edge);
        }
        log::info!(
            target: "audio::mirror",
            "audio available: {} units, {} connections",
            self.registry.live_count(),
            self.registry.connection_count()
        );
        Ok(())
    }

    /// Apply one change entry to the live graph. Does nothing before activation.
    pub fn apply(&mut self, change: &ChangeEntry) {
        if !self.is_available() {
            return;
        }
        match change {
            ChangeEntry::NodeAdd { node } => self.add_node(node),
            ChangeEntry::NodeUpdate { id, patch } => self.update_node(*id, patch),
            ChangeEntry::NodeRemove { id } => {
                if self.instrument_unit(*id).is_some() {
                    self.transport.mark_stale();
                }
                self.remove_node(*id);
            }
            ChangeEntry::EdgeAdd { edge } => self.add_edge(edge),
            ChangeEntry::EdgeRemove { id } => self.remove_edge(*id),
            ChangeEntry::MusicKeyAdd { .. }
            | ChangeEntry::MusicKeyUpdate { .. }
            | ChangeEntry::MusicKeyRemove { .. }
            | ChangeEntry::LayerRemove { .. } => self.transport.mark_stale(),
            ChangeEntry::MetadataUpdate { patch } if patch.bpm.is_some() => self.transport.mark_stale(),
            _ => {}
        }
    }

    fn allocate_unit(&mut self) -> UnitId {
        let id = UnitId::new(self.next_unit_id);
        self.next_unit_id += 1;
        id
    }

    fn report(&self, op: &str, result: BackendResult) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!(target: "audio::mirror", "{} failed: {}", op, e);
                false
            }
        }
    }

    fn add_node(&mut self, node: &AudioNode) {
        if self.registry.unit(node.id).is_some() {
            log::warn!(target: "audio::mirror", "node {} already has a live unit", node.id);
            return;
        }
        let def = unit_def(node.node_type);
        let params = def.initial_params(node);

        let live = if node.node_type == NodeType::Output {
            // The destination already exists. Only the first output node
            // sets its parameters; later ones just route into it.
            let unit = self.destination.unit();
            if self.destination_owner.is_none() {
                self.destination_owner = Some(node.id);
                for (param, value) in &params {
                    self.report("set_param", self.backend.set_param(unit, param, *value));
                }
            }
            LiveUnit { unit, node_type: node.node_type, disposable: false }
        } else {
            let unit = self.allocate_unit();
            if !self.report("create_unit", self.backend.create_unit(unit, def.kind, &params)) {
                return;
            }
            LiveUnit { unit, node_type: node.node_type, disposable: true }
        };

        log::debug!(target: "audio::units", "node {} -> {} unit {}", node.id, def.kind, live.unit);
        self.registry.register(node.id, live);
    }

    fn update_node(&mut self, node_id: NodeId, patch: &NodePatch) {
        let Some(props) = &patch.properties else {
            return;
        };
        let Some(live) = self.registry.check_unit(node_id).copied() else {
            return;
        };
        if !live.disposable && self.destination_owner != Some(node_id) {
            return;
        }
        let def = unit_def(live.node_type);
        for (key, value) in props {
            match def.setter(key) {
                Some(setter) => {
                    let mapped = (setter.map)(*value);
                    self.report("set_param", self.backend.set_param(live.unit, setter.param, mapped));
                }
                None => {
                    log::debug!(target: "audio::units", "{} has no setter for '{}'", def.kind, key);
                }
            }
        }
    }

    fn remove_node(&mut self, node_id: NodeId) {
        for edge_id in self.registry.connections_touching(node_id) {
            self.remove_edge(edge_id);
        }
        let Some(live) = self.registry.unregister(node_id) else {
            return;
        };
        if live.disposable {
            self.report("dispose", self.backend.dispose(live.unit));
        } else if self.destination_owner == Some(node_id) {
            // other output nodes keep their connections into the destination
            self.destination_owner = self
                .registry
                .units()
                .filter(|(_, u)| !u.disposable)
                .map(|(id, _)| *id)
                .min();
        }
    }

    fn add_edge(&mut self, edge: &AudioEdge) {
        if self.registry.has_connection(edge.id) {
            return;
        }
        let source = self.registry.check_unit(edge.source.node_id).copied();
        let target = self.registry.check_unit(edge.target.node_id).copied();
        let (Some(source), Some(target)) = (source, target) else {
            log::warn!(target: "audio::mirror", "edge {} skipped: endpoint has no live unit", edge.id);
            return;
        };
        if let Err(e) = validate_sockets(edge, source.node_type, target.node_type) {
            log::warn!(target: "audio::mirror", "edge {} skipped: {}", edge.id, e);
            return;
        }
        let connection = LiveConnection {
            source_node: edge.source.node_id,
            target_node: edge.target.node_id,
            source: source.unit,
            output: edge.source.socket,
            target: target.unit,
            input: edge.target.socket,
        };
        let connected = self.backend.connect(
            connection.source,
            connection.output,
            connection.target,
            connection.input,
        );
        if self.report("connect", connected) {
            self.registry.register_connection(edge.id, connection);
        }
    }

    fn remove_edge(&mut self, edge_id: EdgeId) {
        let Some(c) = self.registry.unregister_connection(edge_id) else {
            return;
        };
        self.report("disconnect", self.backend.disconnect(c.source, c.output, c.target, c.input));
    }

    /// Resolve a node to a live instrument unit, or `None` when it has been
    /// removed or is not an instrument.
    pub(crate) fn instrument_unit(&self, node_id: NodeId) -> Option<UnitId> {
        self.registry
            .unit(node_id)
            .filter(|u| u.node_type.is_instrument())
            .map(|u| u.unit)
    }

    /// Start a note on an instrument right away. Returns false (silently)
    /// when the instrument cannot sound.
    pub fn attack(&self, instrument: NodeId, note: u8, velocity: f64) -> bool {
        let Some(unit) = self.instrument_unit(instrument) else {
            return false;
        };
        self.report(
            "trigger_attack",
            self.backend.trigger_attack(unit, note_frequency(note), velocity),
        )
    }

    pub fn release(&self, instrument: NodeId, note: u8) -> bool {
        let Some(unit) = self.instrument_unit(instrument) else {
            return false;
        };
        self.report("trigger_release", self.backend.trigger_release(unit, note_frequency(note)))
    }

    /// Dispose every unit this session built and disconnect the destination,
    /// then forget both registries. The mirror returns to uninitialized.
    pub fn teardown(&mut self) {
        if !self.is_available() {
            return;
        }
        self.stop_playback();

        let mut units: Vec<(NodeId, LiveUnit)> = self.registry.units().map(|(id, u)| (*id, *u)).collect();
        units.sort_by_key(|(id, _)| *id);
        let mut destination_touched = false;
        for (_, live) in units {
            if live.disposable {
                self.report("dispose", self.backend.dispose(live.unit));
            } else if !destination_touched {
                // several output nodes share the destination
                self.report("disconnect_all", self.backend.disconnect_all(live.unit));
                destination_touched = true;
            }
        }

        let (units, connections) = (self.registry.live_count(), self.registry.connection_count());
        self.registry.clear();
        self.destination_owner = None;
        self.state = MirrorState::Uninitialized;
        log::info!(target: "audio::mirror", "torn down {} units, {} connections", units, connections);
    }
}
