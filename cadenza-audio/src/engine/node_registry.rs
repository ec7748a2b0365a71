use std::collections::HashMap;

use cadenza_types::{EdgeId, NodeId, NodeType};

use super::backend::UnitId;

/// A constructed unit standing in for one composition node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveUnit {
    pub unit: UnitId,
    pub node_type: NodeType,
    /// False for the shared destination, which may only be disconnected.
    pub disposable: bool,
}

/// A live socket-to-socket connection standing in for one composition edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveConnection {
    pub source_node: NodeId,
    pub target_node: NodeId,
    pub source: UnitId,
    pub output: u8,
    pub target: UnitId,
    pub input: u8,
}

/// Registry of the units and connections the mirror believes to be alive,
/// keyed by the composition ids they stand in for.
pub struct NodeRegistry {
    units: HashMap<NodeId, LiveUnit>,
    connections: HashMap<EdgeId, LiveConnection>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            units: HashMap::new(),
            connections: HashMap::new(),
        }
    }

    /// Record that a unit has been constructed for `node_id`.
    pub fn register(&mut self, node_id: NodeId, unit: LiveUnit) {
        self.units.insert(node_id, unit);
    }

    /// Forget a unit (after it has been disposed or disconnected).
    pub fn unregister(&mut self, node_id: NodeId) -> Option<LiveUnit> {
        self.units.remove(&node_id)
    }

    pub fn unit(&self, node_id: NodeId) -> Option<&LiveUnit> {
        self.units.get(&node_id)
    }

    pub fn units(&self) -> impl Iterator<Item = (&NodeId, &LiveUnit)> {
        self.units.iter()
    }

    pub fn register_connection(&mut self, edge_id: EdgeId, connection: LiveConnection) {
        self.connections.insert(edge_id, connection);
    }

    pub fn unregister_connection(&mut self, edge_id: EdgeId) -> Option<LiveConnection> {
        self.connections.remove(&edge_id)
    }

    pub fn has_connection(&self, edge_id: EdgeId) -> bool {
        self.connections.contains_key(&edge_id)
    }

    /// Edge ids of every connection into or out of `node_id`.
    pub fn connections_touching(&self, node_id: NodeId) -> Vec<EdgeId> {
        let mut ids: Vec<EdgeId> = self
            .connections
            .iter()
            .filter(|(_, c)| c.source_node == node_id || c.target_node == node_id)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Forget everything (session teardown).
    pub fn clear(&mut self) {
        self.units.clear();
        self.connections.clear();
    }

    /// Number of units currently believed to be alive.
    pub fn live_count(&self) -> usize {
        self.units.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Look up a unit, logging when the mirror lags behind the model.
    pub fn check_unit(&self, node_id: NodeId) -> Option<&LiveUnit> {
        let unit = self.units.get(&node_id);
        if unit.is_none() {
            log::debug!(
                target: "audio::mirror",
                "node {} has no live unit",
                node_id
            );
        }
        unit
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: u32) -> LiveUnit {
        LiveUnit {
            unit: UnitId::new(id),
            node_type: NodeType::Gain,
            disposable: true,
        }
    }

    fn connection(from: u64, to: u64) -> LiveConnection {
        LiveConnection {
            source_node: NodeId::new(from),
            target_node: NodeId::new(to),
            source: UnitId::new(from as u32),
            output: 0,
            target: UnitId::new(to as u32),
            input: 0,
        }
    }

    #[test]
    fn register_and_unregister() {
        let mut reg = NodeRegistry::new();
        reg.register(NodeId::new(1), unit(100));
        assert_eq!(reg.live_count(), 1);
        assert_eq!(reg.unit(NodeId::new(1)).map(|u| u.unit), Some(UnitId::new(100)));

        assert!(reg.unregister(NodeId::new(1)).is_some());
        assert_eq!(reg.live_count(), 0);
        assert!(reg.unregister(NodeId::new(1)).is_none());
    }

    #[test]
    fn connections_touching_finds_both_directions() {
        let mut reg = NodeRegistry::new();
        reg.register_connection(EdgeId::new(1), connection(1, 2));
        reg.register_connection(EdgeId::new(2), connection(2, 3));
        reg.register_connection(EdgeId::new(3), connection(3, 4));

        assert_eq!(reg.connections_touching(NodeId::new(2)), vec![EdgeId::new(1), EdgeId::new(2)]);
        assert!(reg.connections_touching(NodeId::new(9)).is_empty());
    }

    #[test]
    fn clear_forgets_everything() {
        let mut reg = NodeRegistry::new();
        reg.register(NodeId::new(1), unit(1));
        reg.register_connection(EdgeId::new(1), connection(1, 2));
        reg.clear();
        assert_eq!(reg.live_count(), 0);
        assert_eq!(reg.connection_count(), 0);
    }

    #[test]
    fn check_unit_returns_none_for_unknown() {
        let reg = NodeRegistry::new();
        assert!(reg.check_unit(NodeId::new(999)).is_none());
    }

    struct Capture(std::sync::Mutex<Vec<(String, String)>>);

    impl log::Log for Capture {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            if let Ok(mut records) = self.0.lock() {
                records.push((record.target().to_string(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static CAPTURE: Capture = Capture(std::sync::Mutex::new(Vec::new()));

    #[test]
    fn missing_unit_logs_under_mirror_target() {
        let _ = log::set_logger(&CAPTURE);
        log::set_max_level(log::LevelFilter::Trace);

        NodeRegistry::new().check_unit(NodeId::new(4242));

        let records = CAPTURE.0.lock().unwrap();
        let (target, _) = records
            .iter()
            .find(|(_, message)| message.contains("4242"))
            .unwrap();
        assert_eq!(target, "audio::mirror");
    }
}
