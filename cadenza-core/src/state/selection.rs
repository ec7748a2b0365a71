use std::collections::{BTreeMap, BTreeSet};

use cadenza_types::{EdgeId, KeyDraft, KeyId, LayerId, NodeId};

/// Transport state as seen by the editor.
///
/// `Initializing` covers the wait for the audio context to resume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Idle,
    Initializing,
    Playing,
    Paused,
}

/// A set of selected ids supporting add/remove/replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSet<T: Ord + Copy> {
    items: BTreeSet<T>,
}

impl<T: Ord + Copy> Default for SelectionSet<T> {
    fn default() -> Self {
        Self { items: BTreeSet::new() }
    }
}

impl<T: Ord + Copy> SelectionSet<T> {
    pub fn add(&mut self, id: T) {
        self.items.insert(id);
    }

    pub fn add_all(&mut self, ids: impl IntoIterator<Item = T>) {
        self.items.extend(ids);
    }

    pub fn remove(&mut self, id: T) -> bool {
        self.items.remove(&id)
    }

    pub fn replace(&mut self, ids: impl IntoIterator<Item = T>) {
        self.items = ids.into_iter().collect();
    }

    pub fn toggle(&mut self, id: T) {
        if !self.items.remove(&id) {
            self.items.insert(id);
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn contains(&self, id: T) -> bool {
        self.items.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.items.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().copied().collect()
    }
}

/// What is currently selected or active in the editor.
#[derive(Debug, Clone)]
pub struct SelectionState {
    pub nodes: SelectionSet<NodeId>,
    pub edges: SelectionSet<EdgeId>,
    pub keys: SelectionSet<KeyId>,
    /// Keys highlighted per layer while editing the timeline.
    active_keys: BTreeMap<LayerId, SelectionSet<KeyId>>,
    active_layer: Option<LayerId>,
    /// Target of on-screen keyboard input.
    live_instrument: Option<NodeId>,
    pub preview_key: Option<KeyDraft>,
    zoom: f64,
    zoom_min: f64,
    zoom_max: f64,
    scroll: f64,
    playback: PlaybackState,
}

impl SelectionState {
    pub fn new(zoom_range: (f64, f64), zoom_default: f64) -> Self {
        let (zoom_min, zoom_max) = zoom_range;
        Self {
            nodes: SelectionSet::default(),
            edges: SelectionSet::default(),
            keys: SelectionSet::default(),
            active_keys: BTreeMap::new(),
            active_layer: None,
            live_instrument: None,
            preview_key: None,
            zoom: zoom_default.clamp(zoom_min, zoom_max),
            zoom_min,
            zoom_max,
            scroll: 0.0,
            playback: PlaybackState::Idle,
        }
    }

    pub fn active_layer(&self) -> Option<LayerId> {
        self.active_layer
    }

    pub fn set_active_layer(&mut self, layer: Option<LayerId>) {
        self.active_layer = layer;
    }

    pub fn live_instrument(&self) -> Option<NodeId> {
        self.live_instrument
    }

    /// Not checked against the graph; a non-instrument target stays silent.
    /// `EditSession::set_live_instrument` validates before setting.
    pub fn set_live_instrument(&mut self, node: Option<NodeId>) {
        self.live_instrument = node;
    }

    pub fn active_keys(&self, layer: LayerId) -> Option<&SelectionSet<KeyId>> {
        self.active_keys.get(&layer)
    }

    pub fn active_keys_mut(&mut self, layer: LayerId) -> &mut SelectionSet<KeyId> {
        self.active_keys.entry(layer).or_default()
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Set zoom, clamped to the configured range. Non-finite input is ignored.
    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() {
            self.zoom = zoom.clamp(self.zoom_min, self.zoom_max);
        }
    }

    pub fn scroll(&self) -> f64 {
        self.scroll
    }

    /// Set the timeline scroll offset; never negative.
    pub fn set_scroll(&mut self, scroll: f64) {
        if scroll.is_finite() {
            self.scroll = scroll.max(0.0);
        }
    }

    /// Forget every reference to a removed node.
    pub fn forget_node(&mut self, id: NodeId) {
        self.nodes.remove(id);
        if self.live_instrument == Some(id) {
            self.live_instrument = None;
        }
    }

    pub fn forget_edge(&mut self, id: EdgeId) {
        self.edges.remove(id);
    }

    pub fn forget_key(&mut self, id: KeyId) {
        self.keys.remove(id);
        for set in self.active_keys.values_mut() {
            set.remove(id);
        }
    }

    pub fn forget_layer(&mut self, id: LayerId) {
        self.active_keys.remove(&id);
        if self.active_layer == Some(id) {
            self.active_layer = None;
        }
    }

    // ── Playback machine ────────────────────────────────────────────

    pub fn playback(&self) -> PlaybackState {
        self.playback
    }

    /// `idle → initializing`.
    pub fn begin_playback(&mut self) -> bool {
        self.transition(PlaybackState::Idle, PlaybackState::Initializing)
    }

    /// `initializing → playing`.
    pub fn playback_ready(&mut self) -> bool {
        self.transition(PlaybackState::Initializing, PlaybackState::Playing)
    }

    /// `playing → paused`.
    pub fn pause(&mut self) -> bool {
        self.transition(PlaybackState::Playing, PlaybackState::Paused)
    }

    /// `paused → playing`.
    pub fn resume(&mut self) -> bool {
        self.transition(PlaybackState::Paused, PlaybackState::Playing)
    }

    /// Any state `→ idle`. Returns false if already idle.
    pub fn stop(&mut self) -> bool {
        if self.playback == PlaybackState::Idle {
            return false;
        }
        self.playback = PlaybackState::Idle;
        true
    }

    fn transition(&mut self, from: PlaybackState, to: PlaybackState) -> bool {
        if self.playback != from {
            log::debug!(target: "core::selection", "ignoring {:?} -> {:?} while {:?}", from, to, self.playback);
            return false;
        }
        self.playback = to;
        true
    }
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new((0.25, 8.0), 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_set_operations() {
        let mut set = SelectionSet::default();
        set.add(NodeId::new(1));
        set.add_all([NodeId::new(2), NodeId::new(3)]);
        assert_eq!(set.len(), 3);
        assert!(set.remove(NodeId::new(2)));
        assert!(!set.remove(NodeId::new(2)));
        set.toggle(NodeId::new(1));
        assert_eq!(set.to_vec(), vec![NodeId::new(3)]);
        set.replace([NodeId::new(7)]);
        assert_eq!(set.to_vec(), vec![NodeId::new(7)]);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut sel = SelectionState::new((0.5, 4.0), 1.0);
        sel.set_zoom(10.0);
        assert_eq!(sel.zoom(), 4.0);
        sel.set_zoom(0.01);
        assert_eq!(sel.zoom(), 0.5);
        sel.set_zoom(f64::NAN);
        assert_eq!(sel.zoom(), 0.5);
        sel.set_scroll(-30.0);
        assert_eq!(sel.scroll(), 0.0);
    }

    #[test]
    fn playback_machine() {
        let mut sel = SelectionState::default();
        assert!(!sel.pause());
        assert!(!sel.playback_ready());
        assert!(sel.begin_playback());
        assert!(!sel.begin_playback());
        assert!(sel.playback_ready());
        assert!(sel.pause());
        assert_eq!(sel.playback(), PlaybackState::Paused);
        assert!(sel.resume());
        assert!(sel.stop());
        assert_eq!(sel.playback(), PlaybackState::Idle);
        assert!(!sel.stop());
    }

    #[test]
    fn forgetting_a_node_clears_live_instrument() {
        let mut sel = SelectionState::default();
        sel.set_live_instrument(Some(NodeId::new(4)));
        sel.nodes.add(NodeId::new(4));
        sel.forget_node(NodeId::new(4));
        assert!(sel.live_instrument().is_none());
        assert!(sel.nodes.is_empty());
    }

    #[test]
    fn active_keys_are_per_layer() {
        let mut sel = SelectionState::default();
        sel.active_keys_mut(LayerId::new(1)).add(KeyId::new(10));
        sel.active_keys_mut(LayerId::new(2)).add(KeyId::new(10));
        sel.forget_key(KeyId::new(10));
        assert!(sel.active_keys(LayerId::new(1)).unwrap().is_empty());
        sel.forget_layer(LayerId::new(2));
        assert!(sel.active_keys(LayerId::new(2)).is_none());
    }
}
