//! Edit session: one open composition and everything that tracks it.
//!
//! Every edit goes through the store first. Only when the store accepts it
//! is a change entry recorded in the change log, which fans it out to the
//! dispatcher (persistence) and the audio mirror.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cadenza_audio::{AudioMirror, BackendError, BackendResult, ScheduleReport, Tempo};
use cadenza_types::{
    ChangeEntry, EdgeId, KeyDraft, KeyId, KeyPatch, LayerId, LayerPatch, MetadataPatch, NodeId,
    NodePatch, NodeType, Position, SocketRef,
};

use crate::change_log::{ChangeFeed, ChangeLog};
use crate::config::Config;
use crate::dispatch::{ChangeDispatcher, DispatchConfig, FlushExecutor, ThreadExecutor, UnloadGuard};
use crate::persistence::ChangePersistence;
use crate::state::{CompositionStore, PlaybackState, SelectionState};

/// Session-wide knobs copied out of the config at construction.
#[derive(Debug, Clone, Copy)]
struct Settings {
    default_velocity: f64,
    steps_per_beat: u32,
}

pub struct EditSession {
    store: CompositionStore,
    log: ChangeLog,
    dispatch_feed: ChangeFeed,
    mirror_feed: ChangeFeed,
    dispatcher: ChangeDispatcher,
    mirror: AudioMirror,
    selection: SelectionState,
    settings: Settings,
}

impl EditSession {
    /// Open a session whose flushes run on background threads.
    pub fn new(
        store: CompositionStore,
        config: &Config,
        persistence: Arc<dyn ChangePersistence>,
        mirror: AudioMirror,
    ) -> Self {
        Self::with_executor(store, config, persistence, Box::new(ThreadExecutor), mirror)
    }

    pub fn with_executor(
        store: CompositionStore,
        config: &Config,
        persistence: Arc<dyn ChangePersistence>,
        executor: Box<dyn FlushExecutor>,
        mirror: AudioMirror,
    ) -> Self {
        let mut log = ChangeLog::with_capacity(config.change_log_capacity());
        let dispatch_feed = log.subscribe();
        let mirror_feed = log.subscribe();
        let dispatcher = ChangeDispatcher::new(
            store.id(),
            DispatchConfig::from_config(config),
            persistence,
            executor,
        );
        let mut selection = SelectionState::new(config.zoom_range(), config.zoom_default());
        selection.set_active_layer(store.layers().next().map(|l| l.id));

        log::info!(
            target: "core::session",
            "opened composition {} ({} nodes, {} keys)",
            store.id(),
            store.nodes().count(),
            store.keys().count()
        );
        Self {
            store,
            log,
            dispatch_feed,
            mirror_feed,
            dispatcher,
            mirror,
            selection,
            settings: Settings {
                default_velocity: config.default_velocity(),
                steps_per_beat: config.steps_per_beat(),
            },
        }
    }

    pub fn set_unload_guard(&mut self, guard: Box<dyn UnloadGuard>) {
        self.dispatcher.set_guard(guard);
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn store(&self) -> &CompositionStore {
        &self.store
    }

    pub fn log(&self) -> &ChangeLog {
        &self.log
    }

    pub fn dispatcher(&self) -> &ChangeDispatcher {
        &self.dispatcher
    }

    pub fn mirror(&self) -> &AudioMirror {
        &self.mirror
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionState {
        &mut self.selection
    }

    pub fn tempo(&self) -> Tempo {
        Tempo::new(self.store.meta().bpm, self.settings.steps_per_beat)
    }

    // ------------------------------------------------------------------
    // Change plumbing
    // ------------------------------------------------------------------

    fn commit(&mut self, change: ChangeEntry) {
        if self.log.apply_change(change).is_none() {
            log::warn!(target: "core::session", "store accepted an edit the change log rejected");
        }
        self.pump(Instant::now());
    }

    /// Deliver pending log entries to both subscribers.
    fn pump(&mut self, now: Instant) {
        for entry in self.dispatch_feed.drain() {
            self.dispatcher.observe(&entry.change, now);
        }
        for entry in self.mirror_feed.drain() {
            self.mirror.apply(&entry.change);
        }
    }

    /// Record the save marker so the next edit never merges across a flush.
    fn mark_saved(&mut self) {
        self.log.apply_change(ChangeEntry::SaveChanges);
        self.pump(Instant::now());
    }

    /// Advance timers: start a flush once the debounce deadline passes and
    /// rebuild a stale playback schedule. Returns true if a flush started.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.pump(now);
        let started = self.dispatcher.poll(now);
        if started {
            self.mark_saved();
        }
        if self.mirror.schedule_is_stale() {
            let tempo = self.tempo();
            if let Some(report) = self.mirror.reschedule(self.store.keys(), tempo) {
                log::debug!(
                    target: "core::session",
                    "rescheduled {} keys ({} muted)",
                    report.scheduled,
                    report.muted
                );
            }
        }
        started
    }

    /// Flush right away (explicit save). Returns true if a flush started.
    pub fn save_now(&mut self) -> bool {
        let started = self.dispatcher.flush_now(Instant::now());
        if started {
            self.mark_saved();
        }
        started
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    pub fn update_metadata(&mut self, patch: MetadataPatch) -> bool {
        if !self.store.update_metadata(&patch) {
            return false;
        }
        self.commit(ChangeEntry::MetadataUpdate { patch });
        true
    }

    // ------------------------------------------------------------------
    // Nodes and edges
    // ------------------------------------------------------------------

    pub fn create_node(&mut self, node_type: NodeType, position: Position) -> Option<NodeId> {
        let node = self.store.create_node(node_type, position)?;
        let id = node.id;
        self.commit(ChangeEntry::NodeAdd { node });
        Some(id)
    }

    pub fn move_node(&mut self, id: NodeId, position: Position) -> bool {
        if !self.store.move_node(id, position) {
            return false;
        }
        self.commit(ChangeEntry::NodeUpdate { id, patch: NodePatch::position(position) });
        true
    }

    pub fn rename_node(&mut self, id: NodeId, label: &str) -> bool {
        if !self.store.rename_node(id, label) {
            return false;
        }
        self.commit(ChangeEntry::NodeUpdate { id, patch: NodePatch::label(label) });
        true
    }

    pub fn set_node_property(&mut self, id: NodeId, key: &str, value: f64) -> bool {
        if !self.store.set_node_property(id, key, value) {
            return false;
        }
        self.commit(ChangeEntry::NodeUpdate { id, patch: NodePatch::property(key, value) });
        true
    }

    /// Remove a node. Each cascaded edge is recorded before the node itself.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let Some(removed) = self.store.remove_node(id) else {
            return false;
        };
        for edge in &removed.edges {
            self.selection.forget_edge(edge.id);
            self.commit(ChangeEntry::EdgeRemove { id: edge.id });
        }
        self.selection.forget_node(id);
        self.commit(ChangeEntry::NodeRemove { id });
        true
    }

    pub fn connect(&mut self, source: SocketRef, target: SocketRef) -> Option<EdgeId> {
        let edge = self.store.connect(source, target)?;
        self.commit(ChangeEntry::EdgeAdd { edge });
        Some(edge.id)
    }

    pub fn disconnect(&mut self, id: EdgeId) -> bool {
        if !self.store.disconnect(id) {
            return false;
        }
        self.selection.forget_edge(id);
        self.commit(ChangeEntry::EdgeRemove { id });
        true
    }

    // ------------------------------------------------------------------
    // Layers and keys
    // ------------------------------------------------------------------

    pub fn create_layer(&mut self, name: &str) -> Option<LayerId> {
        let layer = self.store.create_layer(name)?;
        let id = layer.id;
        self.commit(ChangeEntry::LayerAdd { layer });
        if self.selection.active_layer().is_none() {
            self.selection.set_active_layer(Some(id));
        }
        Some(id)
    }

    pub fn rename_layer(&mut self, id: LayerId, name: &str) -> bool {
        if !self.store.rename_layer(id, name) {
            return false;
        }
        let patch = LayerPatch { name: Some(name.to_string()) };
        self.commit(ChangeEntry::LayerUpdate { id, patch });
        true
    }

    /// Remove a layer along with its keys. Key removals are recorded first.
    pub fn remove_layer(&mut self, id: LayerId) -> bool {
        let Some(removed) = self.store.remove_layer(id) else {
            return false;
        };
        for key in &removed.keys {
            self.selection.forget_key(key.id);
            self.commit(ChangeEntry::MusicKeyRemove { id: key.id });
        }
        self.selection.forget_layer(id);
        if self.selection.active_layer().is_none() {
            let fallback = self.store.layers().next().map(|l| l.id);
            self.selection.set_active_layer(fallback);
        }
        self.commit(ChangeEntry::LayerRemove { id });
        true
    }

    /// Place a key at the configured default velocity.
    pub fn create_key(&mut self, layer_id: LayerId, instrument_id: NodeId, draft: KeyDraft) -> Option<KeyId> {
        let key = self
            .store
            .create_key(layer_id, instrument_id, draft, self.settings.default_velocity)?;
        let id = key.id;
        self.commit(ChangeEntry::MusicKeyAdd { key });
        Some(id)
    }

    /// Commit the hover preview as a key on the active layer, sounded by the
    /// live instrument.
    pub fn place_preview_key(&mut self) -> Option<KeyId> {
        let draft = self.selection.preview_key?;
        let layer = self.selection.active_layer()?;
        let instrument = self.selection.live_instrument()?;
        let id = self.create_key(layer, instrument, draft)?;
        self.selection.preview_key = None;
        Some(id)
    }

    pub fn update_key(&mut self, id: KeyId, patch: KeyPatch) -> bool {
        if !self.store.update_key(id, &patch) {
            return false;
        }
        self.commit(ChangeEntry::MusicKeyUpdate { id, patch });
        true
    }

    pub fn remove_key(&mut self, id: KeyId) -> bool {
        if self.store.remove_key(id).is_none() {
            return false;
        }
        self.selection.forget_key(id);
        self.commit(ChangeEntry::MusicKeyRemove { id });
        true
    }

    /// Route keys to an instrument, recording one update per key.
    pub fn set_key_instrument(&mut self, key_ids: &[KeyId], instrument_id: NodeId) -> bool {
        if !self.store.set_key_instrument(key_ids, instrument_id) {
            return false;
        }
        for id in key_ids {
            let patch = KeyPatch { instrument_id: Some(instrument_id), ..Default::default() };
            self.commit(ChangeEntry::MusicKeyUpdate { id: *id, patch });
        }
        true
    }

    // ------------------------------------------------------------------
    // Audio
    // ------------------------------------------------------------------

    /// Bring the audio mirror up. Must be triggered by a user gesture.
    pub fn resume_audio(&mut self) -> BackendResult {
        self.pump(Instant::now());
        self.mirror.activate(self.store.nodes(), self.store.edges())
    }

    /// `idle → initializing → playing`: activate audio if needed, schedule
    /// every key and start the transport from the top.
    pub fn play(&mut self) -> Result<ScheduleReport, BackendError> {
        if !self.selection.begin_playback() {
            return Ok(ScheduleReport::default());
        }
        if let Err(e) = self.resume_audio() {
            log::warn!(target: "core::session", "playback aborted: {}", e);
            self.selection.stop();
            return Err(e);
        }
        let tempo = self.tempo();
        let report = self.mirror.start_playback(self.store.keys(), tempo, 0.0);
        self.selection.playback_ready();
        Ok(report)
    }

    pub fn pause(&mut self) -> bool {
        if !self.selection.pause() {
            return false;
        }
        self.mirror.pause_playback();
        true
    }

    /// Continue from `position_secs`, the host's playhead.
    pub fn resume(&mut self, position_secs: f64) -> bool {
        if !self.selection.resume() {
            return false;
        }
        self.mirror.resume_playback(position_secs);
        true
    }

    pub fn stop(&mut self) -> bool {
        if !self.selection.stop() {
            return false;
        }
        self.mirror.stop_playback();
        true
    }

    pub fn playback(&self) -> PlaybackState {
        self.selection.playback()
    }

    /// Route the on-screen keyboard to `node`. Only instrument nodes are
    /// accepted; `None` clears the routing.
    pub fn set_live_instrument(&mut self, node: Option<NodeId>) -> bool {
        if let Some(id) = node {
            match self.store.node(id) {
                Some(n) if n.node_type.is_instrument() => {}
                _ => {
                    log::debug!(target: "core::session", "node {} cannot be the live instrument", id);
                    return false;
                }
            }
        }
        self.selection.set_live_instrument(node);
        true
    }

    /// Sound a note on the live instrument. Silent without one.
    pub fn press_key(&mut self, note: u8) -> bool {
        let Some(instrument) = self.selection.live_instrument() else {
            return false;
        };
        if !self.mirror.is_available() {
            if let Err(e) = self.resume_audio() {
                log::warn!(target: "core::session", "live keyboard unavailable: {}", e);
                return false;
            }
        }
        self.mirror.attack(instrument, note, self.settings.default_velocity)
    }

    pub fn release_key(&mut self, note: u8) -> bool {
        match self.selection.live_instrument() {
            Some(instrument) => self.mirror.release(instrument, note),
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Flush everything, wait up to `timeout` for it to land, tear down the
    /// audio graph and release the unload guard. Returns true when nothing
    /// was left unsaved.
    pub fn close(&mut self, timeout: Duration) -> bool {
        self.pump(Instant::now());
        let give_up = Instant::now() + timeout;
        loop {
            if self.dispatcher.flush_now(Instant::now()) {
                self.mark_saved();
            }
            let remaining = give_up.saturating_duration_since(Instant::now());
            if !self.dispatcher.wait_idle(remaining) {
                break;
            }
            // a flush queued behind the one that just landed
            let retry = self.dispatcher.is_dirty() && self.dispatcher.failures() == 0;
            if !retry || Instant::now() >= give_up {
                break;
            }
        }

        let saved = !self.dispatcher.is_dirty();
        if !saved {
            log::error!(
                target: "core::session",
                "closing composition {} with unsaved changes: {}",
                self.store.id(),
                self.dispatcher.last_error().unwrap_or("flush did not finish")
            );
        }
        self.stop();
        self.mirror.teardown();
        self.dispatcher.release_guard();
        log::info!(target: "core::session", "closed composition {}", self.store.id());
        saved
    }
}
