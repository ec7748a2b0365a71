//! # cadenza-core
//!
//! Editing core of the Cadenza composition editor: the in-memory composition
//! store, the coalescing change log, the debounced flush pipeline and the
//! session that wires them to the live audio mirror.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cadenza_audio::{AudioMirror, Destination, NullBackend};
//! use cadenza_core::config::Config;
//! use cadenza_core::persistence::SqlitePersistence;
//! use cadenza_core::session::EditSession;
//! use cadenza_core::state::CompositionStore;
//!
//! // 1. Open storage and load a composition snapshot
//! let config = Config::load();
//! let persistence = Arc::new(SqlitePersistence::open("cadenza.sqlite")?);
//! let (store, dropped) = CompositionStore::from_snapshot(id, persistence.load_snapshot(id)?);
//!
//! // 2. Open a session; the mirror stays dormant until a user gesture
//! let mirror = AudioMirror::new(Box::new(NullBackend), Destination::platform());
//! let mut session = EditSession::new(store, &config, persistence, mirror);
//!
//! // 3. Edit; every accepted edit reaches persistence and audio
//! let synth = session.create_node(NodeType::Synth, Position::new(0.0, 0.0));
//!
//! // 4. Call tick() from the host loop to drive debounced saves
//! session.tick(std::time::Instant::now());
//!
//! // 5. Flush and tear down on exit
//! session.close(std::time::Duration::from_secs(5));
//! ```
//!
//! ## Module Overview
//!
//! - [`state`]: `CompositionStore` and `SelectionState`
//! - [`change_log`]: bounded, coalescing change history with subscriber feeds
//! - [`dispatch`]: debounce/single-flight flush state machine
//! - [`persistence`]: `ChangePersistence` trait, SQLite and in-memory collaborators
//! - [`session`]: `EditSession`, the per-composition wiring
//! - [`config`]: TOML configuration with embedded defaults

pub mod change_log;
pub mod config;
pub mod dispatch;
pub mod persistence;
pub mod session;
pub mod state;

pub use change_log::{ChangeFeed, ChangeLog, LogEntry, Placement};
pub use dispatch::{ChangeDispatcher, DirtyState};
pub use persistence::{ChangePersistence, PersistenceError};
pub use session::EditSession;
pub use state::{CompositionStore, SelectionState};
