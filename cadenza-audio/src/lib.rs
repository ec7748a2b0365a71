//! # cadenza-audio
//!
//! Live audio mirror for the Cadenza composition editor: keeps constructed
//! processing units and their connections in step with the composition
//! graph, and schedules keys against the backend transport.

pub mod destination;
pub mod engine;
pub mod mirror;
pub mod playback;
pub mod units;

pub use destination::{Destination, SharedDestination, DESTINATION_UNIT};
pub use engine::{AudioBackend, BackendError, BackendResult, NullBackend, UnitId};
pub use mirror::{AudioMirror, MirrorState};
pub use playback::{ScheduleReport, Tempo, TransportState};
