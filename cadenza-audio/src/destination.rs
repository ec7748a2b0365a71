use std::sync::Arc;

use crate::engine::UnitId;

/// Unit id reserved for the platform destination. Units allocated by a
/// mirror start well above it.
pub const DESTINATION_UNIT: UnitId = UnitId::new(0);

/// The platform's final output stage.
///
/// There is one per process and it outlives every edit session, so mirrors
/// receive it as a shared handle and only ever disconnect from it.
#[derive(Debug)]
pub struct Destination {
    unit: UnitId,
}

pub type SharedDestination = Arc<Destination>;

impl Destination {
    pub fn new(unit: UnitId) -> SharedDestination {
        Arc::new(Self { unit })
    }

    /// Handle for the default destination unit.
    pub fn platform() -> SharedDestination {
        Self::new(DESTINATION_UNIT)
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }
}
