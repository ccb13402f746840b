//! Domain model, vector-clock algebra, and field-level conflict resolution
//! for the task/comment replication core shared by devices and the server.

pub mod applicator;
pub mod clock;
pub mod constants;
pub mod errors;
pub mod ids;
pub mod model;
pub mod resolve;

pub use applicator::{apply_remote, ApplyDecision};
pub use clock::{ClockOrdering, VectorClock};
pub use errors::{Error, Result};
pub use ids::{DeviceId, EntityId, OrgId, UserId};
pub use model::*;
