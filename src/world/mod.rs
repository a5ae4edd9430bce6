//! World synchronization
//!
//! Keeps a server-side snapshot of viewer-reported object positions loosely
//! consistent across every connected viewer, and decides where new objects
//! may appear.

mod broadcast;
mod placement;
mod query;
mod registry;
mod state;

pub use broadcast::Broadcaster;
pub use placement::{Bounds, choose_position, random_rotation, random_scale};
pub use query::PositionQuery;
pub use registry::{ConnectionId, ConnectionRegistry, ConnectionSender};
pub use state::{WorldSnapshot, WorldStateCache};
