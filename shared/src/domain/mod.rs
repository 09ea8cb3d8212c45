pub mod driver;
pub mod fleet;
pub mod geo;
pub mod order;

pub use driver::{Driver, DriverState};
pub use fleet::FleetTag;
pub use geo::Coordinate;
pub use order::{CreatorMeta, Location, Order, OrderEventKind, OrderLogEntry, OrderKind, OrderStatus};
