pub mod models;
pub mod pii;

pub use models::events::{SeatUpdateEvent, SeatUpdateKind};
pub use pii::Masked;
