pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod memory_repo;
pub mod seat_repo;

pub use booking_repo::StoreBookingRepository;
pub use database::DbClient;
pub use memory_repo::{InMemoryBookingRepository, InMemorySeatRepository};
pub use seat_repo::StoreSeatRepository;
