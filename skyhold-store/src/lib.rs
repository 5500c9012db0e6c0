pub mod app_config;
pub mod database;
pub mod redis_repo;
pub mod reservation_repo;
pub mod seat_repo;

pub use database::{DbClient, PgTx};
pub use redis_repo::RedisClient;
pub use reservation_repo::PgReservationLedger;
pub use seat_repo::PgSeatLedger;
