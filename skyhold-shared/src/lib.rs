pub mod models;

pub use models::events::{HoldEvent, HoldEventKind};
