pub mod manager;
pub mod timing;

pub use manager::{DatabaseError, DatabaseManager};
