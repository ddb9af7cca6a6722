pub mod attendance;
pub mod migrate;
pub mod pin;
