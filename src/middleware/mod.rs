pub mod client;
pub mod pin_gate;
pub mod response;

pub use client::client_address;
pub use pin_gate::pin_gate;
pub use response::{ApiResponse, ApiResult};
