// handlers/protected/mod.rs - Staff-gated handlers
//
// Middleware: pin_gate(PinScope::Staff); manager sessions are accepted too.

pub mod attendance;
pub mod reports;
