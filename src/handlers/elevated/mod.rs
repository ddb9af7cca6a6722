// handlers/elevated/mod.rs - Manager-gated handlers
//
// Middleware: pin_gate(PinScope::Manager)

pub mod payroll;
pub mod pin;
