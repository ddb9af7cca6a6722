// handlers/public/mod.rs - Public handlers (no PIN session required)
//
// Kiosk check-in/out and the PIN prompt endpoints that mint sessions.
// Security Level: None
// Route Prefix: /pin/*, /kiosk/*

pub mod kiosk;
pub mod pin;
