//! TCP front door: accept loop and request routing.

pub mod listener;
pub mod router;
