//! Corsway - CORS-annotating forwarding gateway
//!
//! Core library for policy-checked request forwarding with retries,
//! response caching and cross-origin response headers.

pub mod config;
pub mod http;
pub mod proxy;
pub mod server;
