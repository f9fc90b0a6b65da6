//! TCP-based secure file transfer module.
//!
//! This module provides:
//! - Length-delimited message framing (8-digit ASCII decimal prefix)
//! - The greeting/accept handshake with public-key bootstrap
//! - The single-exchange client and the cancellable server
//! - The ordered upload/download verification pipelines

pub mod client;
pub mod constants;
pub mod framing;
pub mod handler;
pub mod handshake;
pub mod protocol;
pub mod server;

// Re-export public API
pub use client::Client;
pub use constants::TRANSFER_PORT;
pub use handshake::SessionState;
pub use server::Server;
