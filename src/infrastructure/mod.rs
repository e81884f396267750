//! Infrastructure layer - Framework implementations
//!
//! This layer contains:
//! - Configuration loading (config)
//! - Durable catalog cache (cache)
//! - HTTP server setup (server)
//! - Application state (state)

pub mod cache;
pub mod config;
pub mod server;
pub mod state;

pub use state::AppState;
