//! Services Layer
//!
//! Business logic shared by the HTTP and MCP transports.

pub mod catalog;
pub mod classifier;
pub mod geocoder;
pub mod lookup;
pub mod pipeline;
pub mod query_service;

// Re-export for convenience
pub use catalog::Catalog;
pub use query_service::QueryService;
