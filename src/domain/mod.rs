//! Domain layer - Pure business abstractions
//!
//! This layer contains NO framework dependencies (no Axum, no HTTP client
//! construction). Only data types, trait definitions and error types.

pub mod errors;
pub mod geocoding;
pub mod listing;

pub use errors::*;
pub use geocoding::{Geocode, GeocodeLookup, LookupMatch};
pub use listing::*;
