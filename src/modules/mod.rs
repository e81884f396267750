//! Source-facing modules: the listing table reader and external integrations

pub mod import;
pub mod integrations;
