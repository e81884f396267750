pub mod api;
pub mod domain;
pub mod infrastructure;
pub mod modules;
pub mod services;
pub mod utils;

pub use infrastructure::config;
pub use modules::import;
