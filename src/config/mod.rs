//! Configuration loading and management.
//!
//! - [`types`]: config struct definitions and loading
//! - [`validation`]: whole-file checks run at startup and on rehash
//! - [`directives`]: the module directive source handed to the runtime

mod directives;
mod types;
pub mod validation;

pub use directives::TomlConfigurator;
pub use types::{Config, LogConfig};
