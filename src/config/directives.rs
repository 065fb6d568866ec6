//! Module directive values read from the `[modules]` tables of the config file.

use super::{Config, validation};
use parking_lot::RwLock;
use slsvc_core::{ConfigValue, ConfigureError, Configurator, Directive};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Serves module directives from the daemon's TOML configuration.
///
/// Values come from `[modules."<identifier>"]`. [`refresh`] re-reads the file
/// so a rehash picks up edits.
///
/// [`refresh`]: Configurator::refresh
#[derive(Debug)]
pub struct TomlConfigurator {
    path: PathBuf,
    modules: RwLock<toml::Table>,
}

impl TomlConfigurator {
    /// Serve values from an already loaded `config`, re-reading `path` on refresh.
    pub fn new(path: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            path: path.into(),
            modules: RwLock::new(config.modules.clone()),
        }
    }

    /// Path re-read on refresh.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Configurator for TomlConfigurator {
    fn refresh(&self) -> Result<(), ConfigureError> {
        let config = Config::load(&self.path).map_err(|e| ConfigureError::Source(e.to_string()))?;
        if let Err(errors) = validation::validate(&config) {
            let joined = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
            return Err(ConfigureError::Source(joined));
        }
        debug!(path = %self.path.display(), modules = config.modules.len(), "Configuration re-read");
        *self.modules.write() = config.modules;
        Ok(())
    }

    fn read(&self, module: &str, directive: &Directive) -> Result<Option<ConfigValue>, ConfigureError> {
        let modules = self.modules.read();
        let Some(value) = modules
            .get(module)
            .and_then(toml::Value::as_table)
            .and_then(|table| table.get(directive.name))
        else {
            return Ok(None);
        };
        to_config_value(value).map(Some).ok_or_else(|| {
            ConfigureError::Source(format!(
                "modules.{module:?}.{}: unsupported {} value",
                directive.name,
                value.type_str()
            ))
        })
    }
}

fn to_config_value(value: &toml::Value) -> Option<ConfigValue> {
    match value {
        toml::Value::Boolean(b) => Some(ConfigValue::Bool(*b)),
        toml::Value::Integer(i) => Some(ConfigValue::Integer(*i)),
        toml::Value::String(s) => Some(ConfigValue::String(s.clone())),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(ConfigValue::List),
        _ => None,
    }
}
