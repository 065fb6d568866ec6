//! slsvcd - Straylight Services Daemon
//!
//! Hosts IRC network services as modules on top of the `slsvc-core` plugin
//! runtime. The runtime is single-threaded, so the daemon runs on a
//! current-thread tokio runtime that only waits for signals.

mod config;
mod modules;
mod signals;
mod telemetry;

use crate::config::{Config, LogConfig, TomlConfigurator, validation};
use crate::signals::{Request, Signals};
use slsvc_core::{ModuleSource, Runtime, describe_version, MODULE_VERSION_CODE};
use tracing::{error, info};

const DEFAULT_CONFIG: &str = "slsvcd.toml";

#[cfg(feature = "dynamic")]
fn module_source(config: &Config) -> Box<dyn ModuleSource> {
    Box::new(slsvc_core::source::DynamicSource::new(&config.runtime.module_dir))
}

#[cfg(not(feature = "dynamic"))]
fn module_source(_config: &Config) -> Box<dyn ModuleSource> {
    Box::new(modules::builtin())
}

/// Load the autoload list in order, stopping at the first failure.
fn autoload(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    for identifier in &config.runtime.autoload {
        if let Err(e) = rt.load_module(identifier) {
            error!(module = %identifier, error = %e, code = e.error_code(), "Failed to load module");
            return Err(anyhow::anyhow!("failed to load module {identifier}: {e}"));
        }
    }
    info!(count = config.runtime.autoload.len(), "Modules loaded");
    Ok(())
}

async fn serve(rt: &Runtime) -> anyhow::Result<()> {
    let mut signals = Signals::new()?;
    loop {
        match signals.recv().await {
            Request::Rehash => {
                modules::rehash::request(rt);
            }
            Request::Shutdown => return Ok(()),
        }
    }
}

fn shut_down(rt: Runtime) -> anyhow::Result<()> {
    let stuck = rt.teardown();
    if !stuck.is_empty() {
        return Err(anyhow::anyhow!(
            "modules still loaded after shutdown: {}",
            stuck.join(", ")
        ));
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut check_only = false;
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--check" => check_only = true,
            _ => config_path = Some(arg),
        }
    }
    let config_path = config_path.unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            telemetry::init(&LogConfig::default());
            error!(path = %config_path, error = %e, "Failed to load config");
            return Err(e.into());
        }
    };
    telemetry::init(&config.log);

    if let Err(errors) = validation::validate(&config) {
        for e in &errors {
            error!(path = %config_path, error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "{} configuration error(s) in {config_path}",
            errors.len()
        ));
    }

    let configurator = TomlConfigurator::new(&config_path, &config);
    info!(
        config = %configurator.path().display(),
        module_version = %describe_version(MODULE_VERSION_CODE),
        "Starting slsvcd"
    );
    let rt = Runtime::new(module_source(&config), Box::new(configurator));

    if let Err(e) = autoload(&rt, &config) {
        // Leave nothing half-started behind.
        if let Err(teardown) = shut_down(rt) {
            error!(error = %teardown, "Teardown after failed startup was incomplete");
        }
        return Err(e);
    }

    if check_only {
        info!("Configuration OK");
        return shut_down(rt);
    }

    serve(&rt).await?;
    info!("Shutting down");
    shut_down(rt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autoload_stops_at_first_failure() {
        let config: Config = toml::from_str(
            r#"
[runtime]
autoload = ["core/monitor", "nickserv/main", "core/rehash"]
"#,
        )
        .unwrap();
        let rt = Runtime::new(Box::new(modules::builtin()), Box::new(TomlConfigurator::new("unused", &config)));
        assert!(autoload(&rt, &config).is_err());
        assert!(rt.find_module(modules::monitor::NAME).is_some());
        assert!(rt.find_module(modules::rehash::NAME).is_none());
        assert!(shut_down(rt).is_ok());
    }

    static PINNED: slsvc_core::ModuleSlot = slsvc_core::ModuleSlot::new();

    fn pin_to_core(rt: &Runtime, me: slsvc_core::ModuleId) -> bool {
        rt.use_module(me, slsvc_core::ModuleId::CORE);
        true
    }

    fn exit_ok(_rt: &Runtime, _me: slsvc_core::ModuleId, _shutdown: bool) -> bool {
        true
    }

    #[test]
    fn shut_down_reports_stuck_modules() {
        let source = slsvc_core::source::StaticSource::new(vec![
            slsvc_core::source::StaticModule::entry_points("misc/pinned", &PINNED, pin_to_core, exit_ok),
        ]);
        let rt = Runtime::new(Box::new(source), Box::new(slsvc_core::NoopConfigurator));
        rt.load_module("misc/pinned").unwrap();
        let err = shut_down(rt).unwrap_err();
        assert!(err.to_string().contains("misc/pinned"), "{err}");
    }
}
