//! Built-in modules, linked into the daemon.

pub mod monitor;
pub mod rehash;

use slsvc_core::source::StaticSource;

/// The static module table.
#[cfg_attr(feature = "dynamic", allow(dead_code))]
pub fn builtin() -> StaticSource {
    StaticSource::new(vec![monitor::entry(), rehash::entry()])
}
