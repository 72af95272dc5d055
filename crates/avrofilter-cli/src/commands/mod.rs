pub mod check;
pub mod redact;
pub mod resolve;
pub mod serve;

use anyhow::Result;
use avrofilter_config::Config;
use std::path::Path;

/// Explicit `--config` wins; otherwise the default location
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}
