use crate::error::Error;
use mev_plus_bus::ModuleFlags;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// A config file is a table of tables, one per module, each mapping a bare
/// flag name to its string value — the on-disk counterpart to the
/// `<module>.<flag-name>` CLI namespace (spec §6).
#[derive(Debug, Default, Deserialize)]
pub struct Config(pub HashMap<String, ModuleFlags>);

impl Config {
    pub fn from_toml_file<P: AsRef<Path> + fmt::Display>(path: P) -> Result<Config, Error> {
        tracing::info!("loading config from `{path}`...");
        let data = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&data)?)
    }

    /// Apply `--set module.flag=value` overrides on top of whatever the file
    /// supplied (CLI flags override file values, per spec §2's ambient config
    /// section).
    pub fn apply_overrides(&mut self, overrides: &[String]) -> Result<(), Error> {
        for entry in overrides {
            let (key, value) = entry.split_once('=').ok_or_else(|| Error::MalformedOverride(entry.clone()))?;
            let (module, flag) = key.split_once('.').ok_or_else(|| Error::MalformedOverride(entry.clone()))?;
            self.0.entry(module.to_string()).or_default().insert(flag.to_string(), value.to_string());
        }
        Ok(())
    }
}
