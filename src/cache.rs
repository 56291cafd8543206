//! Configuration cache and hardware synchronization engine.
//!
//! [`ConfigCache`] keeps an in-memory mirror of an instrument's settings and
//! decides, per parameter, whether an access must actually touch hardware.
//! Writes go through change detection: re-sending an unchanged value costs
//! nothing. Reads are served from the `live` snapshot once a parameter has
//! been observed. `force_hardware` bypasses both, which is the only defense
//! against someone twisting knobs at the instrument's front panel.
//!
//! Snapshots:
//! - `live` is the authoritative best-effort mirror of hardware.
//! - `init` records the first observed value of every parameter, exactly
//!   once, at the moment the parameter becomes known.
//! - `default` is loaded lazily from the instrument's default file and is
//!   never a save destination.
//! - any other name is a plain user snapshot.

use crate::error::{CacheError, Result};
use crate::settings::Settings;
use crate::store::ConfigStore;
use crate::transport::Transport;
use crate::value::ParamValue;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the hardware-mirror snapshot.
pub const LIVE: &str = "live";
/// Name of the first-observation snapshot.
pub const INIT: &str = "init";
/// Name of the lazily loaded reference snapshot.
pub const DEFAULT: &str = "default";

/// Command syntax flags of one engine instance.
///
/// Instruments disagree on framing details: whether replies echo the command
/// header, whether long-form replies must be requested explicitly, whether a
/// command starts with the separator, and whether a space sits between the
/// command and its argument.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandFormat {
    /// Replies carry the command header, which must be stripped. When
    /// false, the engine disables header echo during the handshake.
    #[serde(default)]
    pub header_echo: bool,
    /// Long-form replies must be requested during the handshake.
    #[serde(default)]
    pub verbose_query: bool,
    /// Commands start with the path separator.
    #[serde(default = "flag_on")]
    pub leading_separator: bool,
    /// A space separates command and value.
    #[serde(default = "flag_on")]
    pub intervening_space: bool,
}

fn flag_on() -> bool {
    true
}

impl Default for CommandFormat {
    fn default() -> Self {
        Self {
            header_echo: false,
            verbose_query: false,
            leading_separator: true,
            intervening_space: true,
        }
    }
}

/// Destination of [`ConfigCache::save_config`].
#[derive(Debug)]
pub enum SaveDest<'a> {
    /// A named snapshot owned by the engine, created if absent.
    Snapshot(&'a str),
    /// A JSON file on disk.
    File(&'a Path),
    /// A caller-owned store.
    Store(&'a mut ConfigStore),
}

/// Source of [`ConfigCache::load_config`].
#[derive(Debug)]
pub enum LoadSource<'a> {
    /// A named snapshot owned by the engine; `default` triggers the lazy
    /// default-file load.
    Snapshot(&'a str),
    /// A JSON file on disk.
    File(&'a Path),
    /// A caller-owned store.
    Store(&'a ConfigStore),
}

/// Read-through/write-through configuration cache over one transport.
#[derive(Debug)]
pub struct ConfigCache<T> {
    transport: T,
    live: ConfigStore,
    init: ConfigStore,
    defaults: Option<ConfigStore>,
    user_snapshots: HashMap<String, ConfigStore>,
    format: CommandFormat,
    instrument_id: String,
    defaults_dir: Option<PathBuf>,
    bulk_query: String,
    hardware_ready: bool,
}

impl<T: Transport> ConfigCache<T> {
    /// New engine over `transport` for the instrument identified by
    /// `instrument_id` (used to name its default file).
    pub fn new(transport: T, instrument_id: impl Into<String>) -> Self {
        Self {
            transport,
            live: ConfigStore::new(),
            init: ConfigStore::new(),
            defaults: None,
            user_snapshots: HashMap::new(),
            format: CommandFormat::default(),
            instrument_id: instrument_id.into(),
            defaults_dir: None,
            bulk_query: "SET?".to_string(),
            hardware_ready: false,
        }
    }

    /// New engine configured from loaded [`Settings`].
    pub fn from_settings(
        mut transport: T,
        instrument_id: impl Into<String>,
        settings: &Settings,
    ) -> Self {
        transport.set_timeout(Duration::from_millis(settings.timeouts.query_timeout_ms));
        let mut engine = Self::new(transport, instrument_id)
            .with_format(settings.format.clone())
            .with_bulk_query(settings.bulk_query.clone());
        engine.defaults_dir = settings.defaults_dir.clone();
        engine
    }

    /// Override the command syntax flags.
    pub fn with_format(mut self, format: CommandFormat) -> Self {
        self.format = format;
        self
    }

    /// Override the directory holding per-instrument default files.
    pub fn with_defaults_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.defaults_dir = Some(dir.into());
        self
    }

    /// Override the bulk "all settings" query word.
    pub fn with_bulk_query(mut self, command: impl Into<String>) -> Self {
        self.bulk_query = command.into();
        self
    }

    /// The hardware-mirror snapshot.
    pub fn live(&self) -> &ConfigStore {
        &self.live
    }

    /// The first-observation snapshot.
    pub fn init_snapshot(&self) -> &ConfigStore {
        &self.init
    }

    /// Snapshot by name, reserved or user-created. `default` answers only
    /// once the default file has been loaded.
    pub fn snapshot(&self, name: &str) -> Option<&ConfigStore> {
        match name {
            LIVE => Some(&self.live),
            INIT => Some(&self.init),
            DEFAULT => self.defaults.as_ref(),
            other => self.user_snapshots.get(other),
        }
    }

    fn prefix(&self) -> &'static str {
        if self.format.leading_separator {
            ":"
        } else {
            ""
        }
    }

    fn set_command(&self, path: &str, value: &ParamValue) -> String {
        let space = if self.format.intervening_space { " " } else { "" };
        format!("{}{}{}{}", self.prefix(), path, space, value)
    }

    fn query_command(&self, path: &str) -> String {
        format!("{}{}?", self.prefix(), path)
    }

    /// One-time handshake before the first transport access of the engine's
    /// lifetime. Never reversed, even when a setup write fails.
    fn ensure_hardware_ready(&mut self) -> Result<()> {
        if self.hardware_ready {
            return Ok(());
        }
        self.hardware_ready = true;
        self.transport.open()?;
        if !self.format.header_echo {
            info!("{}: disabling response headers", self.instrument_id);
            self.transport.write("HEADER OFF")?;
        }
        if self.format.verbose_query {
            info!("{}: requesting verbose responses", self.instrument_id);
            self.transport.write("VERBOSE ON")?;
        }
        Ok(())
    }

    fn parse_response(&self, raw: &str) -> ParamValue {
        let trimmed = raw.trim();
        let body = if self.format.header_echo {
            trimmed.rsplit(' ').next().unwrap_or(trimmed)
        } else {
            trimmed
        };
        ParamValue::parse(body)
    }

    fn record_first_observation(&mut self, path: &str, value: &ParamValue) {
        if !self.init.contains(path) {
            self.init.set(path, value.clone());
        }
    }

    /// Write `value` at `path`, unless the cache already holds it.
    ///
    /// Returns whether hardware was touched. The comparison is on the wire
    /// rendering of both values, so `16` and `16.0` count as unchanged. A
    /// transport failure propagates with every snapshot unmodified.
    pub fn set_config_param(
        &mut self,
        path: &str,
        value: impl Into<ParamValue>,
        force_hardware: bool,
    ) -> Result<bool> {
        let value = value.into();
        let unchanged = self
            .live
            .get(path)
            .map(|current| current.to_string() == value.to_string())
            .unwrap_or(false);
        if unchanged && !force_hardware {
            debug!("{}: '{}' unchanged, write skipped", self.instrument_id, path);
            return Ok(false);
        }
        let command = self.set_command(path, &value);
        self.ensure_hardware_ready()?;
        self.transport.write(&command)?;
        debug!("{}: wrote '{}'", self.instrument_id, command);
        self.live.set(path, value.clone());
        self.record_first_observation(path, &value);
        Ok(true)
    }

    /// Read the value at `path`, from cache when possible.
    ///
    /// A cache miss (or `force_hardware`) performs exactly one hardware
    /// query, parses the reply, and stores it before answering. A transport
    /// failure propagates with every snapshot unmodified.
    pub fn get_config_param(&mut self, path: &str, force_hardware: bool) -> Result<ParamValue> {
        if force_hardware || !self.live.contains(path) {
            let command = self.query_command(path);
            self.ensure_hardware_ready()?;
            let raw = self.transport.query(&command)?;
            let value = self.parse_response(&raw);
            debug!("{}: '{}' read as {}", self.instrument_id, path, value);
            self.live.set(path, value.clone());
            self.record_first_observation(path, &value);
        } else {
            debug!("{}: '{}' served from cache", self.instrument_id, path);
        }
        self.live.get(path).map(Clone::clone)
    }

    /// Run `body` with `path` temporarily set to `temp_value`, restoring the
    /// original value on every exit path.
    ///
    /// The restore runs whether `body` succeeded or failed. A failed restore
    /// is never swallowed: it supersedes and propagates, with the body's own
    /// error (if any) logged first.
    pub fn temp_config<R>(
        &mut self,
        path: &str,
        temp_value: impl Into<ParamValue>,
        force_hardware: bool,
        body: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let original = self.get_config_param(path, force_hardware)?;
        self.set_config_param(path, temp_value, force_hardware)?;
        let outcome = body(self);
        match self.set_config_param(path, original, force_hardware) {
            Ok(_) => outcome,
            Err(restore_err) => {
                if let Err(body_err) = &outcome {
                    error!(
                        "{}: scoped override of '{}' failed before restore: {}",
                        self.instrument_id, path, body_err
                    );
                }
                Err(restore_err)
            }
        }
    }

    /// Copy `subgroup` of `live` into `dest`.
    ///
    /// `default` and `init` are reference/history snapshots and are rejected
    /// as destinations. With `overwrite` false the destination's existing
    /// contents are kept and merged into, mirroring file semantics.
    pub fn save_config(&mut self, dest: SaveDest<'_>, subgroup: &str, overwrite: bool) -> Result<()> {
        match dest {
            SaveDest::Snapshot(name) => {
                if name == DEFAULT || name == INIT {
                    return Err(CacheError::Access(name.to_string()));
                }
                if name == LIVE {
                    return Ok(());
                }
                let source = self.live.clone();
                let target = self.user_snapshots.entry(name.to_string()).or_default();
                if overwrite {
                    *target = ConfigStore::new();
                }
                target.merge(&source, subgroup);
            }
            SaveDest::File(file) => self.live.save(file, subgroup, overwrite)?,
            SaveDest::Store(store) => {
                if overwrite {
                    *store = ConfigStore::new();
                }
                store.merge(&self.live, subgroup);
            }
        }
        Ok(())
    }

    /// Load `subgroup` of `source` into the engine and push it to hardware.
    ///
    /// The caller is asserting a known-good state, so the push is one
    /// unconditional bulk write that bypasses change detection, and the
    /// loaded values overwrite both `live` and `init`.
    pub fn load_config(&mut self, source: LoadSource<'_>, subgroup: &str) -> Result<()> {
        let loaded = match source {
            LoadSource::Snapshot(name) => {
                if name == DEFAULT {
                    self.ensure_defaults_loaded()?;
                }
                self.snapshot(name)
                    .cloned()
                    .ok_or_else(|| CacheError::NotFound(name.to_string()))?
            }
            LoadSource::File(file) => ConfigStore::from_file(file, subgroup)?,
            LoadSource::Store(store) => store.clone(),
        };
        let pairs = loaded.flatten(subgroup);
        if pairs.is_empty() {
            warn!(
                "{}: nothing to load under '{}'",
                self.instrument_id, subgroup
            );
            return Ok(());
        }
        let commands: Vec<String> = pairs
            .iter()
            .map(|(path, value)| self.set_command(path, value))
            .collect();
        self.ensure_hardware_ready()?;
        self.transport.write(&commands.join(";"))?;
        info!(
            "{}: pushed {} loaded parameters",
            self.instrument_id,
            pairs.len()
        );
        for (path, value) in pairs {
            self.live.set(&path, value.clone());
            self.init.set(&path, value);
        }
        Ok(())
    }

    /// Walk the hardware's full reported configuration and write it out as
    /// this instrument's default file.
    ///
    /// Bulk replies can be ambiguous where a path is both a value and a
    /// namespace, so every discovered leaf is re-queried individually.
    /// Parameters whose individual query fails at the transport are
    /// legitimately inapplicable to the current hardware mode; they are
    /// logged and skipped. Any other failure is fatal.
    pub fn generate_defaults(&mut self, file: &Path, overwrite: bool) -> Result<()> {
        self.ensure_hardware_ready()?;
        let bulk = self.bulk_query.clone();
        let raw = self.transport.query(&bulk)?;
        let discovered = ConfigStore::from_bulk_response(&raw);
        let mut defaults = ConfigStore::new();
        let mut skipped = 0usize;
        for (path, _) in discovered.flatten("") {
            let command = self.query_command(&path);
            match self.transport.query(&command) {
                Ok(reply) => {
                    let value = self.parse_response(&reply);
                    defaults.set(&path, value);
                }
                Err(err) if err.is_transport() => {
                    warn!("{}: skipping '{}': {}", self.instrument_id, path, err);
                    skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }
        defaults.save(file, "", overwrite)?;
        info!(
            "{}: wrote defaults to {} ({} skipped)",
            self.instrument_id,
            file.display(),
            skipped
        );
        Ok(())
    }

    /// Path of this instrument's default file: the defaults directory (or
    /// the platform data dir) plus the sanitized instrument id.
    pub fn default_filename(&self) -> PathBuf {
        let dir = self.defaults_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("scpi-cache")
                .join("defaults")
        });
        let sanitized: String = self
            .instrument_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        dir.join(format!("{sanitized}.json"))
    }

    fn ensure_defaults_loaded(&mut self) -> Result<()> {
        if self.defaults.is_some() {
            return Ok(());
        }
        let file = self.default_filename();
        let store = ConfigStore::from_file(&file, "")?;
        info!(
            "{}: loaded defaults from {}",
            self.instrument_id,
            file.display()
        );
        self.defaults = Some(store);
        Ok(())
    }
}
