//! Multi-channel fan-out over one shared instrument session.
//!
//! Mainframe-style instruments expose N channels behind a single physical
//! session; a channel-select command must immediately precede the command it
//! scopes. [`ChannelBank`] owns the shared session and the select-command
//! template; [`ChannelTransport`] emits the select and the scoped command
//! under one continuous lock so nothing can interleave; and
//! [`MultiChannelCache`] composes one [`ConfigCache`] per active channel,
//! reusing per-parameter change detection so a partial update never forces
//! unrelated channels to write.

use crate::cache::{CommandFormat, ConfigCache};
use crate::error::{CacheError, Result};
use crate::transport::{shared, SharedSession, Transport};
use crate::value::ParamValue;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Shared session plus the bank-level facts: declared channel capacity and
/// the channel-select command template (rendered with a `{channel}` slot).
pub struct ChannelBank<T> {
    session: SharedSession<T>,
    capacity: u32,
    select_template: String,
}

impl<T: Transport> ChannelBank<T> {
    /// Wrap `transport` as a bank of `capacity` channels.
    pub fn new(transport: T, capacity: u32, select_template: impl Into<String>) -> Self {
        Self {
            session: shared(transport),
            capacity,
            select_template: select_template.into(),
        }
    }

    /// Declared channel capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// A handle on the shared session.
    pub fn session(&self) -> SharedSession<T> {
        self.session.clone()
    }

    fn select_command(&self, channel: u32) -> Result<String> {
        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("channel".to_string(), channel.to_string());
        strfmt::strfmt(&self.select_template, &vars)
            .map_err(|err| CacheError::CommandFormat(err.to_string()))
    }

    /// Transport scoped to `channel`, bounds-checked against the capacity.
    pub fn channel_transport(&self, channel: u32) -> Result<ChannelTransport<T>> {
        if channel >= self.capacity {
            return Err(CacheError::Channel(format!(
                "channel {channel} exceeds bank capacity {}",
                self.capacity
            )));
        }
        Ok(ChannelTransport {
            session: self.session.clone(),
            select: self.select_command(channel)?,
            channel,
        })
    }
}

/// Transport that scopes every call to one channel of a shared session.
///
/// The select command and the scoped command are issued under a single lock
/// of the session, so concurrent holders of the same bank cannot interleave
/// between them.
#[derive(Debug)]
pub struct ChannelTransport<T> {
    session: SharedSession<T>,
    select: String,
    channel: u32,
}

impl<T> ChannelTransport<T> {
    /// The channel this transport addresses.
    pub fn channel(&self) -> u32 {
        self.channel
    }
}

impl<T: Transport> Transport for ChannelTransport<T> {
    fn open(&mut self) -> Result<()> {
        self.session.lock().open()
    }

    fn close(&mut self) -> Result<()> {
        self.session.lock().close()
    }

    fn write(&mut self, command: &str) -> Result<()> {
        let mut session = self.session.lock();
        session.write(&self.select)?;
        session.write(command)
    }

    fn query_with_timeout(
        &mut self,
        command: &str,
        timeout_override: Option<Duration>,
    ) -> Result<String> {
        let mut session = self.session.lock();
        session.write(&self.select)?;
        session.query_with_timeout(command, timeout_override)
    }

    fn timeout(&self) -> Duration {
        self.session.lock().timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.session.lock().set_timeout(timeout);
    }
}

/// N per-channel cache engines behind one bank, in declaration order.
#[derive(Debug)]
pub struct MultiChannelCache<T> {
    channels: Vec<u32>,
    engines: Vec<ConfigCache<ChannelTransport<T>>>,
}

impl<T: Transport> MultiChannelCache<T> {
    /// Activate `channels` on `bank`.
    ///
    /// Fails with [`CacheError::Channel`] when any requested channel is not
    /// below the bank's declared capacity.
    pub fn new(bank: &ChannelBank<T>, channels: Vec<u32>, instrument_id: &str) -> Result<Self> {
        let mut engines = Vec::with_capacity(channels.len());
        for &channel in &channels {
            let transport = bank.channel_transport(channel)?;
            engines.push(ConfigCache::new(
                transport,
                format!("{instrument_id}-ch{channel}"),
            ));
        }
        Ok(Self { channels, engines })
    }

    /// Apply command syntax flags to every sub-engine.
    pub fn with_format(mut self, format: &CommandFormat) -> Self {
        self.engines = self
            .engines
            .into_iter()
            .map(|engine| engine.with_format(format.clone()))
            .collect();
        self
    }

    /// Active channels, in declaration order.
    pub fn channels(&self) -> &[u32] {
        &self.channels
    }

    /// The sub-engine addressing `channel`.
    pub fn engine(&mut self, channel: u32) -> Result<&mut ConfigCache<ChannelTransport<T>>> {
        let index = self
            .channels
            .iter()
            .position(|&c| c == channel)
            .ok_or_else(|| CacheError::Channel(format!("channel {channel} is not active")))?;
        Ok(&mut self.engines[index])
    }

    /// Read `path` on every channel, one value per channel in declaration
    /// order, strictly in sequence.
    pub fn get_config_array(&mut self, path: &str) -> Result<Vec<ParamValue>> {
        self.engines
            .iter_mut()
            .map(|engine| engine.get_config_param(path, false))
            .collect()
    }

    /// Write one value per channel, in declaration order.
    ///
    /// Fails with [`CacheError::Channel`] unless exactly one value is given
    /// per active channel. Returns whether any sub-engine touched hardware.
    pub fn set_config_array(
        &mut self,
        path: &str,
        values: &[ParamValue],
        force_hardware: bool,
    ) -> Result<bool> {
        if values.len() != self.engines.len() {
            return Err(CacheError::Channel(format!(
                "expected {} values for '{}', got {}",
                self.engines.len(),
                path,
                values.len()
            )));
        }
        let mut wrote_any = false;
        for (engine, value) in self.engines.iter_mut().zip(values) {
            wrote_any |= engine.set_config_param(path, value.clone(), force_hardware)?;
        }
        Ok(wrote_any)
    }

    /// Read `path` on every channel, keyed by channel identifier.
    pub fn get_config_dict(&mut self, path: &str) -> Result<BTreeMap<u32, ParamValue>> {
        let values = self.get_config_array(path)?;
        Ok(self.channels.iter().copied().zip(values).collect())
    }

    /// Write `path` on the channels named in `overrides` only.
    ///
    /// Reads the full array, patches the requested entries, and delegates to
    /// [`MultiChannelCache::set_config_array`]; per-channel change detection
    /// then spares the channels that were not patched.
    pub fn set_config_dict(
        &mut self,
        path: &str,
        overrides: &BTreeMap<u32, ParamValue>,
        force_hardware: bool,
    ) -> Result<bool> {
        for channel in overrides.keys() {
            if !self.channels.contains(channel) {
                return Err(CacheError::Channel(format!(
                    "channel {channel} is not active"
                )));
            }
        }
        let mut values = self.get_config_array(path)?;
        for (index, channel) in self.channels.iter().enumerate() {
            if let Some(value) = overrides.get(channel) {
                values[index] = value.clone();
            }
        }
        self.set_config_array(path, &values, force_hardware)
    }
}
