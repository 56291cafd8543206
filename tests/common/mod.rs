//! Shared test doubles: a simulated instrument that applies commands to an
//! internal store, and a loopback transport pairing two engines through one
//! pending-message queue.

// Not every test binary exercises every helper.
#![allow(dead_code)]

use scpi_cache::{CacheError, CommandFormat, ConfigStore, ParamValue, Result, Transport};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Format used throughout the integration tests: the simulated instrument
/// echoes command headers in its replies and needs no handshake writes.
pub fn echo_format() -> CommandFormat {
    CommandFormat {
        header_echo: true,
        verbose_query: false,
        leading_separator: true,
        intervening_space: true,
    }
}

/// One transport-level interaction recorded by [`SimInstrument`].
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// A channel-select command.
    Select(u32),
    /// A handshake setup command (`HEADER OFF`, `VERBOSE ON`).
    Setup(String),
    /// A settings write on the currently selected channel.
    Write { channel: u32, command: String },
    /// A query on the currently selected channel.
    Query { channel: u32, command: String },
}

/// Simulated instrument: writes mutate per-channel stores, queries answer
/// from them with the command header echoed, every interaction is logged.
#[derive(Debug)]
pub struct SimInstrument {
    stores: HashMap<u32, ConfigStore>,
    current: u32,
    events: Vec<SimEvent>,
    fail_paths: HashSet<String>,
    fail_write_paths: HashSet<String>,
    timeout: Duration,
}

impl SimInstrument {
    pub fn new() -> Self {
        Self {
            stores: HashMap::new(),
            current: 0,
            events: Vec::new(),
            fail_paths: HashSet::new(),
            fail_write_paths: HashSet::new(),
            timeout: Duration::from_secs(1),
        }
    }

    /// Pre-load a parameter on a channel (0 for single-engine use).
    pub fn seed(&mut self, channel: u32, path: &str, value: impl Into<ParamValue>) {
        self.stores.entry(channel).or_default().set(path, value);
    }

    /// Make individual queries of `path` fail at the transport level.
    pub fn fail_on(&mut self, path: &str) {
        self.fail_paths.insert(path.to_string());
    }

    /// Make writes mentioning `path` fail at the transport level.
    pub fn fail_write_on(&mut self, path: &str) {
        self.fail_write_paths.insert(path.to_string());
    }

    /// Current value of a parameter as the instrument holds it.
    pub fn value_at(&self, channel: u32, path: &str) -> Option<ParamValue> {
        self.stores
            .get(&channel)
            .and_then(|store| store.get(path).ok().cloned())
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Settings writes recorded for `channel` (selects and setup excluded).
    pub fn write_count(&self, channel: u32) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, SimEvent::Write { channel: c, .. } if *c == channel))
            .count()
    }

    pub fn query_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, SimEvent::Query { .. }))
            .count()
    }

    fn apply_set(&mut self, part: &str) {
        let part = part.trim().trim_start_matches(':');
        if let Some((path, value)) = part.split_once(' ') {
            self.stores
                .entry(self.current)
                .or_default()
                .set(path, ParamValue::parse(value));
        }
    }
}

impl Transport for SimInstrument {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, command: &str) -> Result<()> {
        if let Some(channel) = command
            .strip_prefix("CH ")
            .and_then(|rest| rest.trim().parse::<u32>().ok())
        {
            self.current = channel;
            self.events.push(SimEvent::Select(channel));
            return Ok(());
        }
        if command == "HEADER OFF" || command == "VERBOSE ON" {
            self.events.push(SimEvent::Setup(command.to_string()));
            return Ok(());
        }
        if self
            .fail_write_paths
            .iter()
            .any(|path| command.contains(path.as_str()))
        {
            return Err(CacheError::transport(command, "write rejected"));
        }
        self.events.push(SimEvent::Write {
            channel: self.current,
            command: command.to_string(),
        });
        for part in command.split(';') {
            self.apply_set(part);
        }
        Ok(())
    }

    fn query_with_timeout(
        &mut self,
        command: &str,
        _timeout_override: Option<Duration>,
    ) -> Result<String> {
        self.events.push(SimEvent::Query {
            channel: self.current,
            command: command.to_string(),
        });
        if command == "SET?" {
            let store = self.stores.entry(self.current).or_default();
            let parts: Vec<String> = store
                .flatten("")
                .into_iter()
                .map(|(path, value)| format!(":{path} {value}"))
                .collect();
            return Ok(parts.join(";"));
        }
        let path = command.trim_start_matches(':').trim_end_matches('?');
        if self.fail_paths.contains(path) {
            return Err(CacheError::transport(command, "parameter not applicable"));
        }
        match self.value_at(self.current, path) {
            Some(value) => Ok(format!(":{path} {value}")),
            None => Err(CacheError::transport(command, "no such parameter")),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

/// One end of a shared pending-message queue.
///
/// Writes enqueue the raw command text; queries consume the oldest pending
/// message and fail when nothing is pending, which is how two engines
/// sharing a session observe each other's traffic.
pub struct Loopback {
    pending: Arc<Mutex<VecDeque<String>>>,
    timeout: Duration,
}

impl Loopback {
    /// Two transports over one queue.
    pub fn pair() -> (Self, Self) {
        let pending = Arc::new(Mutex::new(VecDeque::new()));
        (
            Self {
                pending: pending.clone(),
                timeout: Duration::from_secs(1),
            },
            Self {
                pending,
                timeout: Duration::from_secs(1),
            },
        )
    }
}

impl Transport for Loopback {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, command: &str) -> Result<()> {
        self.pending
            .lock()
            .map_err(|_| CacheError::transport(command, "queue poisoned"))?
            .push_back(command.to_string());
        Ok(())
    }

    fn query_with_timeout(
        &mut self,
        command: &str,
        _timeout_override: Option<Duration>,
    ) -> Result<String> {
        self.pending
            .lock()
            .map_err(|_| CacheError::transport(command, "queue poisoned"))?
            .pop_front()
            .ok_or_else(|| CacheError::transport(command, "no pending message"))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}
