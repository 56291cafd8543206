//! # SCPI Configuration Cache
//!
//! Remote, stateful control of laboratory test instruments over textual
//! command protocols (VISA/GPIB-style `write`/`query` primitives). The crate
//! maintains an in-memory mirror of an instrument's internal settings,
//! decides when a parameter access must actually touch hardware versus being
//! served from cache, and supports snapshotting, merging, and persisting
//! configuration subtrees.
//!
//! ## Crate Structure
//!
//! The library is organized into several modules, each with a distinct
//! responsibility:
//!
//! - **`store`**: The path-addressed hierarchical store, `ConfigStore`. A
//!   tree keyed by `:`-separated paths where a node can be a scalar, a
//!   namespace, or both at once, with flatten/merge/serialize operations and
//!   bulk-response parsing.
//! - **`cache`**: The cache and sync engine, `ConfigCache`. Owns named
//!   store snapshots (`live`, `init`, `default`, user-named), performs
//!   change-detected writes and read-through queries, scoped temporary
//!   overrides, snapshot save/load, and default-file generation.
//! - **`channel`**: Multi-channel fan-out. `ChannelBank` shares one session
//!   between per-channel engines; `MultiChannelCache` adds array/dict batch
//!   operations across channels.
//! - **`transport`**: The `Transport` trait consumed by the engine. The
//!   physical session (GPIB, TCP, Prologix) lives outside this crate.
//! - **`value`**: `ParamValue`, the tagged scalar carried over the wire,
//!   with the ordered response parse chain.
//! - **`settings`**: Deployment configuration loaded from TOML.
//! - **`error`**: The `CacheError` taxonomy shared across the crate.
//!
//! ## Example
//!
//! ```rust,ignore
//! use scpi_cache::{ConfigCache, ParamValue};
//!
//! let mut scope = ConfigCache::new(session, "TEKTRONIX,DPO4034");
//!
//! // First write goes to hardware, the identical second one is absorbed.
//! scope.set_config_param("ACQUIRE:NUMAVG", 16, false)?;
//! scope.set_config_param("ACQUIRE:NUMAVG", 16, false)?;
//!
//! // Served from cache after the first query.
//! let avg = scope.get_config_param("ACQUIRE:NUMAVG", false)?;
//!
//! // Scoped override, restored even if the closure fails.
//! scope.temp_config("ACQUIRE:STOPAFTER", "SEQUENCE", false, |scope| {
//!     scope.set_config_param("ACQUIRE:STATE", 1, false)?;
//!     Ok(())
//! })?;
//! ```

pub mod cache;
pub mod channel;
pub mod error;
pub mod settings;
pub mod store;
pub mod transport;
pub mod value;

pub use cache::{CommandFormat, ConfigCache, LoadSource, SaveDest, DEFAULT, INIT, LIVE};
pub use channel::{ChannelBank, ChannelTransport, MultiChannelCache};
pub use error::{CacheError, Result};
pub use settings::Settings;
pub use store::ConfigStore;
pub use transport::{shared, SharedSession, Transport};
pub use value::ParamValue;
