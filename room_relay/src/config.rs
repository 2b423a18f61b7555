//! Relay configuration
//!
//! Parsed with clap; every flag falls back to a `RELAY_*` environment
//! variable, then to a compiled default:
//!
//! | Variable | Flag | Default |
//! |----------|------|---------|
//! | `RELAY_ROOM_CAPACITY` | `--room-capacity` | `4` (at most 4) |
//! | `RELAY_STATE_FILE` | `--state-file` | `room_relay_state.json` |
//! | `RELAY_CONNECTION_IDLE_MS` | `--connection-idle-ms` | `30000` |
//! | `RELAY_ROOM_IDLE_MS` | `--room-idle-ms` | `600000` |
//! | `RELAY_SEED_ROOMS` | `--seed-rooms` | empty (comma separated room ids) |
//! | `RELAY_LOG` | `--log` | `info` |

use crate::error::ConfigError;
use crate::registry::DEFAULT_ROOM_CAPACITY;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

const DEFAULT_STATE_FILE: &str = "room_relay_state.json";
const DEFAULT_CONNECTION_IDLE_MS: u64 = 30_000;
const DEFAULT_ROOM_IDLE_MS: u64 = 10 * 60 * 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub room_capacity: usize,
    /// Snapshot file carrying state from one request to the next
    pub state_file: PathBuf,
    /// Poll silence after which a connection counts as lost
    pub connection_idle_ms: u64,
    /// How long an empty room survives before it is reclaimed
    pub room_idle_ms: u64,
    /// Rooms that exist from the first start
    pub seed_rooms: Vec<String>,
    /// tracing filter directive
    pub log_filter: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            room_capacity: DEFAULT_ROOM_CAPACITY,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            connection_idle_ms: DEFAULT_CONNECTION_IDLE_MS,
            room_idle_ms: DEFAULT_ROOM_IDLE_MS,
            seed_rooms: Vec::new(),
            log_filter: "info".to_string(),
        }
    }
}

/// Command line and environment surface of [`RelayConfig`]
#[derive(Parser, Debug)]
#[command(name = "room-relay")]
#[command(about = "Signaling relay for small peer-to-peer call rooms")]
pub struct Cli {
    /// Members allowed in one room
    #[arg(long, env = "RELAY_ROOM_CAPACITY", default_value_t = DEFAULT_ROOM_CAPACITY)]
    pub room_capacity: usize,

    /// Snapshot file
    #[arg(long, env = "RELAY_STATE_FILE", default_value = DEFAULT_STATE_FILE)]
    pub state_file: PathBuf,

    /// Poll silence, in milliseconds, treated as connection loss
    #[arg(long, env = "RELAY_CONNECTION_IDLE_MS", default_value_t = DEFAULT_CONNECTION_IDLE_MS)]
    pub connection_idle_ms: u64,

    /// Milliseconds an empty room is kept
    #[arg(long, env = "RELAY_ROOM_IDLE_MS", default_value_t = DEFAULT_ROOM_IDLE_MS)]
    pub room_idle_ms: u64,

    /// Room ids present from the first start
    #[arg(long, env = "RELAY_SEED_ROOMS", value_delimiter = ',')]
    pub seed_rooms: Vec<String>,

    /// Log filter
    #[arg(long, env = "RELAY_LOG", default_value = "info")]
    pub log: String,
}

impl From<Cli> for RelayConfig {
    fn from(cli: Cli) -> Self {
        Self {
            room_capacity: cli.room_capacity,
            state_file: cli.state_file,
            connection_idle_ms: cli.connection_idle_ms,
            room_idle_ms: cli.room_idle_ms,
            seed_rooms: cli
                .seed_rooms
                .iter()
                .map(|id| id.trim())
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
            log_filter: cli.log,
        }
    }
}

impl RelayConfig {
    /// Load from the environment. A WASI instance has no argv, so only the
    /// `RELAY_*` variables and the defaults apply.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_args(["room-relay"])
    }

    /// Parse an explicit command line; unset flags still read the environment
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::from(Cli::try_parse_from(args)?);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=DEFAULT_ROOM_CAPACITY).contains(&self.room_capacity) {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_ROOM_CAPACITY",
                value: self.room_capacity.to_string(),
            });
        }
        if self.connection_idle_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_CONNECTION_IDLE_MS",
                value: "0".to_string(),
            });
        }
        if self.room_idle_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_ROOM_IDLE_MS",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}
