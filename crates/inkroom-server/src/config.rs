//! Server configuration from the environment.

use crate::error::ServerError;
use std::net::SocketAddr;

pub const DEFAULT_ADDR: &str = "0.0.0.0:3030";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on (`INKROOM_ADDR`).
    pub addr: SocketAddr,
    /// Per-room broadcast buffer (`INKROOM_CHANNEL_CAPACITY`). A peer that
    /// falls further behind is resynchronized from history.
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3030)),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let mut config = Self::default();

        if let Some(value) = lookup("INKROOM_ADDR") {
            config.addr = value.parse().map_err(|_| ServerError::InvalidConfig {
                key: "INKROOM_ADDR",
                value: value.clone(),
            })?;
        }

        if let Some(value) = lookup("INKROOM_CHANNEL_CAPACITY") {
            config.channel_capacity = value
                .parse()
                .ok()
                .filter(|&capacity: &usize| capacity > 0)
                .ok_or(ServerError::InvalidConfig {
                    key: "INKROOM_CHANNEL_CAPACITY",
                    value,
                })?;
        }

        Ok(config)
    }
}
