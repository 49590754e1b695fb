//! # Graph Configuration
//!
//! [`GraphConfig`] carries the settings a [`Multigraph`](crate::Multigraph)
//! shares with its members: the working directory file operators resolve
//! their outputs against, and the queue capacity used for connections the
//! graph creates.
//!
//! ```rust
//! use flowweave::{Capacity, GraphConfig};
//!
//! let config = GraphConfig::from_json_str(r#"{
//!   "workdir": "/tmp/run/",
//!   "connection_capacity": { "bounded": 64 }
//! }"#).unwrap();
//! assert_eq!(config.connection_capacity, Capacity::Bounded(64));
//! ```

use crate::connection::Capacity;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings shared by a graph and its members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
  /// Working directory; `None` inherits the parent graph's (or `./`).
  pub workdir: Option<PathBuf>,
  /// Capacity of connections created through the graph.
  pub connection_capacity: Capacity,
}

impl GraphConfig {
  /// Parses a configuration from JSON.
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(json)?)
  }

  /// Reads a JSON configuration file.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Self::from_json_str(&contents)
  }

  /// Sets the working directory.
  #[must_use]
  pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
    self.workdir = Some(workdir.into());
    self
  }

  /// Sets the connection capacity.
  #[must_use]
  pub fn with_capacity(mut self, capacity: Capacity) -> Self {
    self.connection_capacity = capacity;
    self
  }
}
