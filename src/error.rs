//! # Error Handling
//!
//! Error taxonomy for the flow runtime. Errors are layered the same way the
//! runtime is:
//!
//! - **[`PacketError`]**: ownership violations on information packets
//! - **[`PortError`]**: wiring, direction and state violations on ports,
//!   plus the end-of-stream condition that terminates receive loops
//! - **[`ComponentError`]**: anything a component's `run()` can fail with,
//!   including command and file failures raised by file operators
//! - **[`GraphError`]**: what the driver sees from [`Multigraph::run`](crate::Multigraph::run)
//!
//! ## End of stream is not a failure
//!
//! [`PortError::EndOfStream`] travels through the same `Result` channel as
//! real errors so that `?` ends a receive loop, but the scheduler treats a
//! component that stops on it as completed. Use
//! [`ComponentError::is_end_of_stream`] to tell the two apart.
//!
//! ## Propagation
//!
//! Port and packet errors fail the offending component immediately. Any
//! component failure other than end-of-stream is logged with the component
//! name and cancels the rest of the graph; the driver receives
//! [`GraphError::ComponentFailed`] naming the component and the cause.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by packet ownership bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
  /// The packet already has an owner; ownership moves only through `copy()`.
  #[error("packet is owned by '{owner}', copy it before handing it to '{requested}'")]
  Ownership {
    /// Component currently owning the packet.
    owner: String,
    /// Component that tried to take or send the packet.
    requested: String,
  },
}

/// Errors raised by port operations.
///
/// Ports are identified as `component:port` in messages; unregistered ports
/// show `<unregistered>` as component name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
  /// A register lookup missed.
  #[error("component {component}: port {port} does not exist")]
  NotExisting {
    /// Component whose register was searched.
    component: String,
    /// Requested port name.
    port: String,
  },
  /// The same pair of ports was connected twice.
  #[error("port {port} is already connected to {other}")]
  AlreadyConnected {
    /// Port on which connect was called.
    port: String,
    /// Port it is already connected to.
    other: String,
  },
  /// The port already belongs to a component, or the name is taken.
  #[error("port {port} already exists")]
  AlreadyExisting {
    /// Offending port.
    port: String,
  },
  /// Send or receive on a port without connections that is not optional.
  #[error("port {port} is disconnected")]
  Disconnected {
    /// Offending port.
    port: String,
  },
  /// Send or receive after the port has processed end-of-stream.
  #[error("port {port} is closed")]
  Closed {
    /// Offending port.
    port: String,
  },
  /// An output port was used to receive (or as a connection destination).
  #[error("port {port} is an OutputPort, it cannot be used to receive")]
  OutputOnly {
    /// Offending port.
    port: String,
  },
  /// An input port was used to send (or as a connection source).
  #[error("port {port} is an InputPort, it cannot be used to send")]
  InputOnly {
    /// Offending port.
    port: String,
  },
  /// A second upstream connection was attempted on an input port.
  #[error("port {port}: an InputPort only supports one incoming connection")]
  MultipleConnection {
    /// Offending port.
    port: String,
  },
  /// An input port was given both an initial packet and an upstream connection.
  #[error("port {port} cannot be fed by both an initial packet and a connection")]
  InitialPacketConflict {
    /// Offending port.
    port: String,
  },
  /// The payload does not have the type the receiver asked for.
  #[error("port {port} received a {found} payload, expected {expected}")]
  TypeMismatch {
    /// Receiving port.
    port: String,
    /// Requested type.
    expected: &'static str,
    /// Type carried by the packet.
    found: &'static str,
  },
  /// The stream on this port is exhausted.
  #[error("port {port} reached end of stream")]
  EndOfStream {
    /// Port that observed the end of stream.
    port: String,
  },
  /// A packet ownership violation while sending or receiving.
  #[error(transparent)]
  Packet(#[from] PacketError),
}

impl PortError {
  /// Returns `true` for the end-of-stream condition.
  pub fn is_end_of_stream(&self) -> bool {
    matches!(self, PortError::EndOfStream { .. })
  }
}

/// Errors a component's execution entry point can fail with.
#[derive(Error, Debug)]
pub enum ComponentError {
  /// A port or packet contract violation (or end of stream).
  #[error(transparent)]
  Port(#[from] PortError),
  /// An external process exited with a non-zero status.
  #[error("component {component}: running command '{command}' failed with output: {stderr}")]
  CommandFailed {
    /// Component running the command.
    component: String,
    /// Command line after placeholder substitution.
    command: String,
    /// Exit code, if the process was not killed by a signal.
    code: Option<i32>,
    /// Captured standard error, trimmed.
    stderr: String,
  },
  /// An output needs a path formatter and none usable is configured.
  #[error("component {component}: port {port} does not have a path formatter specified")]
  FormatterMissing {
    /// Component owning the port.
    component: String,
    /// Output port (or placeholder) without a formatter.
    port: String,
  },
  /// Expected output artifacts are missing after production.
  #[error("component {component}: following files are missing {paths:?}, check the command")]
  FileNotExisting {
    /// Component that should have produced the files.
    component: String,
    /// Missing paths.
    paths: Vec<PathBuf>,
  },
  /// I/O failure while running a component.
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  /// A nested graph failed.
  #[error(transparent)]
  Graph(Box<GraphError>),
  /// The component task panicked.
  #[error("component panicked: {0}")]
  Panicked(String),
  /// Component-specific failure.
  #[error("{0}")]
  Other(String),
}

impl ComponentError {
  /// Returns `true` if the component stopped because an input was exhausted.
  pub fn is_end_of_stream(&self) -> bool {
    matches!(self, ComponentError::Port(err) if err.is_end_of_stream())
  }
}

impl From<PacketError> for ComponentError {
  fn from(err: PacketError) -> Self {
    ComponentError::Port(PortError::Packet(err))
  }
}

impl From<GraphError> for ComponentError {
  fn from(err: GraphError) -> Self {
    ComponentError::Graph(Box::new(err))
  }
}

/// Errors reported by graph construction and execution.
#[derive(Error, Debug)]
pub enum GraphError {
  /// A member component failed; the rest of the graph was cancelled.
  #[error("component '{component}' failed: {source}")]
  ComponentFailed {
    /// Name of the failing component.
    component: String,
    /// Underlying cause.
    #[source]
    source: ComponentError,
  },
  /// A port operation failed while wiring the graph.
  #[error(transparent)]
  Port(#[from] PortError),
  /// The port is not attached to any component, so its owner cannot be registered.
  #[error("port {port} does not belong to a component")]
  Unregistered {
    /// Offending port.
    port: String,
  },
}

/// Errors loading a [`GraphConfig`](crate::GraphConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
  /// Reading the configuration file failed.
  #[error("failed to read configuration: {0}")]
  Io(#[from] std::io::Error),
  /// The configuration is not valid JSON for `GraphConfig`.
  #[error("invalid configuration: {0}")]
  Parse(#[from] serde_json::Error),
}
