//! # Port Registers
//!
//! A [`PortRegister`] is the ordered, named collection of one component's
//! ports in one direction. Besides lookup it provides the two multi-port
//! primitives components are built from:
//!
//! - [`PortRegister::receive_packets`]: a fan-in barrier. One receive is
//!   issued on every open port and the call returns only once each of them
//!   has produced a packet. End of stream on any port ends the whole call.
//! - [`PortRegister::send_packets`]: concurrent fan-out of a name→packet
//!   mapping to the matching ports.
//!
//! Lookups never fall back to a default: a missing name is
//! [`PortError::NotExisting`].

use crate::component::ComponentHandle;
use crate::error::PortError;
use crate::packet::Packet;
use crate::port::Port;
use async_stream::stream;
use futures::Stream;
use futures::future::{join_all, try_join_all};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// One packet per port name, as produced by [`PortRegister::receive_packets`].
pub type PacketSet = HashMap<String, Packet>;

/// Named collection of a component's ports in one direction.
pub struct PortRegister {
  owner: ComponentHandle,
  ports: RwLock<Vec<(String, Port)>>,
}

impl PortRegister {
  /// Creates an empty register owned by `owner`.
  pub fn new(owner: ComponentHandle) -> Self {
    Self {
      owner,
      ports: RwLock::new(Vec::new()),
    }
  }

  /// Returns the component owning this register.
  pub fn owner(&self) -> &ComponentHandle {
    &self.owner
  }

  /// Adds `port` under its own name.
  pub fn add(&self, port: Port) -> Result<Port, PortError> {
    let name = port.name();
    self.add_as(port, &name)
  }

  /// Adds `port` under `name`, making this register's component its owner.
  ///
  /// # Errors
  ///
  /// [`PortError::AlreadyExisting`] if the port already belongs to a
  /// component or the name is taken.
  pub fn add_as(&self, port: Port, name: &str) -> Result<Port, PortError> {
    if port.component().is_some() {
      return Err(PortError::AlreadyExisting {
        port: port.qualified_name(),
      });
    }
    self.ensure_free(name)?;
    port.set_name(name);
    port.set_component(&self.owner)?;
    self.insert(name, port.clone());
    Ok(port)
  }

  /// Exposes an existing port (usually an inner component's) under `name`
  /// without changing its owner.
  pub fn export(&self, port: &Port, name: &str) -> Result<Port, PortError> {
    self.ensure_free(name)?;
    self.insert(name, port.clone());
    Ok(port.clone())
  }

  fn ensure_free(&self, name: &str) -> Result<(), PortError> {
    if self.contains(name) {
      return Err(PortError::AlreadyExisting {
        port: format!("{}:{}", self.owner.name(), name),
      });
    }
    Ok(())
  }

  fn insert(&self, name: &str, port: Port) {
    if let Ok(mut ports) = self.ports.write() {
      ports.push((name.to_string(), port));
    }
  }

  /// Looks up a port by name.
  pub fn get(&self, name: &str) -> Result<Port, PortError> {
    self
      .ports
      .read()
      .ok()
      .and_then(|ports| {
        ports
          .iter()
          .find(|(candidate, _)| candidate == name)
          .map(|(_, port)| port.clone())
      })
      .ok_or_else(|| PortError::NotExisting {
        component: self.owner.name().to_string(),
        port: name.to_string(),
      })
  }

  /// Returns `true` if a port is registered under `name`.
  pub fn contains(&self, name: &str) -> bool {
    self
      .ports
      .read()
      .map(|ports| ports.iter().any(|(candidate, _)| candidate == name))
      .unwrap_or(false)
  }

  /// Port names in registration order.
  pub fn names(&self) -> Vec<String> {
    self.entries().into_iter().map(|(name, _)| name).collect()
  }

  /// Ports in registration order.
  pub fn ports(&self) -> Vec<Port> {
    self.entries().into_iter().map(|(_, port)| port).collect()
  }

  /// `(name, port)` pairs in registration order.
  pub fn entries(&self) -> Vec<(String, Port)> {
    self
      .ports
      .read()
      .map(|ports| ports.clone())
      .unwrap_or_default()
  }

  /// Number of registered ports.
  pub fn len(&self) -> usize {
    self.ports.read().map(|ports| ports.len()).unwrap_or(0)
  }

  /// Returns `true` if no port is registered.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Receives one packet from every open port.
  ///
  /// Returns only once every open port has produced a packet; the order in
  /// which they arrive is not constrained.
  ///
  /// # Errors
  ///
  /// [`PortError::EndOfStream`] as soon as any port reaches end of stream,
  /// or when no port is open anymore. Any other port error is returned as is.
  pub async fn receive_packets(&self) -> Result<PacketSet, PortError> {
    let open: Vec<(String, Port)> = self
      .entries()
      .into_iter()
      .filter(|(_, port)| port.is_open())
      .collect();
    if open.is_empty() {
      return Err(PortError::EndOfStream {
        port: format!("{}:*", self.owner.name()),
      });
    }
    let received = try_join_all(open.into_iter().map(|(name, port)| async move {
      let packet = port.receive_packet().await?;
      Ok::<_, PortError>((name, packet))
    }))
    .await?;
    Ok(received.into_iter().collect())
  }

  /// Sends each packet of `packets` on the port of the same name, concurrently.
  ///
  /// Every send is attempted; the first failure is returned.
  pub async fn send_packets(&self, packets: PacketSet) -> Result<(), PortError> {
    let mut targets = Vec::with_capacity(packets.len());
    for (name, packet) in packets {
      targets.push((self.get(&name)?, packet));
    }
    let results = join_all(
      targets
        .into_iter()
        .map(|(port, packet)| async move { port.send_packet(packet).await }),
    )
    .await;
    results.into_iter().collect()
  }

  /// Sends `value` on every open port of the register.
  pub async fn send_all<T: Any + Send + Sync>(&self, value: T) -> Result<(), PortError> {
    let packet = Packet::new(value);
    let ports: Vec<Port> = self.ports().into_iter().filter(Port::is_open).collect();
    try_join_all(ports.iter().map(|port| port.send_packet(packet.copy()))).await?;
    Ok(())
  }

  /// Closes every port of the register.
  pub async fn close_all(&self) -> Result<(), PortError> {
    let ports = self.ports();
    let results = join_all(ports.iter().map(Port::close)).await;
    results.into_iter().collect()
  }

  /// Consumes the register as a sequence of packet sets, ending when any
  /// port reaches end of stream or every port is closed.
  pub fn packet_sets(&self) -> impl Stream<Item = Result<PacketSet, PortError>> + Send + '_ {
    stream! {
      loop {
        match self.receive_packets().await {
          Ok(set) => yield Ok(set),
          Err(PortError::EndOfStream { .. }) | Err(PortError::Closed { .. }) => break,
          Err(err) => {
            yield Err(err);
            break;
          }
        }
      }
    }
  }

  /// Ports with a pending initial packet, and its rendering.
  pub fn pending_initials(&self) -> Vec<(Port, String)> {
    self
      .ports()
      .into_iter()
      .filter_map(|port| port.pending_initial().map(|label| (port, label)))
      .collect()
  }
}

impl fmt::Debug for PortRegister {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PortRegister")
      .field("owner", &self.owner.name())
      .field("ports", &self.names())
      .finish()
  }
}
