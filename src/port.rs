//! # Ports
//!
//! A [`Port`] is a named, directional endpoint owned by exactly one
//! component. Output ports fan out: every packet sent is replicated (a fresh
//! envelope per destination, sharing the immutable payload) into each of the
//! port's connections. Input ports accept a single upstream connection, so
//! merging producers is always explicit.
//!
//! ## State machine
//!
//! A port starts open. It closes when it sends or receives end-of-stream, when
//! its one-shot initial packet has been delivered, or when [`Port::close`] is
//! called. Sending or receiving on a closed port fails with
//! [`PortError::Closed`], except on an input whose initial packet was
//! delivered: that one keeps reporting end-of-stream, so a receive loop ends
//! normally. The iteration protocol ([`Port::packets`]) simply ends.
//!
//! An input port is fed either by an initial packet or by a connection, never
//! both ([`PortError::InitialPacketConflict`]).
//!
//! ## Delivery order on receive
//!
//! 1. the initial packet (IIP), once, after which the port is closed
//! 2. queued seed packets, in the order they were seeded
//! 3. live connection traffic; with several connections the first arrival
//!    wins
//!
//! `Port` is a cheap handle (`Arc` inside); clones refer to the same port.

use crate::component::ComponentHandle;
use crate::connection::{Capacity, Connection};
use crate::error::{PacketError, PortError};
use crate::packet::{Kickstart, Packet};
use async_stream::stream;
use futures::Stream;
use futures::future::{select_all, try_join_all};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use tracing::{debug, warn};

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  /// Receives packets.
  Input,
  /// Sends packets.
  Output,
}

struct Initial {
  packet: Packet,
  label: String,
}

struct PortInner {
  id: u64,
  name: RwLock<String>,
  direction: Direction,
  owner: OnceLock<ComponentHandle>,
  connections: Mutex<Vec<Connection>>,
  open: AtomicBool,
  optional: AtomicBool,
  initial: Mutex<Option<Initial>>,
  initial_delivered: AtomicBool,
  seeds: Mutex<VecDeque<Packet>>,
}

/// A named, directional endpoint of a component.
#[derive(Clone)]
pub struct Port {
  inner: Arc<PortInner>,
}

/// Non-owning reference to a [`Port`], held by connections.
#[derive(Clone)]
pub struct WeakPort {
  inner: Weak<PortInner>,
}

impl WeakPort {
  /// Upgrades to a port handle if the port is still alive.
  pub fn upgrade(&self) -> Option<Port> {
    self.inner.upgrade().map(|inner| Port { inner })
  }
}

impl Port {
  fn with_direction(name: impl Into<String>, direction: Direction) -> Self {
    Self {
      inner: Arc::new(PortInner {
        id: NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed),
        name: RwLock::new(name.into()),
        direction,
        owner: OnceLock::new(),
        connections: Mutex::new(Vec::new()),
        open: AtomicBool::new(true),
        optional: AtomicBool::new(false),
        initial: Mutex::new(None),
        initial_delivered: AtomicBool::new(false),
        seeds: Mutex::new(VecDeque::new()),
      }),
    }
  }

  /// Creates an unregistered input port.
  pub fn input(name: impl Into<String>) -> Self {
    Self::with_direction(name, Direction::Input)
  }

  /// Creates an unregistered output port.
  pub fn output(name: impl Into<String>) -> Self {
    Self::with_direction(name, Direction::Output)
  }

  /// Marks the port optional: the component may run without it being connected.
  pub fn optional(self) -> Self {
    self.set_optional(true);
    self
  }

  /// Sets or clears the optional flag.
  pub fn set_optional(&self, optional: bool) {
    self.inner.optional.store(optional, Ordering::Release);
  }

  /// Returns the process-unique port identifier.
  pub fn id(&self) -> u64 {
    self.inner.id
  }

  /// Returns the port name.
  pub fn name(&self) -> String {
    self
      .inner
      .name
      .read()
      .map(|name| name.clone())
      .unwrap_or_default()
  }

  pub(crate) fn set_name(&self, name: &str) {
    if let Ok(mut slot) = self.inner.name.write() {
      *slot = name.to_string();
    }
  }

  /// Returns `component:port`, used in messages and DOT output.
  pub fn qualified_name(&self) -> String {
    match self.component() {
      Some(owner) => format!("{}:{}", owner.name(), self.name()),
      None => format!("<unregistered>:{}", self.name()),
    }
  }

  /// Returns the port direction.
  pub fn direction(&self) -> Direction {
    self.inner.direction
  }

  /// Returns `true` for input ports.
  pub fn is_input(&self) -> bool {
    self.inner.direction == Direction::Input
  }

  /// Returns `true` for output ports.
  pub fn is_output(&self) -> bool {
    self.inner.direction == Direction::Output
  }

  /// Returns the owning component, once registered.
  pub fn component(&self) -> Option<ComponentHandle> {
    self.inner.owner.get().cloned()
  }

  /// Sets the owning component. A port is owned exactly once.
  pub(crate) fn set_component(&self, owner: &ComponentHandle) -> Result<(), PortError> {
    self
      .inner
      .owner
      .set(owner.clone())
      .map_err(|_| PortError::AlreadyExisting {
        port: self.qualified_name(),
      })
  }

  /// Returns `true` until the port has processed end-of-stream.
  pub fn is_open(&self) -> bool {
    self.inner.open.load(Ordering::Acquire)
  }

  /// Returns `true` if the port may stay unconnected.
  pub fn is_optional(&self) -> bool {
    self.inner.optional.load(Ordering::Acquire)
  }

  /// Returns `true` if the port has at least one connection.
  pub fn is_connected(&self) -> bool {
    self
      .inner
      .connections
      .lock()
      .map(|conns| !conns.is_empty())
      .unwrap_or(false)
  }

  /// Snapshot of the port's connections.
  pub fn connections(&self) -> Vec<Connection> {
    self
      .inner
      .connections
      .lock()
      .map(|conns| conns.clone())
      .unwrap_or_default()
  }

  /// Returns `true` if both handles refer to the same port.
  pub fn ptr_eq(&self, other: &Port) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }

  /// Returns a non-owning reference to this port.
  pub fn downgrade(&self) -> WeakPort {
    WeakPort {
      inner: Arc::downgrade(&self.inner),
    }
  }

  fn mark_closed(&self) -> bool {
    self.inner.open.swap(false, Ordering::AcqRel)
  }

  pub(crate) fn push_connection(&self, connection: Connection) {
    if let Ok(mut conns) = self.inner.connections.lock() {
      conns.push(connection);
    }
  }

  /// Connects this output port to the input port `other` with an unbounded queue.
  pub fn connect(&self, other: &Port) -> Result<Connection, PortError> {
    self.connect_with(other, Capacity::Unbounded)
  }

  /// Connects this output port to the input port `other`.
  ///
  /// # Errors
  ///
  /// - [`PortError::InputOnly`] if `self` is an input port
  /// - [`PortError::OutputOnly`] if `other` is an output port
  /// - [`PortError::AlreadyConnected`] if the two ports are already connected
  /// - [`PortError::MultipleConnection`] if `other` already has an upstream
  /// - [`PortError::InitialPacketConflict`] if `other` carries an initial packet
  pub fn connect_with(&self, other: &Port, capacity: Capacity) -> Result<Connection, PortError> {
    if self.is_input() {
      return Err(PortError::InputOnly {
        port: self.qualified_name(),
      });
    }
    if other.is_output() {
      return Err(PortError::OutputOnly {
        port: other.qualified_name(),
      });
    }
    if let Some(existing) = other.connections().first() {
      if existing.source().is_some_and(|source| source.ptr_eq(self)) {
        return Err(PortError::AlreadyConnected {
          port: self.qualified_name(),
          other: other.qualified_name(),
        });
      }
      return Err(PortError::MultipleConnection {
        port: other.qualified_name(),
      });
    }
    if other.pending_initial().is_some() {
      return Err(PortError::InitialPacketConflict {
        port: other.qualified_name(),
      });
    }
    let connection = Connection::new(self, other, capacity);
    self.push_connection(connection.clone());
    other.push_connection(connection.clone());
    debug!(arc = %connection, "connected");
    Ok(connection)
  }

  /// Pre-loads a one-shot initial packet (IIP) on an input port.
  ///
  /// The first receive returns it and closes the port; later receives report
  /// end-of-stream.
  ///
  /// # Errors
  ///
  /// [`PortError::OutputOnly`], or [`PortError::InitialPacketConflict`] if
  /// the port already has an upstream connection.
  pub fn set_initial_packet<T>(&self, value: T) -> Result<(), PortError>
  where
    T: Any + Send + Sync + fmt::Debug,
  {
    if self.is_output() {
      return Err(PortError::OutputOnly {
        port: self.qualified_name(),
      });
    }
    if self.is_connected() {
      return Err(PortError::InitialPacketConflict {
        port: self.qualified_name(),
      });
    }
    let label = format!("{:?}", value);
    if let Ok(mut slot) = self.inner.initial.lock() {
      *slot = Some(Initial {
        packet: Packet::new(value),
        label,
      });
    }
    Ok(())
  }

  /// Debug rendering of the pending initial packet, if any.
  pub fn pending_initial(&self) -> Option<String> {
    self
      .inner
      .initial
      .lock()
      .ok()
      .and_then(|slot| slot.as_ref().map(|initial| initial.label.clone()))
  }

  fn take_initial(&self) -> Option<Packet> {
    self
      .inner
      .initial
      .lock()
      .ok()
      .and_then(|mut slot| slot.take())
      .map(|initial| initial.packet)
  }

  /// Queues a seed packet, delivered before live traffic without closing the port.
  pub fn seed<T: Any + Send + Sync>(&self, value: T) -> Result<(), PortError> {
    self.seed_packet(Packet::new(value))
  }

  /// Queues a content-free [`Kickstart`] seed.
  pub fn kickstart(&self) -> Result<(), PortError> {
    self.seed(Kickstart)
  }

  /// Queues an unowned packet as seed.
  pub fn seed_packet(&self, packet: Packet) -> Result<(), PortError> {
    if self.is_output() {
      return Err(PortError::OutputOnly {
        port: self.qualified_name(),
      });
    }
    if let Some(owner) = packet.owner() {
      return Err(
        PacketError::Ownership {
          owner: owner.name().to_string(),
          requested: self.qualified_name(),
        }
        .into(),
      );
    }
    if let Ok(mut seeds) = self.inner.seeds.lock() {
      seeds.push_back(packet);
    }
    Ok(())
  }

  fn take_seed(&self) -> Option<Packet> {
    self
      .inner
      .seeds
      .lock()
      .ok()
      .and_then(|mut seeds| seeds.pop_front())
  }

  /// Wraps `value` in a packet owned by this port's component and sends it.
  pub async fn send<T: Any + Send + Sync>(&self, value: T) -> Result<(), PortError> {
    self.send_packet(Packet::new(value)).await
  }

  /// Sends `packet` to every connection of this port.
  ///
  /// An unowned packet is taken over by the port's component first; a packet
  /// owned by another component is rejected and must be `copy()`ed. Sending
  /// end-of-stream closes the port.
  ///
  /// Each connection gets its own unowned `copy()`. The sender's envelope is
  /// released once dispatched, and the copy is charged to the receiving
  /// component when it is taken off the queue, so a queued packet is on
  /// nobody's ledger.
  ///
  /// # Errors
  ///
  /// [`PortError::InputOnly`], [`PortError::Closed`],
  /// [`PortError::Disconnected`] (unconnected, not optional) or an ownership
  /// violation.
  pub async fn send_packet(&self, packet: Packet) -> Result<(), PortError> {
    if self.is_input() {
      return Err(PortError::InputOnly {
        port: self.qualified_name(),
      });
    }
    if !self.is_open() {
      return Err(PortError::Closed {
        port: self.qualified_name(),
      });
    }
    let eos = packet.is_eos();
    self.dispatch(packet).await?;
    if eos {
      self.mark_closed();
    }
    Ok(())
  }

  async fn dispatch(&self, mut packet: Packet) -> Result<(), PortError> {
    if let Some(owner) = self.component() {
      let foreign = packet
        .owner()
        .filter(|current| **current != owner)
        .map(|current| current.name().to_string());
      if let Some(current) = foreign {
        return Err(
          PacketError::Ownership {
            owner: current,
            requested: owner.name().to_string(),
          }
          .into(),
        );
      }
      if packet.owner().is_none() {
        packet.set_owner(&owner)?;
      }
    }

    let connections = self.connections();
    if connections.is_empty() {
      if self.is_optional() {
        warn!(port = %self.qualified_name(), packet = %packet, "optional port is not connected, dropping packet");
        return Ok(());
      }
      return Err(PortError::Disconnected {
        port: self.qualified_name(),
      });
    }
    try_join_all(connections.iter().map(|conn| conn.send(packet.copy()))).await?;
    Ok(())
  }

  /// Receives the next packet, taking it over for this port's component.
  ///
  /// # Errors
  ///
  /// [`PortError::EndOfStream`] once every connection has delivered
  /// end-of-stream or the initial packet has been taken (the port is closed
  /// afterwards),
  /// [`PortError::OutputOnly`], [`PortError::Closed`] or
  /// [`PortError::Disconnected`] (unconnected, not optional). An unconnected
  /// optional port reports end-of-stream.
  pub async fn receive_packet(&self) -> Result<Packet, PortError> {
    if self.is_output() {
      return Err(PortError::OutputOnly {
        port: self.qualified_name(),
      });
    }
    if !self.is_open() {
      if self.inner.initial_delivered.load(Ordering::Acquire) {
        return Err(PortError::EndOfStream {
          port: self.qualified_name(),
        });
      }
      return Err(PortError::Closed {
        port: self.qualified_name(),
      });
    }
    if let Some(packet) = self.take_initial() {
      self.inner.initial_delivered.store(true, Ordering::Release);
      self.mark_closed();
      return self.adopt(packet);
    }
    if let Some(packet) = self.take_seed() {
      return self.adopt(packet);
    }

    let connections = self.connections();
    if connections.is_empty() {
      if self.is_optional() {
        return Err(self.end_of_stream());
      }
      return Err(PortError::Disconnected {
        port: self.qualified_name(),
      });
    }

    loop {
      let live: Vec<&Connection> = connections.iter().filter(|conn| !conn.has_ended()).collect();
      if live.is_empty() {
        return Err(self.end_of_stream());
      }
      let (received, index, _) = select_all(live.iter().map(|conn| Box::pin(conn.receive()))).await;
      match received {
        Some(packet) if !packet.is_eos() => return self.adopt(packet),
        _ => live[index].mark_ended(),
      }
    }
  }

  fn adopt(&self, mut packet: Packet) -> Result<Packet, PortError> {
    if let Some(owner) = self.component() {
      packet.set_owner(&owner)?;
    }
    Ok(packet)
  }

  fn end_of_stream(&self) -> PortError {
    self.mark_closed();
    debug!(port = %self.qualified_name(), "end of stream");
    PortError::EndOfStream {
      port: self.qualified_name(),
    }
  }

  /// Receives the next packet and returns its payload as `T`.
  ///
  /// The packet is dropped (released by the component) once the value is
  /// extracted.
  pub async fn receive<T: Any + Send + Sync>(&self) -> Result<Arc<T>, PortError> {
    let packet = self.receive_packet().await?;
    let found = packet.type_name();
    let mismatch = || PortError::TypeMismatch {
      port: self.qualified_name(),
      expected: std::any::type_name::<T>(),
      found,
    };
    let payload = packet.into_payload().ok_or_else(&mismatch)?;
    payload.downcast::<T>().map_err(|_| mismatch())
  }

  /// Receives one logical unit: a lone packet, or everything between an
  /// opening bracket and its matching closing bracket (outer brackets
  /// removed, nested ones kept).
  pub async fn receive_group(&self) -> Result<Vec<Packet>, PortError> {
    let first = self.receive_packet().await?;
    if !first.is_open_bracket() {
      return Ok(vec![first]);
    }
    let mut depth = 1usize;
    let mut group = Vec::new();
    loop {
      let packet = self.receive_packet().await?;
      if packet.is_open_bracket() {
        depth += 1;
      } else if packet.is_close_bracket() {
        depth -= 1;
        if depth == 0 {
          return Ok(group);
        }
      }
      group.push(packet);
    }
  }

  /// Sends an opening bracket.
  pub async fn open_bracket(&self) -> Result<(), PortError> {
    self.send_packet(Packet::open_bracket()).await
  }

  /// Sends a closing bracket.
  pub async fn close_bracket(&self) -> Result<(), PortError> {
    self.send_packet(Packet::close_bracket()).await
  }

  /// Sends `values` as one bracket-delimited group.
  pub async fn send_group<T, I>(&self, values: I) -> Result<(), PortError>
  where
    T: Any + Send + Sync,
    I: IntoIterator<Item = T>,
  {
    self.open_bracket().await?;
    for value in values {
      self.send(value).await?;
    }
    self.close_bracket().await
  }

  /// Closes the port.
  ///
  /// An output port sends end-of-stream to every connection first; an
  /// unconnected one is just marked closed. Closing twice is a no-op.
  pub async fn close(&self) -> Result<(), PortError> {
    if !self.mark_closed() {
      return Ok(());
    }
    if self.is_input() || !self.is_connected() {
      debug!(port = %self.qualified_name(), "closed");
      return Ok(());
    }
    debug!(port = %self.qualified_name(), "sending end of stream");
    self.dispatch(Packet::end_of_stream()).await
  }

  /// Consumes the port as a lazy, finite, non-restartable sequence of packets.
  ///
  /// The stream ends on end-of-stream or when the port is closed; any other
  /// error is yielded once and ends the stream.
  pub fn packets(&self) -> impl Stream<Item = Result<Packet, PortError>> + Send + 'static {
    let port = self.clone();
    stream! {
      loop {
        match port.receive_packet().await {
          Ok(packet) => yield Ok(packet),
          Err(PortError::EndOfStream { .. }) | Err(PortError::Closed { .. }) => break,
          Err(err) => {
            yield Err(err);
            break;
          }
        }
      }
    }
  }
}

impl fmt::Display for Port {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.qualified_name())
  }
}

impl fmt::Debug for Port {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Port")
      .field("name", &self.qualified_name())
      .field("direction", &self.inner.direction)
      .field("open", &self.is_open())
      .field("optional", &self.is_optional())
      .finish()
  }
}
