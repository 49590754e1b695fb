//! # Connections
//!
//! A [`Connection`] is the FIFO channel joining exactly one source (output)
//! port to one destination (input) port. It is the only path by which a
//! packet moves from one component to another.
//!
//! Connections are backed by `tokio::sync::mpsc`. A [`Capacity::Bounded`]
//! connection suspends the sender while the queue is full (backpressure); the
//! default [`Capacity::Unbounded`] never suspends the sender. The receiving half
//! sits behind an async mutex so that several tasks may race to receive from
//! the same connection without corrupting it.
//!
//! Connections hold weak references to their ports; the ports own the
//! connections.

use crate::error::PortError;
use crate::packet::Packet;
use crate::port::{Port, WeakPort};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};

/// Queue capacity of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
  /// No limit; senders never suspend.
  #[default]
  Unbounded,
  /// At most `n` queued packets; senders suspend while the queue is full.
  Bounded(usize),
}

enum Tx {
  Bounded(mpsc::Sender<Packet>),
  Unbounded(mpsc::UnboundedSender<Packet>),
}

enum Rx {
  Bounded(mpsc::Receiver<Packet>),
  Unbounded(mpsc::UnboundedReceiver<Packet>),
}

impl Rx {
  async fn recv(&mut self) -> Option<Packet> {
    match self {
      Rx::Bounded(rx) => rx.recv().await,
      Rx::Unbounded(rx) => rx.recv().await,
    }
  }
}

struct ConnectionInner {
  source: WeakPort,
  destination: WeakPort,
  label: String,
  capacity: Capacity,
  tx: Tx,
  rx: Mutex<Rx>,
  ended: AtomicBool,
}

/// A FIFO channel between one output port and one input port.
#[derive(Clone)]
pub struct Connection {
  inner: Arc<ConnectionInner>,
}

impl Connection {
  pub(crate) fn new(source: &Port, destination: &Port, capacity: Capacity) -> Self {
    let (tx, rx) = match capacity {
      Capacity::Unbounded => {
        let (tx, rx) = mpsc::unbounded_channel();
        (Tx::Unbounded(tx), Rx::Unbounded(rx))
      }
      Capacity::Bounded(n) => {
        let (tx, rx) = mpsc::channel(n.max(1));
        (Tx::Bounded(tx), Rx::Bounded(rx))
      }
    };
    Self {
      inner: Arc::new(ConnectionInner {
        source: source.downgrade(),
        destination: destination.downgrade(),
        label: format!("{} -> {}", source, destination),
        capacity,
        tx,
        rx: Mutex::new(rx),
        ended: AtomicBool::new(false),
      }),
    }
  }

  /// Enqueues `packet`, suspending while a bounded queue is full.
  pub async fn send(&self, packet: Packet) -> Result<(), PortError> {
    let sent = match &self.inner.tx {
      Tx::Bounded(tx) => tx.send(packet).await.is_ok(),
      Tx::Unbounded(tx) => tx.send(packet).is_ok(),
    };
    if sent {
      Ok(())
    } else {
      Err(PortError::Disconnected {
        port: self.inner.label.clone(),
      })
    }
  }

  /// Dequeues the next packet, suspending while the queue is empty.
  ///
  /// Cancel-safe: dropping the future before it completes loses no packet.
  pub async fn receive(&self) -> Option<Packet> {
    self.inner.rx.lock().await.recv().await
  }

  /// Source port, if it is still alive.
  pub fn source(&self) -> Option<Port> {
    self.inner.source.upgrade()
  }

  /// Destination port, if it is still alive.
  pub fn destination(&self) -> Option<Port> {
    self.inner.destination.upgrade()
  }

  /// Returns the configured capacity.
  pub fn capacity(&self) -> Capacity {
    self.inner.capacity
  }

  /// Returns `true` once the destination has consumed end-of-stream from this connection.
  pub fn has_ended(&self) -> bool {
    self.inner.ended.load(Ordering::Acquire)
  }

  pub(crate) fn mark_ended(&self) {
    self.inner.ended.store(true, Ordering::Release);
  }

  /// Returns `true` if both handles refer to the same connection.
  pub fn ptr_eq(&self, other: &Connection) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}

impl fmt::Debug for Connection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Connection")
      .field("arc", &self.inner.label)
      .field("capacity", &self.inner.capacity)
      .field("ended", &self.has_ended())
      .finish()
  }
}

impl fmt::Display for Connection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.inner.label)
  }
}
