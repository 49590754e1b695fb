//! # Information Packets
//!
//! A [`Packet`] is the envelope every value travels in. The payload is an
//! immutable `Arc<dyn Any + Send + Sync>`: nothing downstream can mutate it,
//! so sharing it between copies is safe. The envelope itself has single-owner
//! semantics:
//!
//! - a packet has at most one owner, set once with [`Packet::set_owner`]
//! - ownership never moves by aliasing; [`Packet::copy`] produces a fresh,
//!   unowned envelope around the same payload
//! - dropping a packet (or extracting its value with [`Packet::into_payload`])
//!   deregisters it from its owner's ledger
//!
//! Besides data packets there are three markers: end-of-stream, and the
//! open/close brackets that delimit a group of packets on one connection.

use crate::component::ComponentHandle;
use crate::error::PacketError;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Type-erased, immutable packet payload.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Process-unique packet identifier.
pub type PacketId = u64;

static NEXT_PACKET_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> PacketId {
  NEXT_PACKET_ID.fetch_add(1, Ordering::Relaxed)
}

/// Content-free value carried by kickstart packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Kickstart;

#[derive(Clone)]
enum Content {
  Data {
    payload: Payload,
    type_name: &'static str,
  },
  EndOfStream,
  OpenBracket,
  CloseBracket,
}

/// An information packet: an immutable value with an optional owner.
pub struct Packet {
  id: PacketId,
  content: Content,
  owner: Option<ComponentHandle>,
}

impl Packet {
  /// Wraps `value` in a new unowned packet.
  pub fn new<T: Any + Send + Sync>(value: T) -> Self {
    Self::with_content(Content::Data {
      payload: Arc::new(value),
      type_name: std::any::type_name::<T>(),
    })
  }

  /// Wraps an already type-erased payload in a new unowned packet.
  pub fn from_payload(payload: Payload) -> Self {
    Self::with_content(Content::Data {
      payload,
      type_name: "dyn Any",
    })
  }

  /// Wraps `value` in a packet owned by `owner`.
  pub fn owned<T: Any + Send + Sync>(value: T, owner: &ComponentHandle) -> Self {
    let mut packet = Self::new(value);
    packet.attach(owner);
    packet
  }

  /// Creates an end-of-stream marker.
  pub fn end_of_stream() -> Self {
    Self::with_content(Content::EndOfStream)
  }

  /// Creates an opening bracket marker.
  pub fn open_bracket() -> Self {
    Self::with_content(Content::OpenBracket)
  }

  /// Creates a closing bracket marker.
  pub fn close_bracket() -> Self {
    Self::with_content(Content::CloseBracket)
  }

  fn with_content(content: Content) -> Self {
    Self {
      id: next_id(),
      content,
      owner: None,
    }
  }

  /// Returns the packet identifier.
  pub fn id(&self) -> PacketId {
    self.id
  }

  /// Returns the current owner, if any.
  pub fn owner(&self) -> Option<&ComponentHandle> {
    self.owner.as_ref()
  }

  /// Makes `owner` responsible for this packet.
  ///
  /// # Errors
  ///
  /// [`PacketError::Ownership`] if the packet already has an owner, even the
  /// same one.
  pub fn set_owner(&mut self, owner: &ComponentHandle) -> Result<(), PacketError> {
    if let Some(current) = &self.owner {
      return Err(PacketError::Ownership {
        owner: current.name().to_string(),
        requested: owner.name().to_string(),
      });
    }
    self.attach(owner);
    Ok(())
  }

  fn attach(&mut self, owner: &ComponentHandle) {
    owner.register_packet(self.id);
    self.owner = Some(owner.clone());
  }

  /// Returns a new, unowned packet carrying the same payload.
  pub fn copy(&self) -> Packet {
    Self::with_content(self.content.clone())
  }

  /// Returns `true` for the end-of-stream marker.
  pub fn is_eos(&self) -> bool {
    matches!(self.content, Content::EndOfStream)
  }

  /// Returns `true` for an opening bracket.
  pub fn is_open_bracket(&self) -> bool {
    matches!(self.content, Content::OpenBracket)
  }

  /// Returns `true` for a closing bracket.
  pub fn is_close_bracket(&self) -> bool {
    matches!(self.content, Content::CloseBracket)
  }

  /// Returns `true` if the packet carries a payload.
  pub fn is_data(&self) -> bool {
    matches!(self.content, Content::Data { .. })
  }

  /// Borrows the payload of a data packet.
  pub fn payload(&self) -> Option<&Payload> {
    match &self.content {
      Content::Data { payload, .. } => Some(payload),
      _ => None,
    }
  }

  /// Borrows the payload downcast to `T`.
  pub fn value<T: Any>(&self) -> Option<&T> {
    self.payload().and_then(|payload| payload.downcast_ref::<T>())
  }

  /// Name of the payload type, as far as it is known.
  pub fn type_name(&self) -> &'static str {
    match &self.content {
      Content::Data { type_name, .. } => type_name,
      Content::EndOfStream => "EndOfStream",
      Content::OpenBracket => "OpenBracket",
      Content::CloseBracket => "CloseBracket",
    }
  }

  /// Drops the packet and hands back its payload (`None` for markers).
  pub fn into_payload(mut self) -> Option<Payload> {
    self.release();
    match std::mem::replace(&mut self.content, Content::EndOfStream) {
      Content::Data { payload, .. } => Some(payload),
      _ => None,
    }
  }

  fn release(&mut self) {
    if let Some(owner) = self.owner.take() {
      owner.deregister_packet(self.id);
    }
  }
}

impl Drop for Packet {
  fn drop(&mut self) {
    self.release();
  }
}

impl fmt::Display for Packet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.content {
      Content::Data { type_name, .. } => {
        let owner = self.owner.as_ref().map_or("None", |owner| owner.name());
        write!(f, "Packet[owner:{}, payload type:{}]", owner, type_name)
      }
      Content::EndOfStream => write!(f, "EOS"),
      Content::OpenBracket => write!(f, "("),
      Content::CloseBracket => write!(f, ")"),
    }
  }
}

impl fmt::Debug for Packet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Packet")
      .field("id", &self.id)
      .field("kind", &self.type_name())
      .field("owner", &self.owner.as_ref().map(|owner| owner.name()))
      .finish()
  }
}
