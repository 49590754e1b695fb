//! # Sub-graph Boundary Adapters
//!
//! A nested [`Multigraph`](crate::Multigraph) exposes inner ports through
//! boundary ports on its own registers. Since the graph is not a task of its
//! own, the traffic across each boundary is carried by a small pass-through
//! member created by `export_input` / `export_output`:
//!
//! - [`SubIn`] receives on the graph's boundary input and forwards each value
//!   on its `OUT` port, which is wired to the inner input.
//! - [`SubOut`] receives from the inner output on its `IN` port and forwards
//!   each value on the graph's boundary output.
//!
//! End of stream propagates through both: the adapter stops on it and the
//! scheduler (or the adapter itself, for the boundary) closes downstream.

use crate::component::{Component, ComponentCore};
use crate::error::ComponentError;
use crate::port::Port;
use async_trait::async_trait;

/// Forwards packets from a graph's boundary input into the graph.
pub struct SubIn {
  core: ComponentCore,
  boundary: Port,
}

impl SubIn {
  /// Name of the inner-facing output port.
  pub const OUT: &'static str = "OUT";

  pub(crate) fn new(name: String, boundary: Port) -> Self {
    Self {
      core: ComponentCore::with_ports(name, &[], &[Self::OUT]),
      boundary,
    }
  }
}

#[async_trait]
impl Component for SubIn {
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    let out = self.outputs().get(Self::OUT)?;
    loop {
      let packet = self.boundary.receive_packet().await?;
      out.send_packet(packet.copy()).await?;
    }
  }
}

/// Forwards packets from inside a graph to its boundary output.
pub struct SubOut {
  core: ComponentCore,
  boundary: Port,
}

impl SubOut {
  /// Name of the inner-facing input port.
  pub const IN: &'static str = "IN";

  pub(crate) fn new(name: String, boundary: Port) -> Self {
    Self {
      core: ComponentCore::with_ports(name, &[Self::IN], &[]),
      boundary,
    }
  }
}

#[async_trait]
impl Component for SubOut {
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    let input = self.inputs().get(Self::IN)?;
    loop {
      match input.receive_packet().await {
        Ok(packet) => self.boundary.send_packet(packet.copy()).await?,
        Err(err) if err.is_end_of_stream() => {
          self.boundary.close().await?;
          return Ok(());
        }
        Err(err) => return Err(err.into()),
      }
    }
  }
}
