//! # Split
//!
//! Takes bracket groups apart: the n-th packet of each group received on
//! `IN` is sent on the n-th output port. A lone packet counts as a group of
//! one.
//!
//! ## Ports
//!
//! - **Input**: `"IN"`
//! - **Output**: the names given at construction (`OUT_1`, `OUT_2` with [`Split::new`])

use crate::component::{Component, ComponentCore};
use crate::error::ComponentError;
use async_trait::async_trait;

/// Sends each element of a bracket group on its own output port.
pub struct Split {
  core: ComponentCore,
}

impl Split {
  /// Creates a split into `OUT_1` and `OUT_2`.
  pub fn new(name: impl Into<String>) -> Self {
    Self::with_outputs(name, &["OUT_1", "OUT_2"])
  }

  /// Creates a split over the given output ports.
  pub fn with_outputs(name: impl Into<String>, outputs: &[&str]) -> Self {
    Self {
      core: ComponentCore::with_ports(name, &["IN"], outputs),
    }
  }
}

#[async_trait]
impl Component for Split {
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    let input = self.inputs().get("IN")?;
    let outputs = self.outputs().ports();
    loop {
      let group = input.receive_group().await?;
      if group.len() > outputs.len() {
        return Err(ComponentError::Other(format!(
          "component {}: group of {} packets does not fit {} outputs",
          self.name(),
          group.len(),
          outputs.len()
        )));
      }
      for (packet, port) in group.into_iter().zip(&outputs) {
        port.send_packet(packet).await?;
      }
    }
  }
}
