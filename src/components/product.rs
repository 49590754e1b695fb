//! # Product
//!
//! Collects every input stream to exhaustion, then emits the Cartesian
//! product of the collected values on `OUT`, one bracket group per
//! combination. Within a group, values follow input port order.
//!
//! ## Ports
//!
//! - **Input**: the names given at construction (`IN_1`, `IN_2` with [`Product::new`])
//! - **Output**: `"OUT"`

use crate::component::{Component, ComponentCore};
use crate::error::{ComponentError, PortError};
use crate::packet::Packet;
use crate::port::Port;
use async_trait::async_trait;
use futures::future::try_join_all;

/// Emits the Cartesian product of its input streams as bracket groups.
pub struct Product {
  core: ComponentCore,
}

impl Product {
  /// Creates a product of two streams, on `IN_1` and `IN_2`.
  pub fn new(name: impl Into<String>) -> Self {
    Self::with_inputs(name, &["IN_1", "IN_2"])
  }

  /// Creates a product over the given input ports.
  pub fn with_inputs(name: impl Into<String>, inputs: &[&str]) -> Self {
    Self {
      core: ComponentCore::with_ports(name, inputs, &["OUT"]),
    }
  }
}

async fn drain(port: Port) -> Result<Vec<Packet>, PortError> {
  let mut packets = Vec::new();
  loop {
    match port.receive_packet().await {
      Ok(packet) => packets.push(packet),
      Err(err) if err.is_end_of_stream() => return Ok(packets),
      Err(err) => return Err(err),
    }
  }
}

/// Index tuples of the Cartesian product of `sizes`, last index varying fastest.
fn combinations(sizes: &[usize]) -> Vec<Vec<usize>> {
  if sizes.is_empty() || sizes.contains(&0) {
    return Vec::new();
  }
  let mut result = vec![Vec::new()];
  for &size in sizes {
    result = result
      .into_iter()
      .flat_map(|prefix| {
        (0..size).map(move |i| {
          let mut next = prefix.clone();
          next.push(i);
          next
        })
      })
      .collect();
  }
  result
}

#[async_trait]
impl Component for Product {
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    let streams = try_join_all(self.inputs().ports().into_iter().map(drain)).await?;
    let sizes: Vec<usize> = streams.iter().map(Vec::len).collect();
    let output = self.outputs().get("OUT")?;
    for combination in combinations(&sizes) {
      output.open_bracket().await?;
      for (stream, &index) in streams.iter().zip(&combination) {
        output.send_packet(stream[index].copy()).await?;
      }
      output.close_bracket().await?;
    }
    self.close_downstream().await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_combinations() {
    assert_eq!(
      combinations(&[2, 2]),
      vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
    );
    assert_eq!(combinations(&[3, 1, 2]).len(), 6);
    assert!(combinations(&[3, 0]).is_empty());
    assert!(combinations(&[]).is_empty());
  }
}
