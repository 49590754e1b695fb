//! # Sinks
//!
//! Components without outputs.

use crate::component::{Component, ComponentCore};
use crate::error::ComponentError;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Mutex;
use tracing::info;

/// Records every value received on `IN`, in arrival order.
pub struct Collector<T> {
  core: ComponentCore,
  values: Mutex<Vec<T>>,
}

impl<T> Collector<T>
where
  T: Any + Send + Sync + Clone,
{
  /// Creates a collector with a single `IN` port.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      core: ComponentCore::with_ports(name, &["IN"], &[]),
      values: Mutex::new(Vec::new()),
    }
  }

  /// Values received so far.
  pub fn values(&self) -> Vec<T> {
    self
      .values
      .lock()
      .map(|values| values.clone())
      .unwrap_or_default()
  }
}

#[async_trait]
impl<T> Component for Collector<T>
where
  T: Any + Send + Sync + Clone,
{
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    let input = self.inputs().get("IN")?;
    loop {
      let value = input.receive::<T>().await?;
      if let Ok(mut values) = self.values.lock() {
        values.push(T::clone(&value));
      }
    }
  }
}

/// Logs every packet set received on its inputs.
pub struct ShowInputs {
  core: ComponentCore,
}

impl ShowInputs {
  /// Creates a component with the given input ports.
  pub fn new(name: impl Into<String>, inputs: &[&str]) -> Self {
    Self {
      core: ComponentCore::with_ports(name, inputs, &[]),
    }
  }
}

#[async_trait]
impl Component for ShowInputs {
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    loop {
      let set = self.inputs().receive_packets().await?;
      let mut rendered: Vec<String> = set
        .iter()
        .map(|(port, packet)| format!("{}: {}", port, packet))
        .collect();
      rendered.sort();
      info!(component = %self.name(), inputs = %rendered.join(", "), "received");
    }
  }
}
