//! # Apply
//!
//! The general-purpose transform. Each iteration waits for one packet on
//! every open input (the register barrier), hands the values to a closure by
//! port name, and sends whatever the closure produced.
//!
//! ## Ports
//!
//! - **Input**: any set of names given at construction
//! - **Output**: any set of names given at construction; outputs the closure
//!   leaves unset receive nothing for that iteration
//!
//! ```rust,no_run
//! use flowweave::Apply;
//!
//! let adder = Apply::new("adder", &["a", "b"], &["sum"], |inputs, outputs| {
//!   let sum = inputs.get::<i64>("a")? + inputs.get::<i64>("b")?;
//!   outputs.set("sum", sum);
//!   Ok(())
//! });
//! ```

use crate::component::{Component, ComponentCore};
use crate::error::{ComponentError, PortError};
use crate::packet::Packet;
use crate::register::PacketSet;
use async_trait::async_trait;
use std::any::Any;

/// Input values of one [`Apply`] iteration, by port name.
pub struct ApplyInputs {
  component: String,
  packets: PacketSet,
}

impl ApplyInputs {
  /// Borrows the value received on `port` as `T`.
  pub fn get<T: Any>(&self, port: &str) -> Result<&T, ComponentError> {
    let packet = self.packets.get(port).ok_or_else(|| PortError::NotExisting {
      component: self.component.clone(),
      port: port.to_string(),
    })?;
    packet.value::<T>().ok_or_else(|| {
      PortError::TypeMismatch {
        port: format!("{}:{}", self.component, port),
        expected: std::any::type_name::<T>(),
        found: packet.type_name(),
      }
      .into()
    })
  }

  /// Returns the raw packet received on `port`.
  pub fn packet(&self, port: &str) -> Option<&Packet> {
    self.packets.get(port)
  }

  /// Names of the ports that delivered a value this iteration.
  pub fn ports(&self) -> impl Iterator<Item = &str> {
    self.packets.keys().map(String::as_str)
  }
}

/// Output values of one [`Apply`] iteration, by port name.
#[derive(Default)]
pub struct ApplyOutputs {
  packets: PacketSet,
}

impl ApplyOutputs {
  /// Sets the value to send on `port`.
  pub fn set<T: Any + Send + Sync>(&mut self, port: &str, value: T) {
    self.packets.insert(port.to_string(), Packet::new(value));
  }
}

type ApplyFn = dyn Fn(&ApplyInputs, &mut ApplyOutputs) -> Result<(), ComponentError> + Send + Sync;

/// Applies a closure to each packet set received on its inputs.
pub struct Apply {
  core: ComponentCore,
  function: Box<ApplyFn>,
}

impl Apply {
  /// Creates the component with the given ports and closure.
  pub fn new<F>(name: impl Into<String>, inputs: &[&str], outputs: &[&str], function: F) -> Self
  where
    F: Fn(&ApplyInputs, &mut ApplyOutputs) -> Result<(), ComponentError> + Send + Sync + 'static,
  {
    Self {
      core: ComponentCore::with_ports(name, inputs, outputs),
      function: Box::new(function),
    }
  }
}

#[async_trait]
impl Component for Apply {
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    loop {
      let inputs = ApplyInputs {
        component: self.name().to_string(),
        packets: self.inputs().receive_packets().await?,
      };
      let mut outputs = ApplyOutputs::default();
      (self.function)(&inputs, &mut outputs)?;
      drop(inputs);
      self.outputs().send_packets(outputs.packets).await?;
      tokio::task::yield_now().await;
    }
  }
}
