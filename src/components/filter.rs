//! # Filter
//!
//! Forwards the values on `IN` that satisfy a predicate to `OUT`, in order.
//! Received packets are re-sent as they are: the component owns them after
//! receiving, so no copy is needed.

use crate::component::{Component, ComponentCore};
use crate::error::{ComponentError, PortError};
use async_trait::async_trait;
use std::any::Any;
use std::marker::PhantomData;

/// Forwards values of type `T` that match a predicate.
pub struct Filter<T> {
  core: ComponentCore,
  predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
  _value: PhantomData<fn(T)>,
}

impl<T: Any + Send + Sync> Filter<T> {
  /// Creates a filter with `IN` and `OUT` ports.
  pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
  where
    F: Fn(&T) -> bool + Send + Sync + 'static,
  {
    Self {
      core: ComponentCore::with_ports(name, &["IN"], &["OUT"]),
      predicate: Box::new(predicate),
      _value: PhantomData,
    }
  }
}

#[async_trait]
impl<T: Any + Send + Sync> Component for Filter<T> {
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    let input = self.inputs().get("IN")?;
    let output = self.outputs().get("OUT")?;
    loop {
      let packet = input.receive_packet().await?;
      let keep = match packet.value::<T>() {
        Some(value) => (self.predicate)(value),
        None => {
          return Err(
            PortError::TypeMismatch {
              port: input.qualified_name(),
              expected: std::any::type_name::<T>(),
              found: packet.type_name(),
            }
            .into(),
          );
        }
      };
      if keep {
        output.send_packet(packet).await?;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::port::Port;

  #[tokio::test]
  async fn test_filter_keeps_matching_values() {
    let filter = Filter::new("even", |value: &i32| value % 2 == 0);
    let upstream = Port::output("up");
    let downstream = Port::input("down");
    upstream.connect(&filter.inputs().get("IN").unwrap()).unwrap();
    filter.outputs().get("OUT").unwrap().connect(&downstream).unwrap();

    for i in 0..6 {
      upstream.send(i).await.unwrap();
    }
    upstream.close().await.unwrap();

    let err = filter.run().await.unwrap_err();
    assert!(err.is_end_of_stream());
    filter.close_downstream().await.unwrap();

    let mut kept = Vec::new();
    while let Ok(value) = downstream.receive::<i32>().await {
      kept.push(*value);
    }
    assert_eq!(kept, vec![0, 2, 4]);
  }

  #[tokio::test]
  async fn test_filter_rejects_wrong_type() {
    let filter = Filter::new("f", |_: &String| true);
    let upstream = Port::output("up");
    upstream.connect(&filter.inputs().get("IN").unwrap()).unwrap();
    upstream.send(1u8).await.unwrap();

    let err = filter.run().await.unwrap_err();
    assert!(matches!(
      err,
      ComponentError::Port(PortError::TypeMismatch { found: "u8", .. })
    ));
  }
}
