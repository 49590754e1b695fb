//! # Sources
//!
//! Components without inputs. Both send every value on every output port
//! and close downstream when exhausted.
//!
//! ## Ports
//!
//! - **Output**: `"OUT"` by default, or any set given to `with_outputs`

use crate::component::{Component, ComponentCore};
use crate::error::ComponentError;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Mutex;

/// Emits the items of an iterator, then closes downstream.
///
/// The iterator is consumed by the first run.
pub struct GeneratorSource<I> {
  core: ComponentCore,
  items: Mutex<Option<I>>,
}

impl<I> GeneratorSource<I>
where
  I: IntoIterator + Send + 'static,
  I::IntoIter: Send,
  I::Item: Any + Send + Sync,
{
  /// Creates a source with a single `OUT` port.
  pub fn new(name: impl Into<String>, items: I) -> Self {
    Self::with_outputs(name, items, &["OUT"])
  }

  /// Creates a source broadcasting to the given output ports.
  pub fn with_outputs(name: impl Into<String>, items: I, outputs: &[&str]) -> Self {
    Self {
      core: ComponentCore::with_ports(name, &[], outputs),
      items: Mutex::new(Some(items)),
    }
  }
}

#[async_trait]
impl<I> Component for GeneratorSource<I>
where
  I: IntoIterator + Send + 'static,
  I::IntoIter: Send,
  I::Item: Any + Send + Sync,
{
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    let items = self.items.lock().ok().and_then(|mut slot| slot.take());
    if let Some(items) = items {
      for item in items {
        self.outputs().send_all(item).await?;
        tokio::task::yield_now().await;
      }
    }
    self.close_downstream().await?;
    Ok(())
  }
}

/// Emits the same value a fixed number of times, or forever.
pub struct ConstantSource<T> {
  core: ComponentCore,
  value: T,
  repeat: Option<usize>,
}

impl<T> ConstantSource<T>
where
  T: Any + Send + Sync + Clone,
{
  /// Creates a source sending `value` on `OUT` until downstream stops it.
  pub fn new(name: impl Into<String>, value: T) -> Self {
    Self {
      core: ComponentCore::with_ports(name, &[], &["OUT"]),
      value,
      repeat: None,
    }
  }

  /// Limits the source to `times` values.
  #[must_use]
  pub fn repeat(mut self, times: usize) -> Self {
    self.repeat = Some(times);
    self
  }
}

#[async_trait]
impl<T> Component for ConstantSource<T>
where
  T: Any + Send + Sync + Clone,
{
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    let mut sent = 0usize;
    while self.repeat.is_none_or(|limit| sent < limit) {
      self.outputs().send_all(self.value.clone()).await?;
      sent += 1;
      tokio::task::yield_now().await;
    }
    self.close_downstream().await?;
    Ok(())
  }
}
