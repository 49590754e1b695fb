//! # Component Library
//!
//! Reusable components built on the public port API. None of them gets
//! special treatment from the scheduler.
//!
//! ## Categories
//!
//! - **Sources** (no inputs): [`GeneratorSource`], [`ConstantSource`]
//! - **Sinks** (no outputs): [`Collector`], [`ShowInputs`]
//! - **Transforms**: [`Apply`], [`Filter`]
//! - **Grouping**: [`Product`] emits bracket groups, [`Split`] takes them apart
//! - **File operators**: [`Shell`] runs a command per packet set and emits
//!   the paths it produced

pub mod apply;
pub mod filter;
pub mod product;
pub mod shell;
pub mod sinks;
pub mod sources;
pub mod split;

pub use apply::{Apply, ApplyInputs, ApplyOutputs};
pub use filter::Filter;
pub use product::Product;
pub use shell::{PathFormatter, Shell};
pub use sinks::{Collector, ShowInputs};
pub use sources::{ConstantSource, GeneratorSource};
pub use split::Split;

#[cfg(test)]
mod grouping_test;
#[cfg(test)]
mod shell_test;
