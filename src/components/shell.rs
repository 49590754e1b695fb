//! # Shell File Operator
//!
//! Runs a shell command once per packet set received on its inputs and
//! emits the paths of the files the command produced.
//!
//! ## Command templates
//!
//! The command may reference `{inputs.<port>}` and `{outputs.<port>}`. Input
//! placeholders are replaced with the received values (strings, paths,
//! numbers and booleans render as themselves); output placeholders with the
//! paths computed by the output's [`PathFormatter`].
//!
//! ## Output paths
//!
//! Every output path is the file name produced by the port's formatter,
//! placed in the working directory of the owning graph. Outputs without a
//! formatter get a [`PathFormatter::Unique`] name.
//!
//! ## Idempotence
//!
//! When every output file already exists the command is skipped and the
//! existing paths are sent downstream. Otherwise the command runs through
//! `sh -c`; a non-zero exit is [`ComponentError::CommandFailed`] and outputs
//! still missing afterwards are [`ComponentError::FileNotExisting`].

use crate::component::{Component, ComponentCore};
use crate::error::ComponentError;
use crate::packet::Packet;
use crate::register::PacketSet;
use async_trait::async_trait;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};
use tokio::process::Command;
use tracing::{debug, info, warn};

static PLACEHOLDER: LazyLock<Result<Regex, regex::Error>> =
  LazyLock::new(|| Regex::new(r"\{(inputs|outputs)\.([A-Za-z_][A-Za-z0-9_]*)\}"));

/// How an output port's file name is computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathFormatter {
  /// Always the same file name.
  Fixed(PathBuf),
  /// A template over `{inputs.<port>}`.
  Dynamic(String),
  /// SHA-256 of the rendered input values, in port order.
  Unique,
}

/// Runs a shell command per packet set and emits the produced paths.
pub struct Shell {
  core: ComponentCore,
  command: String,
  formatters: RwLock<HashMap<String, PathFormatter>>,
}

impl Shell {
  /// Creates the operator with the given ports and command template.
  pub fn new(name: impl Into<String>, command: impl Into<String>, inputs: &[&str], outputs: &[&str]) -> Self {
    Self {
      core: ComponentCore::with_ports(name, inputs, outputs),
      command: command.into(),
      formatters: RwLock::new(HashMap::new()),
    }
  }

  /// Sets the formatter of output `port`.
  pub fn set_formatter(&self, port: &str, formatter: PathFormatter) {
    if let Ok(mut formatters) = self.formatters.write() {
      formatters.insert(port.to_string(), formatter);
    }
  }

  /// Gives output `port` the fixed file name `path`.
  #[must_use]
  pub fn fixed_formatter(self, port: &str, path: impl Into<PathBuf>) -> Self {
    self.set_formatter(port, PathFormatter::Fixed(path.into()));
    self
  }

  /// Names output `port` after `pattern`, filled from the inputs.
  #[must_use]
  pub fn dynamic_formatter(self, port: &str, pattern: impl Into<String>) -> Self {
    self.set_formatter(port, PathFormatter::Dynamic(pattern.into()));
    self
  }

  /// Names output `port` after a hash of the inputs.
  #[must_use]
  pub fn unique_formatter(self, port: &str) -> Self {
    self.set_formatter(port, PathFormatter::Unique);
    self
  }

  fn formatter(&self, port: &str) -> PathFormatter {
    let configured = self
      .formatters
      .read()
      .ok()
      .and_then(|formatters| formatters.get(port).cloned());
    configured.unwrap_or_else(|| {
      warn!(component = %self.name(), port, "no path formatter, deriving a unique name from the inputs");
      PathFormatter::Unique
    })
  }

  /// Computes the path of every output port for one set of inputs.
  fn output_paths(
    &self,
    inputs: &BTreeMap<String, String>,
    workdir: &Path,
  ) -> Result<BTreeMap<String, PathBuf>, ComponentError> {
    let mut paths = BTreeMap::new();
    for port in self.outputs().names() {
      let name = match self.formatter(&port) {
        PathFormatter::Fixed(path) => path,
        PathFormatter::Dynamic(pattern) => {
          PathBuf::from(substitute(self.name(), &pattern, inputs, &BTreeMap::new())?)
        }
        PathFormatter::Unique => PathBuf::from(unique_name(inputs)),
      };
      let file_name = name.file_name().map(PathBuf::from).unwrap_or(name);
      let path = workdir.join(file_name);
      debug!(component = %self.name(), port = %port, path = %path.display(), "output path");
      paths.insert(port, path);
    }
    Ok(paths)
  }

  async fn execute(&self, command: &str) -> Result<(), ComponentError> {
    info!(component = %self.name(), command, "executing command");
    let output = Command::new("sh").arg("-c").arg(command).output().await?;
    if !output.status.success() {
      return Err(ComponentError::CommandFailed {
        component: self.name().to_string(),
        command: command.to_string(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    info!(
      component = %self.name(),
      stdout = %String::from_utf8_lossy(&output.stdout).trim(),
      "command succeeded"
    );
    Ok(())
  }
}

/// Renders a payload for use in a command line, if its type is printable.
fn render(packet: &Packet) -> Option<String> {
  macro_rules! try_render {
    ($($ty:ty),*) => {
      $(if let Some(value) = packet.value::<$ty>() {
        return Some(value.to_string());
      })*
    };
  }
  if let Some(path) = packet.value::<PathBuf>() {
    return Some(path.display().to_string());
  }
  try_render!(String, &'static str, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64, bool, char);
  None
}

fn render_inputs(component: &str, set: &PacketSet) -> BTreeMap<String, String> {
  set
    .iter()
    .filter_map(|(port, packet)| match render(packet) {
      Some(value) => Some((port.clone(), value)),
      None => {
        debug!(component, port = %port, kind = packet.type_name(), "input cannot be rendered");
        None
      }
    })
    .collect()
}

fn unique_name(inputs: &BTreeMap<String, String>) -> String {
  let joined: String = inputs.values().map(String::as_str).collect();
  format!("{:x}", Sha256::digest(joined.as_bytes()))
}

/// Replaces `{inputs.X}` / `{outputs.X}` placeholders.
///
/// A placeholder naming an unknown port is [`ComponentError::FormatterMissing`].
fn substitute(
  component: &str,
  template: &str,
  inputs: &BTreeMap<String, String>,
  outputs: &BTreeMap<String, PathBuf>,
) -> Result<String, ComponentError> {
  let placeholder = PLACEHOLDER
    .as_ref()
    .map_err(|err| ComponentError::Other(err.to_string()))?;
  let mut missing = None;
  let result = placeholder.replace_all(template, |caps: &Captures| {
    let port = &caps[2];
    let value = match &caps[1] {
      "inputs" => inputs.get(port).cloned(),
      _ => outputs.get(port).map(|path| path.display().to_string()),
    };
    value.unwrap_or_else(|| {
      missing.get_or_insert_with(|| caps[0].to_string());
      String::new()
    })
  });
  match missing {
    Some(port) => Err(ComponentError::FormatterMissing {
      component: component.to_string(),
      port,
    }),
    None => Ok(result.into_owned()),
  }
}

fn missing_paths(paths: &BTreeMap<String, PathBuf>) -> Vec<PathBuf> {
  paths
    .values()
    .filter(|path| !path.exists())
    .cloned()
    .collect()
}

#[async_trait]
impl Component for Shell {
  fn core(&self) -> &ComponentCore {
    &self.core
  }

  async fn run(&self) -> Result<(), ComponentError> {
    loop {
      let received = self.inputs().receive_packets().await?;
      let inputs = render_inputs(self.name(), &received);
      drop(received);

      let workdir = self.handle().workdir();
      let outputs = self.output_paths(&inputs, &workdir)?;
      let missing = missing_paths(&outputs);
      if missing.is_empty() {
        warn!(component = %self.name(), "all output files exist, command will not be run");
      } else {
        debug!(component = %self.name(), missing = ?missing, "output files missing, command will be run");
        let command = substitute(self.name(), &self.command, &inputs, &outputs)?;
        self.execute(&command).await?;
        let still_missing = missing_paths(&outputs);
        if !still_missing.is_empty() {
          return Err(ComponentError::FileNotExisting {
            component: self.name().to_string(),
            paths: still_missing,
          });
        }
      }

      let mut packets = PacketSet::new();
      for (port, path) in outputs {
        packets.insert(port, Packet::new(path));
      }
      self.outputs().send_packets(packets).await?;
    }
  }
}
