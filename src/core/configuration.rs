//! The read-only configuration tree the controller consumes.
//!
//! The host table is a `BTreeMap` rather than a plain map: ordering matters
//! here for deterministic PRNG draw order across runs of the same file.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

use serde::Deserialize;

use crate::core::error::ControllerError;
use crate::core::simulation_time::SimulationTime;
use crate::utility::units::BitsPerSec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// A host (or process) replica count. Defaults to one.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(transparent)]
pub struct Quantity(pub u32);

impl Default for Quantity {
    fn default() -> Self {
        Quantity(1)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProcessArgs {
    List(Vec<String>),
    Str(String),
}

impl ProcessArgs {
    pub fn into_vec(self) -> anyhow::Result<Vec<String>> {
        match self {
            ProcessArgs::List(v) => Ok(v),
            ProcessArgs::Str(s) => crate::utility::parse_string_as_args(&s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessOptions {
    pub path: String,
    #[serde(default)]
    pub args: Option<ProcessArgs>,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub quantity: Quantity,
    pub start_time: String,
    #[serde(default)]
    pub stop_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostOptions {
    #[serde(default)]
    pub quantity: Quantity,
    #[serde(default)]
    pub ip_addr: Option<IpAddr>,
    pub network_node_id: u32,
    #[serde(default)]
    pub log_level: Option<LogLevel>,
    #[serde(default)]
    pub heartbeat_log_level: Option<LogLevel>,
    #[serde(default)]
    pub heartbeat_interval: Option<String>,
    #[serde(default)]
    pub pcap_directory: Option<PathBuf>,
    #[serde(default)]
    pub bandwidth_down: Option<BitsPerSec>,
    #[serde(default)]
    pub bandwidth_up: Option<BitsPerSec>,
    #[serde(default)]
    pub processes: Vec<ProcessOptions>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QDiscMode {
    Fifo,
    RoundRobin,
}

impl Default for QDiscMode {
    fn default() -> Self {
        QDiscMode::Fifo
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralOptions {
    pub stop_time: String,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub runahead: Option<String>,
    #[serde(default)]
    pub bootstrap_end_time: Option<String>,
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub socket_send_buffer: Option<u64>,
    #[serde(default)]
    pub socket_recv_buffer: Option<u64>,
    #[serde(default)]
    pub socket_send_autotune: bool,
    #[serde(default)]
    pub socket_recv_autotune: bool,
    #[serde(default)]
    pub interface_buffer: Option<u64>,
    #[serde(default)]
    pub interface_qdisc: QDiscMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkOptions {
    pub graph_path: PathBuf,
    #[serde(default)]
    pub use_shortest_path: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigOptions {
    pub general: GeneralOptions,
    pub network: NetworkOptions,
    #[serde(default)]
    pub hosts: BTreeMap<String, HostOptions>,
}

impl ConfigOptions {
    pub fn from_yaml_str(s: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(s).map_err(|e| {
            log::error!("configuration: could not parse configuration: {e}");
            ControllerError::Config(e.to_string()).into()
        })
    }

    pub fn stop_time(&self) -> anyhow::Result<SimulationTime> {
        crate::utility::units::parse_time(&self.general.stop_time)
    }

    pub fn runahead(&self) -> anyhow::Result<SimulationTime> {
        match &self.general.runahead {
            Some(s) => crate::utility::units::parse_time(s),
            None => Ok(SimulationTime::ZERO),
        }
    }

    pub fn bootstrap_end_time(&self) -> anyhow::Result<SimulationTime> {
        match &self.general.bootstrap_end_time {
            Some(s) => crate::utility::units::parse_time(s),
            None => Ok(SimulationTime::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_config() {
        let yaml = r#"
general:
  stop_time: "10 s"
  seed: 42
network:
  graph_path: "topology.gml"
hosts:
  server:
    network_node_id: 0
    processes:
      - path: "/bin/true"
        start_time: "0 s"
"#;
        let cfg = ConfigOptions::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.stop_time().unwrap(), SimulationTime::from_secs(10));
        assert_eq!(cfg.general.seed, Some(42));
        assert!(cfg.hosts.contains_key("server"));
    }

    #[test]
    fn hosts_are_ordered_by_name_for_determinism() {
        let yaml = r#"
general:
  stop_time: "1 s"
network:
  graph_path: "topology.gml"
hosts:
  zeta:
    network_node_id: 0
  alpha:
    network_node_id: 0
"#;
        let cfg = ConfigOptions::from_yaml_str(yaml).unwrap();
        let names: Vec<_> = cfg.hosts.keys().collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
