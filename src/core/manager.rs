//! The manager (worker) interface the controller drives.
//!
//! A real manager -- an event loop executing simulated processes -- is out
//! of scope here. This module defines the trait boundary the controller
//! depends on, plus a minimal single-threaded reference implementation
//! sufficient to drive the controller end to end and to exercise it in
//! tests.

use std::sync::Arc;

use crate::core::configuration::ConfigOptions;
use crate::core::controller::ControllerHandle;
use crate::core::host_registration::{HostParameters, ProcessDescriptor};
use crate::core::simulation_time::SimulationTime;

/// The capability the controller grants a manager implementation: routing
/// queries, DNS lookups, and round-completion reporting, but never mutual
/// ownership of the controller itself.
pub trait SimulationManager {
    fn add_virtual_host(&mut self, params: &HostParameters) -> anyhow::Result<()>;

    fn add_virtual_process(
        &mut self,
        hostname: &str,
        process: &ProcessDescriptor,
    ) -> anyhow::Result<()>;

    /// Drive rounds to completion, calling back into the capability object's
    /// `manager_finished_current_round` between rounds. Returns the process
    /// exit code (0 on clean completion).
    fn run(&mut self) -> anyhow::Result<i32>;
}

/// A minimal in-process manager: it has no event queue of its own and
/// simply reports that every round's earliest pending event is at the
/// window's end, until the window collapses (continuation flag is false).
pub struct ReferenceManager {
    handle: Arc<dyn ControllerHandle>,
    end_time: SimulationTime,
    bootstrap_end_time: SimulationTime,
    seed: u64,
    hosts: Vec<String>,
}

impl ReferenceManager {
    pub fn new(
        handle: Arc<dyn ControllerHandle>,
        config: &ConfigOptions,
        end_time: SimulationTime,
        bootstrap_end_time: SimulationTime,
        seed: u64,
    ) -> anyhow::Result<Self> {
        log::debug!(
            "manager starting: {} configured host(s), end_time={end_time}, bootstrap_end_time={bootstrap_end_time}, seed={seed}",
            config.hosts.len()
        );
        Ok(ReferenceManager { handle, end_time, bootstrap_end_time, seed, hosts: Vec::new() })
    }
}

impl SimulationManager for ReferenceManager {
    fn add_virtual_host(&mut self, params: &HostParameters) -> anyhow::Result<()> {
        self.hosts.push(params.hostname.clone());
        Ok(())
    }

    fn add_virtual_process(
        &mut self,
        _hostname: &str,
        _process: &ProcessDescriptor,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn run(&mut self) -> anyhow::Result<i32> {
        loop {
            let (_, window_end) = self.handle.window();
            let (_, _, keep_going) = self.handle.manager_finished_current_round(window_end);
            if !keep_going {
                break;
            }
        }
        log::debug!(
            "manager finished: end_time={}, bootstrap_end_time={}, seed={}",
            self.end_time,
            self.bootstrap_end_time,
            self.seed
        );
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::controller::tests::test_handle;

    fn minimal_config() -> ConfigOptions {
        ConfigOptions::from_yaml_str(
            "general:\n  stop_time: \"1 s\"\nnetwork:\n  graph_path: \"x.gml\"\n",
        )
        .unwrap()
    }

    #[test]
    fn reference_manager_drives_rounds_to_a_fixed_point() {
        let handle = test_handle(SimulationTime::from_millis(30));
        let config = minimal_config();
        let mut manager = ReferenceManager::new(
            handle,
            &config,
            SimulationTime::from_millis(30),
            SimulationTime::ZERO,
            42,
        )
        .unwrap();
        manager.add_virtual_host(&HostParameters {
            hostname: "a".to_string(),
            cpu_threshold: SimulationTime::ZERO,
            cpu_precision: SimulationTime::ZERO,
            ip_addr: "10.0.0.1".parse().unwrap(),
            log_level: crate::core::configuration::LogLevel::Info,
            heartbeat_log_level: crate::core::configuration::LogLevel::Info,
            heartbeat_interval: None,
            pcap_dir: None,
            send_buf_size: None,
            recv_buf_size: None,
            autotune_send_buf: false,
            autotune_recv_buf: false,
            interface_buf_size: None,
            qdisc: crate::core::configuration::QDiscMode::Fifo,
            requested_bw_down_bits: 1_000_000,
            requested_bw_up_bits: 1_000_000,
        }).unwrap();
        assert_eq!(manager.run().unwrap(), 0);
    }
}
