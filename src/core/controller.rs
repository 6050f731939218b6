//! The controller orchestrator: composes every other component, spawns the
//! manager, drives the round loop, and tears down.
//!
//! The manager never owns the controller back: it's handed a capability
//! object (`ControllerHandle` over `Arc<SimShared>`) instead, which avoids a
//! cyclic reference between the two.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::core::configuration::{ConfigOptions, LogLevel};
use crate::core::error::ControllerError;
use crate::core::host_registration::{self, HostParameters, ProcessDescriptor};
use crate::core::logger::BufferedLogger;
use crate::core::manager::{ReferenceManager, SimulationManager};
use crate::core::simulation_time::SimulationTime;
use crate::core::time_window::TimeWindowEngine;
use crate::network::dns::Dns;
use crate::network::graph::{IpAssignment, NetworkGraph};
use crate::network::routing::RoutingInfo;

/// The capability object the manager is given: routing queries, DNS
/// lookups, and round-completion reporting. Never mutual ownership.
pub trait ControllerHandle: Send + Sync {
    fn window(&self) -> (SimulationTime, SimulationTime);
    fn get_latency(&self, src: IpAddr, dst: IpAddr) -> Option<SimulationTime>;
    fn get_reliability(&self, src: IpAddr, dst: IpAddr) -> Option<f32>;
    fn is_routable(&self, src: IpAddr, dst: IpAddr) -> bool;
    fn increment_packet_count(&self, src: IpAddr, dst: IpAddr);
    fn name_to_addr(&self, name: &str) -> Option<IpAddr>;
    fn manager_finished_current_round(
        &self,
        min_next_event_time: SimulationTime,
    ) -> (SimulationTime, SimulationTime, bool);
    fn update_min_time_jump(&self, observed: SimulationTime);
    fn increment_plugin_errors(&self);
}

/// State shared between the controller and the manager through the
/// `ControllerHandle` capability, built once host registration and routing
/// are complete.
pub struct SimShared {
    ip_assignment: RwLock<IpAssignment>,
    dns: RwLock<Dns>,
    routing: RwLock<Option<RoutingInfo>>,
    time_window: TimeWindowEngine,
    plugin_errors: AtomicU32,
}

impl SimShared {
    pub fn plugin_error_count(&self) -> u32 {
        self.plugin_errors.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.time_window.request_stop();
    }
}

impl ControllerHandle for SimShared {
    fn window(&self) -> (SimulationTime, SimulationTime) {
        self.time_window.window()
    }

    fn get_latency(&self, src: IpAddr, dst: IpAddr) -> Option<SimulationTime> {
        let assignment = self.ip_assignment.read().unwrap();
        let routing = self.routing.read().unwrap();
        routing.as_ref()?.latency(&assignment, src, dst)
    }

    fn get_reliability(&self, src: IpAddr, dst: IpAddr) -> Option<f32> {
        let assignment = self.ip_assignment.read().unwrap();
        let routing = self.routing.read().unwrap();
        routing.as_ref()?.reliability(&assignment, src, dst)
    }

    fn is_routable(&self, src: IpAddr, dst: IpAddr) -> bool {
        let assignment = self.ip_assignment.read().unwrap();
        match self.routing.read().unwrap().as_ref() {
            Some(r) => r.is_routable(&assignment, src, dst),
            None => false,
        }
    }

    fn increment_packet_count(&self, src: IpAddr, dst: IpAddr) {
        let assignment = self.ip_assignment.read().unwrap();
        if let Some(r) = self.routing.read().unwrap().as_ref() {
            r.increment_packet_count(&assignment, src, dst);
        }
    }

    fn name_to_addr(&self, name: &str) -> Option<IpAddr> {
        self.dns.read().unwrap().name_to_addr(name).map(IpAddr::V4)
    }

    fn manager_finished_current_round(
        &self,
        min_next_event_time: SimulationTime,
    ) -> (SimulationTime, SimulationTime, bool) {
        self.time_window.manager_finished_current_round(min_next_event_time)
    }

    fn update_min_time_jump(&self, observed: SimulationTime) {
        self.time_window.update_min_time_jump(observed);
    }

    fn increment_plugin_errors(&self) {
        self.plugin_errors.fetch_add(1, Ordering::SeqCst);
    }
}

/// The top-level coordinator: owns topology/addressing/DNS/randomness and
/// drives the manager through the run.
pub struct Controller {
    config: ConfigOptions,
    run_timer: Instant,
    random: Xoshiro256PlusPlus,
    graph: Option<NetworkGraph>,
    shared: Arc<SimShared>,
    manager: Box<dyn SimulationManager>,
    logger: Option<&'static BufferedLogger>,
}

impl Controller {
    /// Parse the topology, build empty addressing/DNS state, compute the
    /// initial window, and spawn the manager.
    pub fn new(config: ConfigOptions, graph_source: &str) -> anyhow::Result<Self> {
        let graph = NetworkGraph::parse(graph_source)
            .map_err(|e| ControllerError::Topology(format!("failed to load network graph: {e}")))?;

        let seed = config.general.seed.unwrap_or(0);
        let mut random = Xoshiro256PlusPlus::seed_from_u64(seed);

        let end_time = config.stop_time()?;
        let bootstrap_end_time = config.bootstrap_end_time()?;
        let min_jump_config = config.runahead()?;

        let time_window =
            TimeWindowEngine::new(min_jump_config, end_time, bootstrap_end_time, config.general.workers);

        let shared = Arc::new(SimShared {
            ip_assignment: RwLock::new(IpAssignment::new()),
            dns: RwLock::new(Dns::new()),
            routing: RwLock::new(None),
            time_window,
            plugin_errors: AtomicU32::new(0),
        });

        let manager_seed: u64 = random.gen();

        let manager: Box<dyn SimulationManager> = Box::new(
            ReferenceManager::new(
                Arc::clone(&shared) as Arc<dyn ControllerHandle>,
                &config,
                end_time,
                bootstrap_end_time,
                manager_seed,
            )
            .expect("manager construction must not fail"),
        );

        Ok(Controller {
            config,
            run_timer: Instant::now(),
            random,
            graph: Some(graph),
            shared,
            manager,
            logger: None,
        })
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.run_timer.elapsed()
    }

    /// Attach the process-wide logger so the run phase can scope buffering
    /// to just the manager round loop.
    pub fn with_logger(mut self, logger: &'static BufferedLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Register hosts, compute routing, drive the manager, and tear down.
    pub fn run(mut self) -> anyhow::Result<i32> {
        let graph = self
            .graph
            .as_ref()
            .expect("graph must be present before registration");

        let mut assignment = self.shared.ip_assignment.write().unwrap();
        let resolved = host_registration::resolve_hosts(&self.config, graph, &mut assignment)?;
        drop(assignment);

        {
            let assignment = self.shared.ip_assignment.read().unwrap();
            let mut dns = self.shared.dns.write().unwrap();
            for host in &resolved {
                if let IpAddr::V4(v4) = host.params.ip_addr {
                    dns.register(&host.params.hostname, v4);
                }
            }
            let _ = assignment;
        }

        for host in &resolved {
            self.manager.add_virtual_host(&host.params)?;
            for process in &host.processes {
                self.manager.add_virtual_process(&host.params.hostname, process)?;
            }
        }

        let routing = {
            let assignment = self.shared.ip_assignment.read().unwrap();
            host_registration::compute_routing(graph, &assignment, self.config.network.use_shortest_path)?
        };
        if let Some(latency) = routing.smallest_latency_ns() {
            self.shared
                .time_window
                .update_min_time_jump(SimulationTime::from_nanos(latency));
        }
        *self.shared.routing.write().unwrap() = Some(routing);

        // The topology is only needed up to routing computation.
        self.graph = None;

        // Buffer log output for the hot run phase only, unless trace logging
        // was requested, where ordering matters more than throughput.
        // Registration and routing diagnostics above are written
        // synchronously and are never at risk of an unflushed buffer.
        let buffer_for_run = self.config.general.log_level != LogLevel::Trace;
        if buffer_for_run {
            if let Some(logger) = self.logger {
                logger.set_buffering_enabled(true);
            }
        }

        let run_result = self.manager.run();

        if buffer_for_run {
            if let Some(logger) = self.logger {
                logger.set_buffering_enabled(false);
            }
        }

        let exit_code = run_result?;

        if self.shared.plugin_error_count() > 0 && exit_code == 0 {
            return Ok(1);
        }
        Ok(exit_code)
    }

    pub fn random_seed_draw(&mut self) -> u64 {
        self.random.gen()
    }

    pub fn handle(&self) -> Arc<dyn ControllerHandle> {
        Arc::clone(&self.shared) as Arc<dyn ControllerHandle>
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.graph.is_some() {
            log::warn!("controller dropped with the network graph still held; run did not complete normally");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a minimal `ControllerHandle` for manager-level unit tests: a
    /// single-worker time window ending at `end_time`, no routing state.
    pub(crate) fn test_handle(end_time: SimulationTime) -> Arc<dyn ControllerHandle> {
        Arc::new(SimShared {
            ip_assignment: RwLock::new(IpAssignment::new()),
            dns: RwLock::new(Dns::new()),
            routing: RwLock::new(None),
            time_window: TimeWindowEngine::new(SimulationTime::ZERO, end_time, SimulationTime::ZERO, 1),
            plugin_errors: AtomicU32::new(0),
        })
    }

    fn minimal_config(yaml: &str) -> ConfigOptions {
        ConfigOptions::from_yaml_str(yaml).unwrap()
    }

    #[test]
    fn run_registers_hosts_computes_routing_and_completes() {
        let yaml = r#"
general:
  stop_time: "100 ms"
  seed: 7
network:
  graph_path: "x.gml"
  use_shortest_path: true
hosts:
  server:
    network_node_id: 0
  client:
    network_node_id: 1
"#;
        let graph_src = r#"
graph [
  directed 1
  node [ id 0 bandwidth_down "1 Gbit" bandwidth_up "1 Gbit" ]
  node [ id 1 bandwidth_down "1 Gbit" bandwidth_up "1 Gbit" ]
  edge [ source 0 target 1 latency 5000000 ]
  edge [ source 1 target 0 latency 5000000 ]
]"#;
        let controller = Controller::new(minimal_config(yaml), graph_src).unwrap();
        let exit_code = controller.run().unwrap();
        assert_eq!(exit_code, 0);
    }

    #[test]
    fn invalid_host_config_surfaces_as_an_error_before_manager_runs() {
        let yaml = r#"
general:
  stop_time: "100 ms"
network:
  graph_path: "x.gml"
hosts:
  bad:
    network_node_id: 0
    quantity: 2
    ip_addr: "10.0.0.5"
"#;
        let graph_src = "graph [\n  node [ id 0 bandwidth_down \"1 Gbit\" bandwidth_up \"1 Gbit\" ]\n]";
        let controller = Controller::new(minimal_config(yaml), graph_src).unwrap();
        assert!(controller.run().is_err());
    }
}
