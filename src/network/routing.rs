//! The routing oracle: precomputed per-pair latency/reliability plus a
//! mutable packet counter, consulted by the simulated network layer.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::RwLock;

use crate::core::simulation_time::SimulationTime;
use crate::network::graph::{IpAssignment, NetworkGraph, PathProperties};

/// Immutable after construction except for the packet counters, which are
/// sharded behind a lock so concurrent workers can bump them.
pub struct RoutingInfo {
    paths: HashMap<(u32, u32), PathProperties>,
    packet_counters: RwLock<HashMap<(u32, u32), u64>>,
}

impl RoutingInfo {
    pub fn new(paths: HashMap<(u32, u32), PathProperties>) -> Self {
        RoutingInfo { paths, packet_counters: RwLock::new(HashMap::new()) }
    }

    /// Build routing info for every node with an assigned IP, computing
    /// either full shortest paths or direct-edge-only routing.
    pub fn build(
        graph: &NetworkGraph,
        assignment: &IpAssignment,
        use_shortest_path: bool,
    ) -> anyhow::Result<Self> {
        let mut node_ids: Vec<u32> = assignment.assigned_nodes().into_iter().collect();
        node_ids.sort_unstable();
        let paths = if use_shortest_path {
            graph.compute_shortest_paths(&node_ids)?
        } else {
            graph.direct_paths(&node_ids)?
        };
        Ok(RoutingInfo::new(paths))
    }

    fn pair(&self, assignment: &IpAssignment, src: IpAddr, dst: IpAddr) -> Option<(u32, u32)> {
        let src_node = assignment.node_of(src)?;
        let dst_node = assignment.node_of(dst)?;
        Some((src_node, dst_node))
    }

    pub fn is_routable(&self, assignment: &IpAssignment, src: IpAddr, dst: IpAddr) -> bool {
        match self.pair(assignment, src, dst) {
            Some(pair) => self.paths.contains_key(&pair),
            None => false,
        }
    }

    /// Latency between two hosts, or `None` if they are not routable.
    pub fn latency(
        &self,
        assignment: &IpAssignment,
        src: IpAddr,
        dst: IpAddr,
    ) -> Option<SimulationTime> {
        let pair = self.pair(assignment, src, dst)?;
        self.paths.get(&pair).map(|p| SimulationTime::from_nanos(p.latency_ns))
    }

    /// Per-packet delivery probability between two hosts.
    pub fn reliability(&self, assignment: &IpAssignment, src: IpAddr, dst: IpAddr) -> Option<f32> {
        let pair = self.pair(assignment, src, dst)?;
        self.paths.get(&pair).map(|p| 1.0 - p.packet_loss)
    }

    pub fn increment_packet_count(&self, assignment: &IpAssignment, src: IpAddr, dst: IpAddr) {
        let Some(pair) = self.pair(assignment, src, dst) else { return };
        let mut counters = self.packet_counters.write().unwrap();
        counters
            .entry(pair)
            .and_modify(|c| *c = c.saturating_add(1))
            .or_insert(1);
    }

    pub fn packet_count(&self, src_node: u32, dst_node: u32) -> u64 {
        self.packet_counters.read().unwrap().get(&(src_node, dst_node)).copied().unwrap_or(0)
    }

    pub fn smallest_latency_ns(&self) -> Option<u64> {
        self.paths.values().map(|p| p.latency_ns).filter(|&l| l > 0).min()
    }
}
