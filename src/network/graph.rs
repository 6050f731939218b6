//! The network topology and IP assignment components.
//!
//! Node/edge validation, an `11.0.0.0`-based address pool, and a
//! Dijkstra-via-rayon shortest-path precompute over the parsed graph.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::Add;

use petgraph::graph::{Graph, NodeIndex};
use petgraph::{Directed, Undirected};
use rayon::prelude::*;

use crate::network::gml;

/// A topology node: its GML id plus bandwidth annotations (bits/sec).
#[derive(Debug, Clone, Copy)]
pub struct NetworkNode {
    pub id: u32,
    pub bandwidth_down_bits: Option<u64>,
    pub bandwidth_up_bits: Option<u64>,
}

impl<'a> TryFrom<&gml::Node<'a>> for NetworkNode {
    type Error = anyhow::Error;

    fn try_from(node: &gml::Node<'a>) -> anyhow::Result<Self> {
        let id = node
            .id
            .ok_or_else(|| anyhow::anyhow!("graph node is missing an 'id' field"))?;
        let bandwidth_down_bits = node
            .other
            .get("bandwidth_down")
            .and_then(|v| v.as_str())
            .map(|s| crate::utility::units::parse_bits_per_sec(s))
            .transpose()?
            .map(|b| b.as_u64());
        let bandwidth_up_bits = node
            .other
            .get("bandwidth_up")
            .and_then(|v| v.as_str())
            .map(|s| crate::utility::units::parse_bits_per_sec(s))
            .transpose()?
            .map(|b| b.as_u64());
        Ok(NetworkNode { id, bandwidth_down_bits, bandwidth_up_bits })
    }
}

/// A topology edge: latency (ns) and packet loss probability in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct NetworkEdge {
    pub source: u32,
    pub target: u32,
    pub latency_ns: u64,
    pub packet_loss: f32,
}

impl<'a> TryFrom<&gml::Edge<'a>> for NetworkEdge {
    type Error = anyhow::Error;

    fn try_from(edge: &gml::Edge<'a>) -> anyhow::Result<Self> {
        // A bare number is already nanoseconds; a quoted string like "5 ms"
        // goes through the unit parser.
        let latency_ns = match edge.other.get("latency") {
            Some(v) => match v.as_str() {
                Some(s) => crate::utility::units::parse_time(s)?.as_nanos(),
                None => v
                    .as_float()
                    .map(|f| f as u64)
                    .ok_or_else(|| anyhow::anyhow!("edge has a malformed 'latency' value"))?,
            },
            None => anyhow::bail!("edge {}->{} is missing a 'latency' field", edge.source, edge.target),
        };
        if latency_ns == 0 {
            anyhow::bail!("edge {}->{} has zero latency", edge.source, edge.target);
        }
        let packet_loss = edge
            .other
            .get("packet_loss")
            .and_then(|v| v.as_float())
            .unwrap_or(0.0);
        if !(0.0..=1.0).contains(&packet_loss) {
            anyhow::bail!(
                "edge {}->{} has packet_loss {} outside [0, 1]",
                edge.source,
                edge.target,
                packet_loss
            );
        }
        Ok(NetworkEdge { source: edge.source, target: edge.target, latency_ns, packet_loss })
    }
}

/// Precomputed per-pair path properties (sum of latency, compounded loss).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathProperties {
    pub latency_ns: u64,
    pub packet_loss: f32,
}

impl Add for PathProperties {
    type Output = PathProperties;
    fn add(self, rhs: PathProperties) -> PathProperties {
        PathProperties {
            latency_ns: self.latency_ns + rhs.latency_ns,
            packet_loss: 1.0 - (1.0 - self.packet_loss) * (1.0 - rhs.packet_loss),
        }
    }
}

impl From<&NetworkEdge> for PathProperties {
    fn from(e: &NetworkEdge) -> Self {
        PathProperties { latency_ns: e.latency_ns, packet_loss: e.packet_loss }
    }
}

enum GraphWrapper {
    Directed(Graph<u32, NetworkEdge, Directed>),
    Undirected(Graph<u32, NetworkEdge, Undirected>),
}

/// The parsed topology, kept only until routing has been computed.
pub struct NetworkGraph {
    wrapper: GraphWrapper,
    node_id_to_index: HashMap<u32, NodeIndex>,
    pub nodes: Vec<NetworkNode>,
}

impl NetworkGraph {
    pub fn parse(gml_str: &str) -> anyhow::Result<Self> {
        let parsed = gml::parse(gml_str).map_err(|e| {
            log::error!("topology: could not parse network graph: {e}");
            anyhow::anyhow!("could not parse graph: {e}")
        })?;

        let nodes: Vec<NetworkNode> = parsed
            .nodes
            .iter()
            .map(NetworkNode::try_from)
            .collect::<anyhow::Result<_>>()
            .map_err(|e| {
                log::error!("topology: {e}");
                e
            })?;
        let edges: Vec<NetworkEdge> = parsed
            .edges
            .iter()
            .map(NetworkEdge::try_from)
            .collect::<anyhow::Result<_>>()
            .map_err(|e| {
                log::error!("topology: {e}");
                e
            })?;

        let mut node_id_to_index = HashMap::with_capacity(nodes.len());

        if parsed.directed {
            let mut graph = Graph::<u32, NetworkEdge, Directed>::new();
            for n in &nodes {
                node_id_to_index.insert(n.id, graph.add_node(n.id));
            }
            for e in &edges {
                let src = *node_id_to_index.get(&e.source).ok_or_else(|| {
                    log::error!("topology: edge references unknown node id {}", e.source);
                    anyhow::anyhow!("edge references unknown node id {}", e.source)
                })?;
                let dst = *node_id_to_index.get(&e.target).ok_or_else(|| {
                    log::error!("topology: edge references unknown node id {}", e.target);
                    anyhow::anyhow!("edge references unknown node id {}", e.target)
                })?;
                graph.add_edge(src, dst, *e);
            }
            Ok(NetworkGraph { wrapper: GraphWrapper::Directed(graph), node_id_to_index, nodes })
        } else {
            let mut graph = Graph::<u32, NetworkEdge, Undirected>::new_undirected();
            for n in &nodes {
                node_id_to_index.insert(n.id, graph.add_node(n.id));
            }
            for e in &edges {
                let src = *node_id_to_index.get(&e.source).ok_or_else(|| {
                    log::error!("topology: edge references unknown node id {}", e.source);
                    anyhow::anyhow!("edge references unknown node id {}", e.source)
                })?;
                let dst = *node_id_to_index.get(&e.target).ok_or_else(|| {
                    log::error!("topology: edge references unknown node id {}", e.target);
                    anyhow::anyhow!("edge references unknown node id {}", e.target)
                })?;
                graph.add_edge(src, dst, *e);
            }
            Ok(NetworkGraph { wrapper: GraphWrapper::Undirected(graph), node_id_to_index, nodes })
        }
    }

    pub fn contains_node(&self, id: u32) -> bool {
        self.node_id_to_index.contains_key(&id)
    }

    fn edge_weight(&self, a: u32, b: u32) -> anyhow::Result<Option<PathProperties>> {
        let ia = *self
            .node_id_to_index
            .get(&a)
            .ok_or_else(|| anyhow::anyhow!("unknown node id {a}"))?;
        let ib = *self
            .node_id_to_index
            .get(&b)
            .ok_or_else(|| anyhow::anyhow!("unknown node id {b}"))?;

        let weights: Vec<PathProperties> = match &self.wrapper {
            GraphWrapper::Directed(g) => g.edges_connecting(ia, ib).map(|e| e.weight().into()).collect(),
            GraphWrapper::Undirected(g) => g.edges_connecting(ia, ib).map(|e| e.weight().into()).collect(),
        };
        match weights.len() {
            0 => Ok(None),
            1 => Ok(Some(weights[0])),
            _ => anyhow::bail!("multiple edges exist between node {a} and node {b}"),
        }
    }

    /// Compute shortest paths between every pair of `nodes` via Dijkstra,
    /// one run per source node, in parallel.
    pub fn compute_shortest_paths(
        &self,
        nodes: &[u32],
    ) -> anyhow::Result<HashMap<(u32, u32), PathProperties>> {
        let results: Vec<anyhow::Result<Vec<((u32, u32), PathProperties)>>> = nodes
            .par_iter()
            .map(|&src| {
                let src_idx = *self
                    .node_id_to_index
                    .get(&src)
                    .ok_or_else(|| anyhow::anyhow!("unknown node id {src}"))?;
                let mut pairs = Vec::with_capacity(nodes.len());
                for &dst in nodes {
                    if src == dst {
                        // Self-loop: use a direct edge if one exists, else zero cost.
                        let props = self.edge_weight(src, dst)?.unwrap_or(PathProperties {
                            latency_ns: 0,
                            packet_loss: 0.0,
                        });
                        pairs.push(((src, dst), props));
                        continue;
                    }
                    let dst_idx = *self
                        .node_id_to_index
                        .get(&dst)
                        .ok_or_else(|| anyhow::anyhow!("unknown node id {dst}"))?;
                    let path = match &self.wrapper {
                        GraphWrapper::Directed(g) => petgraph::algo::dijkstra(g, src_idx, Some(dst_idx), |e| {
                            PathProperties::from(e.weight())
                        }),
                        GraphWrapper::Undirected(g) => {
                            petgraph::algo::dijkstra(g, src_idx, Some(dst_idx), |e| {
                                PathProperties::from(e.weight())
                            })
                        }
                    };
                    if let Some(props) = path.get(&dst_idx) {
                        pairs.push(((src, dst), *props));
                    }
                }
                Ok(pairs)
            })
            .collect();

        let mut out = HashMap::new();
        for r in results {
            for (k, v) in r? {
                out.insert(k, v);
            }
        }
        Ok(out)
    }

    /// Direct-edge-only routing: each pair must be connected by exactly one
    /// edge (no multi-hop path computation).
    pub fn direct_paths(&self, nodes: &[u32]) -> anyhow::Result<HashMap<(u32, u32), PathProperties>> {
        let mut out = HashMap::new();
        for &a in nodes {
            for &b in nodes {
                if a == b {
                    continue;
                }
                if let Some(props) = self.edge_weight(a, b)? {
                    out.insert((a, b), props);
                }
            }
        }
        Ok(out)
    }

    pub fn smallest_latency_ns(&self, paths: &HashMap<(u32, u32), PathProperties>) -> Option<u64> {
        paths.values().map(|p| p.latency_ns).filter(|&l| l > 0).min()
    }
}

/// Weight ordering used by `petgraph::algo::dijkstra`: shorter latency wins,
/// ties broken by lower packet loss.
impl PartialOrd for PathProperties {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.latency_ns
            .partial_cmp(&other.latency_ns)
            .map(|ord| ord.then_with(|| self.packet_loss.partial_cmp(&other.packet_loss).unwrap_or(std::cmp::Ordering::Equal)))
    }
}

impl Default for PathProperties {
    fn default() -> Self {
        PathProperties { latency_ns: 0, packet_loss: 0.0 }
    }
}
impl std::iter::Sum for PathProperties {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(PathProperties::default(), Add::add)
    }
}

/// A pinned-or-auto-assigned mapping of `IPv4` addresses to graph node ids.
///
/// Addresses are handed out starting at `11.0.0.0`, skipping network
/// (`.0`) and broadcast (`.255`) endings.
pub struct IpAssignment {
    map: HashMap<IpAddr, u32>,
    last_assigned: Ipv4Addr,
}

#[derive(Debug)]
pub struct IpPreviouslyAssignedError(pub IpAddr);

impl fmt::Display for IpPreviouslyAssignedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IP address {} is already assigned", self.0)
    }
}
impl std::error::Error for IpPreviouslyAssignedError {}

impl Default for IpAssignment {
    fn default() -> Self {
        IpAssignment { map: HashMap::new(), last_assigned: Ipv4Addr::new(11, 0, 0, 0) }
    }
}

impl IpAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a caller-supplied ("pinned") address for `node_id`.
    pub fn assign_ip(&mut self, node_id: u32, ip: IpAddr) -> Result<(), IpPreviouslyAssignedError> {
        if self.map.contains_key(&ip) {
            return Err(IpPreviouslyAssignedError(ip));
        }
        self.map.insert(ip, node_id);
        Ok(())
    }

    /// Auto-assign the next free address to `node_id`.
    pub fn assign(&mut self, node_id: u32) -> IpAddr {
        loop {
            let next = Self::increment_address(self.last_assigned);
            self.last_assigned = next;
            let octets = next.octets();
            if octets[3] == 0 || octets[3] == 255 {
                continue;
            }
            let ip = IpAddr::V4(next);
            if self.map.contains_key(&ip) {
                continue;
            }
            self.map.insert(ip, node_id);
            return ip;
        }
    }

    pub fn node_of(&self, ip: IpAddr) -> Option<u32> {
        self.map.get(&ip).copied()
    }

    pub fn assigned_nodes(&self) -> std::collections::HashSet<u32> {
        self.map.values().copied().collect()
    }

    fn increment_address(addr: Ipv4Addr) -> Ipv4Addr {
        let as_u32 = u32::from(addr).wrapping_add(1);
        Ipv4Addr::from(as_u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_directed() -> NetworkGraph {
        let src = r#"
graph [
  directed 1
  node [ id 0 ]
  node [ id 1 ]
  node [ id 2 ]
  edge [ source 0 target 1 latency 1000000 ]
  edge [ source 1 target 2 latency 2000000 ]
]"#;
        NetworkGraph::parse(src).unwrap()
    }

    fn sample_undirected() -> NetworkGraph {
        let src = r#"
graph [
  node [ id 0 ]
  node [ id 1 ]
  node [ id 2 ]
  edge [ source 0 target 1 latency 1000000 ]
  edge [ source 1 target 2 latency 2000000 ]
]"#;
        NetworkGraph::parse(src).unwrap()
    }

    #[test]
    fn path_add_sums_latency_and_compounds_loss() {
        let a = PathProperties { latency_ns: 10, packet_loss: 0.1 };
        let b = PathProperties { latency_ns: 20, packet_loss: 0.2 };
        let sum = a + b;
        assert_eq!(sum.latency_ns, 30);
        assert!((sum.packet_loss - (1.0 - 0.9 * 0.8)).abs() < 1e-6);
    }

    #[test]
    fn shortest_path_directed() {
        let g = sample_directed();
        let paths = g.compute_shortest_paths(&[0, 1, 2]).unwrap();
        assert_eq!(paths[&(0, 2)].latency_ns, 3_000_000);
        assert!(!paths.contains_key(&(2, 0)));
    }

    #[test]
    fn shortest_path_undirected() {
        let g = sample_undirected();
        let paths = g.compute_shortest_paths(&[0, 1, 2]).unwrap();
        assert_eq!(paths[&(0, 2)].latency_ns, 3_000_000);
        assert_eq!(paths[&(2, 0)].latency_ns, 3_000_000);
    }

    #[test]
    fn nonexistent_id_errors() {
        let g = sample_directed();
        assert!(g.compute_shortest_paths(&[0, 99]).is_err());
    }

    #[test]
    fn ip_assignment_skips_network_and_broadcast_endings() {
        let mut a = IpAssignment::new();
        a.last_assigned = Ipv4Addr::new(11, 0, 0, 254);
        let ip = a.assign(1);
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(11, 0, 1, 1)));
    }

    #[test]
    fn pinned_ip_conflict_is_rejected() {
        let mut a = IpAssignment::new();
        a.assign_ip(1, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))).unwrap();
        assert!(a.assign_ip(2, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))).is_err());
    }
}
