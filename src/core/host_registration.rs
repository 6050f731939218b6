//! The two-phase host registration pipeline.
//!
//! Pinned addresses are registered before auto-assigned ones, bandwidth
//! resolution prefers host options over graph annotations, and process
//! argv/environment are built as owned, scope-bounded buffers.

use std::net::IpAddr;

use crate::core::configuration::{ConfigOptions, GeneralOptions, HostOptions, QDiscMode};
use crate::core::error::ControllerError;
use crate::core::simulation_time::SimulationTime;
use crate::network::graph::NetworkGraph;
use crate::network::routing::RoutingInfo;

/// Parameters the manager needs to instantiate a virtual host.
#[derive(Debug, Clone)]
pub struct HostParameters {
    pub hostname: String,
    pub cpu_threshold: SimulationTime,
    pub cpu_precision: SimulationTime,
    pub ip_addr: IpAddr,
    pub log_level: crate::core::configuration::LogLevel,
    pub heartbeat_log_level: crate::core::configuration::LogLevel,
    pub heartbeat_interval: Option<SimulationTime>,
    pub pcap_dir: Option<std::path::PathBuf>,
    pub send_buf_size: Option<u64>,
    pub recv_buf_size: Option<u64>,
    pub autotune_send_buf: bool,
    pub autotune_recv_buf: bool,
    pub interface_buf_size: Option<u64>,
    pub qdisc: QDiscMode,
    pub requested_bw_down_bits: u64,
    pub requested_bw_up_bits: u64,
}

/// A single process to launch on a host.
#[derive(Debug, Clone)]
pub struct ProcessDescriptor {
    pub plugin_path: std::path::PathBuf,
    pub start_time: SimulationTime,
    pub stop_time: Option<SimulationTime>,
    pub argv: Vec<String>,
    pub environment: String,
}

/// A fully resolved host ready for registration with the manager.
pub struct ResolvedHost {
    pub params: HostParameters,
    pub processes: Vec<ProcessDescriptor>,
}

fn expected_hostname(base: &str, quantity: u32, index: u32) -> String {
    if quantity == 1 {
        base.to_string()
    } else {
        format!("{base}{index}")
    }
}

fn resolve_bandwidth(
    name: &str,
    host: &HostOptions,
    node: &crate::network::graph::NetworkNode,
) -> anyhow::Result<(u64, u64)> {
    let down = host
        .bandwidth_down
        .map(|b| b.as_u64())
        .or(node.bandwidth_down_bits)
        .ok_or_else(|| {
            log::error!("host '{name}': no downstream bandwidth available");
            ControllerError::HostValidation {
                host: name.to_string(),
                reason: "no downstream bandwidth available".into(),
            }
        })?;
    let up = host
        .bandwidth_up
        .map(|b| b.as_u64())
        .or(node.bandwidth_up_bits)
        .ok_or_else(|| {
            log::error!("host '{name}': no upstream bandwidth available");
            ControllerError::HostValidation {
                host: name.to_string(),
                reason: "no upstream bandwidth available".into(),
            }
        })?;
    if down == 0 || up == 0 {
        log::error!("host '{name}': bandwidth must be nonzero (down={down}, up={up})");
        return Err(ControllerError::HostValidation {
            host: name.to_string(),
            reason: format!("bandwidth must be nonzero (down={down}, up={up})"),
        }
        .into());
    }
    Ok((down, up))
}

fn build_processes(name: &str, host: &HostOptions) -> anyhow::Result<Vec<ProcessDescriptor>> {
    let mut out = Vec::new();
    for proc_opts in &host.processes {
        let plugin_path = crate::utility::resolve_plugin_path(&proc_opts.path).map_err(|e| {
            log::error!("host '{name}': could not resolve plugin '{}': {e}", proc_opts.path);
            ControllerError::PluginResolution { plugin: proc_opts.path.clone(), reason: e.to_string() }
        })?;
        let user_args = match &proc_opts.args {
            Some(a) => a.clone().into_vec()?,
            None => Vec::new(),
        };
        let mut argv = vec![plugin_path.to_string_lossy().into_owned()];
        argv.extend(user_args);

        let start_time = crate::utility::units::parse_time(&proc_opts.start_time)?;
        let stop_time = proc_opts
            .stop_time
            .as_deref()
            .map(crate::utility::units::parse_time)
            .transpose()?;

        for _ in 0..proc_opts.quantity.0 {
            out.push(ProcessDescriptor {
                plugin_path: plugin_path.clone(),
                start_time,
                stop_time,
                argv: argv.clone(),
                environment: proc_opts.environment.clone(),
            });
        }
    }
    Ok(out)
}

/// Resolve every configured host entry into concrete, addressed hosts, in
/// two phases: pinned IPs first, then auto-assigned ones. Returns the
/// resolved hosts in registration order.
pub fn resolve_hosts(
    config: &ConfigOptions,
    graph: &NetworkGraph,
    assignment: &mut crate::network::graph::IpAssignment,
) -> anyhow::Result<Vec<ResolvedHost>> {
    let mut resolved = Vec::new();

    // Phase 1: pinned addresses.
    for (name, host) in &config.hosts {
        if host.ip_addr.is_none() {
            continue;
        }
        if host.quantity.0 > 1 {
            log::error!("host '{name}': quantity > 1 is incompatible with a pinned IP address");
            return Err(ControllerError::HostValidation {
                host: name.clone(),
                reason: "quantity > 1 is incompatible with a pinned IP address".into(),
            }
            .into());
        }
        let node = graph.nodes.iter().find(|n| n.id == host.network_node_id).ok_or_else(|| {
            log::error!("host '{name}': references unknown node id {}", host.network_node_id);
            ControllerError::HostValidation {
                host: name.clone(),
                reason: format!("references unknown node id {}", host.network_node_id),
            }
        })?;

        let ip = host.ip_addr.unwrap();
        assignment.assign_ip(host.network_node_id, ip).map_err(|e| {
            log::error!("host '{name}': {e}");
            ControllerError::Assignment(format!("host '{name}': {e}"))
        })?;

        let (down, up) = resolve_bandwidth(name, host, node)?;
        let processes = build_processes(name, host)?;
        resolved.push(ResolvedHost {
            params: build_params(name, host, ip, down, up, &config.general),
            processes,
        });
    }

    // Phase 2: auto-assigned addresses.
    for (name, host) in &config.hosts {
        if host.ip_addr.is_some() {
            continue;
        }
        let node = graph.nodes.iter().find(|n| n.id == host.network_node_id).ok_or_else(|| {
            log::error!("host '{name}': references unknown node id {}", host.network_node_id);
            ControllerError::HostValidation {
                host: name.clone(),
                reason: format!("references unknown node id {}", host.network_node_id),
            }
        })?;
        let (down, up) = resolve_bandwidth(name, host, node)?;

        for i in 1..=host.quantity.0 {
            let hostname = expected_hostname(name, host.quantity.0, i);
            let ip = assignment.assign(host.network_node_id);
            let processes = build_processes(&hostname, host)?;
            resolved.push(ResolvedHost {
                params: build_params(&hostname, host, ip, down, up, &config.general),
                processes,
            });
        }
    }

    Ok(resolved)
}

fn build_params(
    hostname: &str,
    host: &HostOptions,
    ip: IpAddr,
    down_bits: u64,
    up_bits: u64,
    general: &GeneralOptions,
) -> HostParameters {
    HostParameters {
        hostname: hostname.to_string(),
        cpu_threshold: SimulationTime::ZERO,
        cpu_precision: SimulationTime::from_nanos(200),
        ip_addr: ip,
        log_level: host.log_level.unwrap_or_default(),
        heartbeat_log_level: host.heartbeat_log_level.unwrap_or_default(),
        heartbeat_interval: host
            .heartbeat_interval
            .as_deref()
            .and_then(|s| crate::utility::units::parse_time(s).ok()),
        pcap_dir: host.pcap_directory.clone(),
        send_buf_size: general.socket_send_buffer,
        recv_buf_size: general.socket_recv_buffer,
        autotune_send_buf: general.socket_send_autotune,
        autotune_recv_buf: general.socket_recv_autotune,
        interface_buf_size: general.interface_buffer,
        qdisc: general.interface_qdisc,
        requested_bw_down_bits: down_bits,
        requested_bw_up_bits: up_bits,
    }
}

/// Build the routing oracle once every host has been registered.
pub fn compute_routing(
    graph: &NetworkGraph,
    assignment: &crate::network::graph::IpAssignment,
    use_shortest_path: bool,
) -> anyhow::Result<RoutingInfo> {
    RoutingInfo::build(graph, assignment, use_shortest_path).map_err(|e| {
        log::error!("routing: {e}");
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::graph::IpAssignment;
    use std::net::Ipv4Addr;

    fn config_with(yaml: &str) -> ConfigOptions {
        ConfigOptions::from_yaml_str(yaml).unwrap()
    }

    fn simple_graph() -> NetworkGraph {
        NetworkGraph::parse(
            r#"
graph [
  node [ id 0 bandwidth_down "1 Gbit" bandwidth_up "1 Gbit" ]
]"#,
        )
        .unwrap()
    }

    #[test]
    fn pinned_host_registers_before_auto_assigned() {
        let yaml = r#"
general:
  stop_time: "1 s"
network:
  graph_path: "x.gml"
hosts:
  a:
    network_node_id: 0
    ip_addr: "10.0.0.5"
  b:
    network_node_id: 0
    quantity: 3
"#;
        let config = config_with(yaml);
        let graph = simple_graph();
        let mut assignment = IpAssignment::new();
        let hosts = resolve_hosts(&config, &graph, &mut assignment).unwrap();

        assert_eq!(hosts[0].params.hostname, "a");
        assert_eq!(hosts[0].params.ip_addr, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));

        let auto_names: Vec<_> = hosts[1..].iter().map(|h| h.params.hostname.clone()).collect();
        assert_eq!(auto_names, vec!["b1", "b2", "b3"]);
        let auto_ips: std::collections::HashSet<_> =
            hosts[1..].iter().map(|h| h.params.ip_addr).collect();
        assert_eq!(auto_ips.len(), 3);
        assert!(!auto_ips.contains(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))));
    }

    #[test]
    fn quantity_with_pinned_ip_is_rejected() {
        let yaml = r#"
general:
  stop_time: "1 s"
network:
  graph_path: "x.gml"
hosts:
  a:
    network_node_id: 0
    quantity: 2
    ip_addr: "10.0.0.5"
"#;
        let config = config_with(yaml);
        let graph = simple_graph();
        let mut assignment = IpAssignment::new();
        assert!(resolve_hosts(&config, &graph, &mut assignment).is_err());
    }

    #[test]
    fn general_socket_and_qdisc_options_flow_into_host_parameters() {
        let yaml = r#"
general:
  stop_time: "1 s"
  socket_send_buffer: 131072
  socket_recv_buffer: 262144
  socket_send_autotune: true
  interface_buffer: 65536
  interface_qdisc: roundrobin
network:
  graph_path: "x.gml"
hosts:
  a:
    network_node_id: 0
"#;
        let config = config_with(yaml);
        let graph = simple_graph();
        let mut assignment = IpAssignment::new();
        let hosts = resolve_hosts(&config, &graph, &mut assignment).unwrap();

        let params = &hosts[0].params;
        assert_eq!(params.send_buf_size, Some(131072));
        assert_eq!(params.recv_buf_size, Some(262144));
        assert!(params.autotune_send_buf);
        assert!(!params.autotune_recv_buf);
        assert_eq!(params.interface_buf_size, Some(65536));
        assert!(matches!(params.qdisc, QDiscMode::RoundRobin));
    }

    #[test]
    fn missing_bandwidth_is_a_fatal_error() {
        let yaml = r#"
general:
  stop_time: "1 s"
network:
  graph_path: "x.gml"
hosts:
  a:
    network_node_id: 0
"#;
        let config = config_with(yaml);
        let graph = NetworkGraph::parse("graph [\n  node [ id 0 ]\n]").unwrap();
        let mut assignment = IpAssignment::new();
        assert!(resolve_hosts(&config, &graph, &mut assignment).is_err());
    }
}
