//! A bidirectional hostname/address registry.
//!
//! A single mutable registry supporting incremental registration, so it can
//! be filled in during two-phase host registration rather than built all at
//! once.

use std::collections::HashMap;
use std::net::Ipv4Addr;

#[derive(Debug, Clone)]
pub struct Record {
    pub name: String,
    pub addr: Ipv4Addr,
}

/// Name <-> address registry consulted by simulated hosts.
#[derive(Default)]
pub struct Dns {
    name_index: HashMap<String, Record>,
    addr_index: HashMap<Ipv4Addr, Record>,
}

impl Dns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host. Loopback and unspecified addresses are skipped
    /// (they're not meaningful entries in a simulated DNS).
    pub fn register(&mut self, name: &str, addr: Ipv4Addr) {
        if addr.is_loopback() || addr.is_unspecified() {
            return;
        }
        let record = Record { name: name.to_string(), addr };
        self.name_index.insert(name.to_string(), record.clone());
        self.addr_index.insert(addr, record);
    }

    pub fn name_to_addr(&self, name: &str) -> Option<Ipv4Addr> {
        self.name_index.get(name).map(|r| r.addr)
    }

    pub fn addr_to_name(&self, addr: Ipv4Addr) -> Option<&str> {
        self.addr_index.get(&addr).map(|r| r.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_resolve_both_directions() {
        let mut dns = Dns::new();
        dns.register("server0", Ipv4Addr::new(11, 0, 0, 1));
        dns.register("server1", Ipv4Addr::new(11, 0, 0, 2));

        assert_eq!(dns.name_to_addr("server0"), Some(Ipv4Addr::new(11, 0, 0, 1)));
        assert_eq!(dns.addr_to_name(Ipv4Addr::new(11, 0, 0, 2)), Some("server1"));
        assert_eq!(dns.name_to_addr("unknown"), None);
    }

    #[test]
    fn loopback_and_unspecified_are_skipped() {
        let mut dns = Dns::new();
        dns.register("localhost", Ipv4Addr::new(127, 0, 0, 1));
        dns.register("nothing", Ipv4Addr::UNSPECIFIED);
        assert_eq!(dns.name_to_addr("localhost"), None);
        assert_eq!(dns.name_to_addr("nothing"), None);
    }
}
