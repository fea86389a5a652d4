//! Local address selection and NAT policy for outbound SIP dialogues.
//!
//! Chooses the socket address a dialogue binds from and the address it
//! advertises to the far end, and decides when a received source address
//! should override what a peer's Contact claims.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::stun::client::StunClient;

/// Sense of an [`AclEntry`], mirroring the `permit`/`deny` sense of a
/// dialplan access list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclSense {
    Allow,
    Deny,
}

/// One CIDR rule in an [`Acl`].
#[derive(Debug, Clone, Copy)]
pub struct AclEntry {
    sense: AclSense,
    network: Ipv4Addr,
    mask: Ipv4Addr,
}

impl AclEntry {
    pub fn new(sense: AclSense, network: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self { sense, network, mask }
    }

    fn matches(&self, addr: Ipv4Addr) -> bool {
        u32::from(self.network) & u32::from(self.mask) == u32::from(addr) & u32::from(self.mask)
    }
}

/// Ordered access list, evaluated first-match-wins like `cw_apply_ha`.
///
/// `default` is the sense applied when nothing matches; `localnet` lists
/// default to `Deny` (nothing is "local" unless an entry says so), while a
/// general source ACL defaults to `Allow`.
#[derive(Debug, Clone)]
pub struct Acl {
    entries: Vec<AclEntry>,
    default: AclSense,
}

impl Acl {
    pub fn new(default: AclSense) -> Self {
        Self { entries: Vec::new(), default }
    }

    pub fn push(&mut self, entry: AclEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    pub fn permits(&self, addr: IpAddr) -> bool {
        let IpAddr::V4(addr) = addr else {
            return self.default == AclSense::Allow;
        };
        for entry in &self.entries {
            if entry.matches(addr) {
                return entry.sense == AclSense::Allow;
            }
        }
        self.default == AclSense::Allow
    }
}

impl Default for Acl {
    fn default() -> Self {
        Self::new(AclSense::Allow)
    }
}

/// NAT traversal policy applied per dialogue (RFC 3261/3581 terms used by
/// most SIP stacks: `never`, `route`, `always`, `rfc3581`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NatPolicy {
    /// Always trust the Contact-derived address.
    Never,
    /// Trust Contact for local peers; trust the received source address for
    /// everything else.
    #[default]
    Route,
    /// Always trust the received source address over Contact.
    Always,
    /// Use RFC 3581 `;rport`: trust the rport-echoed address.
    Rfc3581,
}

/// Static addressing configuration: where we consider ourselves "local",
/// what address we advertise when we're not, and how to reach a STUN server.
#[derive(Debug, Clone)]
pub struct AddressingConfig {
    pub localnet: Acl,
    pub externip: Option<IpAddr>,
    pub externhost: Option<String>,
    pub externrefresh: Duration,
    pub stun_server: Option<SocketAddr>,
    pub nat_policy: NatPolicy,
    pub bind_port: u16,
    /// Sockets this process actually has bound, for the listener-fallback step.
    pub listeners: Vec<SocketAddr>,
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self {
            localnet: Acl::new(AclSense::Deny),
            externip: None,
            externhost: None,
            externrefresh: Duration::from_secs(10),
            stun_server: None,
            nat_policy: NatPolicy::default(),
            bind_port: 5060,
            listeners: Vec::new(),
        }
    }
}

fn same_family(a: IpAddr, b: IpAddr) -> bool {
    matches!((a, b), (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)))
}

/// Resolves the local bind address and externally-visible address for
/// outbound dialogues, and arbitrates Contact vs. received-address trust.
pub struct AddressResolver {
    config: AddressingConfig,
    externhost_cache: RwLock<Option<(IpAddr, Instant)>>,
}

impl AddressResolver {
    pub fn new(config: AddressingConfig) -> Self {
        Self {
            config,
            externhost_cache: RwLock::new(None),
        }
    }

    /// Three-step local-address probe for an outbound dialogue to `destination`.
    pub async fn local_address_for(&self, destination: SocketAddr) -> std::io::Result<SocketAddr> {
        if !self.config.localnet.permits(destination.ip()) {
            if let Some(ip) = self.resolved_externip().await {
                debug!("Using configured externip/externhost {} for {}", ip, destination);
                return Ok(SocketAddr::new(ip, self.config.bind_port));
            }
        }

        // connect(2) a throwaway socket and read the kernel-assigned source address.
        let bind_any: SocketAddr = if destination.is_ipv6() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let probe = UdpSocket::bind(bind_any)?;
        probe.connect(destination)?;
        let local = probe.local_addr()?;

        if self.config.listeners.iter().any(|l| l.ip() == local.ip()) {
            return Ok(local);
        }
        if let Some(listener) = self
            .config
            .listeners
            .iter()
            .find(|l| same_family(l.ip(), local.ip()))
        {
            return Ok(*listener);
        }
        if destination.is_ipv4() {
            if let Some(v6) = self.config.listeners.iter().find(|l| l.is_ipv6()) {
                return Ok(*v6);
            }
        }
        Ok(local)
    }

    async fn resolved_externip(&self) -> Option<IpAddr> {
        if let Some(ip) = self.config.externip {
            return Some(ip);
        }
        let host = self.config.externhost.clone()?;
        {
            let cache = self.externhost_cache.read().await;
            if let Some((ip, at)) = *cache {
                if at.elapsed() < self.config.externrefresh {
                    return Some(ip);
                }
            }
        }
        let refreshed = tokio::task::spawn_blocking(move || {
            (host.as_str(), 0u16).to_socket_addrs().ok().and_then(|mut i| i.next()).map(|a| a.ip())
        })
        .await
        .ok()
        .flatten();
        if let Some(ip) = refreshed {
            *self.externhost_cache.write().await = Some((ip, Instant::now()));
            Some(ip)
        } else {
            warn!("externhost lookup failed; keeping stale cache if any");
            self.externhost_cache.read().await.map(|(ip, _)| ip)
        }
    }

    /// Issues a STUN binding request on `local_addr` and returns the
    /// externally-visible `(addr, port)` tuple, if a STUN server is configured.
    pub async fn discover_external(&self, local_addr: SocketAddr) -> Option<SocketAddr> {
        let server = self.config.stun_server?;
        let client = StunClient::new(server);
        match tokio::task::spawn_blocking(move || client.binding_request(local_addr)).await {
            Ok(Ok(result)) => {
                info!("STUN discovered external address {} for {}", result.public_addr, local_addr);
                Some(result.public_addr)
            }
            Ok(Err(e)) => {
                warn!("STUN binding request failed: {}", e);
                None
            }
            Err(e) => {
                warn!("STUN probe task panicked: {}", e);
                None
            }
        }
    }

    /// Whether `addr` falls inside the configured `localnet`.
    pub fn is_local(&self, addr: IpAddr) -> bool {
        self.config.localnet.permits(addr)
    }

    /// Decides which address a dialogue should trust for responses and
    /// re-INVITEs: the Contact-derived address, or the transport-observed
    /// received source address.
    pub fn advertised_address(
        &self,
        policy: NatPolicy,
        destination: SocketAddr,
        contact_addr: SocketAddr,
        received_addr: SocketAddr,
    ) -> SocketAddr {
        match policy {
            NatPolicy::Always => received_addr,
            NatPolicy::Route if !self.is_local(destination.ip()) => received_addr,
            NatPolicy::Rfc3581 => received_addr,
            _ => contact_addr,
        }
    }

    pub fn config(&self) -> &AddressingConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn localnet_acl_defaults_to_deny() {
        let acl = Acl::new(AclSense::Deny);
        assert!(!acl.permits("203.0.113.5".parse().unwrap()));
    }

    #[test]
    fn localnet_acl_matches_private_range() {
        let mut acl = Acl::new(AclSense::Deny);
        acl.push(AclEntry::new(AclSense::Allow, v4("192.168.0.0"), v4("255.255.0.0")));
        assert!(acl.permits("192.168.1.50".parse().unwrap()));
        assert!(!acl.permits("203.0.113.5".parse().unwrap()));
    }

    #[test]
    fn deny_entry_overrides_broader_allow() {
        let mut acl = Acl::new(AclSense::Allow);
        acl.push(AclEntry::new(AclSense::Deny, v4("192.168.1.100"), v4("255.255.255.255")));
        acl.push(AclEntry::new(AclSense::Allow, v4("192.168.0.0"), v4("255.255.0.0")));
        assert!(!acl.permits("192.168.1.100".parse().unwrap()));
        assert!(acl.permits("192.168.1.101".parse().unwrap()));
    }

    #[tokio::test]
    async fn local_address_for_uses_externip_when_non_local() {
        let mut config = AddressingConfig::default();
        config.externip = Some("203.0.113.10".parse().unwrap());
        config.bind_port = 5060;
        let resolver = AddressResolver::new(config);

        let addr = resolver
            .local_address_for("198.51.100.1:5060".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(addr, "203.0.113.10:5060".parse().unwrap());
    }

    #[tokio::test]
    async fn local_address_for_falls_back_to_connect_probe() {
        let config = AddressingConfig::default();
        let resolver = AddressResolver::new(config);

        let addr = resolver
            .local_address_for("127.0.0.1:5060".parse().unwrap())
            .await
            .unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn policy_always_trusts_received_address() {
        let config = AddressingConfig::default();
        let resolver = AddressResolver::new(config);
        let contact: SocketAddr = "192.168.1.10:5060".parse().unwrap();
        let received: SocketAddr = "203.0.113.20:12345".parse().unwrap();
        let dest: SocketAddr = "203.0.113.1:5060".parse().unwrap();

        assert_eq!(
            resolver.advertised_address(NatPolicy::Always, dest, contact, received),
            received
        );
        assert_eq!(
            resolver.advertised_address(NatPolicy::Never, dest, contact, received),
            contact
        );
    }

    #[test]
    fn policy_route_trusts_contact_for_local_destinations() {
        let mut config = AddressingConfig::default();
        config
            .localnet
            .push(AclEntry::new(AclSense::Allow, v4("192.168.0.0"), v4("255.255.0.0")));
        let resolver = AddressResolver::new(config);

        let contact: SocketAddr = "192.168.1.10:5060".parse().unwrap();
        let received: SocketAddr = "203.0.113.20:12345".parse().unwrap();

        let local_dest: SocketAddr = "192.168.1.50:5060".parse().unwrap();
        assert_eq!(
            resolver.advertised_address(NatPolicy::Route, local_dest, contact, received),
            contact
        );

        let remote_dest: SocketAddr = "198.51.100.1:5060".parse().unwrap();
        assert_eq!(
            resolver.advertised_address(NatPolicy::Route, remote_dest, contact, received),
            received
        );
    }
}
