//! Peer/user registry: concurrent by-name and by-address lookup over
//! registered peers, with ACL-based source checks (SPEC_FULL §4.8).
//!
//! A `Peer` is a persistent identity reachable at a (possibly dynamic)
//! network address: a trunk, a gateway, or a registered endpoint. The
//! by-name registry resolves an outbound dial string or an inbound From-URI
//! to a peer; the by-address registry resolves an inbound request's source
//! address back to the peer that's supposed to be sending from there.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::super::addressing::{Acl, NatPolicy};

/// Reachability, as tracked by periodic qualify (OPTIONS) probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    /// Never qualified, or qualify disabled (`qualify_max_ms == 0`).
    Unknown,
    Ok { rtt_ms: u32 },
    /// Responded, but slower than `qualify_max_ms`.
    Lagged { rtt_ms: u32 },
    Unreachable,
}

/// Per-peer behavior flags (`insecure=port,invite` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerFlags {
    /// Matches this peer by address alone, ignoring the source port.
    pub insecure_port: bool,
    /// Skips auth challenge for inbound INVITE from this peer.
    pub insecure_invite: bool,
    /// Created by an inbound REGISTER rather than static configuration;
    /// eligible for self-destruction once its binding expires.
    pub dynamic: bool,
}

/// Mutable peer state, behind one lock per SPEC_FULL's "peer lock" (in-use
/// counters and call-limit checks are read-then-increment under it).
struct PeerState {
    current_addr: Option<SocketAddr>,
    in_use: u32,
    user_agent: Option<String>,
    status: PeerStatus,
    flags: PeerFlags,
}

/// A persistent SIP identity: trunk, gateway, or registered endpoint.
pub struct Peer {
    pub name: String,
    pub secret: Option<String>,
    pub ha1: Option<String>,
    pub realm: String,
    pub context: String,
    pub codecs: Vec<String>,
    pub acl: Acl,
    /// Fallback address used when no current registration binding exists.
    pub default_addr: Option<SocketAddr>,
    pub nat_policy: NatPolicy,
    /// `None` is unlimited.
    pub call_limit: Option<u32>,
    /// `0` disables qualify.
    pub qualify_max_ms: u32,
    pub mailbox: Option<String>,
    state: RwLock<PeerState>,
}

impl Peer {
    pub fn new(name: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: None,
            ha1: None,
            realm: realm.into(),
            context: "default".to_string(),
            codecs: Vec::new(),
            acl: Acl::default(),
            default_addr: None,
            nat_policy: NatPolicy::default(),
            call_limit: None,
            qualify_max_ms: 0,
            mailbox: None,
            state: RwLock::new(PeerState {
                current_addr: None,
                in_use: 0,
                user_agent: None,
                status: PeerStatus::Unknown,
                flags: PeerFlags::default(),
            }),
        }
    }

    pub fn with_flags(mut self, flags: PeerFlags) -> Self {
        self.state.get_mut().flags = flags;
        self
    }

    pub async fn current_addr(&self) -> Option<SocketAddr> {
        self.state.read().await.current_addr
    }

    pub async fn effective_addr(&self) -> Option<SocketAddr> {
        let state = self.state.read().await;
        state.current_addr.or(self.default_addr)
    }

    pub async fn flags(&self) -> PeerFlags {
        self.state.read().await.flags
    }

    pub async fn user_agent(&self) -> Option<String> {
        self.state.read().await.user_agent.clone()
    }

    pub async fn status(&self) -> PeerStatus {
        self.state.read().await.status
    }

    pub async fn in_use(&self) -> u32 {
        self.state.read().await.in_use
    }

    /// Whether `addr` is permitted to act as this peer's source, per its ACL
    /// and `insecure=port` (port ignored in the by-addr lookup, not here).
    pub fn permits_source(&self, addr: IpAddr) -> bool {
        self.acl.permits(addr)
    }

    /// Read-then-increment under the peer lock, as SPEC_FULL's concurrency
    /// model requires for call-limit enforcement.
    pub async fn try_acquire_call_slot(&self) -> bool {
        let mut state = self.state.write().await;
        if let Some(limit) = self.call_limit {
            if state.in_use >= limit {
                return false;
            }
        }
        state.in_use += 1;
        true
    }

    pub async fn release_call_slot(&self) {
        let mut state = self.state.write().await;
        state.in_use = state.in_use.saturating_sub(1);
    }

    async fn set_binding(&self, addr: Option<SocketAddr>, user_agent: Option<String>) {
        let mut state = self.state.write().await;
        state.current_addr = addr;
        if user_agent.is_some() {
            state.user_agent = user_agent;
        }
    }

    pub async fn mark_qualify_result(&self, rtt: Option<Duration>) {
        let mut state = self.state.write().await;
        state.status = match rtt {
            None => PeerStatus::Unreachable,
            Some(rtt) => {
                let ms = rtt.as_millis() as u32;
                if self.qualify_max_ms > 0 && ms > self.qualify_max_ms {
                    PeerStatus::Lagged { rtt_ms: ms }
                } else {
                    PeerStatus::Ok { rtt_ms: ms }
                }
            }
        };
    }
}

/// Concurrent by-name and by-address peer/user lookup.
///
/// By-addr lookup tries the exact `(addr, port)` entry first, then falls
/// back to an IP-only index populated only from peers flagged
/// `insecure=port`, matching SPEC_FULL's "with-port first, then without"
/// rule.
#[derive(Default)]
pub struct PeerRegistry {
    by_name: RwLock<HashMap<String, Arc<Peer>>>,
    by_addr: RwLock<HashMap<SocketAddr, Arc<Peer>>>,
    by_ip_insecure: RwLock<HashMap<IpAddr, Arc<Peer>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, peer: Arc<Peer>) {
        info!("Registering peer {}", peer.name);
        self.by_name.write().await.insert(peer.name.clone(), peer);
    }

    pub async fn remove(&self, name: &str) {
        let Some(peer) = self.by_name.write().await.remove(name) else {
            return;
        };
        if let Some(addr) = peer.current_addr().await {
            self.by_addr.write().await.remove(&addr);
            self.by_ip_insecure.write().await.remove(&addr.ip());
        }
        debug!("Removed peer {}", name);
    }

    pub async fn find_by_name(&self, name: &str) -> Option<Arc<Peer>> {
        self.by_name.read().await.get(name).cloned()
    }

    pub async fn find_by_addr(&self, addr: SocketAddr) -> Option<Arc<Peer>> {
        if let Some(peer) = self.by_addr.read().await.get(&addr).cloned() {
            return Some(peer);
        }
        self.by_ip_insecure.read().await.get(&addr.ip()).cloned()
    }

    /// Records a fresh binding for `name` at `addr`, re-indexing the
    /// by-address registry (dropping any stale address entry first).
    pub async fn update_binding(
        &self,
        name: &str,
        addr: SocketAddr,
        user_agent: Option<String>,
    ) -> Result<(), String> {
        let peer = self
            .find_by_name(name)
            .await
            .ok_or_else(|| format!("no such peer: {}", name))?;

        if let Some(old) = peer.current_addr().await {
            if old != addr {
                self.by_addr.write().await.remove(&old);
                self.by_ip_insecure.write().await.remove(&old.ip());
            }
        }

        peer.set_binding(Some(addr), user_agent).await;
        self.by_addr.write().await.insert(addr, peer.clone());
        if peer.flags().await.insecure_port {
            self.by_ip_insecure.write().await.insert(addr.ip(), peer);
        }
        Ok(())
    }

    /// Clears a peer's address binding (registration expiry), optionally
    /// dropping the peer entirely if it was dynamically created.
    pub async fn expire_binding(&self, name: &str) {
        let Some(peer) = self.find_by_name(name).await else { return };
        if let Some(addr) = peer.current_addr().await {
            self.by_addr.write().await.remove(&addr);
            self.by_ip_insecure.write().await.remove(&addr.ip());
        }
        peer.set_binding(None, None).await;

        if peer.flags().await.dynamic {
            warn!("Dynamic peer {} expired with no binding; dropping", name);
            self.by_name.write().await.remove(name);
        }
    }

    pub async fn len(&self) -> usize {
        self.by_name.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn find_by_name_after_insert() {
        let registry = PeerRegistry::new();
        registry.insert(Arc::new(Peer::new("trunk1", "example.com"))).await;

        assert!(registry.find_by_name("trunk1").await.is_some());
        assert!(registry.find_by_name("nope").await.is_none());
    }

    #[tokio::test]
    async fn update_binding_indexes_by_addr() {
        let registry = PeerRegistry::new();
        registry.insert(Arc::new(Peer::new("alice", "example.com"))).await;

        registry
            .update_binding("alice", addr("192.168.1.10:5060"), Some("softphone/1.0".into()))
            .await
            .unwrap();

        let found = registry.find_by_addr(addr("192.168.1.10:5060")).await.unwrap();
        assert_eq!(found.name, "alice");
        assert_eq!(found.user_agent().await.as_deref(), Some("softphone/1.0"));
    }

    #[tokio::test]
    async fn rebinding_to_new_address_drops_old_index() {
        let registry = PeerRegistry::new();
        registry.insert(Arc::new(Peer::new("alice", "example.com"))).await;
        registry.update_binding("alice", addr("192.168.1.10:5060"), None).await.unwrap();
        registry.update_binding("alice", addr("192.168.1.20:5060"), None).await.unwrap();

        assert!(registry.find_by_addr(addr("192.168.1.10:5060")).await.is_none());
        assert!(registry.find_by_addr(addr("192.168.1.20:5060")).await.is_some());
    }

    #[tokio::test]
    async fn insecure_port_peer_matches_any_port() {
        let peer = Peer::new("gateway", "example.com").with_flags(PeerFlags {
            insecure_port: true,
            ..Default::default()
        });
        let registry = PeerRegistry::new();
        registry.insert(Arc::new(peer)).await;
        registry.update_binding("gateway", addr("203.0.113.5:5060"), None).await.unwrap();

        let found = registry.find_by_addr(addr("203.0.113.5:41000")).await;
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn call_limit_blocks_once_exhausted() {
        let mut peer = Peer::new("trunk1", "example.com");
        peer.call_limit = Some(1);
        let peer = Arc::new(peer);

        assert!(peer.try_acquire_call_slot().await);
        assert!(!peer.try_acquire_call_slot().await);

        peer.release_call_slot().await;
        assert!(peer.try_acquire_call_slot().await);
    }

    #[tokio::test]
    async fn expire_binding_removes_dynamic_peer() {
        let peer = Peer::new("dyn1", "example.com").with_flags(PeerFlags {
            dynamic: true,
            ..Default::default()
        });
        let registry = PeerRegistry::new();
        registry.insert(Arc::new(peer)).await;
        registry.update_binding("dyn1", addr("192.168.1.30:5060"), None).await.unwrap();

        registry.expire_binding("dyn1").await;

        assert!(registry.find_by_name("dyn1").await.is_none());
        assert!(registry.find_by_addr(addr("192.168.1.30:5060")).await.is_none());
    }

    #[tokio::test]
    async fn qualify_result_classifies_status() {
        let mut peer = Peer::new("trunk1", "example.com");
        peer.qualify_max_ms = 100;
        let peer = Arc::new(peer);

        peer.mark_qualify_result(Some(Duration::from_millis(50))).await;
        assert_eq!(peer.status().await, PeerStatus::Ok { rtt_ms: 50 });

        peer.mark_qualify_result(Some(Duration::from_millis(150))).await;
        assert_eq!(peer.status().await, PeerStatus::Lagged { rtt_ms: 150 });

        peer.mark_qualify_result(None).await;
        assert_eq!(peer.status().await, PeerStatus::Unreachable);
    }

    #[test]
    fn acl_gate_delegates_to_source_acl() {
        let mut peer = Peer::new("trunk1", "example.com");
        peer.acl = Acl::new(super::super::super::addressing::AclSense::Deny);
        assert!(!peer.permits_source("203.0.113.5".parse().unwrap()));
    }
}
