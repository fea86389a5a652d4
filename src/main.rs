use sipdrv::config::Config;
use sipdrv::infrastructure::protocols::addressing::{
    Acl, AclSense, AddressResolver, AddressingConfig, NatPolicy,
};
use sipdrv::infrastructure::protocols::sip::{
    AckHandler, ByeHandler, CancelHandler, InviteHandler, MessageHandler, MessageStore,
    NotifyHandler, Peer, PeerFlags, PeerRegistry, ReferHandler, Registrant, RegistrantConfig,
    Registrar, SipMethod, SipServer, SipServerConfig, SubscribeHandler, SubscriptionManager,
};
use sipdrv::infrastructure::protocols::sip::transport::UdpTransport;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber;

#[cfg(feature = "postgres")]
use sipdrv::infrastructure::persistence::{create_pool, run_migrations, DatabaseConfig, PgUserRepository, PgCdrRepository};
#[cfg(feature = "postgres")]
use sipdrv::infrastructure::protocols::sip::DigestAuthDb;
#[cfg(not(feature = "postgres"))]
use sipdrv::infrastructure::protocols::sip::DigestAuth;
use sipdrv::infrastructure::metrics::{init_metrics, update_active_calls, update_active_dialogues, update_registered_users};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting SIP core");

    let config = Config::default();
    info!(bind = %config.sip.bind_address, port = config.sip.bind_port, domain = %config.sip.domain, "configuration loaded");

    // Address/NAT resolver: local-address selection, STUN, and externip/
    // externhost advertisement, shared by everything that needs to tell a
    // peer how to reach us.
    let localnet = {
        let mut acl = Acl::new(AclSense::Deny);
        for entry in &config.sip.localnet {
            if let Some((net, mask)) = parse_cidr(entry) {
                acl.push(sipdrv::infrastructure::protocols::addressing::AclEntry::new(
                    AclSense::Allow,
                    net,
                    mask,
                ));
            } else {
                warn!(entry = %entry, "skipping unparsable localnet entry");
            }
        }
        acl
    };
    let addressing = Arc::new(AddressResolver::new(AddressingConfig {
        localnet,
        externip: config.sip.externip.as_ref().and_then(|s| s.parse().ok()),
        externhost: config.sip.externhost.clone(),
        externrefresh: Duration::from_secs(config.sip.externrefresh_secs as u64),
        stun_server: config.sip.stun_server.as_ref().and_then(|s| s.parse().ok()),
        nat_policy: match config.sip.nat_default {
            sipdrv::config::NatDefault::Never => NatPolicy::Never,
            sipdrv::config::NatDefault::Route => NatPolicy::Route,
            sipdrv::config::NatDefault::Always => NatPolicy::Always,
            sipdrv::config::NatDefault::Rfc3581 => NatPolicy::Rfc3581,
        },
        bind_port: config.sip.bind_port,
        listeners: vec![format!("{}:{}", config.sip.bind_address, config.sip.bind_port).parse()?],
    }));
    if let Some(addr) = addressing
        .discover_external(format!("{}:{}", config.sip.bind_address, config.sip.bind_port).parse()?)
        .await
    {
        info!(external = %addr, "resolved advertised address");
    }

    // Peer/user registry: by-name and by-address lookup for configured peers.
    let peer_registry = Arc::new(PeerRegistry::new());
    for (name, peer_config) in config.peers.iter().chain(config.users.iter()) {
        let mut peer = Peer::new(name.clone(), config.sip.realm.clone());
        peer.secret = peer_config.secret.clone();
        peer.ha1 = peer_config.md5secret.clone();
        peer.context = peer_config
            .context
            .clone()
            .unwrap_or_else(|| config.sip.default_context.clone());
        peer.call_limit = peer_config.call_limit;
        peer.mailbox = peer_config.mailbox.clone();
        peer.qualify_max_ms = config.sip.qualify_default_ms;
        if !peer_config.codec_allow.is_empty() {
            peer.codecs = peer_config.codec_allow.clone();
        }
        let flags = PeerFlags {
            insecure_port: peer_config.insecure_port,
            insecure_invite: peer_config.insecure_invite,
            dynamic: peer_config.host.is_none(),
        };
        let peer = peer.with_flags(flags);
        peer_registry.insert(Arc::new(peer)).await;
    }
    info!(peers = peer_registry.len().await, "peer registry populated");

    #[cfg(feature = "postgres")]
    let (user_repository, cdr_repository): (Arc<dyn sipdrv::domain::user::UserRepository>, Option<Arc<dyn sipdrv::domain::cdr::CdrRepository>>) = {
        info!("Initializing database connection...");

        let db_config = DatabaseConfig {
            url: config.database.url.clone(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout: std::time::Duration::from_secs(30),
            idle_timeout: std::time::Duration::from_secs(600),
            max_lifetime: std::time::Duration::from_secs(1800),
        };

        let pool = create_pool(&db_config).await?;
        info!("Database connection pool created");

        info!("Running database migrations...");
        run_migrations(&pool).await?;
        info!("Database migrations completed");

        let user_repo: Arc<dyn sipdrv::domain::user::UserRepository> = Arc::new(PgUserRepository::new(pool.clone()));
        let cdr_repo: Arc<dyn sipdrv::domain::cdr::CdrRepository> = Arc::new(PgCdrRepository::new(pool.clone()));

        (user_repo, Some(cdr_repo))
    };

    #[cfg(not(feature = "postgres"))]
    let user_repository: Option<Arc<dyn sipdrv::domain::user::UserRepository>> = None;
    #[cfg(not(feature = "postgres"))]
    let cdr_repository: Option<Arc<dyn sipdrv::domain::cdr::CdrRepository>> = None;

    // SIP stack is UDP-only.
    let sip_config = SipServerConfig {
        udp_bind: format!("{}:{}", config.sip.bind_address, config.sip.bind_port).parse()?,
        domain: config.sip.domain.clone(),
    };

    let mut sip_server = SipServer::new(sip_config);

    #[cfg(feature = "postgres")]
    let auth = Arc::new(DigestAuthDb::new(config.sip.domain.clone(), user_repository.clone()));

    #[cfg(not(feature = "postgres"))]
    let auth = {
        let auth = Arc::new(DigestAuth::new(&config.sip.domain));
        for (name, peer_config) in config.peers.iter().chain(config.users.iter()) {
            if let Some(secret) = &peer_config.secret {
                auth.add_user(name, secret).await;
            }
        }
        info!(count = config.peers.len() + config.users.len(), "loaded peer credentials");
        auth
    };

    let registrar = Arc::new(Registrar::with_auth(auth.clone()));
    sip_server
        .register_handler(SipMethod::Register, registrar.clone())
        .await;

    let local_ip: IpAddr = "0.0.0.0".parse().unwrap();

    #[cfg(feature = "postgres")]
    let invite_handler = {
        let handler = InviteHandler::with_auth(registrar.clone(), local_ip, auth.clone())
            .with_peer_registry(peer_registry.clone());
        if let Some(ref cdr_repo) = cdr_repository {
            Arc::new(handler.with_cdr_repository(cdr_repo.clone()))
        } else {
            Arc::new(handler)
        }
    };

    #[cfg(not(feature = "postgres"))]
    let invite_handler = Arc::new(
        InviteHandler::with_auth(registrar.clone(), local_ip, auth.clone())
            .with_peer_registry(peer_registry.clone()),
    );

    let active_calls = invite_handler.active_calls.clone();
    let call_router = invite_handler.call_router();

    init_metrics();
    let dialogues = invite_handler.dialogues();
    {
        let router_clone = call_router.clone();
        let registrar_clone = registrar.clone();
        let dialogues_clone = dialogues.clone();
        tokio::spawn(async move {
            loop {
                update_active_calls(router_clone.active_call_count().await);
                update_registered_users(registrar_clone.get_registration_count().await);
                update_active_dialogues(dialogues_clone.count().await);
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        });
        info!("Metrics updater task started");
    }

    sip_server
        .register_handler(SipMethod::Invite, invite_handler)
        .await;
    sip_server
        .register_handler(
            SipMethod::Ack,
            Arc::new(AckHandler::new(active_calls.clone(), dialogues.clone())),
        )
        .await;
    sip_server
        .register_handler(
            SipMethod::Cancel,
            Arc::new(CancelHandler::new(
                active_calls.clone(),
                call_router.clone(),
                dialogues.clone(),
            )),
        )
        .await;
    sip_server
        .register_handler(
            SipMethod::Bye,
            Arc::new(ByeHandler::with_router(
                active_calls.clone(),
                call_router.clone(),
                dialogues.clone(),
            )),
        )
        .await;

    let message_store = Arc::new(MessageStore::new());
    sip_server
        .register_handler(
            SipMethod::Message,
            Arc::new(MessageHandler::new(registrar.clone(), message_store)),
        )
        .await;

    let subscription_manager = Arc::new(SubscriptionManager::new());
    sip_server
        .register_handler(
            SipMethod::Subscribe,
            Arc::new(SubscribeHandler::new(subscription_manager)),
        )
        .await;
    sip_server
        .register_handler(SipMethod::Notify, Arc::new(NotifyHandler::new()))
        .await;
    sip_server
        .register_handler(SipMethod::Refer, Arc::new(ReferHandler::new(call_router.clone())))
        .await;

    info!("Registered handlers: REGISTER, INVITE, ACK, CANCEL, BYE, MESSAGE, SUBSCRIBE, NOTIFY, REFER");

    sip_server.start().await?;
    info!(port = config.sip.bind_port, "SIP server listening (UDP)");

    // Outbound registrations (`register =>` lines), spaced evenly over the
    // default expiry so they don't all fire at once.
    let outbound = &config.sip.outbound_registrations;
    if !outbound.is_empty() {
        let spacing = Duration::from_secs(config.sip.registration.default_expires as u64)
            / outbound.len() as u32;
        let mut registrant_handles = Vec::with_capacity(outbound.len());
        for (i, reg) in outbound.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(spacing).await;
            }
            let registrar_addr: std::net::SocketAddr =
                format!("{}:{}", reg.registrar_host, reg.registrar_port).parse()?;
            // Each registrant binds its own fixed port so the advertised
            // Contact matches what it actually listens on.
            let local_addr: std::net::SocketAddr =
                format!("{}:{}", config.sip.bind_address, config.sip.bind_port + 1 + i as u16).parse()?;
            let registrant_config = RegistrantConfig {
                aor: format!("sip:{}@{}", reg.username, reg.registrar_host),
                registrar: registrar_addr,
                contact: format!("sip:{}@{}", reg.contact_user, local_addr),
                local_addr,
                username: reg.username.clone(),
                password: reg.secret.clone(),
                expires: reg.expires,
                retry_after: Duration::from_secs(30),
                max_retry_after: Duration::from_secs(300),
            };
            let transport = Box::new(UdpTransport::new(local_addr));
            let (registrant, handle) = Registrant::spawn(registrant_config, transport);
            info!(user = %reg.username, registrar = %registrar_addr, "registrant started");
            registrant_handles.push((registrant, handle));
        }
        // Keep the registrants alive for the lifetime of the process.
        std::mem::forget(registrant_handles);
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    sip_server.stop().await?;

    Ok(())
}

/// Parses an `a.b.c.d/nn` CIDR entry into (network address, mask); `None` on
/// any malformed input (non-IPv4, bad prefix length).
fn parse_cidr(entry: &str) -> Option<(std::net::Ipv4Addr, std::net::Ipv4Addr)> {
    let (addr, prefix) = entry.split_once('/')?;
    let addr: std::net::Ipv4Addr = addr.trim().parse().ok()?;
    let prefix: u32 = prefix.trim().parse().ok()?;
    if prefix > 32 {
        return None;
    }
    let mask_bits: u32 = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let network = u32::from(addr) & mask_bits;
    Some((std::net::Ipv4Addr::from(network), std::net::Ipv4Addr::from(mask_bits)))
}
