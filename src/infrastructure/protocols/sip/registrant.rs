//! Outbound registration (SIP UAC side of REGISTER, RFC 3261 §10).
//!
//! The inbound `Registrar` accepts REGISTER requests from peers; a
//! `Registrant` is the opposite role, used when this process itself needs
//! to register an AoR with somebody else's registrar (trunk registration,
//! registering on behalf of a gatewayed peer). It owns its own transport,
//! builds and sends REGISTER requests, answers digest challenges, and
//! reschedules itself before the granted expiry runs out.

use super::message::{SipError, SipMessage, SipRequest};
use super::transport::{OutgoingMessage, Transport};
use rand::Rng;
use rsip::Header;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long to wait for a response before treating the REGISTER as lost.
const REGISTER_TIMEOUT: Duration = Duration::from_secs(8);

/// Minimum guard band subtracted from the granted Expires before
/// rescheduling a refresh REGISTER, so a slow registrar or network never
/// lets a binding lapse.
const EXPIRY_GUARD_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct RegistrantConfig {
    /// Address of Record being registered, e.g. `sip:trunk@example.com`.
    pub aor: String,
    /// Registrar to send REGISTER to.
    pub registrar: std::net::SocketAddr,
    /// Contact URI advertised in the Contact header.
    pub contact: String,
    /// Local address used as the Via sent-by and transport bind address.
    pub local_addr: std::net::SocketAddr,
    pub username: String,
    pub password: String,
    /// Requested Expires value; the registrar's granted value may differ.
    pub expires: u32,
    pub retry_after: Duration,
    pub max_retry_after: Duration,
}

/// Current status of a [`Registrant`]'s registration, observable via
/// [`Registrant::subscribe`].
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrantState {
    Unregistered,
    Registering,
    Registered { expires: u32 },
    Failed { reason: String },
}

/// Cached digest credentials from the last successful or challenged
/// exchange, used to authenticate preemptively on the next refresh instead
/// of waiting for another 401/407 round trip.
struct CachedChallenge {
    realm: String,
    nonce: String,
    qop: Option<String>,
    nc: u32,
}

/// Drives REGISTER/refresh for a single AoR against a single registrar.
pub struct Registrant {
    config: RegistrantConfig,
    state_tx: watch::Sender<RegistrantState>,
}

impl Registrant {
    /// Spawns the registration loop on its own transport and returns a
    /// handle for observing state plus the background task's `JoinHandle`.
    pub fn spawn(
        config: RegistrantConfig,
        transport: Box<dyn Transport>,
    ) -> (Arc<Registrant>, JoinHandle<()>) {
        let (state_tx, _) = watch::channel(RegistrantState::Unregistered);
        let registrant = Arc::new(Registrant { config, state_tx });
        let driver = registrant.clone();
        let handle = tokio::spawn(async move { driver.run(transport).await });
        (registrant, handle)
    }

    pub fn state(&self) -> RegistrantState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RegistrantState> {
        self.state_tx.subscribe()
    }

    async fn run(&self, mut transport: Box<dyn Transport>) {
        if let Err(e) = transport.start().await {
            self.set_state(RegistrantState::Failed { reason: e.to_string() });
            return;
        }

        let call_id = format!("{}@{}", uuid::Uuid::new_v4(), self.config.local_addr.ip());
        let from_tag = random_hex(8);
        let mut cseq: u32 = 1;
        let mut challenge: Option<CachedChallenge> = None;
        let mut backoff = self.config.retry_after;

        loop {
            self.set_state(RegistrantState::Registering);

            let auth_header = challenge.as_mut().map(|c| self.authorization_header(c));
            let request = self.build_register(&call_id, &from_tag, cseq, auth_header.as_deref());
            cseq += 1;

            match self.send_and_wait(transport.as_mut(), &call_id, request).await {
                Ok(response) => {
                    let status = response.status_code();
                    if status == 200 {
                        let granted = extract_expires(&response).unwrap_or(self.config.expires);
                        info!("Registered {} for {}s", self.config.aor, granted);
                        self.set_state(RegistrantState::Registered { expires: granted });
                        backoff = self.config.retry_after;
                        tokio::time::sleep(refresh_delay(granted)).await;
                        continue;
                    }
                    if (status == 401 || status == 407) && challenge.is_none() {
                        match parse_www_authenticate(&response) {
                            Some(c) => {
                                debug!("Challenged for {}, retrying with credentials", self.config.aor);
                                challenge = Some(c);
                                continue;
                            }
                            None => {
                                warn!("Challenge response had no usable WWW-Authenticate header");
                            }
                        }
                    } else if status == 401 || status == 407 {
                        // Already sent credentials once this cycle; a second
                        // challenge means they were rejected.
                        warn!("Registration for {} rejected after credentials sent", self.config.aor);
                        challenge = None;
                    } else {
                        warn!("Registration for {} failed with status {}", self.config.aor, status);
                    }
                    self.set_state(RegistrantState::Failed {
                        reason: format!("status {}", status),
                    });
                }
                Err(e) => {
                    warn!("REGISTER for {} failed: {}", self.config.aor, e);
                    self.set_state(RegistrantState::Failed { reason: e.to_string() });
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = std::cmp::min(backoff * 2, self.config.max_retry_after);
        }
    }

    fn set_state(&self, state: RegistrantState) {
        let _ = self.state_tx.send(state);
    }

    fn build_register(
        &self,
        call_id: &str,
        from_tag: &str,
        cseq: u32,
        auth_header: Option<&str>,
    ) -> SipRequest {
        let branch = format!("z9hG4bK{}", random_hex(8));
        let mut raw = format!(
            "REGISTER {} SIP/2.0\r\n\
             Via: SIP/2.0/UDP {};branch={}\r\n\
             From: <{}>;tag={}\r\n\
             To: <{}>\r\n\
             Call-ID: {}\r\n\
             CSeq: {} REGISTER\r\n\
             Contact: <{}>\r\n\
             Expires: {}\r\n\
             Max-Forwards: 70\r\n",
            self.config.aor,
            self.config.local_addr,
            branch,
            self.config.aor,
            from_tag,
            self.config.aor,
            call_id,
            cseq,
            self.config.contact,
            self.config.expires,
        );
        if let Some(auth) = auth_header {
            raw.push_str("Authorization: ");
            raw.push_str(auth);
            raw.push_str("\r\n");
        }
        raw.push_str("Content-Length: 0\r\n\r\n");
        SipRequest::parse(raw.as_bytes()).expect("hand-built REGISTER must parse")
    }

    fn authorization_header(&self, challenge: &mut CachedChallenge) -> String {
        challenge.nc += 1;
        let cnonce = random_hex(8);
        let nc_str = format!("{:08x}", challenge.nc);
        let response = client_digest_response(
            &self.config.username,
            &self.config.password,
            &challenge.realm,
            &challenge.nonce,
            "REGISTER",
            &self.config.aor,
            challenge.qop.as_deref(),
            Some(&nc_str),
            Some(&cnonce),
        );
        if let Some(qop) = &challenge.qop {
            format!(
                r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}", algorithm=MD5, qop={}, nc={}, cnonce="{}""#,
                self.config.username, challenge.realm, challenge.nonce, self.config.aor, response, qop, nc_str, cnonce
            )
        } else {
            format!(
                r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}", algorithm=MD5"#,
                self.config.username, challenge.realm, challenge.nonce, self.config.aor, response
            )
        }
    }

    async fn send_and_wait(
        &self,
        transport: &mut dyn Transport,
        call_id: &str,
        request: SipRequest,
    ) -> Result<super::message::SipResponse, SipError> {
        transport
            .send(OutgoingMessage {
                data: request.to_bytes(),
                destination: self.config.registrar,
                protocol: super::transport::TransportProtocol::Udp,
            })
            .await?;

        let deadline = tokio::time::Instant::now() + REGISTER_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(SipError::TransportError("REGISTER timed out".to_string()));
            }
            let incoming = tokio::time::timeout(remaining, transport.receiver().recv())
                .await
                .map_err(|_| SipError::TransportError("REGISTER timed out".to_string()))?
                .ok_or_else(|| SipError::TransportError("transport channel closed".to_string()))?;

            if let SipMessage::Response(response) = incoming.message {
                if response.call_id().as_deref() == Some(call_id) {
                    return Ok(response);
                }
            }
            // Not ours (stray retransmit of an unrelated message, or a
            // request on the same socket); keep waiting for our response.
        }
    }
}

fn refresh_delay(granted_expires: u32) -> Duration {
    // refresh = expires - guard, guard = max(EXPIRY_GUARD_SECS, 20% of expires),
    // so the guard band widens for long-lived bindings instead of staying
    // fixed at a sliver of the lifetime.
    let expires = granted_expires as u64;
    let guard = EXPIRY_GUARD_SECS.max((granted_expires as f64 * 0.2) as u64);
    Duration::from_secs(expires.saturating_sub(guard).max(1))
}

fn random_hex(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    let data: Vec<u8> = (0..bytes).map(|_| rng.gen()).collect();
    hex::encode(data)
}

fn extract_expires(response: &super::message::SipResponse) -> Option<u32> {
    if let Some(expires) = response
        .headers()
        .iter()
        .find_map(|h| match h {
            Header::Expires(e) => e.to_string().parse().ok(),
            _ => None,
        })
    {
        return Some(expires);
    }

    response.headers().iter().find_map(|h| match h {
        Header::Contact(c) => {
            let s = c.to_string();
            let idx = s.to_ascii_lowercase().find("expires=")?;
            let rest = &s[idx + "expires=".len()..];
            let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            rest[..end].parse().ok()
        }
        _ => None,
    })
}

fn parse_www_authenticate(response: &super::message::SipResponse) -> Option<CachedChallenge> {
    let raw = response.headers().iter().find_map(|h| match h {
        Header::WwwAuthenticate(v) => Some(v.to_string()),
        Header::ProxyAuthenticate(v) => Some(v.to_string()),
        _ => None,
    })?;

    let digest_str = raw
        .split_once(':')
        .map(|(_, v)| v)
        .unwrap_or(&raw)
        .trim()
        .strip_prefix("Digest ")
        .unwrap_or(raw.trim())
        .trim();

    let mut params = HashMap::new();
    for part in digest_str.split(',') {
        if let Some((key, value)) = part.trim().split_once('=') {
            params.insert(key.trim().to_string(), value.trim().trim_matches('"').to_string());
        }
    }

    Some(CachedChallenge {
        realm: params.get("realm")?.clone(),
        nonce: params.get("nonce")?.clone(),
        qop: params.get("qop").cloned(),
        nc: 0,
    })
}

/// Client-side RFC 2617 digest response, built to *send* in an Authorization
/// header rather than to verify one (the registrar's `DigestAuth` only does
/// the latter).
#[allow(clippy::too_many_arguments)]
fn client_digest_response(
    username: &str,
    password: &str,
    realm: &str,
    nonce: &str,
    method: &str,
    uri: &str,
    qop: Option<&str>,
    nc: Option<&str>,
    cnonce: Option<&str>,
) -> String {
    let ha1 = format!("{:x}", md5::compute(format!("{}:{}:{}", username, realm, password)));
    let ha2 = format!("{:x}", md5::compute(format!("{}:{}", method, uri)));

    if let Some(qop) = qop {
        let nc = nc.unwrap_or("00000001");
        let cnonce = cnonce.unwrap_or("");
        format!(
            "{:x}",
            md5::compute(format!("{}:{}:{}:{}:{}:{}", ha1, nonce, nc, cnonce, qop, ha2))
        )
    } else {
        format!("{:x}", md5::compute(format!("{}:{}:{}", ha1, nonce, ha2)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_digest_response_matches_known_vector() {
        // Same vector RFC 2617's example walks through, no qop.
        let ha1 = format!("{:x}", md5::compute("Mufasa:testrealm@host.com:Circle Of Life"));
        let ha2 = format!("{:x}", md5::compute("GET:/dir/index.html"));
        let expected = format!("{:x}", md5::compute(format!("{}:dcd98b7102dd2f0e8b11d0f600bfb0c093:{}", ha1, ha2)));

        let got = client_digest_response(
            "Mufasa",
            "Circle Of Life",
            "testrealm@host.com",
            "dcd98b7102dd2f0e8b11d0f600bfb0c093",
            "GET",
            "/dir/index.html",
            None,
            None,
            None,
        );
        assert_eq!(got, expected);
    }

    #[test]
    fn client_digest_response_with_qop_is_order_sensitive() {
        let a = client_digest_response(
            "alice", "secret", "example.com", "nonce1", "REGISTER", "sip:example.com",
            Some("auth"), Some("00000001"), Some("cnonce1"),
        );
        let b = client_digest_response(
            "alice", "secret", "example.com", "nonce1", "REGISTER", "sip:example.com",
            Some("auth"), Some("00000002"), Some("cnonce1"),
        );
        assert_ne!(a, b, "nc must factor into the response");
    }

    #[test]
    fn parse_www_authenticate_reads_challenge_params() {
        let raw = b"SIP/2.0 401 Unauthorized\r\n\
             Via: SIP/2.0/UDP 127.0.0.1:5060;branch=z9hG4bK1\r\n\
             From: <sip:alice@example.com>;tag=1\r\n\
             To: <sip:alice@example.com>;tag=2\r\n\
             Call-ID: abc@example.com\r\n\
             CSeq: 1 REGISTER\r\n\
             WWW-Authenticate: Digest realm=\"example.com\", nonce=\"abcd1234\", qop=\"auth\"\r\n\
             Content-Length: 0\r\n\r\n";
        let response = super::super::message::SipResponse::parse(raw).unwrap();
        let challenge = parse_www_authenticate(&response).unwrap();
        assert_eq!(challenge.realm, "example.com");
        assert_eq!(challenge.nonce, "abcd1234");
        assert_eq!(challenge.qop.as_deref(), Some("auth"));
    }

    #[test]
    fn extract_expires_reads_header() {
        let raw = b"SIP/2.0 200 OK\r\n\
             Via: SIP/2.0/UDP 127.0.0.1:5060;branch=z9hG4bK1\r\n\
             From: <sip:alice@example.com>;tag=1\r\n\
             To: <sip:alice@example.com>;tag=2\r\n\
             Call-ID: abc@example.com\r\n\
             CSeq: 1 REGISTER\r\n\
             Expires: 1800\r\n\
             Content-Length: 0\r\n\r\n";
        let response = super::super::message::SipResponse::parse(raw).unwrap();
        assert_eq!(extract_expires(&response), Some(1800));
    }

    #[test]
    fn refresh_delay_subtracts_guard_band() {
        // guard = max(15, 20%) = 720 for a 3600s lease.
        assert_eq!(refresh_delay(3600), Duration::from_secs(2880));
        // guard = max(15, 20%) = 15 for a 60s lease.
        assert_eq!(refresh_delay(60), Duration::from_secs(45));
        // short leases clamp the refresh to at least 1s rather than going
        // negative once the flat 15s guard exceeds the granted lifetime.
        assert_eq!(refresh_delay(4), Duration::from_secs(1));
    }
}
