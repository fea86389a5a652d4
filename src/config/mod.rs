//! Configuration management
//!
//! Layered configuration (TOML file + environment overrides) matching the
//! abstract surface of global SIP options plus per-peer/user overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub sip: SipConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub peers: HashMap<String, PeerConfig>,
    #[serde(default)]
    pub users: HashMap<String, UserConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// NAT handling default, overridable per peer. See
/// `infrastructure::protocols::addressing::NatPolicy` for the resolved
/// runtime behavior these map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NatDefault {
    Never,
    #[default]
    Route,
    Always,
    Rfc3581,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DtmfMode {
    Rfc2833,
    Info,
    Inband,
    #[default]
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationDefaults {
    pub default_expires: u32,
    pub max_expires: u32,
    pub min_expires: u32,
}

impl Default for RegistrationDefaults {
    fn default() -> Self {
        Self {
            default_expires: 3600,
            max_expires: 7200,
            min_expires: 60,
        }
    }
}

/// Retransmission timer configuration (RFC 3261 §17.1.1.1 T1/T2, timer B).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SipTimerConfig {
    pub t1_ms: u32,
    pub t2_ms: u32,
    pub timer_b_ms: u32,
}

impl Default for SipTimerConfig {
    fn default() -> Self {
        Self {
            t1_ms: 500,
            t2_ms: 4000,
            timer_b_ms: 32000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SipConfig {
    pub bind_address: String,
    pub bind_port: u16,
    pub domain: String,
    #[serde(default)]
    pub additional_domains: Vec<String>,
    #[serde(default = "default_context")]
    pub default_context: String,
    #[serde(default = "default_realm")]
    pub realm: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub nat_default: NatDefault,
    #[serde(default)]
    pub dtmf_mode: DtmfMode,
    #[serde(default = "default_codec_preference")]
    pub codec_preference: Vec<String>,
    #[serde(default = "default_rtp_timeout_secs")]
    pub rtp_timeout_secs: u32,
    #[serde(default)]
    pub registration: RegistrationDefaults,
    #[serde(default)]
    pub timers: SipTimerConfig,
    /// Fixed external IP for NAT traversal; takes precedence over `externhost`.
    #[serde(default)]
    pub externip: Option<String>,
    /// Hostname re-resolved every `externrefresh_secs` when `externip` is unset.
    #[serde(default)]
    pub externhost: Option<String>,
    #[serde(default = "default_externrefresh_secs")]
    pub externrefresh_secs: u32,
    #[serde(default)]
    pub stun_server: Option<String>,
    /// CIDR entries (e.g. `"192.168.0.0/16"`) considered local for NAT
    /// policy purposes; parsed into an `Acl` at startup.
    #[serde(default)]
    pub localnet: Vec<String>,
    /// `0` disables qualify by default.
    #[serde(default)]
    pub qualify_default_ms: u32,
    /// Outbound `register =>` lines: registrations this process initiates
    /// against a remote registrar, rather than accepts from peers.
    #[serde(default)]
    pub outbound_registrations: Vec<OutboundRegistration>,
}

/// One `register => user[:secret]@registrar_host[:port]/contact` line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundRegistration {
    pub username: String,
    pub secret: String,
    pub registrar_host: String,
    pub registrar_port: u16,
    pub contact_user: String,
    #[serde(default = "default_outbound_expires")]
    pub expires: u32,
}

fn default_outbound_expires() -> u32 {
    3600
}

fn default_context() -> String {
    "default".to_string()
}

fn default_realm() -> String {
    "localhost".to_string()
}

fn default_user_agent() -> String {
    "yakyak-sip/1.0".to_string()
}

fn default_codec_preference() -> Vec<String> {
    vec!["PCMU".to_string(), "PCMA".to_string(), "G722".to_string()]
}

fn default_rtp_timeout_secs() -> u32 {
    60
}

fn default_externrefresh_secs() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Per-peer configuration override. Users share the same shape (secret,
/// context, ACL, codec/timer/NAT overrides); `UserConfig` is an alias since
/// the abstract configuration surface does not distinguish them beyond which
/// registry they end up in.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PeerConfig {
    pub secret: Option<String>,
    pub md5secret: Option<String>,
    /// `None` means `dynamic` (address learned via REGISTER); `Some(host)`
    /// is a static peer reachable at a fixed address.
    pub host: Option<String>,
    pub default_ip: Option<String>,
    pub context: Option<String>,
    pub caller_id: Option<String>,
    #[serde(default)]
    pub acl: Vec<String>,
    #[serde(default)]
    pub codec_allow: Vec<String>,
    #[serde(default)]
    pub codec_disallow: Vec<String>,
    pub call_limit: Option<u32>,
    pub mailbox: Option<String>,
    pub t1_ms: Option<u32>,
    pub t2_ms: Option<u32>,
    pub nat: Option<NatDefault>,
    pub dtmf_mode: Option<DtmfMode>,
    #[serde(default)]
    pub can_reinvite: bool,
    #[serde(default)]
    pub insecure_port: bool,
    #[serde(default)]
    pub insecure_invite: bool,
    #[serde(default)]
    pub trust_rpid: bool,
    #[serde(default)]
    pub send_rpid: bool,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

pub type UserConfig = PeerConfig;

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            sip: SipConfig {
                bind_address: "0.0.0.0".to_string(),
                bind_port: 5060,
                domain: "localhost".to_string(),
                additional_domains: Vec::new(),
                default_context: default_context(),
                realm: default_realm(),
                user_agent: default_user_agent(),
                nat_default: NatDefault::default(),
                dtmf_mode: DtmfMode::default(),
                codec_preference: default_codec_preference(),
                rtp_timeout_secs: default_rtp_timeout_secs(),
                registration: RegistrationDefaults::default(),
                timers: SipTimerConfig::default(),
                externip: None,
                externhost: None,
                externrefresh_secs: default_externrefresh_secs(),
                stun_server: None,
                localnet: Vec::new(),
                qualify_default_ms: 0,
                outbound_registrations: Vec::new(),
            },
            database: DatabaseConfig {
                url: "postgres://postgres@localhost/sipdrv".to_string(),
            },
            peers: HashMap::new(),
            users: HashMap::new(),
        }
    }
}
