//! Simple SDP (Session Description Protocol) handling

use std::net::IpAddr;
use crate::infrastructure::media::srtp::{SrtpMasterKey, SrtpProfile};

/// Simple SDP session
#[derive(Debug, Clone)]
pub struct SdpSession {
    pub version: u32,
    pub origin: SdpOrigin,
    pub session_name: String,
    pub connection: SdpConnection,
    pub media: Vec<SdpMedia>,
}

#[derive(Debug, Clone)]
pub struct SdpOrigin {
    pub username: String,
    pub session_id: String,
    pub session_version: String,
    pub network_type: String,
    pub address_type: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpConnection {
    pub network_type: String,
    pub address_type: String,
    pub address: String,
}

/// `a=sendrecv` / `a=sendonly` / `a=recvonly` / `a=inactive` (RFC 3264 §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl MediaDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaDirection::SendRecv => "sendrecv",
            MediaDirection::SendOnly => "sendonly",
            MediaDirection::RecvOnly => "recvonly",
            MediaDirection::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sendrecv" => Some(MediaDirection::SendRecv),
            "sendonly" => Some(MediaDirection::SendOnly),
            "recvonly" => Some(MediaDirection::RecvOnly),
            "inactive" => Some(MediaDirection::Inactive),
            _ => None,
        }
    }

    /// The direction the far end sees when we put it on hold: our sendonly
    /// becomes their recvonly and vice versa, inactive/sendrecv are
    /// symmetric.
    pub fn reciprocal(&self) -> Self {
        match self {
            MediaDirection::SendOnly => MediaDirection::RecvOnly,
            MediaDirection::RecvOnly => MediaDirection::SendOnly,
            other => *other,
        }
    }
}

/// SRTP crypto line (SDES)
#[derive(Debug, Clone)]
pub struct SdpCrypto {
    pub tag: u32,
    pub crypto_suite: String,
    pub key_params: String, // base64-encoded key material
    pub session_params: Option<String>,
}

impl SdpCrypto {
    /// Create from SRTP master key
    pub fn from_master_key(tag: u32, master_key: &SrtpMasterKey, profile: SrtpProfile) -> Self {
        // Concatenate master key and salt
        let mut key_material = Vec::new();
        key_material.extend_from_slice(&master_key.key);
        key_material.extend_from_slice(&master_key.salt);

        // Base64 encode
        let key_params = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &key_material);

        let crypto_suite = match profile {
            SrtpProfile::Aes128CmHmacSha1_80 => "AES_CM_128_HMAC_SHA1_80",
            SrtpProfile::Aes128CmHmacSha1_32 => "AES_CM_128_HMAC_SHA1_32",
            SrtpProfile::Aes256CmHmacSha1_80 => "AES_CM_256_HMAC_SHA1_80",
            SrtpProfile::Aes256CmHmacSha1_32 => "AES_CM_256_HMAC_SHA1_32",
        };

        Self {
            tag,
            crypto_suite: crypto_suite.to_string(),
            key_params,
            session_params: None,
        }
    }

    /// Parse from crypto attribute line
    pub fn parse(value: &str) -> Option<Self> {
        // Format: <tag> <crypto-suite> inline:<key-params> [<session-params>]
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 3 {
            return None;
        }

        let tag = parts[0].parse().ok()?;
        let crypto_suite = parts[1].to_string();

        let inline_part = parts[2];
        if !inline_part.starts_with("inline:") {
            return None;
        }
        let key_params = inline_part[7..].to_string();

        let session_params = if parts.len() > 3 {
            Some(parts[3..].join(" "))
        } else {
            None
        };

        Some(Self {
            tag,
            crypto_suite,
            key_params,
            session_params,
        })
    }

    /// Convert to master key
    pub fn to_master_key(&self) -> Option<(SrtpMasterKey, SrtpProfile)> {
        // Decode base64
        let key_material = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            &self.key_params
        ).ok()?;

        // Determine profile and key/salt lengths
        let profile = match self.crypto_suite.as_str() {
            "AES_CM_128_HMAC_SHA1_80" => SrtpProfile::Aes128CmHmacSha1_80,
            "AES_CM_128_HMAC_SHA1_32" => SrtpProfile::Aes128CmHmacSha1_32,
            "AES_CM_256_HMAC_SHA1_80" => SrtpProfile::Aes256CmHmacSha1_80,
            "AES_CM_256_HMAC_SHA1_32" => SrtpProfile::Aes256CmHmacSha1_32,
            _ => return None,
        };

        let key_len = profile.master_key_len();
        let salt_len = profile.master_salt_len();

        if key_material.len() < key_len + salt_len {
            return None;
        }

        let key = key_material[..key_len].to_vec();
        let salt = key_material[key_len..key_len + salt_len].to_vec();

        Some((SrtpMasterKey::new(key, salt), profile))
    }

    /// Convert to attribute string
    pub fn to_string(&self) -> String {
        let mut result = format!("{} {} inline:{}", self.tag, self.crypto_suite, self.key_params);
        if let Some(ref params) = self.session_params {
            result.push(' ');
            result.push_str(params);
        }
        result
    }
}

#[derive(Debug, Clone)]
pub struct SdpMedia {
    pub media_type: String,  // "audio", "video", "image" (T.38 fax relay)
    pub port: u16,
    pub protocol: String,    // "RTP/AVP", "RTP/SAVP", or "udptl" (T.38)
    pub formats: Vec<String>, // Codec payload types, or T.38 format name ("t38")
    pub rtpmap: Vec<(String, String)>, // (payload_type, encoding)
    pub fmtp: Vec<(String, String)>, // (payload_type or format, parameter string)
    pub crypto: Vec<SdpCrypto>, // SRTP crypto lines
    /// Media-level connection; overrides the session-level `c=` line
    /// when present (RFC 4566 §5.7).
    pub connection: Option<SdpConnection>,
    pub direction: MediaDirection,
}

impl SdpMedia {
    /// Whether this is a T.38 fax-relay media line (`m=image ... udptl t38`).
    pub fn is_t38(&self) -> bool {
        self.media_type == "image" && self.protocol.eq_ignore_ascii_case("udptl")
    }
}

impl SdpSession {
    /// Create a simple audio SDP
    pub fn create_audio_session(local_ip: IpAddr, local_port: u16) -> Self {
        Self {
            version: 0,
            origin: SdpOrigin {
                username: "sipdrv".to_string(),
                session_id: chrono::Utc::now().timestamp().to_string(),
                session_version: "1".to_string(),
                network_type: "IN".to_string(),
                address_type: if local_ip.is_ipv4() { "IP4" } else { "IP6" }.to_string(),
                address: local_ip.to_string(),
            },
            session_name: "YakYak Call".to_string(),
            connection: SdpConnection {
                network_type: "IN".to_string(),
                address_type: if local_ip.is_ipv4() { "IP4" } else { "IP6" }.to_string(),
                address: local_ip.to_string(),
            },
            media: vec![SdpMedia {
                media_type: "audio".to_string(),
                port: local_port,
                protocol: "RTP/AVP".to_string(),
                formats: vec!["0".to_string(), "8".to_string(), "101".to_string()],
                rtpmap: vec![
                    ("0".to_string(), "PCMU/8000".to_string()),
                    ("8".to_string(), "PCMA/8000".to_string()),
                    ("101".to_string(), "telephone-event/8000".to_string()),
                ],
                fmtp: vec![("101".to_string(), "0-16".to_string())],
                crypto: Vec::new(),
                connection: None,
                direction: MediaDirection::SendRecv,
            }],
        }
    }

    /// Appends a video media line (e.g. H.264/VP8) to an existing session.
    pub fn add_video_media(&mut self, port: u16, payload_type: u8, encoding: &str, clock_rate: u32) {
        self.media.push(SdpMedia {
            media_type: "video".to_string(),
            port,
            protocol: "RTP/AVP".to_string(),
            formats: vec![payload_type.to_string()],
            rtpmap: vec![(payload_type.to_string(), format!("{}/{}", encoding, clock_rate))],
            fmtp: Vec::new(),
            crypto: Vec::new(),
            connection: None,
            direction: MediaDirection::SendRecv,
        });
    }

    /// Appends a T.38 fax-relay media line (`m=image ... udptl t38`, RFC 3362).
    pub fn add_t38_media(&mut self, port: u16, max_datagram: u16) {
        self.media.push(SdpMedia {
            media_type: "image".to_string(),
            port,
            protocol: "udptl".to_string(),
            formats: vec!["t38".to_string()],
            rtpmap: Vec::new(),
            fmtp: vec![
                ("t38".to_string(), format!("T38FaxVersion=0;T38MaxBitRate=14400;T38FaxMaxDatagram={}", max_datagram)),
            ],
            crypto: Vec::new(),
            connection: None,
            direction: MediaDirection::SendRecv,
        });
    }

    /// The connection this media line actually uses: its own `c=` line if
    /// present, otherwise the session-level one (RFC 4566 §5.7).
    pub fn effective_connection<'a>(&'a self, media: &'a SdpMedia) -> &'a SdpConnection {
        media.connection.as_ref().unwrap_or(&self.connection)
    }

    /// Puts every media line on hold using the half of `reciprocal` the
    /// caller chooses: `sendonly` to keep receiving remote media while
    /// muting ours, `inactive` to stop both directions.
    pub fn set_hold(&mut self, inactive: bool) {
        for media in &mut self.media {
            media.direction = if inactive { MediaDirection::Inactive } else { MediaDirection::SendOnly };
        }
    }

    pub fn resume_from_hold(&mut self) {
        for media in &mut self.media {
            media.direction = MediaDirection::SendRecv;
        }
    }

    /// True once any media line signals anything other than `sendrecv`.
    pub fn is_on_hold(&self) -> bool {
        self.media.iter().any(|m| m.direction != MediaDirection::SendRecv)
    }

    /// Convert to SDP string
    pub fn to_string(&self) -> String {
        let mut sdp = String::new();

        // Version
        sdp.push_str(&format!("v={}\r\n", self.version));

        // Origin
        sdp.push_str(&format!(
            "o={} {} {} {} {} {}\r\n",
            self.origin.username,
            self.origin.session_id,
            self.origin.session_version,
            self.origin.network_type,
            self.origin.address_type,
            self.origin.address
        ));

        // Session name
        sdp.push_str(&format!("s={}\r\n", self.session_name));

        // Connection
        sdp.push_str(&format!(
            "c={} {} {}\r\n",
            self.connection.network_type, self.connection.address_type, self.connection.address
        ));

        // Time
        sdp.push_str("t=0 0\r\n");

        // Media descriptions
        for media in &self.media {
            sdp.push_str(&format!(
                "m={} {} {} {}\r\n",
                media.media_type,
                media.port,
                media.protocol,
                media.formats.join(" ")
            ));

            if let Some(conn) = &media.connection {
                sdp.push_str(&format!("c={} {} {}\r\n", conn.network_type, conn.address_type, conn.address));
            }

            // Crypto (SRTP)
            for crypto in &media.crypto {
                sdp.push_str(&format!("a=crypto:{}\r\n", crypto.to_string()));
            }

            // RTP map
            for (pt, encoding) in &media.rtpmap {
                sdp.push_str(&format!("a=rtpmap:{} {}\r\n", pt, encoding));
            }

            // Format parameters
            for (pt, params) in &media.fmtp {
                sdp.push_str(&format!("a=fmtp:{} {}\r\n", pt, params));
            }

            // Send/receive direction
            sdp.push_str(&format!("a={}\r\n", media.direction.as_str()));
        }

        sdp
    }

    /// Parse SDP from string
    pub fn parse(sdp_body: &str) -> Option<Self> {
        let mut version = 0;
        let mut origin: Option<SdpOrigin> = None;
        let mut session_name = String::new();
        let mut connection: Option<SdpConnection> = None;
        let mut media: Vec<SdpMedia> = Vec::new();
        let mut current_media: Option<SdpMedia> = None;

        for line in sdp_body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            // Skip \r if present
            let line = line.trim_end_matches('\r');

            if line.len() < 2 || !line.contains('=') {
                continue;
            }

            let (field_type, value) = line.split_at(2);
            let value = value.trim();

            match field_type {
                "v=" => {
                    version = value.parse().unwrap_or(0);
                }
                "o=" => {
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() >= 6 {
                        origin = Some(SdpOrigin {
                            username: parts[0].to_string(),
                            session_id: parts[1].to_string(),
                            session_version: parts[2].to_string(),
                            network_type: parts[3].to_string(),
                            address_type: parts[4].to_string(),
                            address: parts[5].to_string(),
                        });
                    }
                }
                "s=" => {
                    session_name = value.to_string();
                }
                "c=" => {
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() >= 3 {
                        let conn = SdpConnection {
                            network_type: parts[0].to_string(),
                            address_type: parts[1].to_string(),
                            address: parts[2].to_string(),
                        };

                        match current_media.as_mut() {
                            Some(media) => media.connection = Some(conn),
                            None => connection = Some(conn),
                        }
                    }
                }
                "m=" => {
                    // Save previous media if any
                    if let Some(m) = current_media.take() {
                        media.push(m);
                    }

                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() >= 4 {
                        let media_type = parts[0].to_string();
                        let port = parts[1].parse().unwrap_or(0);
                        let protocol = parts[2].to_string();
                        let formats: Vec<String> = parts[3..].iter().map(|s| s.to_string()).collect();

                        current_media = Some(SdpMedia {
                            media_type,
                            port,
                            protocol,
                            formats,
                            rtpmap: Vec::new(),
                            fmtp: Vec::new(),
                            crypto: Vec::new(),
                            connection: None,
                            direction: MediaDirection::SendRecv,
                        });
                    }
                }
                "a=" => {
                    // Parse attributes
                    if let Some(media) = current_media.as_mut() {
                        if value.starts_with("rtpmap:") {
                            let rtpmap_value = &value[7..]; // Skip "rtpmap:"
                            if let Some(space_pos) = rtpmap_value.find(' ') {
                                let pt = rtpmap_value[..space_pos].to_string();
                                let encoding = rtpmap_value[space_pos + 1..].to_string();
                                media.rtpmap.push((pt, encoding));
                            }
                        } else if value.starts_with("fmtp:") {
                            let fmtp_value = &value[5..]; // Skip "fmtp:"
                            if let Some(space_pos) = fmtp_value.find(' ') {
                                let pt = fmtp_value[..space_pos].to_string();
                                let params = fmtp_value[space_pos + 1..].to_string();
                                media.fmtp.push((pt, params));
                            }
                        } else if value.starts_with("crypto:") {
                            let crypto_value = &value[7..]; // Skip "crypto:"
                            if let Some(crypto) = SdpCrypto::parse(crypto_value) {
                                media.crypto.push(crypto);
                            }
                        } else if let Some(direction) = MediaDirection::from_str(value) {
                            media.direction = direction;
                        }
                    }
                }
                _ => {
                    // Ignore other fields
                }
            }
        }

        // Save last media if any
        if let Some(m) = current_media.take() {
            media.push(m);
        }

        // Validate required fields
        let origin = origin?;
        let connection = connection?;

        Some(Self {
            version,
            origin,
            session_name,
            connection,
            media,
        })
    }

    /// Get media description for audio
    pub fn audio_media(&self) -> Option<&SdpMedia> {
        self.media.iter().find(|m| m.media_type == "audio")
    }

    /// Get supported codecs
    pub fn audio_codecs(&self) -> Vec<u8> {
        if let Some(audio) = self.audio_media() {
            audio
                .formats
                .iter()
                .filter_map(|f| f.parse::<u8>().ok())
                .collect()
        } else {
            Vec::new()
        }
    }

    /// Add SRTP crypto to audio media
    pub fn add_srtp_crypto(&mut self, master_key: &SrtpMasterKey, profile: SrtpProfile) {
        if let Some(media) = self.media.iter_mut().find(|m| m.media_type == "audio") {
            // Change protocol to RTP/SAVP for SRTP
            media.protocol = "RTP/SAVP".to_string();

            // Add crypto line
            let tag = (media.crypto.len() + 1) as u32;
            media.crypto.push(SdpCrypto::from_master_key(tag, master_key, profile));
        }
    }

    /// Get SRTP crypto from audio media
    pub fn get_srtp_crypto(&self) -> Option<(SrtpMasterKey, SrtpProfile)> {
        if let Some(audio) = self.audio_media() {
            // Get first crypto line (highest priority)
            audio.crypto.first()?.to_master_key()
        } else {
            None
        }
    }

    /// Check if SRTP is enabled
    pub fn is_srtp_enabled(&self) -> bool {
        if let Some(audio) = self.audio_media() {
            !audio.crypto.is_empty() && audio.protocol.contains("SAVP")
        } else {
            false
        }
    }
}
