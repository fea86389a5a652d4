/// SRTP (Secure Real-time Transport Protocol) implementation
/// RFC 3711
///
/// This module provides encryption and authentication for RTP and RTCP packets.

pub mod crypto;
pub mod context;
pub mod srtcp;

pub use crypto::{
    SrtpProfile, SrtpMasterKey, SrtpSessionKeys,
    derive_session_keys, compute_auth_tag, verify_auth_tag,
};
pub use context::{SrtpContext, SrtpError};
pub use srtcp::SrtcpContext;

/// Combined SRTP/SRTCP context for a media session
pub struct MediaCryptoContext {
    /// SRTP context for RTP packets
    pub srtp: SrtpContext,
    /// SRTCP context for RTCP packets
    pub srtcp: SrtcpContext,
    /// Protection profile
    pub profile: SrtpProfile,
}

impl MediaCryptoContext {
    /// Create new media crypto context from master key
    pub fn new(master_key: SrtpMasterKey, profile: SrtpProfile) -> Self {
        let session_keys = derive_session_keys(&master_key, profile);

        let srtp = SrtpContext::from_session_keys(
            SrtpSessionKeys {
                srtp_cipher_key: session_keys.srtp_cipher_key.clone(),
                srtp_auth_key: session_keys.srtp_auth_key.clone(),
                srtp_salt: session_keys.srtp_salt.clone(),
                srtcp_cipher_key: session_keys.srtcp_cipher_key.clone(),
                srtcp_auth_key: session_keys.srtcp_auth_key.clone(),
                srtcp_salt: session_keys.srtcp_salt.clone(),
            },
            profile,
        );

        let srtcp = SrtcpContext::new(
            session_keys.srtcp_cipher_key,
            session_keys.srtcp_auth_key,
            session_keys.srtcp_salt,
            profile,
        );

        Self {
            srtp,
            srtcp,
            profile,
        }
    }

    /// Encrypt RTP packet
    pub fn protect_rtp(&self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        self.srtp.encrypt_rtp(packet)
    }

    /// Decrypt RTP packet
    pub fn unprotect_rtp(&self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        self.srtp.decrypt_rtp(packet)
    }

    /// Encrypt RTCP packet
    pub fn protect_rtcp(&self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        self.srtcp.encrypt_rtcp(packet)
    }

    /// Decrypt RTCP packet
    pub fn unprotect_rtcp(&self, packet: &mut Vec<u8>) -> Result<(), SrtpError> {
        self.srtcp.decrypt_rtcp(packet)
    }
}
