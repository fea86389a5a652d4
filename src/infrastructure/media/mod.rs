//! Media processing implementations

pub mod bridge;
pub mod codec;
pub mod mixer;
pub mod moh;
pub mod rtp;
pub mod srtp;
pub mod stream;

pub use bridge::{MediaBridge, MediaBridgeManager};
pub use codec::{CodecInfo, CodecNegotiator, G711Type, PcmaCodec, PcmuCodec};
pub use mixer::{AudioFrame, AudioMixer, AutomaticGainControl, ParticipantStream};
pub use moh::{MohConfig, MohPlayer, MohState, ToneGenerator};
pub use rtp::{
    Goodbye, JitterBuffer, JitterBufferConfig, JitterBufferStats, ReceiverReport, RtcpError,
    RtcpPacket, RtpError, RtpPacket, RtpSession, RtpStats, SenderReport, SourceDescription,
    SsrcGenerator,
};
pub use srtp::{
    MediaCryptoContext, SrtpContext, SrtcpContext, SrtpError, SrtpMasterKey,
    SrtpProfile, SrtpSessionKeys, derive_session_keys,
};
pub use stream::{MediaStream, StreamDirection};
