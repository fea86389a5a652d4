//! Audio/Video Codec Implementations

pub mod g711;
pub mod g722;
pub mod negotiator;
pub mod opus;

pub use g711::{G711Type, PcmaCodec, PcmuCodec};
pub use g722::{G722Config, G722Decoder, G722Encoder};
pub use negotiator::{CodecInfo, CodecNegotiator};
pub use opus::{OpusApplication, OpusConfig, OpusDecoder, OpusEncoder};
