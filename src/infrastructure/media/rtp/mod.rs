//! RTP (Real-time Transport Protocol) Implementation
//!
//! This module implements RTP according to RFC 3550.

pub mod jitter_buffer;
pub mod packet;
pub mod rtcp;
pub mod session;

pub use jitter_buffer::{JitterBuffer, JitterBufferConfig, JitterBufferStats};
pub use packet::{RtpError, RtpPacket};
pub use rtcp::{Goodbye, ReceiverReport, RtcpError, RtcpPacket, SenderReport, SourceDescription};
pub use session::{RtpSession, RtpStats, SsrcGenerator};
