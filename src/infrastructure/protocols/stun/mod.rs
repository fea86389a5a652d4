/// STUN (Session Traversal Utilities for NAT) protocol implementation
/// RFC 5389
pub mod client;
pub mod message;

pub use client::{StunClient, StunResult};
pub use message::{StunMessage, StunMethod, StunMessageType, StunAttribute};
