//! Protocol implementations (SIP signaling, STUN, and the addressing/NAT
//! helpers the SIP stack leans on).

pub mod addressing;
pub mod sip;
pub mod stun;
