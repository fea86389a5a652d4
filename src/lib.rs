//! A SIP (RFC 3261) user-agent/registrar/proxy channel driver core.
//!
//! Domain-Driven Design layering: transaction/dialogue/registration state
//! machines and the wire codec live in `infrastructure::protocols::sip`,
//! independent of any particular call-control policy.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
