//! Application layer - Use cases and application services
//!
//! This layer orchestrates domain objects to fulfill use cases.
//! It's responsible for:
//! - Transaction management
//! - Coordinating multiple aggregates
//! - Publishing domain events
//! - Converting between domain models and DTOs

// Call/registration/session use cases are handled directly by
// infrastructure::protocols::sip's handlers; no separate application
// layer module exists yet.
