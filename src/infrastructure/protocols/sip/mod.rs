//! SIP protocol implementation
//!
//! This module implements a SIP (Session Initiation Protocol) stack based on RFC 3261.
//!
//! Architecture:
//! ```
//! ┌─────────────────────────┐
//! │   Application Layer     │
//! │  (User Agent, Server)   │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │    Dialog Layer         │
//! │   (SIP Dialogs)         │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │   Transaction Layer     │
//! │  (Client/Server TXN)    │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │   Transport Layer       │
//! │  (UDP, TCP, TLS, WS)    │
//! └─────────────────────────┘
//! ```

pub mod auth;
#[cfg(feature = "postgres")]
pub mod auth_db;
pub mod auth_enhanced;
pub mod builder;
pub mod call_handler;
pub mod call_router;
pub mod call_state;
pub mod dialog;
pub mod handler;
pub mod hold_manager;
pub mod message;
pub mod message_handler;
pub mod notify_handler;
pub mod peer_registry;
pub mod refer_handler;
pub mod registrant;
pub mod registrar;
pub mod rport;
pub mod sdp;
pub mod server;
pub mod subscribe_handler;
pub mod transaction;
pub mod transport;

pub use auth::{AuthChallenge, DigestAuth, SipAuthenticator, UserCredentials};
#[cfg(feature = "postgres")]
pub use auth_db::DigestAuthDb;
pub use call_handler::{AckHandler, ByeHandler, CallSession, CancelHandler, InviteHandler};
pub use call_router::{ActiveCallInfo, BridgedCall, CallLegInfo, CallRouter};
pub use call_state::{
    cause_for_status, CallDirection, CallEvent, CallLeg, CallState, CallStateMachine, CallStats,
    HangupCause,
};
pub use dialog::{
    Dialogue, DialogueId, DialogueRegistry, DialogueRole, DialogueState, FaxState,
    OutstandingRequest,
};
pub use message::{SipMessage, SipMethod, SipRequest, SipResponse};
pub use message_handler::{MessageHandler, MessageRecord, MessageStore};
pub use notify_handler::NotifyHandler;
pub use peer_registry::{Peer, PeerFlags, PeerRegistry, PeerStatus};
pub use refer_handler::ReferHandler;
pub use registrant::{Registrant, RegistrantConfig, RegistrantState};
pub use registrar::Registrar;
pub use subscribe_handler::{Subscription, SubscribeHandler, SubscriptionManager};
pub use sdp::SdpSession;
pub use server::{SipServer, SipServerConfig};
pub use transaction::{
    InviteClientState, InviteServerState, NonInviteClientState, NonInviteServerState,
    SipTimers, TimerType, Transaction, TransactionId, TransactionLayer, TransactionState,
    TransactionTimerAction,
};
pub use transport::{Transport, TransportProtocol};
