//! Call Detail Record (CDR) domain model
//!
//! CDR captures information about each call for billing, auditing, and analytics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Call Detail Record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallDetailRecord {
    /// Unique CDR ID
    pub id: Uuid,

    /// SIP Call-ID
    pub call_id: String,

    /// Caller information
    pub caller_username: String,
    pub caller_uri: String,
    pub caller_ip: String,

    /// Callee information
    pub callee_username: String,
    pub callee_uri: String,
    pub callee_ip: Option<String>,

    /// Call direction
    pub direction: CallDirection,

    /// Time information
    pub start_time: DateTime<Utc>,
    pub answer_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    /// Duration in seconds
    pub setup_duration: Option<i32>,
    pub call_duration: Option<i32>,
    pub total_duration: Option<i32>,

    /// Call status and result
    pub status: CallStatus,
    pub end_reason: Option<String>,
    pub sip_response_code: Option<u16>,

    /// Media information
    pub codec: Option<String>,
    pub rtp_packets_sent: Option<i64>,
    pub rtp_packets_received: Option<i64>,
    pub rtp_bytes_sent: Option<i64>,
    pub rtp_bytes_received: Option<i64>,

    /// Metadata
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Inbound call from external
    Inbound,
    /// Outbound call to external
    Outbound,
    /// Internal call between registered users
    Internal,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
            CallDirection::Internal => "internal",
        }
    }
}

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Call in progress
    Active,
    /// Call completed successfully
    Completed,
    /// Call failed (connection issues, etc.)
    Failed,
    /// Callee was busy
    Busy,
    /// Call was not answered
    NoAnswer,
    /// Call was cancelled
    Cancelled,
    /// Call was rejected/declined
    Rejected,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Active => "active",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
            CallStatus::Busy => "busy",
            CallStatus::NoAnswer => "no_answer",
            CallStatus::Cancelled => "cancelled",
            CallStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CallStatus::Active),
            "completed" => Some(CallStatus::Completed),
            "failed" => Some(CallStatus::Failed),
            "busy" => Some(CallStatus::Busy),
            "no_answer" => Some(CallStatus::NoAnswer),
            "cancelled" => Some(CallStatus::Cancelled),
            "rejected" => Some(CallStatus::Rejected),
            _ => None,
        }
    }
}

impl CallDetailRecord {
    /// Create a new CDR for an initiated call
    pub fn new(
        call_id: String,
        caller_username: String,
        caller_uri: String,
        caller_ip: String,
        callee_username: String,
        callee_uri: String,
        direction: CallDirection,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            call_id,
            caller_username,
            caller_uri,
            caller_ip,
            callee_username,
            callee_uri,
            callee_ip: None,
            direction,
            start_time: now,
            answer_time: None,
            end_time: None,
            setup_duration: None,
            call_duration: None,
            total_duration: None,
            status: CallStatus::Active,
            end_reason: None,
            sip_response_code: None,
            codec: None,
            rtp_packets_sent: None,
            rtp_packets_received: None,
            rtp_bytes_sent: None,
            rtp_bytes_received: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the call as answered
    pub fn mark_answered(&mut self) {
        let now = Utc::now();
        self.answer_time = Some(now);
        self.setup_duration = Some((now - self.start_time).num_seconds() as i32);
        self.updated_at = now;
    }

    /// Mark the call as ended
    pub fn mark_ended(&mut self, status: CallStatus, reason: Option<String>, response_code: Option<u16>) {
        let now = Utc::now();
        self.end_time = Some(now);
        self.status = status;
        self.end_reason = reason;
        self.sip_response_code = response_code;
        self.total_duration = Some((now - self.start_time).num_seconds() as i32);

        if let Some(answer_time) = self.answer_time {
            self.call_duration = Some((now - answer_time).num_seconds() as i32);
        }

        self.updated_at = now;
    }

    /// Set media information
    pub fn set_media_info(
        &mut self,
        codec: Option<String>,
        packets_sent: Option<i64>,
        packets_received: Option<i64>,
        bytes_sent: Option<i64>,
        bytes_received: Option<i64>,
    ) {
        self.codec = codec;
        self.rtp_packets_sent = packets_sent;
        self.rtp_packets_received = packets_received;
        self.rtp_bytes_sent = bytes_sent;
        self.rtp_bytes_received = bytes_received;
        self.updated_at = Utc::now();
    }

    /// Set callee IP address
    pub fn set_callee_ip(&mut self, ip: String) {
        self.callee_ip = Some(ip);
        self.updated_at = Utc::now();
    }
}

/// CDR Repository trait
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CdrRepository: Send + Sync {
    /// Create a new CDR
    async fn create(&self, cdr: &CallDetailRecord) -> Result<(), String>;

    /// Update an existing CDR
    async fn update(&self, cdr: &CallDetailRecord) -> Result<(), String>;

    /// Get CDR by ID
    async fn get_by_id(&self, id: Uuid) -> Result<Option<CallDetailRecord>, String>;

    /// Get CDR by Call-ID
    async fn get_by_call_id(&self, call_id: &str) -> Result<Option<CallDetailRecord>, String>;

    /// List CDRs with filters
    async fn list(
        &self,
        filters: CdrFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CallDetailRecord>, String>;

    /// Count CDRs with filters
    async fn count(&self, filters: CdrFilters) -> Result<i64, String>;

    /// Delete old CDRs (for cleanup)
    async fn delete_older_than(&self, days: i32) -> Result<i64, String>;
}

/// Filters for CDR queries
#[derive(Debug, Clone, Default)]
pub struct CdrFilters {
    pub caller_username: Option<String>,
    pub callee_username: Option<String>,
    pub direction: Option<CallDirection>,
    pub status: Option<CallStatus>,
    pub start_time_from: Option<DateTime<Utc>>,
    pub start_time_to: Option<DateTime<Utc>>,
    pub min_duration: Option<i32>,
}
