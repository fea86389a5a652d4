//! Dialogue state (RFC 3261 §12): the peer-to-peer relationship identified by
//! the Call-ID plus the local and remote tags, outliving any single
//! transaction within it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rsip::Uri;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::message::{SipMethod, SipRequest, SipResponse};

/// Identifies a dialogue uniquely: Call-ID plus the tag pair.
///
/// Early dialogues (before the remote tag is known) key on `remote_tag: None`
/// and are promoted in place once a tagged response/request arrives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialogueId {
    pub call_id: String,
    pub local_tag: String,
    pub remote_tag: Option<String>,
}

impl DialogueId {
    pub fn new(call_id: impl Into<String>, local_tag: impl Into<String>, remote_tag: Option<String>) -> Self {
        Self {
            call_id: call_id.into(),
            local_tag: local_tag.into(),
            remote_tag,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueState {
    Early,
    Confirmed,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueRole {
    Uac,
    Uas,
}

/// T.38 fax renegotiation state, tracked alongside the dialogue because a
/// re-INVITE to fax-relay must be answered from whatever media state the
/// dialogue was already in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaxState {
    None,
    Requested,
    Active,
}

/// A request sent but not yet answered within this dialogue — used to
/// enforce CSeq monotonicity and to match retransmissions.
#[derive(Debug, Clone)]
pub struct OutstandingRequest {
    pub method: SipMethod,
    pub cseq: u32,
    pub sent_at: Instant,
    /// Whether exhausting this request's retransmission schedule without a
    /// response should destroy the dialogue and hang up the owning channel
    /// (RFC 3261 §17.1.1.1/§17.1.2.2 Timer B/F expiry).
    pub fatal: bool,
}

/// A confirmed or early SIP dialogue.
pub struct Dialogue {
    pub id: DialogueId,
    pub state: DialogueState,
    pub role: DialogueRole,
    pub local_uri: Uri,
    pub remote_uri: Uri,
    pub remote_target: Option<Uri>,
    pub route_set: Vec<Uri>,
    pub local_cseq: u32,
    pub remote_cseq: Option<u32>,
    pub secure: bool,
    pub fax_state: FaxState,
    pub outstanding: Vec<OutstandingRequest>,
    pub created_at: Instant,
}

impl Dialogue {
    fn new(id: DialogueId, role: DialogueRole, local_uri: Uri, remote_uri: Uri) -> Self {
        Self {
            id,
            state: DialogueState::Early,
            role,
            local_uri,
            remote_uri,
            remote_target: None,
            route_set: Vec::new(),
            local_cseq: 0,
            remote_cseq: None,
            secure: false,
            fax_state: FaxState::None,
            outstanding: Vec::new(),
            created_at: Instant::now(),
        }
    }

    pub fn confirm(&mut self, remote_tag: String) {
        self.id.remote_tag = Some(remote_tag);
        self.state = DialogueState::Confirmed;
    }

    pub fn terminate(&mut self) {
        self.state = DialogueState::Terminated;
    }

    /// Bumps the local CSeq for a new request this dialogue originates.
    pub fn next_local_cseq(&mut self) -> u32 {
        self.local_cseq += 1;
        self.local_cseq
    }

    /// Validates and records the CSeq of an in-dialogue request received from
    /// the peer. Returns `false` (without updating state) if the request is
    /// an out-of-order retransmission or reordered request that must be
    /// rejected with a 500 per RFC 3261 §12.2.2.
    pub fn accept_remote_cseq(&mut self, cseq: u32) -> bool {
        match self.remote_cseq {
            Some(last) if cseq <= last => false,
            _ => {
                self.remote_cseq = Some(cseq);
                true
            }
        }
    }

    pub fn record_outstanding(&mut self, method: SipMethod, cseq: u32, fatal: bool) {
        self.outstanding.push(OutstandingRequest {
            method,
            cseq,
            sent_at: Instant::now(),
            fatal,
        });
    }

    pub fn complete_outstanding(&mut self, cseq: u32) -> Option<OutstandingRequest> {
        let idx = self.outstanding.iter().position(|o| o.cseq == cseq)?;
        Some(self.outstanding.remove(idx))
    }

    /// Drops and returns outstanding requests whose retransmission schedule
    /// has exhausted (older than `timeout`, RFC 3261 Timer B/F). A non-empty
    /// return with any `fatal` entry means the caller should destroy this
    /// dialogue and hang up whatever channel owns it.
    pub fn expire_outstanding(&mut self, timeout: std::time::Duration) -> Vec<OutstandingRequest> {
        let now = Instant::now();
        let (expired, remaining): (Vec<_>, Vec<_>) = self
            .outstanding
            .drain(..)
            .partition(|o| now.duration_since(o.sent_at) >= timeout);
        self.outstanding = remaining;
        expired
    }
}

/// Concurrent registry of live dialogues, matched by Call-ID + tag pair.
///
/// Early dialogues are stored under a key with `remote_tag: None`; once the
/// first response carrying a To tag (or first in-dialogue request) arrives
/// the caller is expected to call [`DialogueRegistry::confirm`], which
/// re-keys the entry.
#[derive(Default)]
pub struct DialogueRegistry {
    dialogues: RwLock<HashMap<DialogueId, Dialogue>>,
}

impl DialogueRegistry {
    pub fn new() -> Self {
        Self {
            dialogues: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_uac(
        &self,
        call_id: impl Into<String>,
        local_tag: impl Into<String>,
        local_uri: Uri,
        remote_uri: Uri,
    ) -> DialogueId {
        let id = DialogueId::new(call_id, local_tag, None);
        let dialogue = Dialogue::new(id.clone(), DialogueRole::Uac, local_uri, remote_uri);
        self.dialogues.write().await.insert(id.clone(), dialogue);
        id
    }

    pub async fn create_uas(
        &self,
        call_id: impl Into<String>,
        local_tag: impl Into<String>,
        remote_tag: impl Into<String>,
        local_uri: Uri,
        remote_uri: Uri,
    ) -> DialogueId {
        let id = DialogueId::new(call_id, local_tag, Some(remote_tag.into()));
        let mut dialogue = Dialogue::new(id.clone(), DialogueRole::Uas, local_uri, remote_uri);
        dialogue.state = DialogueState::Confirmed;
        self.dialogues.write().await.insert(id.clone(), dialogue);
        id
    }

    /// Promotes an early dialogue to confirmed once the remote tag is known,
    /// re-keying its entry in the map.
    pub async fn confirm(&self, call_id: &str, local_tag: &str, remote_tag: String) -> Option<DialogueId> {
        let mut dialogues = self.dialogues.write().await;
        let early_key = DialogueId::new(call_id, local_tag, None);
        let mut dialogue = dialogues.remove(&early_key)?;
        dialogue.confirm(remote_tag);
        let new_id = dialogue.id.clone();
        dialogues.insert(new_id.clone(), dialogue);
        Some(new_id)
    }

    /// Matches an incoming in-dialogue request against the registry using
    /// Call-ID + From-tag (peer's tag, our remote) + To-tag (our local tag).
    pub async fn match_request(&self, call_id: &str, peer_tag: &str, our_tag: &str) -> Option<DialogueId> {
        let dialogues = self.dialogues.read().await;
        let confirmed = DialogueId::new(call_id, our_tag, Some(peer_tag.to_string()));
        if dialogues.contains_key(&confirmed) {
            return Some(confirmed);
        }
        None
    }

    pub async fn find(&self, id: &DialogueId) -> bool {
        self.dialogues.read().await.contains_key(id)
    }

    /// Finds a dialogue's key by Call-ID alone, for callers that only carry
    /// the Call-ID as a join key (in-dialogue requests matched against the
    /// legacy call-session map rather than the full tag pair).
    pub async fn find_by_call_id(&self, call_id: &str) -> Option<DialogueId> {
        self.dialogues
            .read()
            .await
            .keys()
            .find(|id| id.call_id == call_id)
            .cloned()
    }

    pub async fn with_dialogue<R>(&self, id: &DialogueId, f: impl FnOnce(&mut Dialogue) -> R) -> Option<R> {
        let mut dialogues = self.dialogues.write().await;
        dialogues.get_mut(id).map(f)
    }

    pub async fn terminate(&self, id: &DialogueId) {
        if let Some(dialogue) = self.dialogues.write().await.get_mut(id) {
            dialogue.terminate();
            debug!(call_id = %id.call_id, "dialogue terminated");
        }
    }

    pub async fn remove(&self, id: &DialogueId) {
        self.dialogues.write().await.remove(id);
    }

    pub async fn count(&self) -> usize {
        self.dialogues.read().await.len()
    }

    /// Applies the request's CSeq to whichever dialogue it belongs to,
    /// rejecting requests that arrive out of order.
    pub async fn validate_request_cseq(&self, id: &DialogueId, request: &SipRequest) -> bool {
        let Some(cseq) = request.cseq() else {
            warn!("in-dialogue request missing CSeq");
            return false;
        };
        self.with_dialogue(id, |d| d.accept_remote_cseq(cseq))
            .await
            .unwrap_or(false)
    }
}

/// Derives the dialogue key a response belongs to from the UAC's perspective:
/// local tag is the From tag we sent, remote tag is the To tag we receive
/// back.
pub fn dialogue_id_from_response(call_id: String, local_tag: String, response: &SipResponse) -> DialogueId {
    DialogueId::new(call_id, local_tag, response.to_tag())
}

/// Derives the dialogue key an in-dialogue request belongs to from the UAS's
/// perspective: local tag is our To tag, remote tag is the caller's From tag.
pub fn dialogue_id_from_request(request: &SipRequest, our_tag: &str) -> Option<DialogueId> {
    let call_id = request.call_id()?;
    let peer_tag = request.from_tag()?;
    Some(DialogueId::new(call_id, our_tag, Some(peer_tag)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        Uri::try_from(s).unwrap()
    }

    #[tokio::test]
    async fn uac_dialogue_confirms_on_tagged_response() {
        let registry = DialogueRegistry::new();
        let early = registry
            .create_uac("call-1", "from-tag", uri("sip:alice@example.com"), uri("sip:bob@example.com"))
            .await;
        assert!(registry.find(&early).await);

        let confirmed = registry
            .confirm("call-1", "from-tag", "to-tag".to_string())
            .await
            .expect("promotes early dialogue");
        assert!(!registry.find(&early).await);
        assert!(registry.find(&confirmed).await);
        assert_eq!(confirmed.remote_tag.as_deref(), Some("to-tag"));
    }

    #[tokio::test]
    async fn cseq_monotonicity_rejects_replay() {
        let registry = DialogueRegistry::new();
        let id = registry
            .create_uas(
                "call-2",
                "to-tag",
                "from-tag",
                uri("sip:bob@example.com"),
                uri("sip:alice@example.com"),
            )
            .await;

        let accepted = registry.with_dialogue(&id, |d| d.accept_remote_cseq(2)).await.unwrap();
        assert!(accepted);
        let replay = registry.with_dialogue(&id, |d| d.accept_remote_cseq(2)).await.unwrap();
        assert!(!replay);
        let reordered = registry.with_dialogue(&id, |d| d.accept_remote_cseq(1)).await.unwrap();
        assert!(!reordered);
        let advanced = registry.with_dialogue(&id, |d| d.accept_remote_cseq(3)).await.unwrap();
        assert!(advanced);
    }

    #[tokio::test]
    async fn outstanding_request_tracked_and_completed() {
        let registry = DialogueRegistry::new();
        let id = registry
            .create_uac("call-3", "from-tag", uri("sip:alice@example.com"), uri("sip:bob@example.com"))
            .await;

        registry
            .with_dialogue(&id, |d| d.record_outstanding(SipMethod::Bye, 5, true))
            .await;
        let completed = registry.with_dialogue(&id, |d| d.complete_outstanding(5)).await.flatten();
        assert!(completed.is_some());
        assert_eq!(completed.unwrap().method, SipMethod::Bye);
    }

    #[tokio::test]
    async fn expire_outstanding_drops_only_requests_past_timeout() {
        let registry = DialogueRegistry::new();
        let id = registry
            .create_uac("call-3b", "from-tag", uri("sip:alice@example.com"), uri("sip:bob@example.com"))
            .await;

        registry
            .with_dialogue(&id, |d| d.record_outstanding(SipMethod::Bye, 7, true))
            .await;

        let none_expired = registry
            .with_dialogue(&id, |d| d.expire_outstanding(std::time::Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(none_expired.is_empty());

        let expired = registry
            .with_dialogue(&id, |d| d.expire_outstanding(std::time::Duration::from_secs(0)))
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert!(expired[0].fatal);
        assert!(
            registry
                .with_dialogue(&id, |d| d.outstanding.is_empty())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn terminate_marks_state_without_removing() {
        let registry = DialogueRegistry::new();
        let id = registry
            .create_uas(
                "call-4",
                "to-tag",
                "from-tag",
                uri("sip:bob@example.com"),
                uri("sip:alice@example.com"),
            )
            .await;

        registry.terminate(&id).await;
        assert!(registry.find(&id).await);
        let state = registry.with_dialogue(&id, |d| d.state).await.unwrap();
        assert_eq!(state, DialogueState::Terminated);

        registry.remove(&id).await;
        assert!(!registry.find(&id).await);
    }
}
