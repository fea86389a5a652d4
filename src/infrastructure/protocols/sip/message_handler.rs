//! MESSAGE handler for SIP instant messaging (RFC 3428)

use super::builder::ResponseBuilder;
use super::handler::SipHandler;
use super::message::{SipError, SipMethod, SipRequest, SipResponse};
use super::registrar::Registrar;
use async_trait::async_trait;
use chrono::Utc;
use rsip::Header;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Message record for history/offline delivery
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    pub content_type: String,
    pub body: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub delivered: bool,
}

/// Message store for offline messages and history
pub struct MessageStore {
    messages: RwLock<Vec<MessageRecord>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
        }
    }

    pub async fn store(&self, message: MessageRecord) {
        self.messages.write().await.push(message);
    }

    pub async fn get_undelivered(&self, user: &str) -> Vec<MessageRecord> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|m| m.to == user && !m.delivered)
            .cloned()
            .collect()
    }

    pub async fn mark_delivered(&self, id: &str) {
        if let Some(msg) = self.messages.write().await.iter_mut().find(|m| m.id == id) {
            msg.delivered = true;
        }
    }

    pub async fn count(&self) -> usize {
        self.messages.read().await.len()
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

/// MESSAGE handler for SIP instant messaging (page-mode, no dialog)
pub struct MessageHandler {
    registrar: Arc<Registrar>,
    message_store: Arc<MessageStore>,
}

impl MessageHandler {
    pub fn new(registrar: Arc<Registrar>, message_store: Arc<MessageStore>) -> Self {
        Self {
            registrar,
            message_store,
        }
    }

    fn extract_from_uri(request: &SipRequest) -> Option<String> {
        request.headers().iter().find_map(|h| match h {
            Header::From(from) => from.uri().ok().map(|u| u.to_string()),
            _ => None,
        })
    }

    fn extract_to_uri(request: &SipRequest) -> Option<String> {
        request.headers().iter().find_map(|h| match h {
            Header::To(to) => to.uri().ok().map(|u| u.to_string()),
            _ => None,
        })
    }

    fn extract_content_type(request: &SipRequest) -> String {
        request
            .headers()
            .iter()
            .find_map(|h| match h {
                Header::ContentType(ct) => Some(ct.to_string()),
                Header::Other(name, value) if name.eq_ignore_ascii_case("content-type") => {
                    Some(String::from_utf8_lossy(value).to_string())
                }
                _ => None,
            })
            .unwrap_or_else(|| "text/plain".to_string())
    }
}

#[async_trait]
impl SipHandler for MessageHandler {
    async fn handle_request(&self, request: SipRequest) -> Result<SipResponse, SipError> {
        let from = Self::extract_from_uri(&request).unwrap_or_default();
        let to = Self::extract_to_uri(&request).unwrap_or_default();

        debug!("MESSAGE from {} to {}", from, to);

        let content_type = Self::extract_content_type(&request);
        debug!("Content-Type: {}", content_type);

        let body = String::from_utf8_lossy(request.body()).to_string();
        if body.is_empty() {
            warn!("MESSAGE with empty body");
            return ResponseBuilder::new(400).build_for_request(&request);
        }

        let is_online = self.registrar.is_registered(&to).await;

        let message_record = MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            from: from.clone(),
            to: to.clone(),
            content_type,
            body,
            timestamp: Utc::now(),
            delivered: is_online,
        };

        self.message_store.store(message_record).await;

        if is_online {
            info!("Recipient {} is online, delivering message", to);
        } else {
            info!("Recipient {} is offline, message stored for later delivery", to);
        }

        ResponseBuilder::new(202).build_for_request(&request)
    }

    fn can_handle(&self, method: SipMethod) -> bool {
        matches!(method, SipMethod::Message)
    }
}
