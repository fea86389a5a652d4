//! SUBSCRIBE handler for event subscription (RFC 6665)

use super::builder::ResponseBuilder;
use super::handler::SipHandler;
use super::message::{SipError, SipMethod, SipRequest, SipResponse};
use rsip::Header;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Subscription information
#[derive(Debug, Clone)]
pub struct Subscription {
    pub subscriber: String,
    pub event: String,
    pub expires: u32,
    pub dialog_id: String,
}

/// Subscription manager, keyed by dialog id (Call-ID[:from-tag])
pub struct SubscriptionManager {
    subscriptions: RwLock<HashMap<String, Subscription>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add_subscription(&self, dialog_id: String, subscription: Subscription) {
        self.subscriptions.write().await.insert(dialog_id, subscription);
    }

    pub async fn remove_subscription(&self, dialog_id: &str) {
        self.subscriptions.write().await.remove(dialog_id);
    }

    pub async fn get_subscription(&self, dialog_id: &str) -> Option<Subscription> {
        self.subscriptions.read().await.get(dialog_id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

const SUPPORTED_EVENTS: &[&str] = &["presence", "dialog", "message-summary", "reg", "refer"];

/// SUBSCRIBE handler for SIP event subscriptions
pub struct SubscribeHandler {
    subscription_manager: std::sync::Arc<SubscriptionManager>,
}

impl SubscribeHandler {
    pub fn new(subscription_manager: std::sync::Arc<SubscriptionManager>) -> Self {
        Self { subscription_manager }
    }

    fn extract_other(request: &SipRequest, name: &str) -> Option<String> {
        request.headers().iter().find_map(|h| match h {
            Header::Other(n, value) if n.eq_ignore_ascii_case(name) => {
                Some(String::from_utf8_lossy(value).to_string())
            }
            _ => None,
        })
    }

    fn extract_event(request: &SipRequest) -> Option<String> {
        Self::extract_other(request, "Event")
    }

    fn extract_expires(request: &SipRequest) -> u32 {
        request
            .headers()
            .iter()
            .find_map(|h| match h {
                Header::Expires(e) => e.to_string().parse().ok(),
                _ => None,
            })
            .unwrap_or(3600)
    }

    fn generate_dialog_id(request: &SipRequest) -> String {
        let call_id = request.call_id().unwrap_or_else(|| format!("sub-{}", uuid::Uuid::new_v4()));
        match request.from_tag() {
            Some(tag) => format!("{}:{}", call_id, tag),
            None => call_id,
        }
    }
}

#[async_trait]
impl SipHandler for SubscribeHandler {
    async fn handle_request(&self, request: SipRequest) -> Result<SipResponse, SipError> {
        let event = match Self::extract_event(&request) {
            Some(evt) => evt,
            None => {
                warn!("SUBSCRIBE request missing Event header");
                return ResponseBuilder::new(400).build_for_request(&request);
            }
        };

        debug!("SUBSCRIBE event type: {}", event);

        let expires = Self::extract_expires(&request);
        let subscriber = request
            .headers()
            .iter()
            .find_map(|h| match h {
                Header::From(from) => from.uri().ok().map(|u| u.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| "unknown".to_string());

        let dialog_id = Self::generate_dialog_id(&request);

        if expires == 0 {
            info!("Unsubscribing dialog: {}", dialog_id);
            self.subscription_manager.remove_subscription(&dialog_id).await;
            return ResponseBuilder::ok().build_for_request(&request);
        }

        if !SUPPORTED_EVENTS.contains(&event.as_str()) {
            warn!("Unsupported event package: {}", event);
            return ResponseBuilder::new(489).build_for_request(&request);
        }

        let subscription = Subscription {
            subscriber: subscriber.clone(),
            event: event.clone(),
            expires,
            dialog_id: dialog_id.clone(),
        };

        self.subscription_manager
            .add_subscription(dialog_id.clone(), subscription)
            .await;

        info!("Created subscription for {} (dialog: {})", subscriber, dialog_id);

        // Sending the initial NOTIFY with current state is the transport
        // layer's job once the 202 is accepted; this handler only admits
        // the subscription.
        ResponseBuilder::new(202)
            .to_tag(uuid::Uuid::new_v4().to_string())
            .build_for_request(&request)
    }

    fn can_handle(&self, method: SipMethod) -> bool {
        matches!(method, SipMethod::Subscribe)
    }
}
