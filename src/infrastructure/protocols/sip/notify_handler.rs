//! NOTIFY handler for SIP event notifications (RFC 6665)
//!
//! Used with SUBSCRIBE/REFER for presence, message-waiting, refer progress, etc.

use super::builder::ResponseBuilder;
use super::handler::SipHandler;
use super::message::{SipError, SipMethod, SipRequest, SipResponse};
use async_trait::async_trait;
use rsip::Header;
use tracing::{debug, info};

pub struct NotifyHandler {}

impl NotifyHandler {
    pub fn new() -> Self {
        Self {}
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

    fn extract_subscription_state(request: &SipRequest) -> Option<String> {
        Self::extract_other(request, "Subscription-State")
    }
}

impl Default for NotifyHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SipHandler for NotifyHandler {
    async fn handle_request(&self, request: SipRequest) -> Result<SipResponse, SipError> {
        info!("Handling NOTIFY request");

        if let Some(event) = Self::extract_event(&request) {
            debug!("NOTIFY event type: {}", event);
        }

        if let Some(state) = Self::extract_subscription_state(&request) {
            debug!("Subscription state: {}", state);
        }

        let body = String::from_utf8_lossy(request.body());
        if !body.is_empty() {
            debug!("NOTIFY body: {}", body);
        }

        // Dispatch by event package is left to higher layers (refer progress,
        // message-summary, presence, dialog, reg); this handler only
        // acknowledges receipt per RFC 6665 §3.2.4.

        ResponseBuilder::ok().build_for_request(&request)
    }

    fn can_handle(&self, method: SipMethod) -> bool {
        matches!(method, SipMethod::Notify)
    }
}
