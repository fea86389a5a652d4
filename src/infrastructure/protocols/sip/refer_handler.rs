//! REFER handler for call transfer (RFC 3515)

use super::builder::ResponseBuilder;
use super::call_router::CallRouter;
use super::handler::SipHandler;
use super::message::{SipError, SipMethod, SipRequest, SipResponse};
use async_trait::async_trait;
use rsip::Header;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// REFER handler for blind and attended call transfer
pub struct ReferHandler {
    call_router: Arc<CallRouter>,
}

impl ReferHandler {
    pub fn new(call_router: Arc<CallRouter>) -> Self {
        Self { call_router }
    }

    fn extract_other(request: &SipRequest, name: &str) -> Option<String> {
        request.headers().iter().find_map(|h| match h {
            Header::Other(n, value) if n.eq_ignore_ascii_case(name) => {
                Some(String::from_utf8_lossy(value).to_string())
            }
            _ => None,
        })
    }

    fn extract_refer_to(request: &SipRequest) -> Option<String> {
        Self::extract_other(request, "Refer-To")
    }

    fn extract_referred_by(request: &SipRequest) -> Option<String> {
        Self::extract_other(request, "Referred-By")
    }

    fn extract_replaces(refer_to: &str) -> Option<String> {
        // Replaces is carried as a URI header param on Refer-To:
        // <sip:target@host?Replaces=call-id%3Bto-tag%3Dxxx%3Bfrom-tag%3Dyyy>
        let idx = refer_to.find("Replaces=")?;
        let rest = &refer_to[idx + "Replaces=".len()..];
        let end = rest.find(['>', '&']).unwrap_or(rest.len());
        let encoded = &rest[..end];
        Some(encoded.replace("%3B", ";").replace("%3D", "=").replace("%40", "@"))
    }
}

#[async_trait]
impl SipHandler for ReferHandler {
    async fn handle_request(&self, request: SipRequest) -> Result<SipResponse, SipError> {
        let call_id = request.call_id().unwrap_or_else(|| "unknown".to_string());
        info!("Handling REFER for call {}", call_id);

        let refer_to = match Self::extract_refer_to(&request) {
            Some(target) => target,
            None => {
                warn!("REFER request missing Refer-To header");
                return ResponseBuilder::new(400).build_for_request(&request);
            }
        };

        debug!("Transfer target: {}", refer_to);

        if let Some(referrer) = Self::extract_referred_by(&request) {
            debug!("Referred by: {}", referrer);
        }

        let replaces = Self::extract_replaces(&refer_to);

        let result = if let Some(replaces) = &replaces {
            self.call_router
                .attended_transfer(&call_id, &refer_to, Some(replaces.as_str()))
                .await
        } else {
            self.call_router.blind_transfer(&call_id, &refer_to).await
        };

        match result {
            Ok(()) => {
                info!("Accepting REFER for call {}", call_id);
                ResponseBuilder::new(202).build_for_request(&request)
            }
            Err(e) if e.contains("not found") => {
                warn!("REFER for non-existent call {}: {}", call_id, e);
                ResponseBuilder::new(481).build_for_request(&request)
            }
            Err(e) => {
                warn!("REFER rejected for call {}: {}", call_id, e);
                ResponseBuilder::new(603).build_for_request(&request)
            }
        }
    }

    fn can_handle(&self, method: SipMethod) -> bool {
        matches!(method, SipMethod::Refer)
    }
}
