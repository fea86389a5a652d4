//! SIP message builder utilities (Simplified version)

use super::message::{SipError, SipRequest, SipResponse};
use rsip::{Header, Headers, Response, StatusCode, Version};

/// Build a simple SIP response from a request
pub struct ResponseBuilder {
    status_code: u16,
    headers: Vec<Header>,
    body: Vec<u8>,
    to_tag: Option<String>,
}

impl ResponseBuilder {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Vec::new(),
            body: Vec::new(),
            to_tag: None,
        }
    }

    /// Assign a To tag when none is present on the request's To header yet.
    ///
    /// UAS-generated dialogue-creating responses (200 OK to INVITE/SUBSCRIBE,
    /// 18x with To tag) need this; it is a no-op if the request's To already
    /// carries a tag.
    pub fn to_tag(mut self, tag: impl Into<String>) -> Self {
        self.to_tag = Some(tag.into());
        self
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn unauthorized() -> Self {
        Self::new(401)
    }

    pub fn server_internal_error() -> Self {
        Self::new(500)
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn build_for_request(mut self, request: &SipRequest) -> Result<SipResponse, SipError> {
        let has_to_tag = request.to_tag().is_some();
        let to_tag = self.to_tag.clone();

        // Copy essential headers from request
        for header in request.headers().iter() {
            match header {
                Header::To(to) if !has_to_tag && to_tag.is_some() => {
                    let tagged = format!("{};tag={}", to.to_string().trim_end(), to_tag.as_ref().unwrap());
                    self.headers.push(Header::Other("To".into(), tagged.into_bytes()));
                }
                Header::Via(_) | Header::From(_) | Header::To(_) | Header::CallId(_) | Header::CSeq(_) => {
                    self.headers.push(header.clone());
                }
                _ => {}
            }
        }

        // Add Content-Length
        self.headers.push(Header::ContentLength(
            if self.body.is_empty() {
                "0".into()
            } else {
                self.body.len().to_string().into()
            },
        ));

        let response = Response {
            status_code: StatusCode::from(self.status_code),
            headers: Headers::from(self.headers),
            body: self.body,
            version: Version::V2,
        };

        Ok(SipResponse::new(response))
    }
}

/// Build a simple REGISTER response
pub fn build_register_response(
    request: &SipRequest,
    status_code: u16,
) -> Result<SipResponse, SipError> {
    ResponseBuilder::new(status_code).build_for_request(request)
}
