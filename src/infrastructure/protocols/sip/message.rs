//! SIP message types and parsing

use bytes::Bytes;
use rsip::{Header, Headers, Method, Request, Response, Uri};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SipError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rsip::Error> for SipError {
    fn from(err: rsip::Error) -> Self {
        SipError::ParseError(err.to_string())
    }
}

/// SIP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SipMethod {
    Register,
    Invite,
    Ack,
    Cancel,
    Bye,
    Options,
    Info,
    Update,
    Prack,
    Subscribe,
    Notify,
    Refer,
    Message,
    Publish,
}

impl SipMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Register => "REGISTER",
            SipMethod::Invite => "INVITE",
            SipMethod::Ack => "ACK",
            SipMethod::Cancel => "CANCEL",
            SipMethod::Bye => "BYE",
            SipMethod::Options => "OPTIONS",
            SipMethod::Info => "INFO",
            SipMethod::Update => "UPDATE",
            SipMethod::Prack => "PRACK",
            SipMethod::Subscribe => "SUBSCRIBE",
            SipMethod::Notify => "NOTIFY",
            SipMethod::Refer => "REFER",
            SipMethod::Message => "MESSAGE",
            SipMethod::Publish => "PUBLISH",
        }
    }

    pub fn from_rsip(method: &Method) -> Option<Self> {
        match method {
            Method::Register => Some(SipMethod::Register),
            Method::Invite => Some(SipMethod::Invite),
            Method::Ack => Some(SipMethod::Ack),
            Method::Cancel => Some(SipMethod::Cancel),
            Method::Bye => Some(SipMethod::Bye),
            Method::Options => Some(SipMethod::Options),
            Method::Info => Some(SipMethod::Info),
            Method::Update => Some(SipMethod::Update),
            Method::PRack => Some(SipMethod::Prack),
            Method::Subscribe => Some(SipMethod::Subscribe),
            Method::Notify => Some(SipMethod::Notify),
            Method::Refer => Some(SipMethod::Refer),
            Method::Message => Some(SipMethod::Message),
            Method::Publish => Some(SipMethod::Publish),
        }
    }

    pub fn to_rsip(&self) -> Method {
        match self {
            SipMethod::Register => Method::Register,
            SipMethod::Invite => Method::Invite,
            SipMethod::Ack => Method::Ack,
            SipMethod::Cancel => Method::Cancel,
            SipMethod::Bye => Method::Bye,
            SipMethod::Options => Method::Options,
            SipMethod::Info => Method::Info,
            SipMethod::Update => Method::Update,
            SipMethod::Prack => Method::PRack,
            SipMethod::Subscribe => Method::Subscribe,
            SipMethod::Notify => Method::Notify,
            SipMethod::Refer => Method::Refer,
            SipMethod::Message => Method::Message,
            SipMethod::Publish => Method::Publish,
        }
    }

    /// Whether an unmatched message of this method may create a new dialogue.
    ///
    /// 1 = yes, 2 = theoretically yes but rejected with a specific error here,
    /// 0 = never (must match an existing dialogue or transaction).
    pub fn can_create(&self) -> u8 {
        match self {
            SipMethod::Invite => 1,
            SipMethod::Register => 1,
            SipMethod::Subscribe => 1,
            SipMethod::Options => 1,
            SipMethod::Message => 1,
            SipMethod::Refer => 2,
            SipMethod::Ack
            | SipMethod::Cancel
            | SipMethod::Bye
            | SipMethod::Info
            | SipMethod::Update
            | SipMethod::Prack
            | SipMethod::Notify
            | SipMethod::Publish => 0,
        }
    }
}

/// Extracts the `tag=` parameter value from a raw From/To header line.
///
/// Works directly on the header's wire text rather than relying on typed
/// parameter accessors, since both quoted and unquoted display-names shift
/// where the `;tag=` substring starts.
fn extract_tag_param(header_line: &str) -> Option<String> {
    let lower = header_line.to_ascii_lowercase();
    let idx = lower.find(";tag=")?;
    let rest = &header_line[idx + 5..];
    let end = rest.find(';').unwrap_or(rest.len());
    let tag = rest[..end].trim();
    if tag.is_empty() {
        None
    } else {
        Some(tag.to_string())
    }
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// SIP Request wrapper
#[derive(Debug, Clone)]
pub struct SipRequest {
    pub inner: Request,
}

impl SipRequest {
    pub fn new(inner: Request) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let request = rsip::Request::try_from(data)?;
        Ok(Self::new(request))
    }

    pub fn method(&self) -> Option<SipMethod> {
        SipMethod::from_rsip(&self.inner.method)
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn call_id(&self) -> Option<String> {
        self.inner
            .headers
            .iter()
            .find_map(|h| match h {
                Header::CallId(cid) => {
                    // rsip's CallId .to_string() includes "Call-ID: " prefix
                    let s = cid.to_string();
                    s.strip_prefix("Call-ID: ").map(|v| v.to_string()).or(Some(s))
                }
                _ => None,
            })
    }

    pub fn from_tag(&self) -> Option<String> {
        self.inner
            .headers
            .iter()
            .find_map(|h| match h {
                Header::From(from) => extract_tag_param(&from.to_string()),
                _ => None,
            })
    }

    pub fn to_tag(&self) -> Option<String> {
        self.inner
            .headers
            .iter()
            .find_map(|h| match h {
                Header::To(to) => extract_tag_param(&to.to_string()),
                _ => None,
            })
    }

    pub fn cseq(&self) -> Option<u32> {
        self.inner
            .headers
            .iter()
            .find_map(|h| match h {
                Header::CSeq(cseq) => {
                    // seq() returns Result, so we need to unwrap it
                    cseq.seq().ok().and_then(|s| s.to_string().parse().ok())
                }
                _ => None,
            })
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Response wrapper
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub inner: Response,
}

impl SipResponse {
    pub fn new(inner: Response) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let response = rsip::Response::try_from(data)?;
        Ok(Self::new(response))
    }

    pub fn status_code(&self) -> u16 {
        self.inner.status_code.clone().into()
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn call_id(&self) -> Option<String> {
        self.inner
            .headers
            .iter()
            .find_map(|h| match h {
                Header::CallId(cid) => {
                    let s = cid.to_string();
                    s.strip_prefix("Call-ID: ").map(|v| v.to_string()).or(Some(s))
                }
                _ => None,
            })
    }

    pub fn from_tag(&self) -> Option<String> {
        self.inner
            .headers
            .iter()
            .find_map(|h| match h {
                Header::From(from) => extract_tag_param(&from.to_string()),
                _ => None,
            })
    }

    pub fn to_tag(&self) -> Option<String> {
        self.inner
            .headers
            .iter()
            .find_map(|h| match h {
                Header::To(to) => extract_tag_param(&to.to_string()),
                _ => None,
            })
    }

    pub fn cseq(&self) -> Option<u32> {
        self.inner
            .headers
            .iter()
            .find_map(|h| match h {
                Header::CSeq(cseq) => cseq.seq().ok().and_then(|s| s.to_string().parse().ok()),
                _ => None,
            })
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Message (either request or response)
#[derive(Debug, Clone)]
pub enum SipMessage {
    Request(SipRequest),
    Response(SipResponse),
}

impl SipMessage {
    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        // Try parsing as request first
        if let Ok(request) = SipRequest::parse(data) {
            return Ok(SipMessage::Request(request));
        }

        // Try parsing as response
        if let Ok(response) = SipResponse::parse(data) {
            return Ok(SipMessage::Response(response));
        }

        Err(SipError::ParseError(
            "Could not parse as SIP request or response".to_string(),
        ))
    }

    pub fn is_request(&self) -> bool {
        matches!(self, SipMessage::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, SipMessage::Response(_))
    }

    pub fn as_request(&self) -> Option<&SipRequest> {
        match self {
            SipMessage::Request(req) => Some(req),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&SipResponse> {
        match self {
            SipMessage::Response(resp) => Some(resp),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            SipMessage::Request(req) => req.to_bytes(),
            SipMessage::Response(resp) => resp.to_bytes(),
        }
    }
}
