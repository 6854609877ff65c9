//! Response description and its HTTP serialization
//!
//! A [`ResponseDescription`] is the complete, transport-independent shape of
//! one reply: status, optional `Cache-Control: max-age`, optional cookie and
//! the JSON body that echoes what was decided. It is built fresh for every
//! request and turned into an axum response right away.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Path every cookie set by this service is scoped to
pub const COOKIE_PATH: &str = "/api/cookie";

/// JSON body returned with every shaped response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMessage {
    /// Whether a positive `max-age` was sent
    pub is_cacheable_header_set: bool,
    /// Status code of the response, repeated for the harness
    pub status: i32,
    /// Extra information (the incoming cookie value for cookie responses)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResponseMessage {
    /// Body without a message
    #[must_use]
    pub fn new(is_cacheable_header_set: bool, status: i32) -> Self {
        Self {
            is_cacheable_header_set,
            status,
            message: None,
        }
    }

    /// Attach a message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Cookie to set on the response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Path attribute
    pub path: String,
    /// Domain attribute (request host)
    pub domain: String,
    /// `Max-Age` in seconds; negative means a session cookie
    pub max_age: i64,
    /// Only send over HTTPS
    pub secure: bool,
}

impl ResponseCookie {
    /// Render as a `Set-Cookie` header value
    #[must_use]
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}; Path={}", self.name, self.value, self.path);
        if !self.domain.is_empty() {
            out.push_str("; Domain=");
            out.push_str(&self.domain);
        }
        if self.max_age >= 0 {
            out.push_str(&format!("; Max-Age={}", self.max_age));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out
    }
}

/// Everything needed to write one shaped HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDescription {
    /// HTTP status to return
    pub status_code: i32,
    /// Emits `Cache-Control: max-age=<n>` when present, verbatim
    pub cache_control_max_age: Option<i64>,
    /// Cookie to set
    pub cookie: Option<ResponseCookie>,
    /// JSON payload
    pub body: ResponseMessage,
}

impl ResponseDescription {
    /// `Cache-Control` header value, if any
    #[must_use]
    pub fn cache_control(&self) -> Option<String> {
        self.cache_control_max_age.map(|age| format!("max-age={age}"))
    }

    /// Whether the description will tell a cache it may store the response
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.cache_control_max_age.is_some_and(|age| age > 0)
    }
}

impl IntoResponse for ResponseDescription {
    fn into_response(self) -> Response {
        let status = u16::try_from(self.status_code)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or_else(|| {
                tracing::error!(
                    status = self.status_code,
                    "Unrepresentable status code reached serialization"
                );
                StatusCode::INTERNAL_SERVER_ERROR
            });

        let cache_control = self.cache_control();
        let cookie = match self
            .cookie
            .as_ref()
            .map(|c| HeaderValue::from_str(&c.to_header_value()))
            .transpose()
        {
            Ok(cookie) => cookie,
            Err(e) => {
                return Error::Internal(format!("Cookie not representable as a header: {e}"))
                    .into_response();
            }
        };

        let mut response = (status, Json(self.body)).into_response();
        let headers = response.headers_mut();

        if let Some(value) = cache_control.and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        if let Some(value) = cookie {
            headers.insert(header::SET_COOKIE, value);
        }

        response
    }
}
