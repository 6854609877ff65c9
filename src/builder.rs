//! Response shaping
//!
//! Maps small request parameters onto a [`ResponseDescription`]. The plain
//! builders are pure; the timed ones first wait on the [`DelayGate`] and
//! build nothing if the gate refuses.

use tracing::debug;

use crate::Result;
use crate::failsafe::{DelayGate, DelayOutcome};
use crate::response::{COOKIE_PATH, ResponseCookie, ResponseDescription, ResponseMessage};

const OK: i32 = 200;

/// Request data the cookie response is derived from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieRequest {
    /// Name of the cookie to set (and to look up in the request)
    pub name: String,
    /// Value to set
    pub value: String,
    /// `max-age` for both the cookie and `Cache-Control`
    pub max_age: i64,
    /// `http` or `https`
    pub scheme: String,
    /// Request host without port
    pub host: String,
    /// Value of the request's own cookie called `name`, if sent
    pub incoming_value: Option<String>,
}

fn with_max_age(status: i32, max_age: i64) -> ResponseDescription {
    ResponseDescription {
        status_code: status,
        cache_control_max_age: Some(max_age),
        cookie: None,
        body: ResponseMessage::new(max_age > 0, status),
    }
}

/// 200 with `Cache-Control: max-age=<max_age>`.
///
/// `max_age <= 0` still emits the header, only the body flag reads false.
#[must_use]
pub fn build_cacheable(max_age: i64) -> ResponseDescription {
    with_max_age(OK, max_age)
}

/// Same as [`build_cacheable`], for the max-age routes
#[must_use]
pub fn build_max_age(max_age: i64) -> ResponseDescription {
    build_cacheable(max_age)
}

/// Arbitrary status, no cache header
#[must_use]
pub fn build_status(status: i32) -> ResponseDescription {
    ResponseDescription {
        status_code: status,
        cache_control_max_age: None,
        cookie: None,
        body: ResponseMessage::new(false, status),
    }
}

/// [`build_status`] after a gated delay
pub async fn build_status_with_delay(
    gate: &DelayGate,
    status: i32,
    seconds: i64,
) -> Result<ResponseDescription> {
    wait(gate, seconds).await?;
    Ok(build_status(status))
}

/// 200 without cache header after a gated delay
pub async fn build_timed_ok(gate: &DelayGate, seconds: i64) -> Result<ResponseDescription> {
    wait(gate, seconds).await?;
    Ok(build_status(OK))
}

/// Status plus `max-age` after a gated delay
pub async fn build_max_age_status_timed(
    gate: &DelayGate,
    max_age: i64,
    status: i32,
    seconds: i64,
) -> Result<ResponseDescription> {
    wait(gate, seconds).await?;
    Ok(with_max_age(status, max_age))
}

/// 200 with `max-age`, a fresh cookie, and the previous cookie value echoed
/// in the body message (empty when the request carried none).
#[must_use]
pub fn build_cookie(request: &CookieRequest) -> ResponseDescription {
    let mut desc = with_max_age(OK, request.max_age);

    desc.cookie = Some(ResponseCookie {
        name: request.name.clone(),
        value: request.value.clone(),
        path: COOKIE_PATH.to_string(),
        domain: request.host.clone(),
        max_age: request.max_age,
        secure: request.scheme == "https",
    });
    desc.body = desc
        .body
        .with_message(request.incoming_value.clone().unwrap_or_default());

    desc
}

async fn wait(gate: &DelayGate, seconds: i64) -> Result<()> {
    match gate.delay(seconds).await? {
        DelayOutcome::Completed => {}
        DelayOutcome::Interrupted => {
            debug!(seconds, "Building response after interrupted delay");
        }
    }
    Ok(())
}
