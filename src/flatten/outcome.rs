//! Round-trip outcome classification for probe rows.
//!
//! Outcomes are `<stage>/<result>` strings. The stage says how far the round
//! trip got (`setup`, `dial`, `tls`, `write`, `read`, `http`, `content`) and the
//! result names the failure seen there.

use crate::constants::outcome::{
    AKAMAI_SERVER_HEADERS, CONTENT_MISMATCH, EXPECTED_MATCH, STATUS_MISMATCH, TRUSTED_AKAMAI,
    UNKNOWN,
};
use crate::types::Outcome;

#[derive(Clone, Copy)]
enum Pattern {
    Equals(&'static str),
    StartsWith(&'static str),
    EndsWith(&'static str),
    Contains(&'static str),
}

impl Pattern {
    fn matches(&self, error: &str) -> bool {
        match self {
            Pattern::Equals(needle) => error == *needle,
            Pattern::StartsWith(needle) => error.starts_with(needle),
            Pattern::EndsWith(needle) => error.ends_with(needle),
            Pattern::Contains(needle) => error.contains(needle),
        }
    }
}

#[derive(Clone, Copy)]
enum Verdict {
    Fixed(&'static str),
    StatusMismatch,
}

struct Rule {
    pattern: Pattern,
    /// Rule only applies to scan types other than echo.
    skip_echo: bool,
    verdict: Verdict,
}

const fn rule(pattern: Pattern, outcome: &'static str) -> Rule {
    Rule {
        pattern,
        skip_echo: false,
        verdict: Verdict::Fixed(outcome),
    }
}

const fn non_echo(pattern: Pattern, outcome: &'static str) -> Rule {
    Rule {
        pattern,
        skip_echo: true,
        verdict: Verdict::Fixed(outcome),
    }
}

const fn status(pattern: Pattern) -> Rule {
    Rule {
        pattern,
        skip_echo: false,
        verdict: Verdict::StatusMismatch,
    }
}

use Pattern::{Contains, EndsWith, Equals, StartsWith};

// Evaluated top to bottom; the first match wins.
const RULES: &[Rule] = &[
    rule(EndsWith("address already in use"), "setup/system_failure"),
    rule(EndsWith("protocol error"), "setup/system_failure"),
    rule(EndsWith("protocol not available"), "setup/system_failure"),
    rule(EndsWith("too many open files"), "setup/system_failure"),
    rule(EndsWith("network is unreachable"), "dial/ip.network_unreachable"),
    rule(EndsWith("no route to host"), "dial/ip.host_no_route"),
    rule(EndsWith("connection refused"), "dial/tcp.refused"),
    rule(EndsWith("context deadline exceeded"), "dial/timeout"),
    rule(EndsWith("connect: connection timed ou"), "dial/timeout"),
    rule(StartsWith("connection reset by peer"), "dial/tcp.reset"),
    rule(EndsWith("connect: connection reset by peer"), "dial/tcp.reset"),
    rule(EndsWith("getsockopt: connection reset by peer"), "dial/tcp.reset"),
    rule(Contains("tls:"), "tls/tls.failed"),
    rule(Contains("remote error:"), "tls/tls.failed"),
    rule(Contains("local error:"), "tls/tls.failed"),
    rule(EndsWith("readLoopPeekFailLocked: <nil>"), "tls/tls.failed"),
    rule(EndsWith("no mutual cipher suite"), "tls/tls.failed"),
    rule(EndsWith("missing ServerKeyExchange message"), "tls/tls.failed"),
    rule(Contains("TLS handshake timeout"), "tls/timeout"),
    rule(EndsWith("write: connection reset by peer"), "write/tcp.reset"),
    rule(EndsWith("write: broken pipe"), "write/system"),
    rule(Contains("request canceled"), "read/timeout"),
    rule(EndsWith("i/o timeout"), "read/timeout"),
    rule(EndsWith("shutdown: transport endpoint is not connected"), "read/system"),
    rule(Contains("read: connection reset by peer"), "read/tcp.reset"),
    non_echo(Contains("unexpected EOF"), "read/http.truncated_response"),
    non_echo(Contains("EOF"), "read/http.empty"),
    rule(Contains("http: server closed idle connection"), "read/http.truncated_response"),
    rule(EndsWith("trailer header without chunked transfer encoding"), "http/http.invalid"),
    rule(EndsWith("response missing Location header"), "http/http.invalid"),
    rule(Contains("bad Content-Length"), "http/http.invalid"),
    rule(Contains("failed to parse Location header"), "http/http.invalid"),
    rule(Contains("malformed HTTP"), "http/http.invalid"),
    rule(Contains("malformed MIME"), "http/http.invalid"),
    rule(Equals("Incorrect echo response"), CONTENT_MISMATCH),
    rule(Equals("Received response"), CONTENT_MISMATCH),
    status(Equals("Incorrect web response: status lines don't match")),
    rule(Equals("Incorrect web response: bodies don't match"), "content/body_mismatch"),
    rule(Equals("Incorrect web response: certificates don't match"), "content/tls_mismatch"),
    rule(Equals("Incorrect web response: cipher suites don't match"), "content/tls_mismatch"),
    rule(Equals("Incorrect web response: TLS versions don't match"), "content/tls_mismatch"),
    rule(Equals("echo response does not match echo request"), CONTENT_MISMATCH),
    rule(Equals("discard response is not empty"), CONTENT_MISMATCH),
    status(Equals("Status lines does not match")),
    status(Equals("Status lines do not match")),
    rule(Equals("Bodies do not match"), "content/body_mismatch"),
    rule(Equals("Certificates do not match"), "content/tls_mismatch"),
    rule(Equals("Cipher suites do not match"), "content/tls_mismatch"),
    rule(Equals("TLS versions do not match"), "content/tls_mismatch"),
    rule(Contains("header field missing"), "content/header_mismatch"),
    rule(Contains("header field mismatch"), "content/header_mismatch"),
];

/// Classify one round trip.
///
/// A round trip not known to match its template (`matches_template` of
/// `Some(false)` or `None`) with no recorded error is a content mismatch:
/// some scanner versions did not write verification failures into the error
/// field.
pub fn classify_outcome(
    error: Option<&str>,
    scan_type: &str,
    received_status: Option<&str>,
    matches_template: Option<bool>,
    received_headers: &[String],
) -> Outcome {
    if received_headers
        .iter()
        .any(|header| AKAMAI_SERVER_HEADERS.contains(&header.as_str()))
    {
        return TRUSTED_AKAMAI.to_string();
    }
    let error = error.filter(|error| !error.is_empty());
    if matches_template != Some(true) && error.is_none() {
        return CONTENT_MISMATCH.to_string();
    }
    classify_error(error.map(first_error), scan_type, received_status)
}

/// First error of a `;`-separated error list.
pub fn first_error(errors: &str) -> &str {
    errors.split(';').next().unwrap_or(errors)
}

fn classify_error(error: Option<&str>, scan_type: &str, received_status: Option<&str>) -> Outcome {
    let Some(error) = error.filter(|error| !error.is_empty()) else {
        return EXPECTED_MATCH.to_string();
    };
    let is_echo = scan_type == "echo";
    RULES
        .iter()
        .filter(|rule| !(rule.skip_echo && is_echo))
        .find(|rule| rule.pattern.matches(error))
        .map(|rule| match rule.verdict {
            Verdict::Fixed(outcome) => outcome.to_string(),
            Verdict::StatusMismatch => status_mismatch(received_status),
        })
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn status_mismatch(received_status: Option<&str>) -> Outcome {
    match received_status.filter(|status| !status.is_empty()) {
        Some(status) => {
            let code: String = status.chars().take(3).collect();
            format!("{STATUS_MISMATCH}:{code}")
        }
        None => STATUS_MISMATCH.to_string(),
    }
}
