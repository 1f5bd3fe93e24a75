use serde_json::Value;
use tracing::warn;

use crate::constants::flatten::UNKNOWN_SHAPE_MSG;
use crate::data::{CommonFields, ProbeRow, Received, Row};
use crate::flatten::outcome::classify_outcome;
use crate::flatten::{
    PathContext, is_control_url, value_bool, value_error, value_str, value_u32,
};

/// Rows for one probe record (either scanner generation).
pub fn extract(context: &PathContext, path: &str, record: &Value, measurement_id: &str) -> Vec<Row> {
    if let Some(results) = record.get("Results").and_then(Value::as_array) {
        return extract_v1(context, record, results, measurement_id);
    }
    if let Some(responses) = record.get("response").and_then(Value::as_array) {
        return extract_v2(context, record, responses, measurement_id);
    }
    warn!(path, UNKNOWN_SHAPE_MSG);
    Vec::new()
}

/// `{Server, Keyword, Results: [...], Blocked, FailSanity, StatefulBlock}`
fn extract_v1(
    context: &PathContext,
    record: &Value,
    results: &[Value],
    measurement_id: &str,
) -> Vec<Row> {
    let keyword = value_str(record, "Keyword").unwrap_or_default();
    let server = value_str(record, "Server").unwrap_or_default();
    let retries = record.get("Retries").and_then(Value::as_u64);
    let anomaly = value_bool(record, "Blocked");
    let controls_failed = value_bool(record, "FailSanity");
    let stateful_block = value_bool(record, "StatefulBlock");

    results
        .iter()
        .enumerate()
        .map(|(index, result)| {
            let sent = result
                .get("Sent")
                .and_then(Value::as_str)
                .and_then(domain_from_sent);
            let (domain, is_control) = match sent {
                Some(domain) => {
                    let is_control = is_control_url(Some(&domain));
                    (domain, is_control)
                }
                // Failed round trips sometimes have no `Sent`; control
                // attempts follow the retries.
                None => match retries {
                    Some(retries) if index as u64 > retries => (String::new(), true),
                    _ => (keyword.clone(), is_control_url(Some(&keyword))),
                },
            };
            let success = value_bool(result, "Success");
            let error = value_error(result, "Error");
            let received = result.get("Received").map(parse_received).unwrap_or_default();

            let mut common = CommonFields::new(
                context.date,
                context.source.clone(),
                domain,
                server.clone(),
                measurement_id,
            );
            common.start_time = value_str(result, "StartTime");
            common.end_time = value_str(result, "EndTime");
            common.anomaly = anomaly;
            common.success = success;
            common.is_control = is_control;
            common.controls_failed = controls_failed;
            common.error = error;

            finish_row(context, common, received, stateful_block, success)
        })
        .collect()
}

/// `{vp, test_url, response: [...], anomaly, controls_failed, stateful_block}`
fn extract_v2(
    context: &PathContext,
    record: &Value,
    responses: &[Value],
    measurement_id: &str,
) -> Vec<Row> {
    let vp = value_str(record, "vp").unwrap_or_default();
    let test_url = value_str(record, "test_url").unwrap_or_default();
    let anomaly = value_bool(record, "anomaly");
    let controls_failed = value_bool(record, "controls_failed");
    let stateful_block = value_bool(record, "stateful_block");

    responses
        .iter()
        .map(|response| {
            let control_url = value_str(response, "control_url");
            let is_control = control_url.is_some();
            let domain = control_url.unwrap_or_else(|| test_url.clone());
            let matches_template = value_bool(response, "matches_template");
            let received = response
                .get("response")
                .map(parse_received)
                .unwrap_or_default();

            let mut common =
                CommonFields::new(context.date, context.source.clone(), domain, vp.clone(), measurement_id);
            common.start_time = value_str(response, "start_time");
            common.end_time = value_str(response, "end_time");
            common.anomaly = anomaly;
            common.success = matches_template;
            common.is_control = is_control;
            common.controls_failed = controls_failed;
            common.error = value_error(response, "error");

            finish_row(context, common, received, stateful_block, matches_template)
        })
        .collect()
}

fn finish_row(
    context: &PathContext,
    common: CommonFields,
    received: Received,
    stateful_block: Option<bool>,
    matches_template: Option<bool>,
) -> Row {
    let outcome = classify_outcome(
        common.error.as_deref(),
        context.scan_type,
        received.status.as_deref(),
        matches_template,
        &received.headers,
    );
    Row::Probe(ProbeRow {
        common,
        received,
        stateful_block,
        outcome: Some(outcome),
    })
}

/// Domain a v1 probe actually sent.
///
/// HTTP/S requests carry it in the `Host` header; echo and discard send the
/// bare domain (or a payload containing it).
fn domain_from_sent(sent: &str) -> Option<String> {
    let sent = sent.trim();
    if sent.is_empty() {
        return None;
    }
    let host = sent
        .split("\r\n")
        .find_map(|line| line.strip_prefix("Host: "))
        .map(str::trim);
    Some(host.unwrap_or(sent).to_string())
}

/// Parse a `Received` value: a plain string is the status; an object carries
/// the status line, body, headers, and TLS details in either naming scheme.
pub fn parse_received(received: &Value) -> Received {
    match received {
        Value::String(status) => Received {
            status: Some(status.clone()),
            ..Received::default()
        },
        Value::Object(_) => {
            let mut parsed = Received {
                status: value_str(received, "status_line"),
                body: value_str(received, "body"),
                headers: received
                    .get("headers")
                    .map(flatten_headers)
                    .unwrap_or_default(),
                ..Received::default()
            };
            if let Some(tls) = received.get("tls").filter(|tls| tls.is_object()) {
                parsed.tls_version = value_u32(tls, "version");
                parsed.tls_cipher_suite = value_u32(tls, "cipher_suite");
                parsed.tls_cert = value_str(tls, "cert");
            }
            if received.get("TlsVersion").is_some() {
                parsed.tls_version = value_u32(received, "TlsVersion");
                parsed.tls_cipher_suite = value_u32(received, "CipherSuite");
                parsed.tls_cert = value_str(received, "Certificate");
            }
            parsed
        }
        _ => Received::default(),
    }
}

/// `{"Name": ["a", "b"]}` to `["Name: a", "Name: b"]`, in key order.
fn flatten_headers(headers: &Value) -> Vec<String> {
    let Some(map) = headers.as_object() else {
        return Vec::new();
    };
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys.into_iter()
        .flat_map(|key| {
            let values: Vec<&str> = match &map[key.as_str()] {
                Value::Array(values) => values.iter().filter_map(Value::as_str).collect(),
                Value::String(value) => vec![value.as_str()],
                _ => Vec::new(),
            };
            values
                .into_iter()
                .map(move |value| format!("{key}: {value}"))
        })
        .collect()
}
