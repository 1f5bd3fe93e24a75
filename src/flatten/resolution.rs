use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::constants::flatten::{
    ANSWER_TAGS, CDN_AS_PREFIXES, CDN_EXCLUDE_REASON, IP_TAG, UNKNOWN_SHAPE_MSG,
};
use crate::data::{CommonFields, ResolutionRow, ResolvedAnswer, Row};
use crate::flatten::{PathContext, is_control_url, value_bool, value_error, value_str, value_u32};
use crate::types::Domain;

/// Rows for one resolution record.
///
/// Legacy records (`resolver`/`query`/`answers`) give one row. Current
/// records give one row per DNS answer when `response` is a list, or one row
/// when it is a single answer map. Confidence and exclusion are filled later
/// by [`post_process`] unless the record carries them.
pub fn extract(context: &PathContext, path: &str, record: &Value, measurement_id: &str) -> Vec<Row> {
    if record.get("resolver").is_some() && record.get("query").is_some() {
        return vec![extract_legacy(context, record, measurement_id)];
    }
    match record.get("response") {
        Some(Value::Array(answers)) => answers
            .iter()
            .map(|answer| extract_answer(context, record, answer, measurement_id))
            .collect(),
        Some(Value::Object(_)) => vec![extract_answer(context, record, record, measurement_id)],
        _ => {
            warn!(path, UNKNOWN_SHAPE_MSG);
            Vec::new()
        }
    }
}

/// `{resolver, query, answers, passed, error?, rcode?}`
fn extract_legacy(context: &PathContext, record: &Value, measurement_id: &str) -> Row {
    let query = value_str(record, "query").unwrap_or_default();
    let resolver = value_str(record, "resolver").unwrap_or_default();
    let is_control = is_control_url(Some(&query));
    let mut common = CommonFields::new(context.date, context.source.clone(), query, resolver, measurement_id);
    common.is_control = is_control;
    common.anomaly = value_bool(record, "passed").map(|passed| !passed);
    common.error = value_error(record, "error");
    common.start_time = value_str(record, "start_time");
    common.end_time = value_str(record, "end_time");

    let received = match record.get("answers") {
        Some(Value::Array(ips)) => ips
            .iter()
            .filter_map(Value::as_str)
            .map(|ip| ResolvedAnswer {
                ip: ip.to_string(),
                ..ResolvedAnswer::default()
            })
            .collect(),
        Some(Value::Object(tagged)) => tagged
            .iter()
            .map(|(ip, tags)| ResolvedAnswer {
                ip: ip.clone(),
                matches_control: join_tags(tags),
                ..ResolvedAnswer::default()
            })
            .collect(),
        _ => Vec::new(),
    };

    Row::Resolution(ResolutionRow {
        common,
        resolver_name: None,
        rcode: rcode(record),
        has_type_a: None,
        is_control_ip: None,
        received,
        average_confidence: None,
        matches_confidence: Vec::new(),
        untagged_controls: None,
        untagged_response: None,
        excluded: None,
        exclude_reason: None,
    })
}

/// One DNS answer of a current-generation record.
///
/// `answer` is either an entry of the record's `response` list or the record
/// itself when `response` is a single answer map.
fn extract_answer(context: &PathContext, record: &Value, answer: &Value, measurement_id: &str) -> Row {
    let test_url = value_str(record, "test_url").unwrap_or_default();
    let vp = value_str(record, "vp").unwrap_or_default();
    let domain = value_str(answer, "url").unwrap_or_else(|| test_url.clone());
    let is_control = is_control_url(Some(&domain)) || (!test_url.is_empty() && domain != test_url);

    let mut common = CommonFields::new(context.date, context.source.clone(), domain, vp, measurement_id);
    common.is_control = is_control;
    common.anomaly = value_bool(record, "anomaly");
    common.success = value_bool(record, "passed_liveness");
    common.controls_failed = value_bool(record, "in_control_group").map(|in_group| !in_group);
    common.error = value_error(answer, "error").or_else(|| value_error(record, "connect_error"));
    common.start_time = value_str(answer, "start_time").or_else(|| value_str(record, "start_time"));
    common.end_time = value_str(answer, "end_time").or_else(|| value_str(record, "end_time"));

    let received = answer
        .get("response")
        .and_then(Value::as_object)
        .map(parse_answers)
        .unwrap_or_default();

    let mut row = ResolutionRow {
        common,
        resolver_name: value_str(record, "resolver_name"),
        rcode: rcode(answer).or_else(|| rcode(record)),
        has_type_a: value_bool(answer, "has_type_a"),
        is_control_ip: value_bool(record, "is_control_ip"),
        received,
        average_confidence: None,
        matches_confidence: Vec::new(),
        untagged_controls: None,
        untagged_response: None,
        excluded: value_bool(record, "excluded"),
        exclude_reason: value_str(record, "exclude_reason"),
    };

    if let Some(confidence) = record.get("confidence").filter(|value| value.is_object()) {
        row.average_confidence = confidence.get("average").and_then(Value::as_f64);
        row.matches_confidence = confidence
            .get("matches")
            .and_then(Value::as_array)
            .map(|matches| matches.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();
        row.untagged_controls = value_bool(confidence, "untagged_controls");
        row.untagged_response = value_bool(confidence, "untagged_response");
    }
    Row::Resolution(row)
}

/// `{ip: {http, cert, asnum, asname, matched}}` answers, in IP order.
fn parse_answers(answers: &Map<String, Value>) -> Vec<ResolvedAnswer> {
    let mut parsed: Vec<ResolvedAnswer> = answers
        .iter()
        .filter(|(_, tags)| tags.is_object())
        .map(|(ip, tags)| ResolvedAnswer {
            ip: ip.clone(),
            asnum: value_u32(tags, "asnum"),
            asname: value_str(tags, "asname"),
            http: value_str(tags, "http"),
            cert: value_str(tags, "cert"),
            matches_control: tags.get("matched").and_then(join_tags),
        })
        .collect();
    parsed.sort_by(|a, b| a.ip.cmp(&b.ip));
    parsed
}

fn join_tags(tags: &Value) -> Option<String> {
    let tags: Vec<&str> = tags.as_array()?.iter().filter_map(Value::as_str).collect();
    Some(tags.join(" "))
}

fn rcode(value: &Value) -> Option<i64> {
    match value.get("rcode")? {
        Value::Number(number) => number.as_i64(),
        Value::Array(codes) => codes.iter().find_map(Value::as_i64),
        _ => None,
    }
}

/// Value of `tag` on `answer`, when set and non-empty.
fn tag_value(answer: &ResolvedAnswer, tag: &str) -> Option<String> {
    let value = match tag {
        "http" => answer.http.clone(),
        "cert" => answer.cert.clone(),
        "asname" => answer.asname.clone(),
        "asnum" => answer.asnum.filter(|asnum| *asnum != 0).map(|asnum| asnum.to_string()),
        _ => None,
    };
    value.filter(|value| !value.is_empty())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    /// Query for a control domain.
    DomainControl,
    /// Query sent to a control resolver; these carry no anomaly verdict.
    IpControl,
    Test,
}

fn role(row: &ResolutionRow) -> Role {
    if row.common.is_control {
        Role::DomainControl
    } else if row.is_control_ip == Some(true) || row.common.anomaly.is_none() {
        Role::IpControl
    } else {
        Role::Test
    }
}

/// Distinct non-ip tag values across the answers of one control resolution.
fn control_tag_count(row: &ResolutionRow) -> usize {
    ANSWER_TAGS
        .iter()
        .map(|tag| {
            row.received
                .iter()
                .filter_map(|answer| tag_value(answer, tag))
                .collect::<HashSet<_>>()
                .len()
        })
        .sum()
}

/// Fill confidence and exclusion on test resolutions.
///
/// Control resolutions for the same date and domain are counted first: a
/// test whose controls carried no tags at all is flagged `untagged_controls`.
/// Rows that arrived with confidence or exclusion keep them. Control rows
/// and probe rows are left as they are.
pub fn post_process(rows: &mut [Row]) {
    let mut control_tags: HashMap<NaiveDate, HashMap<Domain, usize>> = HashMap::new();
    for row in rows.iter() {
        if let Row::Resolution(row) = row
            && role(row) == Role::IpControl
        {
            let slot = control_tags
                .entry(row.common.date)
                .or_default()
                .entry(row.common.domain.clone())
                .or_default();
            *slot = (*slot).max(control_tag_count(row));
        }
    }

    let mut tests = 0usize;
    for row in rows.iter_mut() {
        let Row::Resolution(row) = row else {
            continue;
        };
        if role(row) != Role::Test {
            continue;
        }
        tests += 1;
        if row.average_confidence.is_none() {
            let tags = control_tags
                .get(&row.common.date)
                .and_then(|domains| domains.get(&row.common.domain))
                .copied()
                .unwrap_or(0);
            calculate_confidence(row, tags);
        }
        if row.excluded.is_none() {
            verify(row);
        }
    }
    debug!(tests, control_dates = control_tags.len(), "resolution post-processing complete");
}

/// Per-answer share of tags that match the control resolution.
///
/// An answer whose IP appeared in the control response scores 100. When no
/// answer carries any tag the row cannot claim interference, so `anomaly` is
/// cleared. `control_tags` is the tag count of the matching controls.
pub(crate) fn calculate_confidence(row: &mut ResolutionRow, control_tags: usize) {
    row.untagged_controls = Some(control_tags == 0);
    let mut untagged_response = true;
    let mut matches = Vec::with_capacity(row.received.len());
    for answer in &row.received {
        let matched: Vec<&str> = answer
            .matches_control
            .as_deref()
            .map(|tags| tags.split_whitespace().collect())
            .unwrap_or_default();
        let present: Vec<&str> = ANSWER_TAGS
            .iter()
            .copied()
            .filter(|tag| tag_value(answer, tag).is_some())
            .collect();
        if !present.is_empty() {
            untagged_response = false;
        }
        let score = if matched.contains(&IP_TAG) {
            100.0
        } else if present.is_empty() {
            0.0
        } else {
            let hits = present.iter().filter(|tag| matched.contains(tag)).count();
            hits as f64 * 100.0 / present.len() as f64
        };
        matches.push(score);
    }
    row.average_confidence = Some(if matches.is_empty() {
        0.0
    } else {
        matches.iter().sum::<f64>() / matches.len() as f64
    });
    row.matches_confidence = matches;
    row.untagged_response = Some(untagged_response);
    if untagged_response {
        row.common.anomaly = Some(false);
    }
}

/// Mark anomalous rows whose answers land on a CDN as excluded false positives.
pub(crate) fn verify(row: &mut ResolutionRow) {
    if row.common.anomaly != Some(true) {
        return;
    }
    let reasons: Vec<&str> = row
        .received
        .iter()
        .filter(|answer| {
            answer.asname.as_deref().is_some_and(|asname| {
                CDN_AS_PREFIXES
                    .iter()
                    .any(|prefix| asname.starts_with(prefix))
            })
        })
        .map(|_| CDN_EXCLUDE_REASON)
        .collect();
    row.excluded = Some(!reasons.is_empty());
    row.exclude_reason = Some(reasons.join(" "));
}
