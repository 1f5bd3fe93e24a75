use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::metadata::MetadataRecord;

pub use crate::types::{Domain, IpString, MeasurementId, Outcome, SourceId};

/// Fields shared by every normalized row regardless of scan family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommonFields {
    /// Calendar date taken from the source path.
    pub date: NaiveDate,
    /// Batch identifier taken from the source path.
    pub source: SourceId,
    /// Tested or queried domain.
    pub domain: Domain,
    /// Measured endpoint (probe families) or resolver (resolution family).
    pub ip: IpString,
    /// Shared by every row flattened from the same raw line.
    pub measurement_id: MeasurementId,
    /// When the round trip started, as written by the scanner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// When the round trip ended, as written by the scanner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    /// First recorded failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Scanner verdict that the measurement saw interference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<bool>,
    /// Round trip (or liveness check) succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Row measures a control domain rather than a test domain.
    #[serde(default)]
    pub is_control: bool,
    /// Controls for this measurement failed, so the test is inconclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls_failed: Option<bool>,
    /// Filled only by the metadata join.
    #[serde(flatten)]
    pub metadata: MetadataRecord,
}

impl CommonFields {
    /// Create a row header with every optional field unset.
    pub fn new(
        date: NaiveDate,
        source: impl Into<SourceId>,
        domain: impl Into<Domain>,
        ip: impl Into<IpString>,
        measurement_id: impl Into<MeasurementId>,
    ) -> Self {
        Self {
            date,
            source: source.into(),
            domain: domain.into(),
            ip: ip.into(),
            measurement_id: measurement_id.into(),
            start_time: None,
            end_time: None,
            error: None,
            anomaly: None,
            success: None,
            is_control: false,
            controls_failed: None,
            metadata: MetadataRecord::default(),
        }
    }
}

/// What a probe received back from the endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Received {
    /// Status line for HTTP/S, or the raw payload for echo/discard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Response body for HTTP/S.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Flattened `Name: value` header strings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
    /// Negotiated TLS version number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_version: Option<u32>,
    /// Negotiated TLS cipher suite id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_cipher_suite: Option<u32>,
    /// Leaf certificate presented by the endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_cert: Option<String>,
}

/// One protocol attempt against an endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbeRow {
    /// Shared row fields; `ip` is the probed endpoint.
    #[serde(flatten)]
    pub common: CommonFields,
    /// What came back.
    #[serde(default)]
    pub received: Received,
    /// Blocking persisted across later connections to the endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stateful_block: Option<bool>,
    /// Classified round-trip outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

/// A single resolved address inside a DNS answer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAnswer {
    /// Address returned by the resolver.
    pub ip: IpString,
    /// AS number announcing the address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asnum: Option<u32>,
    /// AS name announcing the address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asname: Option<String>,
    /// Hash of the HTTP page served by the address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,
    /// Hash of the TLS certificate served by the address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    /// Space-separated tags that matched the control resolution (e.g. `ip http`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches_control: Option<String>,
}

/// One DNS answer from a resolver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRow {
    /// Shared row fields; `ip` is the resolver.
    #[serde(flatten)]
    pub common: CommonFields,
    /// Hostname of the resolver, from resolver tag files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver_name: Option<String>,
    /// DNS response code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rcode: Option<i64>,
    /// Response carried at least one A record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_type_a: Option<bool>,
    /// Resolver is a control resolver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_control_ip: Option<bool>,
    /// Answers, in IP order.
    #[serde(default)]
    pub received: Vec<ResolvedAnswer>,
    /// Mean of `matches_confidence`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_confidence: Option<f64>,
    /// Per-answer percentage of tags matching the control resolution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches_confidence: Vec<f64>,
    /// No control resolution of this date and domain carried any tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub untagged_controls: Option<bool>,
    /// No answer of this row carried any tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub untagged_response: Option<bool>,
    /// Interference was judged a false positive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded: Option<bool>,
    /// Space-separated reasons behind `excluded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_reason: Option<String>,
}

/// Normalized measurement row, tagged by scan style.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Row {
    /// Echo, discard, HTTP, or HTTPS attempt.
    Probe(ProbeRow),
    /// DNS resolution answer.
    Resolution(ResolutionRow),
}

impl Row {
    /// Shared fields of either variant.
    pub fn common(&self) -> &CommonFields {
        match self {
            Row::Probe(row) => &row.common,
            Row::Resolution(row) => &row.common,
        }
    }

    /// Mutable shared fields of either variant.
    pub fn common_mut(&mut self) -> &mut CommonFields {
        match self {
            Row::Probe(row) => &mut row.common,
            Row::Resolution(row) => &mut row.common,
        }
    }

    /// The `(date, ip)` key this row's metadata is looked up under.
    pub fn join_key(&self) -> JoinKey {
        let common = self.common();
        JoinKey::new(common.date, common.ip.clone())
    }

    /// Metadata attached by the join (empty before it runs).
    pub fn metadata(&self) -> &MetadataRecord {
        &self.common().metadata
    }

    /// Merge a lookup result onto this row.
    pub fn apply_metadata(&mut self, record: &MetadataRecord) {
        self.common_mut().metadata.merge_from(record);
    }
}

/// Key of one metadata lookup: the IP as seen on a given day.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinKey {
    /// Day the measurement was taken.
    pub date: NaiveDate,
    /// Address the metadata describes.
    pub ip: IpString,
}

impl JoinKey {
    /// Build a key from its parts.
    pub fn new(date: NaiveDate, ip: impl Into<IpString>) -> Self {
        Self { date, ip: ip.into() }
    }
}
