//! Resolver and answer tag files.
//!
//! Resolution scans ship side files that describe IPs seen on a given day:
//! resolver files carry a hostname and location per resolver, answer files
//! carry http/cert/AS tags per answer IP. Both are keyed by `(date, ip)` with
//! the date taken from the file path, and merged onto rows before the
//! confidence pass.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::constants::flatten::{ANSWER_TAG_FILES, RESOLVER_TAG_FILES, SKIP_TAG_LINE_MSG};
use crate::data::{ResolvedAnswer, Row};
use crate::errors::PipelineError;
use crate::source::indexing::date_helpers::{data_filename, date_from_path};
use crate::transport::fs::read_lines;
use crate::types::{CountryCode, IpString};

#[derive(Debug, Deserialize)]
struct ResolverLine {
    resolver: Option<IpString>,
    vp: Option<IpString>,
    name: Option<String>,
    location: Option<Location>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    country_code: Option<String>,
}

/// What a resolver file says about one resolver.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolverTag {
    /// Reverse DNS name of the resolver.
    pub name: Option<String>,
    /// Two-letter code of the resolver's country.
    pub country: Option<CountryCode>,
}

/// What an answer file says about one answer IP.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AnswerTag {
    /// Hash of the HTTP page served by the IP.
    #[serde(default)]
    pub http: Option<String>,
    /// Hash of the TLS certificate served by the IP.
    #[serde(default)]
    pub cert: Option<String>,
    /// Name of the AS announcing the IP.
    #[serde(default)]
    pub asname: Option<String>,
    /// Number of the AS announcing the IP.
    #[serde(default)]
    pub asnum: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AnswerLine {
    ip: IpString,
    #[serde(flatten)]
    tag: AnswerTag,
}

enum TagKind {
    Resolver,
    Answer,
}

fn tag_kind(path: &str) -> Option<TagKind> {
    let name = data_filename(path)?;
    if RESOLVER_TAG_FILES.contains(&name) {
        Some(TagKind::Resolver)
    } else if ANSWER_TAG_FILES.contains(&name) {
        Some(TagKind::Answer)
    } else {
        None
    }
}

/// True when `path` is a resolver or answer tag file rather than measurements.
pub fn is_tag_file(path: &str) -> bool {
    tag_kind(path).is_some()
}

/// Two uppercase ASCII letters.
fn is_country_code(value: &str) -> bool {
    value.len() == 2 && value.bytes().all(|byte| byte.is_ascii_uppercase())
}

/// Tags from every tag file of a run, by date then IP.
#[derive(Debug, Default)]
pub struct ResolutionTags {
    resolvers: HashMap<NaiveDate, HashMap<IpString, ResolverTag>>,
    answers: HashMap<NaiveDate, HashMap<IpString, AnswerTag>>,
}

enum TagEntry {
    Resolver(IpString, ResolverTag),
    Answer(IpString, AnswerTag),
}

impl ResolutionTags {
    /// Read every tag file in `paths`; an unreadable file fails the batch.
    ///
    /// Files without a date stamp and lines that do not parse are skipped.
    /// When two lines tag the same `(date, ip)` the later path wins.
    pub fn load(paths: &[&str]) -> Result<Self, PipelineError> {
        let per_file = paths
            .par_iter()
            .map(|path| read_tag_file(path))
            .collect::<Result<Vec<_>, _>>()?;
        let mut tags = Self::default();
        for (date, entries) in per_file.into_iter().flatten() {
            for entry in entries {
                tags.insert(date, entry);
            }
        }
        debug!(
            resolver_dates = tags.resolvers.len(),
            answer_dates = tags.answers.len(),
            "loaded resolution tags"
        );
        Ok(tags)
    }

    fn insert(&mut self, date: NaiveDate, entry: TagEntry) {
        match entry {
            TagEntry::Resolver(ip, tag) => {
                self.resolvers.entry(date).or_default().insert(ip, tag);
            }
            TagEntry::Answer(ip, tag) => {
                self.answers.entry(date).or_default().insert(ip, tag);
            }
        }
    }

    /// True when no tag file contributed anything.
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty() && self.answers.is_empty()
    }

    /// Tag for resolver `ip` on `date`.
    pub fn resolver(&self, date: NaiveDate, ip: &str) -> Option<&ResolverTag> {
        self.resolvers.get(&date)?.get(ip)
    }

    /// Tag for answer `ip` on `date`.
    pub fn answer(&self, date: NaiveDate, ip: &str) -> Option<&AnswerTag> {
        self.answers.get(&date)?.get(ip)
    }

    /// Merge tags onto resolution rows of the same date.
    ///
    /// Resolver tags fill the resolver name and a country the row does not
    /// have yet. Answer tags overwrite the answer fields they carry and leave
    /// the others alone. Probe rows are untouched.
    pub fn apply(&self, rows: &mut [Row]) {
        if self.is_empty() {
            return;
        }
        for row in rows.iter_mut() {
            let Row::Resolution(row) = row else {
                continue;
            };
            let date = row.common.date;
            if let Some(tag) = self.resolver(date, &row.common.ip) {
                if row.resolver_name.is_none() {
                    row.resolver_name.clone_from(&tag.name);
                }
                if row.common.metadata.country.is_none() {
                    row.common.metadata.country.clone_from(&tag.country);
                }
            }
            for answer in row.received.iter_mut() {
                if let Some(tag) = self.answer(date, &answer.ip) {
                    merge_answer(answer, tag);
                }
            }
        }
    }
}

fn merge_answer(answer: &mut ResolvedAnswer, tag: &AnswerTag) {
    if tag.http.is_some() {
        answer.http.clone_from(&tag.http);
    }
    if tag.cert.is_some() {
        answer.cert.clone_from(&tag.cert);
    }
    if tag.asname.is_some() {
        answer.asname.clone_from(&tag.asname);
    }
    if tag.asnum.is_some() {
        answer.asnum = tag.asnum;
    }
}

fn read_tag_file(path: &str) -> Result<Option<(NaiveDate, Vec<TagEntry>)>, PipelineError> {
    let Some(kind) = tag_kind(path) else {
        return Ok(None);
    };
    let Some(date) = date_from_path(path) else {
        warn!(path, "skipping tag file without a date stamp");
        return Ok(None);
    };
    let entries = read_lines(Path::new(path))?
        .iter()
        .filter_map(|line| match kind {
            TagKind::Resolver => parse_resolver_line(path, line),
            TagKind::Answer => parse_answer_line(path, line),
        })
        .collect();
    Ok(Some((date, entries)))
}

fn parse_resolver_line(path: &str, line: &str) -> Option<TagEntry> {
    let parsed: ResolverLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(path, error = %err, line, SKIP_TAG_LINE_MSG);
            return None;
        }
    };
    let Some(ip) = parsed.resolver.or(parsed.vp) else {
        warn!(path, line, SKIP_TAG_LINE_MSG);
        return None;
    };
    let country = parsed
        .country
        .filter(|country| is_country_code(country))
        .or_else(|| parsed.location.and_then(|location| location.country_code));
    Some(TagEntry::Resolver(
        ip,
        ResolverTag {
            name: parsed.name,
            country,
        },
    ))
}

fn parse_answer_line(path: &str, line: &str) -> Option<TagEntry> {
    match serde_json::from_str::<AnswerLine>(line) {
        Ok(parsed) => Some(TagEntry::Answer(parsed.ip, parsed.tag)),
        Err(err) => {
            warn!(path, error = %err, line, SKIP_TAG_LINE_MSG);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_files_are_recognised_by_name() {
        assert!(is_tag_file("satellite/CP_Satellite-2021-03-01-12-00-01/resolvers.json.gz"));
        assert!(is_tag_file("satellite/CP_Satellite-2021-03-01-12-00-01/tagged_answers.json"));
        assert!(!is_tag_file("satellite/CP_Satellite-2021-03-01-12-00-01/results.json"));
    }

    #[test]
    fn resolver_lines_prefer_a_country_code_over_the_location() {
        let Some(TagEntry::Resolver(ip, tag)) = parse_resolver_line(
            "p",
            r#"{"vp":"1.1.1.1","name":"one.one.one.one","country":"AU","location":{"country_code":"US"}}"#,
        ) else {
            panic!("expected a resolver tag");
        };
        assert_eq!(ip, "1.1.1.1");
        assert_eq!(tag.name.as_deref(), Some("one.one.one.one"));
        assert_eq!(tag.country.as_deref(), Some("AU"));

        let Some(TagEntry::Resolver(_, tag)) = parse_resolver_line(
            "p",
            r#"{"resolver":"8.8.8.8","country":"United States","location":{"country_code":"US"}}"#,
        ) else {
            panic!("expected a resolver tag");
        };
        assert_eq!(tag.country.as_deref(), Some("US"));
    }

    #[test]
    fn lines_without_an_ip_are_skipped() {
        assert!(parse_resolver_line("p", r#"{"name":"nobody"}"#).is_none());
        assert!(parse_answer_line("p", r#"{"http":"abc"}"#).is_none());
        assert!(parse_answer_line("p", "not json").is_none());
    }
}
