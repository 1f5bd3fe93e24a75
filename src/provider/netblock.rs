use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::Arc;

use tracing::warn;

use crate::constants::provider::SKIP_SNAPSHOT_LINE_MSG;
use crate::errors::LookupError;
use crate::metadata::MetadataRecord;
use crate::provider::ProviderHandle;

/// Longest-prefix-match table from CIDR netblocks to metadata.
#[derive(Clone, Debug, Default)]
pub struct NetblockTable {
    v4: BTreeMap<u8, HashMap<u32, MetadataRecord>>,
    v6: BTreeMap<u8, HashMap<u128, MetadataRecord>>,
    len: usize,
}

impl NetblockTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from JSON lines shaped like `MetadataRecord` with a `netblock`.
    ///
    /// Lines that fail to parse or lack a valid netblock are logged and skipped.
    pub fn from_json_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for line in lines {
            let line = line.as_ref();
            let parsed = serde_json::from_str::<MetadataRecord>(line)
                .map_err(|err| err.to_string())
                .and_then(|record| table.insert(record));
            if let Err(reason) = parsed {
                warn!(line, reason = %reason, SKIP_SNAPSHOT_LINE_MSG);
            }
        }
        table
    }

    /// Insert `record` under its `netblock`.
    pub fn insert(&mut self, record: MetadataRecord) -> Result<(), String> {
        let netblock = record
            .netblock
            .clone()
            .ok_or_else(|| "record has no netblock".to_string())?;
        let (address, prefix) = parse_cidr(&netblock)?;
        match address {
            IpAddr::V4(v4) => {
                let key = mask_v4(u32::from(v4), prefix);
                self.v4.entry(prefix).or_default().insert(key, record);
            }
            IpAddr::V6(v6) => {
                let key = mask_v6(u128::from(v6), prefix);
                self.v6.entry(prefix).or_default().insert(key, record);
            }
        }
        self.len += 1;
        Ok(())
    }

    /// Number of netblocks inserted.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no netblock has been inserted.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record of the most specific netblock covering `ip`.
    pub fn find(&self, ip: &str) -> Result<&MetadataRecord, LookupError> {
        let address: IpAddr = ip.parse().map_err(|_| LookupError::InvalidAddress {
            ip: ip.to_string(),
        })?;
        let found = match address {
            IpAddr::V4(v4) => {
                let bits = u32::from(v4);
                self.v4
                    .iter()
                    .rev()
                    .find_map(|(prefix, blocks)| blocks.get(&mask_v4(bits, *prefix)))
            }
            IpAddr::V6(v6) => {
                let bits = u128::from(v6);
                self.v6
                    .iter()
                    .rev()
                    .find_map(|(prefix, blocks)| blocks.get(&mask_v6(bits, *prefix)))
            }
        };
        found.ok_or_else(|| LookupError::NotFound { ip: ip.to_string() })
    }
}

impl ProviderHandle for NetblockTable {
    fn lookup(&self, ip: &str) -> Result<MetadataRecord, LookupError> {
        self.find(ip).cloned()
    }
}

impl ProviderHandle for Arc<NetblockTable> {
    fn lookup(&self, ip: &str) -> Result<MetadataRecord, LookupError> {
        self.find(ip).cloned()
    }
}

fn parse_cidr(netblock: &str) -> Result<(IpAddr, u8), String> {
    let (address, prefix) = netblock
        .split_once('/')
        .ok_or_else(|| format!("netblock '{netblock}' has no prefix length"))?;
    let address: IpAddr = address
        .parse()
        .map_err(|_| format!("netblock '{netblock}' has an invalid address"))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| format!("netblock '{netblock}' has an invalid prefix length"))?;
    let max = if address.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(format!("netblock '{netblock}' prefix exceeds {max}"));
    }
    Ok((address, prefix))
}

fn mask_v4(bits: u32, prefix: u8) -> u32 {
    bits & u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

fn mask_v6(bits: u128, prefix: u8) -> u128 {
    bits & u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(netblock: &str, asn: u32) -> MetadataRecord {
        MetadataRecord {
            netblock: Some(netblock.to_string()),
            asn: Some(asn),
            ..MetadataRecord::default()
        }
    }

    #[test]
    fn most_specific_netblock_wins() {
        let mut table = NetblockTable::new();
        table.insert(record("10.0.0.0/8", 1)).unwrap();
        table.insert(record("10.1.0.0/16", 2)).unwrap();
        table.insert(record("0.0.0.0/0", 3)).unwrap();
        assert_eq!(table.find("10.1.2.3").unwrap().asn, Some(2));
        assert_eq!(table.find("10.2.2.3").unwrap().asn, Some(1));
        assert_eq!(table.find("11.0.0.1").unwrap().asn, Some(3));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn ipv6_and_misses() {
        let mut table = NetblockTable::new();
        table.insert(record("2001:db8::/32", 64500)).unwrap();
        assert_eq!(table.find("2001:db8::1").unwrap().asn, Some(64500));
        assert!(matches!(table.find("2001:db9::1"), Err(LookupError::NotFound { .. })));
        assert!(matches!(table.find("1.2.3.4"), Err(LookupError::NotFound { .. })));
        assert!(matches!(table.find("not-an-ip"), Err(LookupError::InvalidAddress { .. })));
    }

    #[test]
    fn bad_lines_are_skipped() {
        let table = NetblockTable::from_json_lines([
            r#"{"netblock": "192.0.2.0/24", "country": "US"}"#,
            r#"{"country": "DE"}"#,
            r#"{"netblock": "192.0.2.0/40"}"#,
            "not json",
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.find("192.0.2.9").unwrap().country.as_deref(), Some("US"));
    }
}
