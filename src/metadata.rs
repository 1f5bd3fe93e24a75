use serde::{Deserialize, Serialize};

use crate::types::CountryCode;

/// Point-in-time network metadata for one IP.
///
/// Every field is optional: an unset field means the provider knows nothing
/// about it, which is distinct from the lookup itself failing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Covering netblock in CIDR form (e.g. `1.1.1.0/24`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netblock: Option<String>,
    /// Autonomous system number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<u32>,
    /// Short AS name (e.g. `CLOUDFLARENET`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_name: Option<String>,
    /// Registered AS organisation name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_full_name: Option<String>,
    /// AS classification (e.g. `Content`, `Transit/Access`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_type: Option<String>,
    /// Two-letter country code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<CountryCode>,
    /// Organisation operating the IP, when a secondary source agrees on the AS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

impl MetadataRecord {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Copy every set field of `other` over this record, leaving the rest untouched.
    pub fn merge_from(&mut self, other: &MetadataRecord) {
        fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        take(&mut self.netblock, &other.netblock);
        take(&mut self.asn, &other.asn);
        take(&mut self.as_name, &other.as_name);
        take(&mut self.as_full_name, &other.as_full_name);
        take(&mut self.as_type, &other.as_type);
        take(&mut self.country, &other.country);
        take(&mut self.organization, &other.organization);
    }
}
