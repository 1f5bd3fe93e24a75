use chrono::NaiveDate;

use crate::errors::{LookupError, PipelineError};
use crate::metadata::MetadataRecord;
use crate::provider::{MetadataProviderFactory, ProviderHandle};

/// Combines a primary provider with an organization table.
///
/// The primary provider decides whether an IP has metadata at all. The
/// organization name is only attached when the organization table reports
/// the same AS number as the primary record, since the two sources can
/// disagree about who announces a netblock.
pub struct OrganizationChooser<P, O> {
    primary: P,
    organizations: O,
}

impl<P, O> OrganizationChooser<P, O>
where
    P: MetadataProviderFactory,
    O: MetadataProviderFactory,
{
    /// Chooser over `primary`, enriched from `organizations`.
    pub fn new(primary: P, organizations: O) -> Self {
        Self {
            primary,
            organizations,
        }
    }
}

impl<P, O> MetadataProviderFactory for OrganizationChooser<P, O>
where
    P: MetadataProviderFactory,
    O: MetadataProviderFactory,
{
    fn for_date(&self, date: NaiveDate) -> Result<Box<dyn ProviderHandle>, PipelineError> {
        Ok(Box::new(ChooserHandle {
            primary: self.primary.for_date(date)?,
            organizations: self.organizations.for_date(date)?,
        }))
    }
}

struct ChooserHandle {
    primary: Box<dyn ProviderHandle>,
    organizations: Box<dyn ProviderHandle>,
}

impl ProviderHandle for ChooserHandle {
    fn lookup(&self, ip: &str) -> Result<MetadataRecord, LookupError> {
        let mut record = self.primary.lookup(ip)?;
        if let Ok(organization) = self.organizations.lookup(ip)
            && organization.organization.is_some()
            && organization.asn.is_some()
            && organization.asn == record.asn
        {
            record.organization = organization.organization;
        }
        Ok(record)
    }
}
