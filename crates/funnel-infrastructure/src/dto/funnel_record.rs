//! Local funnel record DTOs and migrations.
//!
//! One record per funnel, fully overwritten on every write.

use chrono::{DateTime, Utc};
use funnel_core::error::Result;
use funnel_core::funnel::Funnel;
use serde::{Deserialize, Serialize};
use version_migrate::{IntoDomain, Migrator, Versioned};

/// Funnel record V1.0.0.
///
/// Stored the document under `funnel` together with the time of the write.
#[derive(Debug, Clone, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
#[serde(rename_all = "camelCase")]
pub struct FunnelRecordV1_0_0 {
    pub funnel: Funnel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

/// Funnel record V1.1.0.
///
/// Keyed by `funnelId`; the write time lives in the document's `lastModified`.
#[derive(Debug, Clone, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.1.0")]
#[serde(rename_all = "camelCase")]
pub struct FunnelRecordV1_1_0 {
    pub funnel_id: String,
    pub document: Funnel,
}

pub type FunnelRecordDTO = FunnelRecordV1_1_0;

impl version_migrate::MigratesTo<FunnelRecordV1_1_0> for FunnelRecordV1_0_0 {
    fn migrate(self) -> FunnelRecordV1_1_0 {
        let mut document = self.funnel;
        if let Some(saved_at) = self.saved_at {
            document.last_modified = document.last_modified.max(saved_at);
        }
        FunnelRecordV1_1_0 {
            funnel_id: document.id.clone(),
            document,
        }
    }
}

impl IntoDomain<Funnel> for FunnelRecordV1_1_0 {
    fn into_domain(self) -> Funnel {
        let mut funnel = self.document;
        funnel.id = self.funnel_id;
        funnel
    }
}

impl version_migrate::FromDomain<Funnel> for FunnelRecordV1_1_0 {
    fn from_domain(funnel: Funnel) -> Self {
        FunnelRecordV1_1_0 {
            funnel_id: funnel.id.clone(),
            document: funnel,
        }
    }
}

/// Creates the migrator for local funnel records.
///
/// # Migration Path
///
/// - V1.0.0 → V1.1.0: `funnel` becomes `document`, keyed by `funnelId`
/// - V1.1.0 → Funnel
pub fn create_funnel_record_migrator() -> Result<Migrator> {
    let mut migrator = Migrator::builder().build();

    let path = Migrator::define("funnel_record")
        .from::<FunnelRecordV1_0_0>()
        .step::<FunnelRecordV1_1_0>()
        .into_with_save::<Funnel>();

    migrator.register(path)?;
    Ok(migrator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::funnel::default_funnel;

    #[test]
    fn test_v1_0_record_migrates_to_domain() {
        let migrator = create_funnel_record_migrator().unwrap();
        let funnel = default_funnel("Legacy");
        let value = serde_json::json!({
            "version": "1.0.0",
            "funnel": funnel,
        });

        let loaded: Funnel = migrator.load_flat_from("funnel_record", value).unwrap();

        assert_eq!(loaded, funnel);
    }

    #[test]
    fn test_save_writes_latest_schema() {
        let migrator = create_funnel_record_migrator().unwrap();
        let funnel = default_funnel("Current");

        let json = migrator
            .save_domain_flat("funnel_record", funnel.clone())
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["version"], "1.1.0");
        assert_eq!(value["funnelId"], funnel.id.as_str());
        assert_eq!(value["document"]["name"], "Current");
    }
}
