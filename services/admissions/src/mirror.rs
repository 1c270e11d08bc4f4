//! Best-effort replication of admission records to the spreadsheet and of
//! documents to file storage.
//!
//! Mirror capabilities are resolved once at startup into [`SheetAccess`] and
//! [`FileAccess`]. A disabled capability is a normal configuration state.
//! Sheet mirroring never fails a request: its result is a [`MirrorOutcome`]
//! the caller may log or ignore.

use crate::config::{SheetsConfig, StorageConfig};
use crate::credentials::{self, ServiceAccountTokenSource, SPREADSHEETS_SCOPE};
use crate::error::AdmissionError;
use crate::file_store::{FileMetadata, FileStorage, S3FileStore, StoredFile};
use crate::record::AdmissionRecord;
use crate::sheet_mirror::{GoogleSheetsProjection, SheetProjection, UpsertAction};
use anyhow::Context;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Spreadsheet mirroring capability
#[derive(Clone)]
pub enum SheetAccess {
    Enabled(Arc<dyn SheetProjection>),
    Disabled { reason: String },
}

/// Document storage capability
#[derive(Clone)]
pub enum FileAccess {
    Enabled(Arc<dyn FileStorage>),
    Disabled { reason: String },
}

impl fmt::Debug for SheetAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetAccess::Enabled(_) => f.write_str("SheetAccess::Enabled"),
            SheetAccess::Disabled { reason } => write!(f, "SheetAccess::Disabled({reason})"),
        }
    }
}

impl fmt::Debug for FileAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileAccess::Enabled(_) => f.write_str("FileAccess::Enabled"),
            FileAccess::Disabled { reason } => write!(f, "FileAccess::Disabled({reason})"),
        }
    }
}

impl SheetAccess {
    pub fn disabled(reason: impl Into<String>) -> Self {
        SheetAccess::Disabled {
            reason: reason.into(),
        }
    }

    /// Resolve the sheet mirror from configuration and credentials
    pub fn from_config(config: Option<&SheetsConfig>) -> Self {
        let Some(config) = config else {
            return Self::disabled("no sheets configuration");
        };

        let Some((key, source)) = credentials::resolve_or_warn(config) else {
            return Self::disabled("no usable service-account credentials");
        };

        match Self::build(config, key) {
            Ok(projection) => {
                info!(
                    spreadsheet_id = %config.spreadsheet_id,
                    sheet = %config.sheet_name,
                    credentials = %source,
                    "Spreadsheet mirror enabled"
                );
                SheetAccess::Enabled(Arc::new(projection))
            }
            Err(e) => Self::disabled(format!("{e:#}")),
        }
    }

    fn build(
        config: &SheetsConfig,
        key: credentials::ServiceAccountKey,
    ) -> anyhow::Result<GoogleSheetsProjection> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        let tokens = ServiceAccountTokenSource::new(key, SPREADSHEETS_SCOPE, http.clone())?;

        GoogleSheetsProjection::new(config, http, Arc::new(tokens))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, SheetAccess::Enabled(_))
    }
}

impl FileAccess {
    pub fn disabled(reason: impl Into<String>) -> Self {
        FileAccess::Disabled {
            reason: reason.into(),
        }
    }

    /// Resolve document storage from configuration
    pub async fn from_config(config: Option<&StorageConfig>) -> Self {
        let Some(config) = config else {
            return Self::disabled("no storage configuration");
        };

        match S3FileStore::new(config).await {
            Ok(store) => FileAccess::Enabled(Arc::new(store)),
            Err(e) => Self::disabled(format!("{e:#}")),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, FileAccess::Enabled(_))
    }
}

/// Result of one best-effort mirror attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    Synced(UpsertAction),
    Skipped { reason: String },
    Failed { error: String },
}

impl MirrorOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, MirrorOutcome::Failed { .. })
    }

    /// Emit the outcome as a structured log event
    pub fn log(&self, application_id: &str) {
        match self {
            MirrorOutcome::Synced(action) => {
                debug!(application_id, action = ?action, "Record mirrored to sheet")
            }
            MirrorOutcome::Skipped { reason } => {
                debug!(application_id, reason = %reason, "Sheet mirror skipped")
            }
            MirrorOutcome::Failed { error } => {
                warn!(application_id, error = %error, "Sheet mirror failed; record store unaffected")
            }
        }
    }
}

/// A committed Record Store result plus what happened to its mirror
#[derive(Debug, Clone)]
pub struct Synced<T> {
    pub value: T,
    pub mirror: MirrorOutcome,
}

/// Subordinate replication to the spreadsheet and file storage
#[derive(Debug, Clone)]
pub struct MirrorSync {
    sheets: SheetAccess,
    files: FileAccess,
}

impl MirrorSync {
    pub fn new(sheets: SheetAccess, files: FileAccess) -> Self {
        if let SheetAccess::Disabled { ref reason } = sheets {
            warn!(reason = %reason, "Spreadsheet mirror disabled");
        }
        if let FileAccess::Disabled { ref reason } = files {
            warn!(reason = %reason, "Document storage disabled");
        }
        Self { sheets, files }
    }

    /// Both capabilities disabled
    pub fn disabled() -> Self {
        Self {
            sheets: SheetAccess::disabled("mirroring disabled"),
            files: FileAccess::disabled("storage disabled"),
        }
    }

    pub fn sheets(&self) -> &SheetAccess {
        &self.sheets
    }

    pub fn files(&self) -> &FileAccess {
        &self.files
    }

    /// Upsert the record's sheet row; never returns an error
    pub async fn mirror_record(&self, record: &AdmissionRecord) -> MirrorOutcome {
        let projection = match self.sheets {
            SheetAccess::Enabled(ref projection) => projection,
            SheetAccess::Disabled { ref reason } => {
                return MirrorOutcome::Skipped {
                    reason: reason.clone(),
                }
            }
        };

        match projection.upsert(record).await {
            Ok(action) => {
                metrics::counter!("admissions.mirror.synced").increment(1);
                MirrorOutcome::Synced(action)
            }
            Err(e) => {
                metrics::counter!("admissions.mirror.failed").increment(1);
                MirrorOutcome::Failed {
                    error: format!("{e:#}"),
                }
            }
        }
    }

    /// Upload a document; unlike sheet mirroring, failures are surfaced
    pub async fn store_file(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        metadata: &FileMetadata,
    ) -> Result<StoredFile, AdmissionError> {
        let storage = match self.files {
            FileAccess::Enabled(ref storage) => storage,
            FileAccess::Disabled { .. } => return Err(AdmissionError::StorageDisabled),
        };

        storage
            .upload_file(bytes, file_name, metadata)
            .await
            .map_err(AdmissionError::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Registration;
    use crate::sheet_mirror::MockSheetProjection;
    use chrono::Utc;

    fn record() -> AdmissionRecord {
        Registration {
            full_name: "Asha Rao".to_string(),
            dob: "2000-01-01".to_string(),
            mobile: "9000000001".to_string(),
            ..Default::default()
        }
        .into_record("PPSU4821".to_string(), Utc::now())
    }

    #[tokio::test]
    async fn test_disabled_sheets_are_skipped() {
        let mirror = MirrorSync::disabled();
        let outcome = mirror.mirror_record(&record()).await;
        assert!(matches!(outcome, MirrorOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_projection_failure_becomes_outcome() {
        let mut projection = MockSheetProjection::new();
        projection
            .expect_upsert()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("sheets unavailable")));

        let mirror = MirrorSync::new(
            SheetAccess::Enabled(Arc::new(projection)),
            FileAccess::disabled("test"),
        );
        let outcome = mirror.mirror_record(&record()).await;

        assert!(outcome.is_failed());
        assert_eq!(
            outcome,
            MirrorOutcome::Failed {
                error: "sheets unavailable".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_projection_success_reports_action() {
        let mut projection = MockSheetProjection::new();
        projection
            .expect_upsert()
            .withf(|r| r.application_id == "PPSU4821")
            .returning(|_| Ok(UpsertAction::Updated { row_index: 7 }));

        let mirror = MirrorSync::new(
            SheetAccess::Enabled(Arc::new(projection)),
            FileAccess::disabled("test"),
        );

        assert_eq!(
            mirror.mirror_record(&record()).await,
            MirrorOutcome::Synced(UpsertAction::Updated { row_index: 7 })
        );
    }

    #[tokio::test]
    async fn test_store_file_requires_enabled_storage() {
        let mirror = MirrorSync::disabled();
        let metadata = FileMetadata {
            application_id: "PPSU4821".to_string(),
            doc_type: "Photo".to_string(),
            student_name: None,
            content_type: None,
        };

        let err = mirror
            .store_file(vec![1, 2, 3], "photo.jpg", &metadata)
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::StorageDisabled));
    }

    #[test]
    fn test_missing_sheets_config_disables_mirror() {
        let access = SheetAccess::from_config(None);
        assert!(!access.is_enabled());
    }
}
