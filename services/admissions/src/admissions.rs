use crate::error::AdmissionError;
use crate::file_store::{FileMetadata, StoredFile};
use crate::mirror::{MirrorSync, Synced};
use crate::record::{AdmissionRecord, ApplicationIdGenerator, ApplicationPatch, Registration};
use crate::record_store::RecordStore;
use std::sync::Arc;
use tracing::{info, instrument};

/// A document received from the upload form
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub application_id: String,
    pub doc_type: String,
    pub student_name: Option<String>,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Result of a document upload
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub file: StoredFile,
    /// Set when the document was a profile photo attached to the record
    pub photo: Option<Synced<AdmissionRecord>>,
}

/// True for document types that become the record's profile photo
pub fn is_profile_photo(doc_type: &str) -> bool {
    let normalized: String = doc_type
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    matches!(normalized.as_str(), "photo" | "profilephoto")
}

/// Admission workflow: every write commits to the record store first and
/// only then mirrors, so mirror trouble can never undo a committed write.
pub struct AdmissionsService {
    store: Arc<dyn RecordStore>,
    mirror: MirrorSync,
    ids: ApplicationIdGenerator,
}

impl AdmissionsService {
    pub fn new(store: Arc<dyn RecordStore>, mirror: MirrorSync, ids: ApplicationIdGenerator) -> Self {
        Self { store, mirror, ids }
    }

    pub fn mirror(&self) -> &MirrorSync {
        &self.mirror
    }

    #[instrument(skip(self, registration))]
    pub async fn register(
        &self,
        registration: Registration,
    ) -> Result<Synced<AdmissionRecord>, AdmissionError> {
        let record = self.store.create(registration, &self.ids).await?;

        metrics::counter!("admissions.registrations").increment(1);
        info!(application_id = %record.application_id, "Student registered");

        Ok(self.mirrored(record).await)
    }

    /// Look up a student by mobile and date of birth
    #[instrument(skip(self, mobile, dob))]
    pub async fn login(&self, mobile: &str, dob: &str) -> Result<AdmissionRecord, AdmissionError> {
        match self.store.authenticate(mobile, dob).await {
            Ok(record) => {
                metrics::counter!("admissions.logins").increment(1);
                Ok(record)
            }
            Err(AdmissionError::NotFound) => Err(AdmissionError::InvalidCredentials),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, patch))]
    pub async fn update_application(
        &self,
        application_id: &str,
        patch: &ApplicationPatch,
    ) -> Result<Synced<AdmissionRecord>, AdmissionError> {
        let record = self.store.update(application_id, patch).await?;

        metrics::counter!("admissions.updates").increment(1);
        info!(application_id = %record.application_id, "Application updated");

        Ok(self.mirrored(record).await)
    }

    #[instrument(skip(self, upload), fields(application_id = %upload.application_id, doc_type = %upload.doc_type))]
    pub async fn upload_document(
        &self,
        upload: DocumentUpload,
    ) -> Result<UploadReceipt, AdmissionError> {
        if upload.application_id.trim().is_empty() {
            return Err(AdmissionError::MissingField("applicationId"));
        }

        let existing = self
            .store
            .get(&upload.application_id)
            .await?
            .ok_or(AdmissionError::NotFound)?;

        let metadata = FileMetadata {
            application_id: upload.application_id.clone(),
            doc_type: upload.doc_type.clone(),
            student_name: upload.student_name.or(Some(existing.full_name)),
            content_type: upload.content_type,
        };

        let file = self
            .mirror
            .store_file(upload.bytes, &upload.file_name, &metadata)
            .await?;

        metrics::counter!("admissions.uploads").increment(1);
        info!(file_id = %file.file_id, "Document stored");

        let photo = if is_profile_photo(&upload.doc_type) {
            let record = self
                .store
                .attach_photo(&upload.application_id, &file.link)
                .await?;
            Some(self.mirrored(record).await)
        } else {
            None
        };

        Ok(UploadReceipt { file, photo })
    }

    /// Database readiness
    pub async fn ready(&self) -> Result<(), AdmissionError> {
        self.store.ping().await
    }

    async fn mirrored(&self, record: AdmissionRecord) -> Synced<AdmissionRecord> {
        let mirror = self.mirror.mirror_record(&record).await;
        mirror.log(&record.application_id);
        Synced {
            value: record,
            mirror,
        }
    }
}
