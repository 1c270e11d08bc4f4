use crate::config::StorageConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, ProvideCredentials};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Descriptive metadata stored alongside an uploaded document
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub application_id: String,
    pub doc_type: String,
    pub student_name: Option<String>,
    pub content_type: Option<String>,
}

/// Stable reference to an uploaded document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Storage-side identifier (object key)
    pub file_id: String,
    /// Viewable URL
    pub link: String,
}

/// External storage for uploaded documents
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        metadata: &FileMetadata,
    ) -> Result<StoredFile>;
}

/// S3 document store.
///
/// Uploads are capped by the API body limit, so every document goes up in a
/// single `PutObject`.
pub struct S3FileStore {
    client: S3Client,
    config: StorageConfig,
}

impl S3FileStore {
    /// Create a new S3 document store from the default AWS provider chain
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        Self::from_sdk_config(config, &aws_config).await
    }

    /// Create a store from a loaded SDK config; fails unless credentials resolve
    pub async fn from_sdk_config(config: &StorageConfig, aws_config: &SdkConfig) -> Result<Self> {
        aws_config
            .credentials_provider()
            .context("No AWS credentials provider configured")?
            .provide_credentials()
            .await
            .context("AWS credentials could not be resolved")?;

        let mut s3_config_builder = S3ConfigBuilder::from(aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            folder = %config.folder,
            "S3 document store initialized"
        );

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl FileStorage for S3FileStore {
    #[instrument(skip(self, bytes, metadata), fields(application_id = %metadata.application_id, doc_type = %metadata.doc_type))]
    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        metadata: &FileMetadata,
    ) -> Result<StoredFile> {
        let key = object_key(&self.config.folder, metadata, file_name, Utc::now(), Uuid::new_v4());
        let content_type = metadata
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for(file_name).to_string());
        let size_bytes = bytes.len();

        debug!(key = %key, size_bytes, "Uploading document to S3");

        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .metadata("application-id", &metadata.application_id)
            .metadata("doc-type", &metadata.doc_type);

        if let Some(ref name) = metadata.student_name {
            request = request.metadata("student-name", name);
        }

        request
            .send()
            .await
            .context("Failed to upload document to S3")?;

        info!(key = %key, size_bytes, "Document uploaded successfully");

        Ok(StoredFile {
            link: object_link(&self.config, &key),
            file_id: key,
        })
    }
}

/// Object key for an uploaded document
/// Format: {folder}/{application_id}/{doc_type}/{timestamp}_{upload_id}_{file_name}
pub fn object_key(
    folder: &str,
    metadata: &FileMetadata,
    file_name: &str,
    now: DateTime<Utc>,
    upload_id: Uuid,
) -> String {
    format!(
        "{folder}/{application_id}/{doc_type}/{timestamp}_{upload_id}_{file_name}",
        folder = folder.trim_matches('/'),
        application_id = sanitize_path_component(&metadata.application_id),
        doc_type = sanitize_path_component(&metadata.doc_type),
        timestamp = now.format("%Y%m%dT%H%M%S"),
        upload_id = upload_id.simple(),
        file_name = sanitize_file_name(file_name),
    )
}

/// Viewable URL for an object key
pub fn object_link(config: &StorageConfig, key: &str) -> String {
    if let Some(ref base) = config.public_base_url {
        return format!("{}/{}", base.trim_end_matches('/'), key);
    }
    match config.endpoint_url {
        Some(ref endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), config.bucket, key),
        None => format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            config.bucket, config.region, key
        ),
    }
}

/// Sanitize a path component to prevent path traversal
fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Like [`sanitize_path_component`] but keeps the extension dot
fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Content type from a file name's extension
fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::{Credentials, SharedCredentialsProvider};
    use chrono::TimeZone;

    fn storage_config() -> StorageConfig {
        serde_json::from_value(serde_json::json!({
            "bucket": "admissions-docs",
            "region": "ap-south-1"
        }))
        .unwrap()
    }

    fn metadata() -> FileMetadata {
        FileMetadata {
            application_id: "PPSU4821".to_string(),
            doc_type: "Photo".to_string(),
            student_name: Some("Asha Rao".to_string()),
            content_type: None,
        }
    }

    #[tokio::test]
    async fn test_store_requires_credentials_provider() {
        let aws_config = SdkConfig::builder()
            .region(aws_config::Region::new("ap-south-1"))
            .behavior_version(BehaviorVersion::latest())
            .build();

        let err = S3FileStore::from_sdk_config(&storage_config(), &aws_config)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("credentials"));
    }

    #[tokio::test]
    async fn test_store_builds_with_static_credentials() {
        let credentials = Credentials::new("AKIDTEST", "secret", None, None, "tests");
        let aws_config = SdkConfig::builder()
            .region(aws_config::Region::new("ap-south-1"))
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .build();

        let store = S3FileStore::from_sdk_config(&storage_config(), &aws_config)
            .await
            .unwrap();
        assert_eq!(store.config.bucket, "admissions-docs");
    }

    #[test]
    fn test_object_key_layout() {
        let upload_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 45).unwrap();

        let key = object_key("/admissions/", &metadata(), "my photo.JPG", now, upload_id);

        assert_eq!(
            key,
            "admissions/PPSU4821/Photo/20240601T093045_550e8400e29b41d4a716446655440000_my_photo.JPG"
        );
    }

    #[test]
    fn test_object_link_variants() {
        let mut config = storage_config();
        assert_eq!(
            object_link(&config, "admissions/a.pdf"),
            "https://admissions-docs.s3.ap-south-1.amazonaws.com/admissions/a.pdf"
        );

        config.endpoint_url = Some("http://localhost:9000/".to_string());
        assert_eq!(
            object_link(&config, "admissions/a.pdf"),
            "http://localhost:9000/admissions-docs/admissions/a.pdf"
        );

        config.public_base_url = Some("https://cdn.example.com".to_string());
        assert_eq!(
            object_link(&config, "admissions/a.pdf"),
            "https://cdn.example.com/admissions/a.pdf"
        );
    }

    #[test]
    fn test_sanitize_path_component() {
        assert_eq!(sanitize_path_component("PPSU4821"), "PPSU4821");
        assert_eq!(sanitize_path_component("../etc"), "___etc");
        assert_eq!(sanitize_path_component("Aadhaar Card"), "Aadhaar_Card");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("scan.pdf"), "scan.pdf");
        assert_eq!(sanitize_file_name("../../secret.pdf"), "secret.pdf");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\id card.png"), "id_card.png");
        assert_eq!(sanitize_file_name(".."), "document");
        assert_eq!(sanitize_file_name(""), "document");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("photo.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("PHOTO.JPG"), "image/jpeg");
        assert_eq!(content_type_for("marksheet.pdf"), "application/pdf");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
