//! Admissions Intake Service
//!
//! Backend for the student admission form. Registrations, logins, application
//! updates and document uploads are served over HTTP; PostgreSQL holds the
//! authoritative admission records.
//!
//! ## Features
//!
//! - **Record Store**: PostgreSQL-backed admission records with unique
//!   application identifiers and mobile numbers
//! - **Spreadsheet Mirror**: best-effort projection of each record into a
//!   Google Sheet, keyed by application identifier
//! - **Document Storage**: uploads to S3 with viewable links; profile photos
//!   are attached to the record
//!
//! ## Architecture
//!
//! ```text
//!  Browser form                 PostgreSQL
//! ┌──────────────┐             ┌──────────────┐
//! │ /api/register│             │ students     │
//! │ /api/login   │──────┐      └──────────────┘
//! │ /api/update- │      │             ▲
//! │  application │      ▼             │ 1. mandatory
//! │ /api/upload  │  ┌──────────────┐  │
//! └──────────────┘  │ Admissions   │──┘
//!                   │ Service      │
//!                   └──────────────┘
//!                          │ 2. best-effort
//!                          ▼
//!                   ┌──────────────┐      ┌──────────────┐
//!                   │ Mirror Sync  │─────▶│ Google Sheet │
//!                   │              │      └──────────────┘
//!                   │              │      ┌──────────────┐
//!                   │              │─────▶│ S3 documents │
//!                   └──────────────┘      └──────────────┘
//! ```

pub mod admissions;
pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod file_store;
pub mod mirror;
pub mod record;
pub mod record_store;
pub mod sheet_mirror;

pub use admissions::{AdmissionsService, DocumentUpload, UploadReceipt};
pub use api::{create_router, AppState};
pub use config::Config;
pub use error::AdmissionError;
pub use file_store::{FileMetadata, FileStorage, S3FileStore, StoredFile};
pub use mirror::{FileAccess, MirrorOutcome, MirrorSync, SheetAccess, Synced};
pub use record::{AdmissionRecord, ApplicationIdGenerator, ApplicationPatch, FeeStatus, Registration};
pub use record_store::{MemoryRecordStore, PgRecordStore, RecordStore};
pub use sheet_mirror::{GoogleSheetsProjection, SheetProjection, SheetRow, UpsertAction};
