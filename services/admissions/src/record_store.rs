use crate::config::DatabaseConfig;
use crate::error::AdmissionError;
use crate::record::{
    AdmissionRecord, ApplicationIdGenerator, ApplicationPatch, FeeStatus, Registration,
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// How many fresh identifiers `create` tries before giving up
const MAX_ID_ATTEMPTS: usize = 8;

const MOBILE_UNIQUE: &str = "students_mobile_key";
const APPLICATION_ID_UNIQUE: &str = "students_application_id_key";

const STUDENT_COLUMNS: &str = "application_id, full_name, aadhaar, dob, course, mobile, \
     referral, submitted_at, email, address, city, state, pincode, reg_fee_status, \
     app_fee_status, hostel, mess_fee_status, photo_url";

/// Authoritative storage for admission records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a fully-formed record.
    ///
    /// Fails with `DuplicateMobile` or `ApplicationIdTaken` without writing.
    async fn insert(&self, record: &AdmissionRecord) -> Result<(), AdmissionError>;

    /// Exact match on mobile number and date of birth
    async fn find_by_credentials(
        &self,
        mobile: &str,
        dob: &str,
    ) -> Result<Option<AdmissionRecord>, AdmissionError>;

    async fn get(&self, application_id: &str) -> Result<Option<AdmissionRecord>, AdmissionError>;

    /// Merge `patch` into the record; `NotFound` leaves every record untouched
    async fn update(
        &self,
        application_id: &str,
        patch: &ApplicationPatch,
    ) -> Result<AdmissionRecord, AdmissionError>;

    async fn attach_photo(
        &self,
        application_id: &str,
        photo_url: &str,
    ) -> Result<AdmissionRecord, AdmissionError>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<(), AdmissionError>;

    /// Register a new student, generating its application identifier
    async fn create(
        &self,
        registration: Registration,
        ids: &ApplicationIdGenerator,
    ) -> Result<AdmissionRecord, AdmissionError> {
        let submitted_at = Utc::now();

        for _ in 0..MAX_ID_ATTEMPTS {
            let record = registration.clone().into_record(ids.generate(), submitted_at);
            match self.insert(&record).await {
                Ok(()) => return Ok(record),
                Err(AdmissionError::ApplicationIdTaken(id)) => {
                    warn!(application_id = %id, "Generated application id collided, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AdmissionError::Persistence(anyhow!(
            "no free application identifier after {MAX_ID_ATTEMPTS} attempts"
        )))
    }

    /// Look up a student for login; only paid admission fees may log in
    async fn authenticate(
        &self,
        mobile: &str,
        dob: &str,
    ) -> Result<AdmissionRecord, AdmissionError> {
        let record = self
            .find_by_credentials(mobile, dob)
            .await?
            .ok_or(AdmissionError::NotFound)?;

        if record.reg_fee_status != FeeStatus::Paid {
            return Err(AdmissionError::FeePending);
        }

        Ok(record)
    }
}

/// Row shape of the `students` table
#[derive(Debug, FromRow)]
struct StudentRow {
    application_id: String,
    full_name: String,
    aadhaar: String,
    dob: String,
    course: String,
    mobile: String,
    referral: Option<String>,
    submitted_at: DateTime<Utc>,
    email: Option<String>,
    address: Option<String>,
    city: Option<String>,
    state: Option<String>,
    pincode: Option<String>,
    reg_fee_status: String,
    app_fee_status: String,
    hostel: String,
    mess_fee_status: String,
    photo_url: Option<String>,
}

impl TryFrom<StudentRow> for AdmissionRecord {
    type Error = AdmissionError;

    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        let status = |value: &str| {
            value
                .parse::<FeeStatus>()
                .map_err(|e| AdmissionError::Persistence(anyhow!(e)))
        };

        Ok(Self {
            reg_fee_status: status(&row.reg_fee_status)?,
            app_fee_status: status(&row.app_fee_status)?,
            mess_fee_status: status(&row.mess_fee_status)?,
            application_id: row.application_id,
            full_name: row.full_name,
            aadhaar: row.aadhaar,
            dob: row.dob,
            course: row.course,
            mobile: row.mobile,
            referral: row.referral,
            date: row.submitted_at,
            email: row.email,
            address: row.address,
            city: row.city,
            state: row.state,
            pincode: row.pincode,
            hostel: row.hostel,
            photo_url: row.photo_url,
        })
    }
}

/// Map unique-index violations onto domain errors
fn classify_write_error(
    err: sqlx::Error,
    application_id: &str,
    context: &'static str,
) -> AdmissionError {
    if let sqlx::Error::Database(ref db_err) = err {
        match db_err.constraint() {
            Some(MOBILE_UNIQUE) => return AdmissionError::DuplicateMobile,
            Some(APPLICATION_ID_UNIQUE) => {
                return AdmissionError::ApplicationIdTaken(application_id.to_string())
            }
            _ => {}
        }
    }
    AdmissionError::persistence(context)(err)
}

/// PostgreSQL-backed record store
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Create a new record store with connection pool
    pub async fn new(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip(self, record), fields(application_id = %record.application_id))]
    async fn insert(&self, record: &AdmissionRecord) -> Result<(), AdmissionError> {
        sqlx::query(
            r#"
            INSERT INTO students (
                id, application_id, full_name, aadhaar, dob,
                course, mobile, referral, submitted_at, email,
                address, city, state, pincode, reg_fee_status,
                app_fee_status, hostel, mess_fee_status, photo_url
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15,
                $16, $17, $18, $19
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.application_id)
        .bind(&record.full_name)
        .bind(&record.aadhaar)
        .bind(&record.dob)
        .bind(&record.course)
        .bind(&record.mobile)
        .bind(&record.referral)
        .bind(record.date)
        .bind(&record.email)
        .bind(&record.address)
        .bind(&record.city)
        .bind(&record.state)
        .bind(&record.pincode)
        .bind(record.reg_fee_status.as_str())
        .bind(record.app_fee_status.as_str())
        .bind(&record.hostel)
        .bind(record.mess_fee_status.as_str())
        .bind(&record.photo_url)
        .execute(&self.pool)
        .await
        .map_err(|e| classify_write_error(e, &record.application_id, "Failed to insert student"))?;

        debug!("Student record inserted");
        Ok(())
    }

    async fn find_by_credentials(
        &self,
        mobile: &str,
        dob: &str,
    ) -> Result<Option<AdmissionRecord>, AdmissionError> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE mobile = $1 AND dob = $2");

        sqlx::query_as::<_, StudentRow>(&sql)
            .bind(mobile)
            .bind(dob)
            .fetch_optional(&self.pool)
            .await
            .map_err(AdmissionError::persistence("Failed to query student by credentials"))?
            .map(AdmissionRecord::try_from)
            .transpose()
    }

    async fn get(&self, application_id: &str) -> Result<Option<AdmissionRecord>, AdmissionError> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE application_id = $1");

        sqlx::query_as::<_, StudentRow>(&sql)
            .bind(application_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AdmissionError::persistence("Failed to query student"))?
            .map(AdmissionRecord::try_from)
            .transpose()
    }

    #[instrument(skip(self, patch))]
    async fn update(
        &self,
        application_id: &str,
        patch: &ApplicationPatch,
    ) -> Result<AdmissionRecord, AdmissionError> {
        let sql = format!(
            r#"
            UPDATE students SET
                full_name = COALESCE($2, full_name),
                aadhaar = COALESCE($3, aadhaar),
                dob = COALESCE($4, dob),
                course = COALESCE($5, course),
                mobile = COALESCE($6, mobile),
                referral = COALESCE($7, referral),
                email = COALESCE($8, email),
                address = COALESCE($9, address),
                city = COALESCE($10, city),
                state = COALESCE($11, state),
                pincode = COALESCE($12, pincode),
                reg_fee_status = COALESCE($13, reg_fee_status),
                app_fee_status = COALESCE($14, app_fee_status),
                hostel = COALESCE($15, hostel),
                mess_fee_status = COALESCE($16, mess_fee_status),
                photo_url = COALESCE($17, photo_url),
                updated_at = NOW()
            WHERE application_id = $1
            RETURNING {STUDENT_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, StudentRow>(&sql)
            .bind(application_id)
            .bind(&patch.full_name)
            .bind(&patch.aadhaar)
            .bind(&patch.dob)
            .bind(&patch.course)
            .bind(&patch.mobile)
            .bind(&patch.referral)
            .bind(&patch.email)
            .bind(&patch.address)
            .bind(&patch.city)
            .bind(&patch.state)
            .bind(&patch.pincode)
            .bind(patch.reg_fee_status.map(|s| s.as_str()))
            .bind(patch.app_fee_status.map(|s| s.as_str()))
            .bind(&patch.hostel)
            .bind(patch.mess_fee_status.map(|s| s.as_str()))
            .bind(&patch.photo_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, application_id, "Failed to update student"))?;

        row.ok_or(AdmissionError::NotFound)?.try_into()
    }

    #[instrument(skip(self))]
    async fn attach_photo(
        &self,
        application_id: &str,
        photo_url: &str,
    ) -> Result<AdmissionRecord, AdmissionError> {
        let sql = format!(
            "UPDATE students SET photo_url = $2, updated_at = NOW() \
             WHERE application_id = $1 RETURNING {STUDENT_COLUMNS}"
        );

        let row = sqlx::query_as::<_, StudentRow>(&sql)
            .bind(application_id)
            .bind(photo_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(AdmissionError::persistence("Failed to attach photo"))?;

        row.ok_or(AdmissionError::NotFound)?.try_into()
    }

    async fn ping(&self) -> Result<(), AdmissionError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(AdmissionError::persistence("Database ping failed"))?;
        Ok(())
    }
}

/// In-process record store keyed by application identifier
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, AdmissionRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &AdmissionRecord) -> Result<(), AdmissionError> {
        let mut records = self.records.write().await;

        if records.values().any(|r| r.mobile == record.mobile) {
            return Err(AdmissionError::DuplicateMobile);
        }
        if records.contains_key(&record.application_id) {
            return Err(AdmissionError::ApplicationIdTaken(
                record.application_id.clone(),
            ));
        }

        records.insert(record.application_id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_credentials(
        &self,
        mobile: &str,
        dob: &str,
    ) -> Result<Option<AdmissionRecord>, AdmissionError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| r.mobile == mobile && r.dob == dob)
            .cloned())
    }

    async fn get(&self, application_id: &str) -> Result<Option<AdmissionRecord>, AdmissionError> {
        Ok(self.records.read().await.get(application_id).cloned())
    }

    async fn update(
        &self,
        application_id: &str,
        patch: &ApplicationPatch,
    ) -> Result<AdmissionRecord, AdmissionError> {
        let mut records = self.records.write().await;

        let mut updated = records
            .get(application_id)
            .cloned()
            .ok_or(AdmissionError::NotFound)?;

        if let Some(ref mobile) = patch.mobile {
            let taken = records
                .values()
                .any(|r| r.application_id != application_id && &r.mobile == mobile);
            if taken {
                return Err(AdmissionError::DuplicateMobile);
            }
        }

        patch.apply(&mut updated);
        records.insert(application_id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn attach_photo(
        &self,
        application_id: &str,
        photo_url: &str,
    ) -> Result<AdmissionRecord, AdmissionError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(application_id)
            .ok_or(AdmissionError::NotFound)?;

        record.photo_url = Some(photo_url.to_string());
        Ok(record.clone())
    }

    async fn ping(&self) -> Result<(), AdmissionError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registration(mobile: &str) -> Registration {
        Registration {
            full_name: "Asha Rao".to_string(),
            aadhaar: "123412341234".to_string(),
            dob: "2000-01-01".to_string(),
            course: "B.Tech".to_string(),
            mobile: mobile.to_string(),
            email: Some("asha@example.com".to_string()),
            city: Some("Surat".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_generates_prefixed_id() {
        let store = MemoryRecordStore::new();
        let ids = ApplicationIdGenerator::default();

        let record = store.create(registration("9000000001"), &ids).await.unwrap();

        assert!(ids.matches(&record.application_id));
        assert_eq!(record.reg_fee_status, FeeStatus::Pending);
        assert_eq!(record.hostel, "Not Booked");
        assert_eq!(store.get(&record.application_id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_mobile_without_writing() {
        let store = MemoryRecordStore::new();
        let ids = ApplicationIdGenerator::default();
        store.create(registration("9000000001"), &ids).await.unwrap();

        let mut again = registration("9000000001");
        again.full_name = "Someone Else".to_string();
        let err = store.create(again, &ids).await.unwrap_err();

        assert!(matches!(err, AdmissionError::DuplicateMobile));
        let stored = store.find_by_credentials("9000000001", "2000-01-01").await.unwrap();
        assert_eq!(stored.unwrap().full_name, "Asha Rao");
    }

    #[tokio::test]
    async fn test_authenticate_is_gated_on_admission_fee() {
        let store = MemoryRecordStore::new();
        let ids = ApplicationIdGenerator::default();
        let record = store.create(registration("9000000001"), &ids).await.unwrap();

        let err = store.authenticate("9000000001", "2000-01-01").await.unwrap_err();
        assert!(matches!(err, AdmissionError::FeePending));

        let patch = ApplicationPatch {
            reg_fee_status: Some(FeeStatus::Paid),
            ..Default::default()
        };
        store.update(&record.application_id, &patch).await.unwrap();

        let student = store.authenticate("9000000001", "2000-01-01").await.unwrap();
        assert_eq!(student.reg_fee_status, FeeStatus::Paid);
        assert_eq!(student.full_name, "Asha Rao");
        assert_eq!(student.application_id, record.application_id);
    }

    #[tokio::test]
    async fn test_authenticate_requires_exact_dob() {
        let store = MemoryRecordStore::new();
        let ids = ApplicationIdGenerator::default();
        store.create(registration("9000000001"), &ids).await.unwrap();

        let err = store.authenticate("9000000001", "2000-01-02").await.unwrap_err();
        assert!(matches!(err, AdmissionError::NotFound));
    }

    #[tokio::test]
    async fn test_update_unknown_id_changes_nothing() {
        let store = MemoryRecordStore::new();
        let ids = ApplicationIdGenerator::default();
        let record = store.create(registration("9000000001"), &ids).await.unwrap();

        let patch = ApplicationPatch {
            email: Some("x@example.com".to_string()),
            ..Default::default()
        };
        let err = store.update("PPSU0000", &patch).await.unwrap_err();

        assert!(matches!(err, AdmissionError::NotFound));
        assert_eq!(store.get(&record.application_id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_update_merges_only_supplied_fields() {
        let store = MemoryRecordStore::new();
        let ids = ApplicationIdGenerator::default();
        let before = store.create(registration("9000000001"), &ids).await.unwrap();

        let patch = ApplicationPatch {
            email: Some("new@example.com".to_string()),
            ..Default::default()
        };
        let after = store.update(&before.application_id, &patch).await.unwrap();

        assert_eq!(after.email.as_deref(), Some("new@example.com"));
        let mut expected = before.clone();
        expected.email = Some("new@example.com".to_string());
        assert_eq!(after, expected);
    }

    #[tokio::test]
    async fn test_update_rejects_mobile_taken_by_another_record() {
        let store = MemoryRecordStore::new();
        let ids = ApplicationIdGenerator::default();
        store.create(registration("9000000001"), &ids).await.unwrap();
        let second = store.create(registration("9000000002"), &ids).await.unwrap();

        let patch = ApplicationPatch {
            mobile: Some("9000000001".to_string()),
            ..Default::default()
        };
        let err = store.update(&second.application_id, &patch).await.unwrap_err();
        assert!(matches!(err, AdmissionError::DuplicateMobile));

        // Re-submitting one's own mobile is fine
        let patch = ApplicationPatch {
            mobile: Some("9000000002".to_string()),
            ..Default::default()
        };
        store.update(&second.application_id, &patch).await.unwrap();
    }

    #[tokio::test]
    async fn test_attach_photo_by_application_id() {
        let store = MemoryRecordStore::new();
        let ids = ApplicationIdGenerator::default();
        let first = store.create(registration("9000000001"), &ids).await.unwrap();
        let second = store.create(registration("9000000002"), &ids).await.unwrap();

        let updated = store
            .attach_photo(&second.application_id, "https://cdn.example.com/p.jpg")
            .await
            .unwrap();

        assert_eq!(updated.photo_url.as_deref(), Some("https://cdn.example.com/p.jpg"));
        // Same name, different record: untouched
        let first_now = store.get(&first.application_id).await.unwrap().unwrap();
        assert_eq!(first_now.photo_url, None);

        let err = store.attach_photo("PPSU0000", "x").await.unwrap_err();
        assert!(matches!(err, AdmissionError::NotFound));
    }

    /// Reports a taken identifier for the first `collisions` inserts
    struct CollidingStore {
        inner: MemoryRecordStore,
        collisions: AtomicUsize,
    }

    #[async_trait]
    impl RecordStore for CollidingStore {
        async fn insert(&self, record: &AdmissionRecord) -> Result<(), AdmissionError> {
            let remaining = self.collisions.load(Ordering::SeqCst);
            if remaining > 0 {
                self.collisions.store(remaining - 1, Ordering::SeqCst);
                return Err(AdmissionError::ApplicationIdTaken(
                    record.application_id.clone(),
                ));
            }
            self.inner.insert(record).await
        }

        async fn find_by_credentials(
            &self,
            mobile: &str,
            dob: &str,
        ) -> Result<Option<AdmissionRecord>, AdmissionError> {
            self.inner.find_by_credentials(mobile, dob).await
        }

        async fn get(&self, id: &str) -> Result<Option<AdmissionRecord>, AdmissionError> {
            self.inner.get(id).await
        }

        async fn update(
            &self,
            id: &str,
            patch: &ApplicationPatch,
        ) -> Result<AdmissionRecord, AdmissionError> {
            self.inner.update(id, patch).await
        }

        async fn attach_photo(
            &self,
            id: &str,
            url: &str,
        ) -> Result<AdmissionRecord, AdmissionError> {
            self.inner.attach_photo(id, url).await
        }

        async fn ping(&self) -> Result<(), AdmissionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_retries_identifier_collisions() {
        let store = CollidingStore {
            inner: MemoryRecordStore::new(),
            collisions: AtomicUsize::new(3),
        };
        let ids = ApplicationIdGenerator::default();

        let record = store.create(registration("9000000001"), &ids).await.unwrap();
        assert!(ids.matches(&record.application_id));

        let exhausted = CollidingStore {
            inner: MemoryRecordStore::new(),
            collisions: AtomicUsize::new(MAX_ID_ATTEMPTS),
        };
        let err = exhausted.create(registration("9000000001"), &ids).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Persistence(_)));
        let stored = exhausted
            .inner
            .find_by_credentials("9000000001", "2000-01-01")
            .await
            .unwrap();
        assert!(stored.is_none());
    }

    /// Run against a scratch database: `DATABASE_URL=... cargo test -- --ignored`
    mod postgres {
        use super::*;

        fn store(pool: PgPool) -> PgRecordStore {
            PgRecordStore::from_pool(pool)
        }

        #[sqlx::test(migrations = "./migrations")]
        #[ignore = "requires PostgreSQL via DATABASE_URL"]
        async fn test_pg_create_rejects_duplicate_mobile(pool: PgPool) {
            let store = store(pool);
            let ids = ApplicationIdGenerator::default();
            let record = store.create(registration("9000000001"), &ids).await.unwrap();
            assert!(ids.matches(&record.application_id));

            let mut again = registration("9000000001");
            again.full_name = "Someone Else".to_string();
            let err = store.create(again, &ids).await.unwrap_err();

            assert!(matches!(err, AdmissionError::DuplicateMobile));
            let stored = store
                .find_by_credentials("9000000001", "2000-01-01")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.full_name, "Asha Rao");
            assert_eq!(stored.application_id, record.application_id);
        }

        #[sqlx::test(migrations = "./migrations")]
        #[ignore = "requires PostgreSQL via DATABASE_URL"]
        async fn test_pg_taken_application_id_is_reported(pool: PgPool) {
            let store = store(pool);
            let first = registration("9000000001").into_record("PPSU4821".to_string(), Utc::now());
            store.insert(&first).await.unwrap();

            let second = registration("9000000002").into_record("PPSU4821".to_string(), Utc::now());
            let err = store.insert(&second).await.unwrap_err();

            assert!(matches!(err, AdmissionError::ApplicationIdTaken(ref id) if id == "PPSU4821"));
        }

        #[sqlx::test(migrations = "./migrations")]
        #[ignore = "requires PostgreSQL via DATABASE_URL"]
        async fn test_pg_update_changes_only_email(pool: PgPool) {
            let store = store(pool);
            let ids = ApplicationIdGenerator::default();
            let id = store
                .create(registration("9000000001"), &ids)
                .await
                .unwrap()
                .application_id;
            let before = store.get(&id).await.unwrap().unwrap();

            let patch = ApplicationPatch {
                email: Some("new@example.com".to_string()),
                ..Default::default()
            };
            let after = store.update(&id, &patch).await.unwrap();

            let mut expected = before;
            expected.email = Some("new@example.com".to_string());
            assert_eq!(after, expected);
            assert_eq!(store.get(&id).await.unwrap(), Some(expected));
        }

        #[sqlx::test(migrations = "./migrations")]
        #[ignore = "requires PostgreSQL via DATABASE_URL"]
        async fn test_pg_update_unknown_id_is_not_found(pool: PgPool) {
            let store = store(pool);
            let err = store
                .update("PPSU0000", &ApplicationPatch::default())
                .await
                .unwrap_err();
            assert!(matches!(err, AdmissionError::NotFound));
        }

        #[sqlx::test(migrations = "./migrations")]
        #[ignore = "requires PostgreSQL via DATABASE_URL"]
        async fn test_pg_update_rejects_taken_mobile(pool: PgPool) {
            let store = store(pool);
            let ids = ApplicationIdGenerator::default();
            store.create(registration("9000000001"), &ids).await.unwrap();
            let second = store.create(registration("9000000002"), &ids).await.unwrap();

            let patch = ApplicationPatch {
                mobile: Some("9000000001".to_string()),
                ..Default::default()
            };
            let err = store.update(&second.application_id, &patch).await.unwrap_err();

            assert!(matches!(err, AdmissionError::DuplicateMobile));
            let stored = store.get(&second.application_id).await.unwrap().unwrap();
            assert_eq!(stored.mobile, "9000000002");
        }

        #[sqlx::test(migrations = "./migrations")]
        #[ignore = "requires PostgreSQL via DATABASE_URL"]
        async fn test_pg_fee_status_round_trip_gates_login(pool: PgPool) {
            let store = store(pool);
            let ids = ApplicationIdGenerator::default();
            let record = store.create(registration("9000000001"), &ids).await.unwrap();

            let err = store.authenticate("9000000001", "2000-01-01").await.unwrap_err();
            assert!(matches!(err, AdmissionError::FeePending));

            let patch = ApplicationPatch {
                reg_fee_status: Some(FeeStatus::Paid),
                mess_fee_status: Some(FeeStatus::Paid),
                ..Default::default()
            };
            store.update(&record.application_id, &patch).await.unwrap();

            let student = store.authenticate("9000000001", "2000-01-01").await.unwrap();
            assert_eq!(student.reg_fee_status, FeeStatus::Paid);
            assert_eq!(student.app_fee_status, FeeStatus::Pending);
            assert_eq!(student.mess_fee_status, FeeStatus::Paid);
        }

        #[sqlx::test(migrations = "./migrations")]
        #[ignore = "requires PostgreSQL via DATABASE_URL"]
        async fn test_pg_attach_photo_and_ping(pool: PgPool) {
            let store = store(pool);
            store.ping().await.unwrap();
            let ids = ApplicationIdGenerator::default();
            let record = store.create(registration("9000000001"), &ids).await.unwrap();

            let updated = store
                .attach_photo(&record.application_id, "https://cdn.example.com/p.jpg")
                .await
                .unwrap();
            assert_eq!(updated.photo_url.as_deref(), Some("https://cdn.example.com/p.jpg"));

            let err = store.attach_photo("PPSU0000", "x").await.unwrap_err();
            assert!(matches!(err, AdmissionError::NotFound));
        }
    }
}
