use thiserror::Error;

/// Errors surfaced by the admissions workflow.
///
/// Mirror (spreadsheet) failures are not variants: they are reported
/// through [`crate::mirror::MirrorOutcome`] and never fail a request.
#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("A student with this mobile number is already registered")]
    DuplicateMobile,

    #[error("Application not found")]
    NotFound,

    #[error("Invalid mobile number or date of birth")]
    InvalidCredentials,

    #[error("Admission fee is pending")]
    FeePending,

    /// Raised by a store when a generated identifier collides; the create
    /// path retries with a fresh token.
    #[error("Application identifier {0} is already taken")]
    ApplicationIdTaken(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Document storage is not configured")]
    StorageDisabled,

    #[error("Document storage failure: {0:#}")]
    Storage(anyhow::Error),

    #[error("Persistence failure: {0:#}")]
    Persistence(anyhow::Error),
}

impl AdmissionError {
    /// Wrap a database error with context as a persistence failure
    pub fn persistence<E>(context: &'static str) -> impl FnOnce(E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        move |e| Self::Persistence(anyhow::Error::new(e).context(context))
    }

    /// True for failures whose details must stay server-side
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::Storage(_) | Self::ApplicationIdTaken(_)
        )
    }
}
