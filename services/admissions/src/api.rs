use crate::admissions::{AdmissionsService, DocumentUpload};
use crate::config::ApiConfig;
use crate::error::AdmissionError;
use crate::record::{AdmissionRecord, ApplicationPatch, Registration};
use anyhow::{Context, Result};
use axum::{
    async_trait,
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, FromRequest,
        Multipart, Request, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

pub const LIVENESS_TEXT: &str = "Admissions backend is live!";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AdmissionsService>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Registration response
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub id: String,
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub mobile: String,
    pub dob: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub student: AdmissionRecord,
}

/// Update request: the identifier plus any record fields to change
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApplicationRequest {
    pub application_id: Option<String>,
    #[serde(flatten)]
    pub patch: ApplicationPatch,
}

/// Upload response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub file_id: String,
    pub link: String,
}

/// Error returned by every handler, rendered as [`ErrorResponse`]
pub enum ApiError {
    Admission(AdmissionError),
    /// The request body could not be extracted
    Rejected { status: StatusCode, message: String },
}

impl From<AdmissionError> for ApiError {
    fn from(e: AdmissionError) -> Self {
        Self::Admission(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "Rejected JSON body");
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        warn!(error = %e, "Rejected multipart body");
        Self::Rejected {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Admission(e) => admission_error_response(e),
            ApiError::Rejected { status, message } => {
                (status, Json(ErrorResponse { error: message })).into_response()
            }
        }
    }
}

fn admission_error_response(e: AdmissionError) -> Response {
    let status = match e {
        AdmissionError::DuplicateMobile | AdmissionError::MissingField(_) => {
            StatusCode::BAD_REQUEST
        }
        AdmissionError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AdmissionError::FeePending => StatusCode::FORBIDDEN,
        AdmissionError::NotFound => StatusCode::NOT_FOUND,
        AdmissionError::StorageDisabled
        | AdmissionError::Storage(_)
        | AdmissionError::Persistence(_)
        | AdmissionError::ApplicationIdTaken(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = match e {
        AdmissionError::Storage(_) => "Failed to upload document".to_string(),
        ref e if e.is_internal() => "Internal server error".to_string(),
        ref e => e.to_string(),
    };

    if e.is_internal() {
        error!(error = %e, "Request failed");
    }

    (status, Json(ErrorResponse { error: message })).into_response()
}

/// `Json` whose rejections use the API error body
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<HeaderValue> = config
                .cors_origins
                .iter()
                .filter_map(|origin| match origin.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            if origins.is_empty() {
                warn!("No valid CORS origins configured; cross-origin requests will be refused");
            }
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(liveness))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/update-application", post(update_application))
        .route(
            "/api/upload",
            post(upload_document).layer(DefaultBodyLimit::max(config.upload_limit_bytes)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn liveness() -> &'static str {
    LIVENESS_TEXT
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "admissions-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let mirror = state.service.mirror();
    let sheets = mirror.sheets().is_enabled();
    let storage = mirror.files().is_enabled();

    match state.service.ready().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected",
                "sheets": sheets,
                "storage": storage
            })),
        ),
        Err(e) => {
            error!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "database": "disconnected"
                })),
            )
        }
    }
}

#[instrument(skip(state, registration))]
async fn register(
    State(state): State<AppState>,
    ApiJson(registration): ApiJson<Registration>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let synced = state.service.register(registration).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration Successful".to_string(),
            id: synced.value.application_id,
        }),
    ))
}

#[instrument(skip(state, request))]
async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let student = state.service.login(&request.mobile, &request.dob).await?;

    Ok(Json(LoginResponse {
        message: "Login Successful".to_string(),
        student,
    }))
}

#[instrument(skip(state, request))]
async fn update_application(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UpdateApplicationRequest>,
) -> Result<Json<AdmissionRecord>, ApiError> {
    let application_id = request
        .application_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(AdmissionError::MissingField("applicationId"))?;

    let synced = state
        .service
        .update_application(&application_id, &request.patch)
        .await?;

    Ok(Json(synced.value))
}

#[instrument(skip(state, multipart))]
async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut application_id = None;
    let mut student_name = None;
    let mut doc_type = None;

    while let Some(field) = multipart.next_field().await? {

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("document").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            "applicationId" | "studentName" | "docType" => {
                let value = field.text().await?;
                match name.as_str() {
                    "applicationId" => application_id = Some(value),
                    "studentName" => student_name = Some(value),
                    _ => doc_type = Some(value),
                }
            }
            other => {
                warn!(field = %other, "Ignoring unexpected upload field");
            }
        }
    }

    let (file_name, content_type, bytes) = file
        .filter(|(_, _, b)| !b.is_empty())
        .ok_or(AdmissionError::MissingField("file"))?;
    let application_id = application_id.ok_or(AdmissionError::MissingField("applicationId"))?;

    let upload = DocumentUpload {
        application_id,
        doc_type: doc_type.unwrap_or_else(|| "Document".to_string()),
        student_name,
        file_name,
        content_type,
        bytes,
    };

    let receipt = state.service.upload_document(upload).await?;

    Ok(Json(UploadResponse {
        file_id: receipt.file.file_id,
        link: receipt.file.link,
    }))
}

/// Start the intake API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting admissions API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: AdmissionError) -> StatusCode {
        ApiError::from(e).into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_of(AdmissionError::DuplicateMobile), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(AdmissionError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AdmissionError::FeePending), StatusCode::FORBIDDEN);
        assert_eq!(status_of(AdmissionError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(AdmissionError::MissingField("file")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AdmissionError::Persistence(anyhow::anyhow!("pool timed out"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(AdmissionError::StorageDisabled),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_update_request_flattens_patch() {
        let request: UpdateApplicationRequest = serde_json::from_value(serde_json::json!({
            "applicationId": "PPSU4821",
            "regFeeStatus": "Paid",
            "email": "asha@example.com"
        }))
        .unwrap();

        assert_eq!(request.application_id.as_deref(), Some("PPSU4821"));
        assert_eq!(request.patch.email.as_deref(), Some("asha@example.com"));
        assert!(request.patch.reg_fee_status.is_some());
        assert!(request.patch.hostel.is_none());
    }
}
