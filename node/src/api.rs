//! # REST API
//!
//! Two axum routers over one shared [`Authority`].
//!
//! ## Principal-facing (public port)
//!
//! | Method | Path                  | Body / result                                  |
//! |--------|-----------------------|------------------------------------------------|
//! | GET    | `/health`             | Liveness probe                                 |
//! | GET    | `/authority/key`      | The Authority's public key                     |
//! | POST   | `/principals`         | `Registration` → `Ack`                         |
//! | POST   | `/pseudonyms`         | `Envelope<PseudonymRequest>` → `Envelope<PseudonymGrant>` |
//! | POST   | `/submissions`        | `Envelope<Submission>` → `Ack`                 |
//! | GET    | `/grades`             | Published `pseudonym → grade` map              |
//! | GET    | `/grades/:pseudonym`  | `GradeStatus`                                  |
//!
//! ## Authority-local (admin port, loopback only)
//!
//! | Method | Path                               | Body / result                 |
//! |--------|------------------------------------|-------------------------------|
//! | POST   | `/admin/grades`                    | `{pseudonym, grade}` → `Ack`  |
//! | POST   | `/admin/publish`                   | Published map                 |
//! | GET    | `/admin/submissions`               | Every `SubmissionRecord`      |
//! | GET    | `/admin/records`                   | De-anonymised `FinalRecord`s  |
//! | GET    | `/admin/principals/:real_id/state` | `PrincipalState`              |
//!
//! Protocol errors become `{"error": "..."}` with a status per variant. A
//! body that does not deserialize is reported the same way, as a malformed
//! message with status 400.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use shroud_protocol::messages::{
    Ack, Envelope, GradeQuery, GradeStatus, PseudonymGrant, PseudonymRequest, Registration,
    Submission,
};
use shroud_protocol::{
    Authority, FinalRecord, Grade, PrincipalState, ProtocolError, Pseudonym, RealId,
    SubmissionRecord,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// State shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub authority: Arc<Authority>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Generic error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A protocol failure on its way out as an HTTP response.
pub struct ApiError(ProtocolError);

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ProtocolError::InvalidSignature => StatusCode::UNAUTHORIZED,
            ProtocolError::KeyMismatch => StatusCode::FORBIDDEN,
            ProtocolError::UnknownPseudonym | ProtocolError::NotFound(_) => StatusCode::NOT_FOUND,
            ProtocolError::DuplicateSubmission => StatusCode::CONFLICT,
            ProtocolError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProtocolError::DecryptionFailed
            | ProtocolError::Malformed(_)
            | ProtocolError::UnsupportedVersion(_)
            | ProtocolError::UnexpectedKind { .. }
            | ProtocolError::Serialization(_)
            | ProtocolError::PseudonymNotIssued => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "request body rejected");
        let reason = match rejection {
            JsonRejection::JsonSyntaxError(_) => "request body is not valid JSON",
            JsonRejection::MissingJsonContentType(_) => "expected an application/json body",
            JsonRejection::JsonDataError(_) => "request body does not match the expected message",
            _ => "request body could not be read",
        };
        Self(ProtocolError::Malformed(reason.to_string()))
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// A JSON body, or the rejection axum produced for it.
type JsonBody<T> = Result<Json<T>, JsonRejection>;

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// The principal-facing router. Nothing here reaches the reverse map.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/authority/key", get(authority_key_handler))
        .route("/principals", post(register_handler))
        .route("/pseudonyms", post(pseudonym_handler))
        .route("/submissions", post(submission_handler))
        .route("/grades", get(published_grades_handler))
        .route("/grades/:pseudonym", get(grade_handler))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The Authority-local router. Serve it on loopback only.
pub fn create_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/grades", post(grade_submission_handler))
        .route("/admin/publish", post(publish_handler))
        .route("/admin/submissions", get(submissions_handler))
        .route("/admin/records", get(final_records_handler))
        .route("/admin/principals/:real_id/state", get(principal_state_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorityKeyResponse {
    pub public_key: String,
    pub fingerprint: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GradeRequest {
    pub pseudonym: Pseudonym,
    pub grade: Grade,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrincipalStateResponse {
    pub real_id: RealId,
    pub state: PrincipalState,
}

// ---------------------------------------------------------------------------
// Principal-facing handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        version: state.version.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /authority/key`: the key participants pin before requesting a pseudonym.
async fn authority_key_handler(State(state): State<AppState>) -> Json<AuthorityKeyResponse> {
    let key = state.authority.public_key();
    Json(AuthorityKeyResponse {
        public_key: key.to_interchange(),
        fingerprint: key.fingerprint(),
    })
}

/// `POST /principals`
async fn register_handler(
    State(state): State<AppState>,
    body: JsonBody<Registration>,
) -> ApiResult<Ack> {
    let Json(registration) = body?;
    let ack = state.authority.register_principal(&registration)?;
    state.metrics.principals_registered_total.inc();
    Ok(Json(ack))
}

/// `POST /pseudonyms`
async fn pseudonym_handler(
    State(state): State<AppState>,
    body: JsonBody<Envelope<PseudonymRequest>>,
) -> ApiResult<Envelope<PseudonymGrant>> {
    let issued = body
        .map_err(ApiError::from)
        .and_then(|Json(request)| {
            state
                .authority
                .request_pseudonym(&request)
                .map_err(ApiError::from)
        });
    match issued {
        Ok(grant) => {
            state.metrics.pseudonyms_issued_total.inc();
            Ok(Json(grant))
        }
        Err(e) => {
            state.metrics.pseudonym_requests_rejected_total.inc();
            Err(e)
        }
    }
}

/// `POST /submissions`
async fn submission_handler(
    State(state): State<AppState>,
    body: JsonBody<Envelope<Submission>>,
) -> ApiResult<Ack> {
    let accepted = body
        .map_err(ApiError::from)
        .and_then(|Json(submission)| {
            state
                .authority
                .submit_work(&submission)
                .map_err(ApiError::from)
        });
    match accepted {
        Ok(ack) => {
            state.metrics.submissions_accepted_total.inc();
            Ok(Json(ack))
        }
        Err(e) => {
            state.metrics.submissions_rejected_total.inc();
            Err(e)
        }
    }
}

/// `GET /grades`
async fn published_grades_handler(
    State(state): State<AppState>,
) -> Json<BTreeMap<Pseudonym, Grade>> {
    Json(state.authority.published_grades())
}

/// `GET /grades/:pseudonym`
async fn grade_handler(
    Path(pseudonym): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<GradeStatus> {
    let pseudonym = Pseudonym::parse(&pseudonym)?;
    Ok(Json(state.authority.query_grade(&GradeQuery::new(pseudonym))?))
}

// ---------------------------------------------------------------------------
// Admin handlers
// ---------------------------------------------------------------------------

/// `POST /admin/grades`
async fn grade_submission_handler(
    State(state): State<AppState>,
    body: JsonBody<GradeRequest>,
) -> ApiResult<Ack> {
    let Json(req) = body?;
    let ack = state.authority.grade_submission(&req.pseudonym, req.grade)?;
    state.metrics.grades_recorded_total.inc();
    Ok(Json(ack))
}

/// `POST /admin/publish`
async fn publish_handler(State(state): State<AppState>) -> Json<BTreeMap<Pseudonym, Grade>> {
    let published = state.authority.publish_grades();
    state.metrics.grades_published.set(published.len() as i64);
    Json(published)
}

/// `GET /admin/submissions`
async fn submissions_handler(State(state): State<AppState>) -> Json<Vec<SubmissionRecord>> {
    Json(state.authority.submission_records())
}

/// `GET /admin/records`
async fn final_records_handler(State(state): State<AppState>) -> Json<Vec<FinalRecord>> {
    Json(state.authority.final_records())
}

/// `GET /admin/principals/:real_id/state`
async fn principal_state_handler(
    Path(real_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<PrincipalStateResponse> {
    let real_id = RealId::new(real_id);
    real_id.validate()?;
    let principal_state = state.authority.principal_state(&real_id);
    Ok(Json(PrincipalStateResponse {
        real_id,
        state: principal_state,
    }))
}
