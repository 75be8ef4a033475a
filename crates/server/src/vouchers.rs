//! JSON API over the voucher workflow engine.
//!
//! - `POST /api/v1/vouchers`                 resolve (or create) the caller's voucher for a month
//! - `GET  /api/v1/vouchers`                 caller's vouchers, newest month first
//! - `GET  /api/v1/vouchers/{id}`            one voucher, visible to owner and role holders
//! - `GET  /api/v1/vouchers/{id}/history`    approval history, oldest first
//! - `POST /api/v1/vouchers/{id}/submit`     submit or resubmit
//! - `POST /api/v1/vouchers/{id}/approve`    approve the current stage
//! - `POST /api/v1/vouchers/{id}/reject`     return to the employee with a reason
//! - `GET  /api/v1/approvals/queue`          vouchers awaiting the caller's senior-most stage
//!
//! Callers are authenticated upstream; identity arrives in `x-principal-id` and
//! `x-principal-email`.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use routetracker_core::domain::voucher::{ApprovalHistoryEntry, Principal, Voucher, VoucherId};
use routetracker_core::errors::{InterfaceError, WorkflowError};
use routetracker_core::store::{SnapshotOrigin, VoucherSnapshot};
use routetracker_core::validation::validate_month;
use routetracker_core::workflow::{
    ApprovalQueue, ApproveVoucher, RejectVoucher, VoucherWorkflowEngine, WorkflowOutcome,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";
pub const PRINCIPAL_EMAIL_HEADER: &str = "x-principal-email";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct VoucherApiState {
    engine: VoucherWorkflowEngine,
}

#[derive(Debug, Deserialize)]
pub struct CreateVoucherRequest {
    pub month: String,
    pub total_miles: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub supervisor_email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApproveRequest {
    pub next_recipient_email: Option<String>,
    pub accountant_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub month: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error_class: String,
    pub message: String,
    pub detail: Option<String>,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

impl ApiError {
    fn unauthenticated(correlation_id: String, missing_header: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ApiErrorBody {
                error_class: "authentication".to_string(),
                message: "Sign in to continue.".to_string(),
                detail: Some(format!("missing `{missing_header}` header")),
                correlation_id,
            },
        }
    }
}

impl From<InterfaceError> for ApiError {
    fn from(error: InterfaceError) -> Self {
        let status = match error {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        // Backend error text is logged, never returned.
        let detail = match error {
            InterfaceError::ServiceUnavailable { .. } => None,
            _ => Some(error.message().to_string()),
        };
        Self {
            status,
            body: ApiErrorBody {
                error_class: error.error_class().to_string(),
                message: error.user_message().to_string(),
                detail,
                correlation_id: error.correlation_id().to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Caller identity plus the correlation id echoed in error bodies and logs.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub principal: Principal,
    pub correlation_id: String,
}

impl RequestContext {
    fn fail(&self, error: WorkflowError) -> ApiError {
        let interface = error.into_interface(self.correlation_id.clone());
        warn!(
            event_name = "api.request_failed",
            correlation_id = %self.correlation_id,
            actor_id = %self.principal.id,
            error_class = interface.error_class(),
            error = interface.message(),
            "voucher API request failed"
        );
        interface.into()
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = header_value(parts, CORRELATION_ID_HEADER)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let Some(id) = header_value(parts, PRINCIPAL_ID_HEADER) else {
            return Err(ApiError::unauthenticated(correlation_id, PRINCIPAL_ID_HEADER));
        };
        let Some(email) = header_value(parts, PRINCIPAL_EMAIL_HEADER) else {
            return Err(ApiError::unauthenticated(correlation_id, PRINCIPAL_EMAIL_HEADER));
        };
        Ok(Self { principal: Principal::new(id, email), correlation_id })
    }
}

pub fn router(engine: VoucherWorkflowEngine) -> Router {
    Router::new()
        .route("/api/v1/vouchers", post(create_voucher).get(list_vouchers))
        .route("/api/v1/vouchers/{id}", get(get_voucher))
        .route("/api/v1/vouchers/{id}/history", get(voucher_history))
        .route("/api/v1/vouchers/{id}/submit", post(submit_voucher))
        .route("/api/v1/vouchers/{id}/approve", post(approve_voucher))
        .route("/api/v1/vouchers/{id}/reject", post(reject_voucher))
        .route("/api/v1/approvals/queue", get(approval_queue))
        .with_state(VoucherApiState { engine })
}

async fn create_voucher(
    context: RequestContext,
    State(state): State<VoucherApiState>,
    Json(body): Json<CreateVoucherRequest>,
) -> Result<(StatusCode, Json<VoucherSnapshot>), ApiError> {
    let month = validate_month(&body.month).map_err(|error| context.fail(error.into()))?;
    let snapshot = state
        .engine
        .get_or_create_voucher(&context.principal, month, body.total_miles)
        .await
        .map_err(|error| context.fail(error))?;

    let status = match snapshot.origin {
        SnapshotOrigin::Created => StatusCode::CREATED,
        SnapshotOrigin::Refreshed | SnapshotOrigin::Unchanged => StatusCode::OK,
    };
    Ok((status, Json(snapshot)))
}

async fn list_vouchers(
    context: RequestContext,
    State(state): State<VoucherApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Voucher>>, ApiError> {
    let employee_id = &context.principal.id;
    let vouchers: Vec<Voucher> = match query.month.as_deref() {
        Some(month) => {
            let month = validate_month(month).map_err(|error| context.fail(error.into()))?;
            state
                .engine
                .voucher_for_month(employee_id, month)
                .await
                .map_err(|error| context.fail(error))?
                .into_iter()
                .collect()
        }
        None => state.engine.vouchers_for(employee_id).await.map_err(|error| context.fail(error))?,
    };
    Ok(Json(vouchers))
}

async fn get_voucher(
    context: RequestContext,
    State(state): State<VoucherApiState>,
    Path(id): Path<String>,
) -> Result<Json<Voucher>, ApiError> {
    let voucher = state
        .engine
        .visible_voucher(&context.principal.id, &VoucherId(id))
        .await
        .map_err(|error| context.fail(error))?;
    Ok(Json(voucher))
}

async fn voucher_history(
    context: RequestContext,
    State(state): State<VoucherApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ApprovalHistoryEntry>>, ApiError> {
    let voucher_id = VoucherId(id);
    let engine = &state.engine;
    engine
        .visible_voucher(&context.principal.id, &voucher_id)
        .await
        .map_err(|error| context.fail(error))?;
    let history = engine.history(&voucher_id).await.map_err(|error| context.fail(error))?;
    Ok(Json(history))
}

async fn submit_voucher(
    context: RequestContext,
    State(state): State<VoucherApiState>,
    Path(id): Path<String>,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<WorkflowOutcome>, ApiError> {
    let outcome = state
        .engine
        .submit_voucher(&context.principal, &VoucherId(id), &body.supervisor_email)
        .await
        .map_err(|error| context.fail(error))?;
    Ok(Json(outcome))
}

async fn approve_voucher(
    context: RequestContext,
    State(state): State<VoucherApiState>,
    Path(id): Path<String>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<WorkflowOutcome>, ApiError> {
    let request = ApproveVoucher {
        voucher_id: VoucherId(id),
        actor_id: context.principal.id.clone(),
        next_recipient_email: body.next_recipient_email,
        accountant_email: body.accountant_email,
    };
    let outcome = state.engine.approve_voucher(request).await.map_err(|error| context.fail(error))?;
    Ok(Json(outcome))
}

async fn reject_voucher(
    context: RequestContext,
    State(state): State<VoucherApiState>,
    Path(id): Path<String>,
    Json(body): Json<RejectRequest>,
) -> Result<Json<WorkflowOutcome>, ApiError> {
    let request = RejectVoucher {
        voucher_id: VoucherId(id),
        actor_id: context.principal.id.clone(),
        reason: body.reason,
    };
    let outcome = state.engine.reject_voucher(request).await.map_err(|error| context.fail(error))?;
    Ok(Json(outcome))
}

async fn approval_queue(
    context: RequestContext,
    State(state): State<VoucherApiState>,
) -> Result<Json<ApprovalQueue>, ApiError> {
    let engine = &state.engine;
    let queue =
        engine.list_pending_for(&context.principal.id).await.map_err(|error| context.fail(error))?;
    Ok(Json(queue))
}
