// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP surface.
//!
//! ```text
//! POST /payments/initialize                {courseId, email, callbackUrl?}
//! POST /payments/verify                    {reference}
//! GET  /payments/history
//! POST /webhook/paystack                   signed gateway push
//! GET  /enrollments
//! POST /enrollments/{course_id}            free courses only
//! GET  /enrollments/{course_id}/progress
//! PUT  /enrollments/{course_id}/progress   {lectureId, completed, lastPosition?}
//! ```
//!
//! Authentication happens upstream; the authenticated student arrives in the
//! `x-student-id` header.

use crate::base::{CourseId, PaymentReference, StudentId};
use crate::error::EnrollmentError;
use crate::progress::{ProgressTracker, ProgressUpdate};
use crate::reconciler::{ReconciliationResult, Reconciler, WebhookOutcome};
use crate::service::EnrollmentService;
use crate::webhook::SIGNATURE_HEADER;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequestParts, Path, State},
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const STUDENT_HEADER: &str = "x-student-id";

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentRequest {
    pub course_id: CourseId,
    pub email: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub reference: PaymentReference,
}

/// Every response body: a success flag plus an optional message and payload.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            code: None,
            data: Some(data),
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub enrollments: Arc<EnrollmentService>,
    pub progress: Arc<ProgressTracker>,
}

// === Error Handling ===

pub enum AppError {
    Unauthorized,
    Enrollment(EnrollmentError),
}

impl From<EnrollmentError> for AppError {
    fn from(err: EnrollmentError) -> Self {
        AppError::Enrollment(err)
    }
}

fn status_for(err: &EnrollmentError) -> (StatusCode, &'static str) {
    match err {
        EnrollmentError::CourseNotFound => (StatusCode::NOT_FOUND, "COURSE_NOT_FOUND"),
        EnrollmentError::CoursePriced => (StatusCode::PAYMENT_REQUIRED, "COURSE_PRICED"),
        EnrollmentError::AlreadyEnrolled => (StatusCode::CONFLICT, "ALREADY_ENROLLED"),
        EnrollmentError::NotEnrolled => (StatusCode::NOT_FOUND, "NOT_ENROLLED"),
        EnrollmentError::LectureNotFound => (StatusCode::NOT_FOUND, "LECTURE_NOT_FOUND"),
        EnrollmentError::InvalidPosition => (StatusCode::BAD_REQUEST, "INVALID_POSITION"),
        EnrollmentError::InvalidMetadata(_) => (StatusCode::BAD_REQUEST, "INVALID_METADATA"),
        EnrollmentError::PaymentNotSuccessful(_) => {
            (StatusCode::BAD_REQUEST, "PAYMENT_NOT_SUCCESSFUL")
        }
        EnrollmentError::GatewayUnreachable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "GATEWAY_UNREACHABLE")
        }
        EnrollmentError::GatewayRejected(_) => (StatusCode::BAD_GATEWAY, "GATEWAY_REJECTED"),
        EnrollmentError::StorageConflict => (StatusCode::CONFLICT, "STORAGE_CONFLICT"),
        EnrollmentError::Integrity(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTEGRITY"),
        EnrollmentError::InvalidSignature => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
        EnrollmentError::MalformedEvent(_) => (StatusCode::BAD_REQUEST, "MALFORMED_EVENT"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "authentication required".to_string(),
            ),
            AppError::Enrollment(err) => {
                let (status, code) = status_for(&err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "request failed");
                }
                (status, code, err.to_string())
            }
        };
        let body: ApiResponse<()> = ApiResponse {
            success: false,
            message: Some(message),
            code: Some(code),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

/// The student the upstream auth layer vouched for.
pub struct AuthenticatedStudent(pub StudentId);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedStudent {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(STUDENT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(|id| AuthenticatedStudent(StudentId(id)))
            .ok_or(AppError::Unauthorized)
    }
}

fn reconciliation_response(result: ReconciliationResult) -> Response {
    match result {
        ReconciliationResult::Enrolled(enrollment) => {
            (StatusCode::CREATED, Json(ApiResponse::ok(enrollment))).into_response()
        }
        ReconciliationResult::AlreadyProcessed(enrollment) => (
            StatusCode::OK,
            Json(ApiResponse::ok(enrollment).with_message("already enrolled")),
        )
            .into_response(),
    }
}

// === Handlers ===

async fn initialize_payment(
    State(state): State<AppState>,
    AuthenticatedStudent(student_id): AuthenticatedStudent,
    Json(request): Json<InitializePaymentRequest>,
) -> Result<Response, AppError> {
    let session = state
        .reconciler
        .initialize(
            student_id,
            request.course_id,
            request.email,
            request.callback_url,
        )
        .await?;
    Ok(Json(ApiResponse::ok(session)).into_response())
}

async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Response, AppError> {
    let result = state.reconciler.verify(request.reference).await?;
    Ok(reconciliation_response(result))
}

async fn payment_history(
    State(state): State<AppState>,
    AuthenticatedStudent(student_id): AuthenticatedStudent,
) -> Result<Response, AppError> {
    let payments = state.enrollments.payment_history(student_id)?;
    Ok(Json(ApiResponse::ok(payments)).into_response())
}

async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    match state.reconciler.handle_webhook(&body, signature)? {
        WebhookOutcome::Reconciled(result) => Ok(reconciliation_response(result)),
        WebhookOutcome::Ignored(_) => {
            let body: ApiResponse<()> = ApiResponse {
                success: true,
                message: Some("event ignored".into()),
                code: None,
                data: None,
            };
            Ok(Json(body).into_response())
        }
    }
}

async fn list_enrollments(
    State(state): State<AppState>,
    AuthenticatedStudent(student_id): AuthenticatedStudent,
) -> Result<Response, AppError> {
    let enrollments = state.enrollments.list_enrollments(student_id)?;
    Ok(Json(ApiResponse::ok(enrollments)).into_response())
}

async fn enroll_free(
    State(state): State<AppState>,
    AuthenticatedStudent(student_id): AuthenticatedStudent,
    Path(course_id): Path<u64>,
) -> Result<Response, AppError> {
    let enrollment = state
        .enrollments
        .enroll_free(student_id, CourseId(course_id))?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(enrollment))).into_response())
}

async fn get_progress(
    State(state): State<AppState>,
    AuthenticatedStudent(student_id): AuthenticatedStudent,
    Path(course_id): Path<u64>,
) -> Result<Response, AppError> {
    let enrollment = state
        .enrollments
        .get_progress(student_id, CourseId(course_id))?;
    Ok(Json(ApiResponse::ok(enrollment)).into_response())
}

async fn update_progress(
    State(state): State<AppState>,
    AuthenticatedStudent(student_id): AuthenticatedStudent,
    Path(course_id): Path<u64>,
    Json(update): Json<ProgressUpdate>,
) -> Result<Response, AppError> {
    let enrollment = state
        .progress
        .update_progress(student_id, CourseId(course_id), update)?;
    Ok(Json(ApiResponse::ok(enrollment)).into_response())
}

// === Router ===

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/payments/initialize", post(initialize_payment))
        .route("/payments/verify", post(verify_payment))
        .route("/payments/history", get(payment_history))
        .route("/webhook/paystack", post(paystack_webhook))
        .route("/enrollments", get(list_enrollments))
        .route("/enrollments/{course_id}", post(enroll_free))
        .route(
            "/enrollments/{course_id}/progress",
            get(get_progress).put(update_progress),
        )
        .with_state(state)
}
