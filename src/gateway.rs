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

//! Payment gateway client.
//!
//! [`PaymentGateway`] is the seam the reconciler consumes. [`PaystackClient`]
//! speaks the Paystack-style REST API: bearer-authenticated JSON calls that
//! answer with a `{status, message, data}` envelope.

use crate::base::{CourseId, PaymentReference, StudentId};
use crate::error::EnrollmentError;
use crate::intent::RawPaymentEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No answer within the configured deadline
    #[error("gateway call timed out")]
    Timeout,

    /// Connection-level failure
    #[error("gateway transport error: {0}")]
    Transport(String),

    /// Gateway answered with a server-side error status
    #[error("gateway returned status {0}")]
    Status(u16),

    /// Gateway refused the request
    #[error("gateway rejected request: {0}")]
    Rejected(String),

    /// Gateway reply could not be decoded
    #[error("gateway reply could not be decoded: {0}")]
    Decode(String),
}

impl From<GatewayError> for EnrollmentError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Timeout | GatewayError::Transport(_) | GatewayError::Status(_) => {
                EnrollmentError::GatewayUnreachable(err.to_string())
            }
            GatewayError::Rejected(reason) => EnrollmentError::GatewayRejected(reason),
            GatewayError::Decode(reason) => EnrollmentError::MalformedEvent(reason),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Parameters of a hosted payment session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeRequest {
    pub email: String,
    /// Amount in minor currency units.
    pub amount_minor: i64,
    pub currency: String,
    pub callback_url: String,
    pub student_id: StudentId,
    pub course_id: CourseId,
}

/// A hosted payment session, ready for redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializedTransaction {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: PaymentReference,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_transaction(
        &self,
        request: InitializeRequest,
    ) -> Result<InitializedTransaction, GatewayError>;

    async fn verify_transaction(
        &self,
        reference: &PaymentReference,
    ) -> Result<RawPaymentEvent, GatewayError>;
}

/// Runs a gateway call on its own task and waits at most `timeout` for it.
///
/// The call is not aborted when the deadline passes or when the caller is
/// cancelled; it runs to completion and its result is discarded.
pub async fn call_detached<T, F>(timeout: Duration, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(call);
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(GatewayError::Transport(join_error.to_string())),
        Err(_) => Err(GatewayError::Timeout),
    }
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: String,
    pub secret_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

/// HTTP client for a Paystack-compatible gateway.
#[derive(Debug, Clone)]
pub struct PaystackClient {
    http: reqwest::Client,
    settings: GatewaySettings,
}

impl PaystackClient {
    pub fn new(settings: GatewaySettings) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { http, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    async fn read_envelope<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        if !status.is_success() || !envelope.status {
            return Err(GatewayError::Rejected(envelope.message));
        }
        envelope
            .data
            .ok_or_else(|| GatewayError::Decode("envelope has no data".into()))
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize_transaction(
        &self,
        request: InitializeRequest,
    ) -> Result<InitializedTransaction, GatewayError> {
        // Identifiers go out twice: as display fields and as flat keys.
        // Either shape may come back on verify.
        let body = json!({
            "email": request.email,
            "amount": request.amount_minor,
            "currency": request.currency,
            "callback_url": request.callback_url,
            "metadata": {
                "custom_fields": [
                    {
                        "display_name": "User ID",
                        "variable_name": "user_id",
                        "value": request.student_id.to_string(),
                    },
                    {
                        "display_name": "Course ID",
                        "variable_name": "course_id",
                        "value": request.course_id.to_string(),
                    },
                ],
                "user_id": request.student_id.to_string(),
                "course_id": request.course_id.to_string(),
            },
        });
        let response = self
            .http
            .post(self.url("/transaction/initialize"))
            .bearer_auth(&self.settings.secret_key)
            .json(&body)
            .send()
            .await?;
        Self::read_envelope(response).await
    }

    async fn verify_transaction(
        &self,
        reference: &PaymentReference,
    ) -> Result<RawPaymentEvent, GatewayError> {
        let response = self
            .http
            .get(self.url(&format!("/transaction/verify/{}", reference.as_str())))
            .bearer_auth(&self.settings.secret_key)
            .send()
            .await?;
        Self::read_envelope(response).await
    }
}
