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

//! Payment reconciliation.
//!
//! A successful charge reaches us twice: once when the student's browser
//! comes back from the hosted checkout and asks us to verify the reference,
//! and once when the gateway pushes a signed webhook. Both paths, in any
//! order and any number of times, funnel into [`Reconciler::reconcile`].
//!
//! # Invariants
//!
//! - At most one enrollment per (student, course) and one payment per reference.
//!   Both are enforced by the ledger store, never by locks held here, since
//!   several instances may serve the same ledger.
//! - Enrollment, payment, and enrolled-counter increment commit as one unit.
//! - A uniqueness violation means another path already did the work. It is
//!   resolved by re-reading and reporting [`ReconciliationResult::AlreadyProcessed`].

use crate::base::{CourseId, PaymentReference, StudentId};
use crate::course::{Course, CourseCatalog};
use crate::enrollment::Enrollment;
use crate::error::EnrollmentError;
use crate::gateway::{InitializeRequest, InitializedTransaction, PaymentGateway, call_detached};
use crate::intent::{RawPaymentEvent, ReconciliationIntent};
use crate::ledger::{LedgerStore, Transaction};
use crate::notifier::NotificationDispatcher;
use crate::payment::{Payment, to_minor_units};
use crate::service::commit_enrollment;
use crate::webhook::{WebhookEvent, WebhookVerifier};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::instrument;

/// How many times a lost creation race is re-read before giving up.
const MAX_RECONCILE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub currency: String,
    pub default_callback_url: String,
    pub gateway_timeout: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            currency: "GHS".into(),
            default_callback_url: "http://localhost:3000/payment/callback".into(),
            gateway_timeout: Duration::from_secs(12),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "enrollment", rename_all = "snake_case")]
pub enum ReconciliationResult {
    /// This call created the enrollment.
    Enrolled(Enrollment),
    /// The transaction or the enrollment was already on record.
    AlreadyProcessed(Enrollment),
}

impl ReconciliationResult {
    pub fn enrollment(&self) -> &Enrollment {
        match self {
            Self::Enrolled(enrollment) | Self::AlreadyProcessed(enrollment) => enrollment,
        }
    }

    pub fn into_enrollment(self) -> Enrollment {
        match self {
            Self::Enrolled(enrollment) | Self::AlreadyProcessed(enrollment) => enrollment,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Enrolled(_))
    }
}

/// Result of a verified webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Reconciled(ReconciliationResult),
    /// Event type we do not act on.
    Ignored(String),
}

pub struct Reconciler {
    catalog: Arc<dyn CourseCatalog>,
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: WebhookVerifier,
    notifications: NotificationDispatcher,
    settings: ReconcilerSettings,
}

impl Reconciler {
    pub fn new(
        catalog: Arc<dyn CourseCatalog>,
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: WebhookVerifier,
        notifications: NotificationDispatcher,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            catalog,
            ledger,
            gateway,
            verifier,
            notifications,
            settings,
        }
    }

    /// Opens a hosted payment session for a paid course.
    ///
    /// Nothing is written locally; the transaction only becomes real once a
    /// success signal is reconciled.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::CourseNotFound`] - unknown course.
    /// - [`EnrollmentError::AlreadyEnrolled`] - the student is already enrolled.
    /// - [`EnrollmentError::GatewayUnreachable`] - the gateway did not answer in time.
    /// - [`EnrollmentError::GatewayRejected`] - the gateway refused the session.
    #[instrument(skip_all, fields(%student_id, %course_id))]
    pub async fn initialize(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        email: String,
        callback_url: Option<String>,
    ) -> Result<InitializedTransaction, EnrollmentError> {
        let course = self
            .catalog
            .find_course(course_id)
            .ok_or(EnrollmentError::CourseNotFound)?;
        if self.ledger.find_enrollment(student_id, course_id)?.is_some() {
            return Err(EnrollmentError::AlreadyEnrolled);
        }
        let amount_minor = to_minor_units(course.price).ok_or_else(|| {
            EnrollmentError::Integrity(format!("unpayable price {}", course.price))
        })?;

        let request = InitializeRequest {
            email,
            amount_minor,
            currency: self.settings.currency.clone(),
            callback_url: callback_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| self.settings.default_callback_url.clone()),
            student_id,
            course_id,
        };
        let gateway = Arc::clone(&self.gateway);
        let session = call_detached(self.settings.gateway_timeout, async move {
            gateway.initialize_transaction(request).await
        })
        .await?;

        tracing::info!(
            reference = %session.reference,
            amount_minor,
            "payment session initialized"
        );
        Ok(session)
    }

    /// Client pull path: asks the gateway about `reference` and reconciles the answer.
    ///
    /// A reference already on record is answered from the ledger without a
    /// gateway round-trip.
    #[instrument(skip_all, fields(%reference))]
    pub async fn verify(
        &self,
        reference: PaymentReference,
    ) -> Result<ReconciliationResult, EnrollmentError> {
        if let Some(result) = self.already_recorded(&reference)? {
            return Ok(result);
        }
        let gateway = Arc::clone(&self.gateway);
        let lookup = reference.clone();
        let event = call_detached(self.settings.gateway_timeout, async move {
            gateway.verify_transaction(&lookup).await
        })
        .await?;
        if event.reference != reference {
            return Err(EnrollmentError::MalformedEvent(format!(
                "gateway answered for reference {}",
                event.reference
            )));
        }
        self.reconcile(&event)
    }

    /// Server push path: checks the signature, then reconciles `charge.success` events.
    ///
    /// # Errors
    ///
    /// [`EnrollmentError::InvalidSignature`] before any parsing if the
    /// signature is missing or wrong; otherwise as [`Reconciler::reconcile`].
    pub fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, EnrollmentError> {
        let event = self.verifier.open(body, signature).inspect_err(|e| {
            tracing::warn!(error = %e, "webhook rejected");
        })?;
        match event {
            WebhookEvent::ChargeSuccess(raw) => {
                Ok(WebhookOutcome::Reconciled(self.reconcile(&raw)?))
            }
            WebhookEvent::Other(kind) => {
                tracing::debug!(event = %kind, "webhook event ignored");
                Ok(WebhookOutcome::Ignored(kind))
            }
        }
    }

    /// Turns a gateway success signal into enrollment and payment records, exactly once.
    ///
    /// Safe to call concurrently, any number of times, with payloads that
    /// describe the same transaction.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::PaymentNotSuccessful`] - nothing to reconcile; no side effects.
    /// - [`EnrollmentError::InvalidMetadata`] - student or course cannot be resolved.
    /// - [`EnrollmentError::CourseNotFound`] - course id no longer resolves.
    /// - [`EnrollmentError::Integrity`] - the write unit failed and was rolled back.
    /// - [`EnrollmentError::StorageConflict`] - the race did not settle after re-reading.
    pub fn reconcile(
        &self,
        event: &RawPaymentEvent,
    ) -> Result<ReconciliationResult, EnrollmentError> {
        let intent = ReconciliationIntent::parse(event)?;

        for attempt in 0..MAX_RECONCILE_ATTEMPTS {
            if let Some(result) = self.already_recorded(&intent.reference)? {
                return Ok(result);
            }

            let course = self.catalog.find_course(intent.course_id);

            if let Some(existing) = self
                .ledger
                .find_enrollment(intent.student_id, intent.course_id)?
            {
                self.record_orphan_payment(&intent, course.as_ref())?;
                return Ok(ReconciliationResult::AlreadyProcessed(existing));
            }

            let course = course.ok_or(EnrollmentError::CourseNotFound)?;
            check_amount(&intent, &course);
            let payment = Payment::succeeded(
                intent.student_id,
                intent.course_id,
                course.price,
                intent.reference.clone(),
                OffsetDateTime::now_utc(),
            );

            match commit_enrollment(
                self.ledger.as_ref(),
                intent.student_id,
                &course,
                Some(payment),
                OffsetDateTime::now_utc(),
            ) {
                Ok(enrollment) => {
                    tracing::info!(
                        reference = %intent.reference,
                        student_id = %intent.student_id,
                        course_id = %intent.course_id,
                        amount = %course.price,
                        "payment reconciled; enrollment created"
                    );
                    self.notifications.enrolled(intent.student_id, intent.course_id);
                    return Ok(ReconciliationResult::Enrolled(enrollment));
                }
                Err(e) if e.is_uniqueness_violation() => {
                    tracing::debug!(
                        reference = %intent.reference,
                        attempt,
                        error = %e,
                        "concurrent reconciliation won; re-reading"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(reference = %intent.reference, "reconciliation did not settle");
        Err(EnrollmentError::StorageConflict)
    }

    /// The idempotency gate: a recorded reference means the work is done.
    fn already_recorded(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<ReconciliationResult>, EnrollmentError> {
        let Some(payment) = self.ledger.find_payment(reference)? else {
            return Ok(None);
        };
        let enrollment = self
            .ledger
            .find_enrollment(payment.student_id, payment.course_id)?
            .ok_or_else(|| {
                EnrollmentError::Integrity(format!("payment {reference} has no enrollment"))
            })?;
        tracing::debug!(%reference, "reference already reconciled");
        Ok(Some(ReconciliationResult::AlreadyProcessed(enrollment)))
    }

    /// Keeps financial history complete when the enrollment already existed,
    /// e.g. a second checkout for a course the student already owns.
    fn record_orphan_payment(
        &self,
        intent: &ReconciliationIntent,
        course: Option<&Course>,
    ) -> Result<(), EnrollmentError> {
        let amount = course
            .map(|course| course.price)
            .or_else(|| intent.amount_minor.map(|minor| Decimal::new(minor, 2)))
            .unwrap_or(Decimal::ZERO);
        let payment = Payment::succeeded(
            intent.student_id,
            intent.course_id,
            amount,
            intent.reference.clone(),
            OffsetDateTime::now_utc(),
        );

        let mut tx = Transaction::begin(self.ledger.as_ref());
        tx.record_payment(payment);
        match tx.commit() {
            Ok(()) => {
                tracing::info!(
                    reference = %intent.reference,
                    student_id = %intent.student_id,
                    course_id = %intent.course_id,
                    "payment recorded for existing enrollment"
                );
                Ok(())
            }
            Err(e) if e.is_uniqueness_violation() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn check_amount(intent: &ReconciliationIntent, course: &Course) {
    let Some(reported) = intent.amount_minor else {
        return;
    };
    if to_minor_units(course.price) != Some(reported) {
        tracing::warn!(
            reference = %intent.reference,
            reported,
            price = %course.price,
            "gateway amount differs from course price; recording course price"
        );
    }
}
