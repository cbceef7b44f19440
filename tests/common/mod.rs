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

//! Shared fixtures for the integration tests: a scripted payment gateway,
//! a recording notifier, and a fully wired set of services over one ledger.

#![allow(dead_code)]

use async_trait::async_trait;
use enrollment_ledger::{
    Course, CourseId, EnrollmentService, GatewayError, InitializeRequest, InitializedTransaction,
    Lecture, LectureId, MemoryLedger, Notification, NotificationDispatcher, Notifier, NotifyError,
    PaymentGateway, PaymentReference, ProgressTracker, RawPaymentEvent, Reconciler,
    ReconcilerSettings, StudentId, WebhookVerifier,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const WEBHOOK_SECRET: &str = "sk_test_webhook_secret";

// =============================================================================
// Builders
// =============================================================================

/// A course whose lectures are numbered `id * 100 + 1 ..= id * 100 + count`.
pub fn make_course(id: u64, price: Decimal, lecture_count: u64) -> Course {
    Course {
        id: CourseId(id),
        title: format!("Course {id}"),
        price,
        lectures: (1..=lecture_count)
            .map(|n| Lecture {
                id: lecture_id(id, n),
                order: n as u32,
                title: format!("Lecture {n}"),
            })
            .collect(),
        enrolled_students: 0,
    }
}

pub fn lecture_id(course_id: u64, n: u64) -> LectureId {
    LectureId(course_id * 100 + n)
}

/// A successful charge carrying ids in the `custom_fields` array.
pub fn make_charge(reference: &str, student_id: u64, course_id: u64, amount: i64) -> RawPaymentEvent {
    make_event(
        reference,
        "success",
        amount,
        json!({
            "custom_fields": [
                { "display_name": "User ID", "variable_name": "user_id", "value": student_id.to_string() },
                { "display_name": "Course ID", "variable_name": "course_id", "value": course_id.to_string() },
            ]
        }),
    )
}

/// The same charge with ids as flat metadata keys, the way webhooks sometimes carry them.
pub fn make_flat_charge(
    reference: &str,
    student_id: u64,
    course_id: u64,
    amount: i64,
) -> RawPaymentEvent {
    make_event(
        reference,
        "success",
        amount,
        json!({ "user_id": student_id, "course_id": course_id }),
    )
}

pub fn make_event(reference: &str, status: &str, amount: i64, metadata: Value) -> RawPaymentEvent {
    RawPaymentEvent {
        reference: PaymentReference::new(reference),
        status: status.to_string(),
        amount: Some(amount),
        currency: Some("GHS".to_string()),
        metadata,
    }
}

/// Serializes `event` the way the gateway posts it to the webhook.
pub fn webhook_body(kind: &str, event: &RawPaymentEvent) -> Vec<u8> {
    serde_json::to_vec(&json!({ "event": kind, "data": event })).expect("serialize webhook")
}

// =============================================================================
// Fake Gateway
// =============================================================================

/// Answers verify calls from a table of known transactions.
#[derive(Default)]
pub struct FakeGateway {
    transactions: Mutex<HashMap<PaymentReference, RawPaymentEvent>>,
    initialized: Mutex<Vec<InitializeRequest>>,
    delay: Mutex<Option<Duration>>,
    pub initialize_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `event` visible to later verify calls.
    pub fn settle(&self, event: RawPaymentEvent) {
        self.transactions
            .lock()
            .insert(event.reference.clone(), event);
    }

    /// Every call sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn initialized(&self) -> Vec<InitializeRequest> {
        self.initialized.lock().clone()
    }

    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn initialize_count(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize_transaction(
        &self,
        request: InitializeRequest,
    ) -> Result<InitializedTransaction, GatewayError> {
        let n = self.initialize_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.wait().await;
        let reference = format!("REF-{}-{}-{n}", request.student_id, request.course_id);
        self.initialized.lock().push(request);
        Ok(InitializedTransaction {
            authorization_url: format!("https://checkout.test/{reference}"),
            access_code: format!("access-{n}"),
            reference: PaymentReference::new(reference),
        })
    }

    async fn verify_transaction(
        &self,
        reference: &PaymentReference,
    ) -> Result<RawPaymentEvent, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        self.transactions
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected("Transaction reference not found".into()))
    }
}

// =============================================================================
// Recording Notifier
// =============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails after being recorded.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    pub fn enrolled_count(&self) -> usize {
        self.sent()
            .iter()
            .filter(|n| matches!(n, Notification::Enrolled { .. }))
            .count()
    }

    pub fn completed_count(&self) -> usize {
        self.sent()
            .iter()
            .filter(|n| matches!(n, Notification::Completed { .. }))
            .count()
    }

    fn record(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().push(notification);
        if self.fail {
            Err(NotifyError::Delivery("mailbox unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_enrolled(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<(), NotifyError> {
        self.record(Notification::Enrolled {
            student_id,
            course_id,
        })
    }

    async fn notify_completed(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<(), NotifyError> {
        self.record(Notification::Completed {
            student_id,
            course_id,
        })
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Every service wired over one [`MemoryLedger`]. Must be built inside a tokio runtime.
pub struct Harness {
    pub ledger: Arc<MemoryLedger>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub reconciler: Arc<Reconciler>,
    pub enrollments: Arc<EnrollmentService>,
    pub progress: Arc<ProgressTracker>,
    pub verifier: WebhookVerifier,
    worker: JoinHandle<()>,
}

impl Harness {
    pub fn new(courses: Vec<Course>) -> Self {
        Self::with_notifier(courses, RecordingNotifier::new())
    }

    pub fn with_notifier(courses: Vec<Course>, notifier: RecordingNotifier) -> Self {
        let settings = ReconcilerSettings {
            gateway_timeout: Duration::from_millis(500),
            ..ReconcilerSettings::default()
        };
        Self::with_settings(courses, notifier, settings)
    }

    pub fn with_settings(
        courses: Vec<Course>,
        notifier: RecordingNotifier,
        settings: ReconcilerSettings,
    ) -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        for course in courses {
            ledger.put_course(course);
        }
        let gateway = Arc::new(FakeGateway::new());
        let notifier = Arc::new(notifier);
        let (notifications, worker) = NotificationDispatcher::spawn(notifier.clone());
        let verifier = WebhookVerifier::new(WEBHOOK_SECRET);

        let reconciler = Arc::new(Reconciler::new(
            ledger.clone(),
            ledger.clone(),
            gateway.clone(),
            verifier.clone(),
            notifications.clone(),
            settings,
        ));
        let enrollments = Arc::new(EnrollmentService::new(
            ledger.clone(),
            ledger.clone(),
            notifications.clone(),
        ));
        let progress = Arc::new(
            ProgressTracker::new(ledger.clone(), notifications).with_retry_limit(10_000),
        );

        Self {
            ledger,
            gateway,
            notifier,
            reconciler,
            enrollments,
            progress,
            verifier,
            worker,
        }
    }

    /// Drops the services, waits for queued notifications, and returns what was delivered.
    ///
    /// Every clone of the service handles must be dropped before calling this.
    pub async fn drain_notifications(self) -> Vec<Notification> {
        let Harness {
            notifier,
            reconciler,
            enrollments,
            progress,
            worker,
            ..
        } = self;
        drop(reconciler);
        drop(enrollments);
        drop(progress);
        worker.await.expect("notification worker panicked");
        notifier.sent()
    }
}
