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

//! # Enrollment Ledger
//!
//! This library turns course purchases into durable, exactly-once enrollment
//! records and keeps per-lecture progress consistent while a student works
//! through a course.
//!
//! ## Core Components
//!
//! - [`Reconciler`]: Converts gateway success signals (client verify or signed
//!   webhook) into enrollment and payment records exactly once
//! - [`EnrollmentService`]: Free enrollment and read access to enrollments and payments
//! - [`ProgressTracker`]: Lecture completion updates with compare-and-retry
//! - [`LedgerStore`]: Storage boundary enforcing (student, course) and
//!   payment-reference uniqueness; [`MemoryLedger`] is the in-process implementation
//! - [`EnrollmentError`]: Error taxonomy shared by every operation
//!
//! ## Example
//!
//! ```
//! use enrollment_ledger::{
//!     Course, CourseId, EnrollmentService, Lecture, LectureId, MemoryLedger,
//!     NotificationDispatcher, ProgressTracker, ProgressUpdate, StudentId,
//! };
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let ledger = Arc::new(MemoryLedger::new());
//! ledger.put_course(Course {
//!     id: CourseId(1),
//!     title: "Intro to Rust".into(),
//!     price: dec!(0),
//!     lectures: vec![
//!         Lecture { id: LectureId(10), order: 1, title: "Hello".into() },
//!         Lecture { id: LectureId(11), order: 2, title: "Ownership".into() },
//!     ],
//!     enrolled_students: 0,
//! });
//!
//! let service = EnrollmentService::new(
//!     ledger.clone(),
//!     ledger.clone(),
//!     NotificationDispatcher::disabled(),
//! );
//! let enrollment = service.enroll_free(StudentId(7), CourseId(1)).unwrap();
//! assert_eq!(enrollment.total_lectures, 2);
//!
//! let tracker = ProgressTracker::new(ledger.clone(), NotificationDispatcher::disabled());
//! let update = ProgressUpdate { lecture_id: LectureId(10), completed: true, last_position: None };
//! let enrollment = tracker.update_progress(StudentId(7), CourseId(1), update).unwrap();
//! assert_eq!(enrollment.completion_percentage, 50);
//! ```
//!
//! ## Concurrency
//!
//! Nothing here holds an in-process lock across a reconciliation. The store's
//! uniqueness constraints arbitrate between racing delivery paths, and a lost
//! race is reported as [`ReconciliationResult::AlreadyProcessed`].

pub mod api;
mod base;
pub mod config;
mod course;
mod enrollment;
pub mod error;
pub mod gateway;
mod intent;
pub mod ledger;
mod memory;
pub mod notifier;
mod payment;
mod progress;
mod reconciler;
mod service;
pub mod telemetry;
pub mod webhook;

pub use base::{CourseId, EnrollmentKey, LectureId, PaymentReference, StudentId};
pub use course::{Course, CourseCatalog, Lecture};
pub use enrollment::{Enrollment, LectureProgress, ProgressDelta, completion_percentage};
pub use error::{EnrollmentError, ErrorKind};
pub use gateway::{
    GatewayError, GatewaySettings, InitializeRequest, InitializedTransaction, PaymentGateway,
    PaystackClient,
};
pub use intent::{RawPaymentEvent, ReconciliationIntent};
pub use ledger::{LedgerStore, StoreError, Transaction, WriteBatch};
pub use memory::MemoryLedger;
pub use notifier::{LogNotifier, Notification, NotificationDispatcher, Notifier, NotifyError};
pub use payment::{Payment, PaymentStatus, to_minor_units};
pub use progress::{DEFAULT_RETRY_LIMIT, ProgressTracker, ProgressUpdate};
pub use reconciler::{Reconciler, ReconcilerSettings, ReconciliationResult, WebhookOutcome};
pub use service::EnrollmentService;
pub use webhook::{WebhookEvent, WebhookVerifier};
