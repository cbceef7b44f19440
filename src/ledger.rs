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

//! Ledger store boundary.
//!
//! The store is the only source of mutual exclusion for reconciliation. Two
//! uniqueness constraints are enforced by every implementation:
//!
//! - one [`Enrollment`] per (student, course) pair
//! - one [`Payment`] per gateway reference
//!
//! Multi-record writes go through a [`Transaction`], which stages writes and
//! hands them to [`LedgerStore::apply`] as a single all-or-nothing unit.

use crate::base::{CourseId, PaymentReference, StudentId};
use crate::enrollment::Enrollment;
use crate::error::EnrollmentError;
use crate::payment::Payment;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An enrollment for the (student, course) pair already exists
    #[error("enrollment already exists")]
    EnrollmentExists,

    /// A payment with the same reference already exists
    #[error("payment reference already recorded")]
    PaymentExists,

    /// The enrollment changed since it was read
    #[error("enrollment version conflict")]
    VersionConflict,

    /// A record referenced by the write does not exist
    #[error("record not found")]
    NotFound,

    /// The backing store failed
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the error is a uniqueness violation raised by a concurrent writer.
    pub fn is_uniqueness_violation(&self) -> bool {
        matches!(self, Self::EnrollmentExists | Self::PaymentExists)
    }
}

impl From<StoreError> for EnrollmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EnrollmentExists => EnrollmentError::AlreadyEnrolled,
            StoreError::PaymentExists | StoreError::VersionConflict => {
                EnrollmentError::StorageConflict
            }
            StoreError::NotFound => EnrollmentError::Integrity("referenced record missing".into()),
            StoreError::Unavailable(reason) => EnrollmentError::Integrity(reason),
        }
    }
}

/// Writes applied together by [`LedgerStore::apply`].
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    pub enrollments: Vec<Enrollment>,
    pub payments: Vec<Payment>,
    pub enrolled_increments: Vec<CourseId>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.enrollments.is_empty()
            && self.payments.is_empty()
            && self.enrolled_increments.is_empty()
    }
}

/// Durable storage for enrollments and payments.
pub trait LedgerStore: Send + Sync {
    fn find_enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StoreError>;

    /// All enrollments of a student, most recent first.
    fn enrollments_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Enrollment>, StoreError>;

    fn find_payment(&self, reference: &PaymentReference) -> Result<Option<Payment>, StoreError>;

    /// All payments of a student, most recent first.
    fn payments_for_student(&self, student_id: StudentId) -> Result<Vec<Payment>, StoreError>;

    /// Replaces an enrollment if its stored version still equals `enrollment.version`.
    ///
    /// Returns the stored record with its new version.
    ///
    /// # Errors
    ///
    /// - [`StoreError::VersionConflict`] - another writer updated the record first.
    /// - [`StoreError::NotFound`] - no enrollment exists for the pair.
    fn update_enrollment(&self, enrollment: &Enrollment) -> Result<Enrollment, StoreError>;

    /// Applies every write in the batch, or none of them.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EnrollmentExists`] / [`StoreError::PaymentExists`] - a
    ///   uniqueness constraint fired; nothing was written.
    /// - [`StoreError::NotFound`] - a counter increment names an unknown course.
    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Scoped write unit over a [`LedgerStore`].
///
/// Writes are staged in memory and reach the store only through
/// [`Transaction::commit`]. A transaction dropped on any other path (early
/// return, `?`, panic) is rolled back by discarding its staged writes.
pub struct Transaction<'a> {
    store: &'a dyn LedgerStore,
    batch: WriteBatch,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub fn begin(store: &'a dyn LedgerStore) -> Self {
        Self {
            store,
            batch: WriteBatch::default(),
            finished: false,
        }
    }

    pub fn create_enrollment(&mut self, enrollment: Enrollment) -> &mut Self {
        self.batch.enrollments.push(enrollment);
        self
    }

    pub fn record_payment(&mut self, payment: Payment) -> &mut Self {
        self.batch.payments.push(payment);
        self
    }

    pub fn increment_enrolled(&mut self, course_id: CourseId) -> &mut Self {
        self.batch.enrolled_increments.push(course_id);
        self
    }

    pub fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        let batch = std::mem::take(&mut self.batch);
        self.store.apply(batch)
    }

    /// Discards staged writes explicitly.
    pub fn rollback(mut self) {
        self.finished = true;
        self.batch = WriteBatch::default();
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.batch.is_empty() {
            tracing::debug!(
                enrollments = self.batch.enrollments.len(),
                payments = self.batch.payments.len(),
                "transaction dropped without commit; staged writes discarded"
            );
        }
    }
}
