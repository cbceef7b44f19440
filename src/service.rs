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

//! Enrollment service: free enrollment and read access to enrollments.

use crate::base::{CourseId, StudentId};
use crate::course::{Course, CourseCatalog};
use crate::enrollment::Enrollment;
use crate::error::EnrollmentError;
use crate::ledger::{LedgerStore, StoreError, Transaction};
use crate::notifier::NotificationDispatcher;
use crate::payment::Payment;
use std::sync::Arc;
use time::OffsetDateTime;

/// Snapshots the course into a new enrollment and commits it together with
/// the enrolled-counter increment and, for paid enrollments, the payment.
///
/// Returns the enrollment as stored.
pub(crate) fn commit_enrollment(
    ledger: &dyn LedgerStore,
    student_id: StudentId,
    course: &Course,
    payment: Option<Payment>,
    now: OffsetDateTime,
) -> Result<Enrollment, StoreError> {
    let enrollment = Enrollment::open(student_id, course, now);

    let mut tx = Transaction::begin(ledger);
    tx.create_enrollment(enrollment).increment_enrolled(course.id);
    if let Some(payment) = payment {
        tx.record_payment(payment);
    }
    tx.commit()?;

    ledger
        .find_enrollment(student_id, course.id)?
        .ok_or(StoreError::NotFound)
}

pub struct EnrollmentService {
    catalog: Arc<dyn CourseCatalog>,
    ledger: Arc<dyn LedgerStore>,
    notifications: NotificationDispatcher,
}

impl EnrollmentService {
    pub fn new(
        catalog: Arc<dyn CourseCatalog>,
        ledger: Arc<dyn LedgerStore>,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            catalog,
            ledger,
            notifications,
        }
    }

    /// Enrolls a student in a zero-price course.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::CourseNotFound`] - unknown course.
    /// - [`EnrollmentError::CoursePriced`] - paid courses go through the reconciler.
    /// - [`EnrollmentError::AlreadyEnrolled`] - the pair is already enrolled,
    ///   including when a concurrent request won the race.
    pub fn enroll_free(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Enrollment, EnrollmentError> {
        let course = self
            .catalog
            .find_course(course_id)
            .ok_or(EnrollmentError::CourseNotFound)?;
        if !course.is_free() {
            return Err(EnrollmentError::CoursePriced);
        }
        if self.ledger.find_enrollment(student_id, course_id)?.is_some() {
            return Err(EnrollmentError::AlreadyEnrolled);
        }

        let enrollment = commit_enrollment(
            self.ledger.as_ref(),
            student_id,
            &course,
            None,
            OffsetDateTime::now_utc(),
        )?;
        tracing::info!(
            %student_id,
            %course_id,
            lectures = enrollment.total_lectures,
            "free enrollment created"
        );
        self.notifications.enrolled(student_id, course_id);
        Ok(enrollment)
    }

    /// # Errors
    ///
    /// [`EnrollmentError::NotEnrolled`] if no enrollment exists for the pair.
    pub fn get_progress(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Enrollment, EnrollmentError> {
        self.ledger
            .find_enrollment(student_id, course_id)?
            .ok_or(EnrollmentError::NotEnrolled)
    }

    /// All of a student's enrollments, most recent first.
    pub fn list_enrollments(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Enrollment>, EnrollmentError> {
        Ok(self.ledger.enrollments_for_student(student_id)?)
    }

    /// A student's recorded payments, most recent first.
    pub fn payment_history(&self, student_id: StudentId) -> Result<Vec<Payment>, EnrollmentError> {
        Ok(self.ledger.payments_for_student(student_id)?)
    }
}
