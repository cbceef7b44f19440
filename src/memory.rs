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

//! In-process ledger store.
//!
//! [`MemoryLedger`] keeps enrollments, payments, and the course catalog in
//! [`DashMap`]s so reads for different students proceed in parallel. Batched
//! writes are serialized by a commit gate: constraints are checked for the
//! whole batch before the first record is written, so a failing batch leaves
//! no trace.

use crate::base::{CourseId, EnrollmentKey, PaymentReference, StudentId};
use crate::course::{Course, CourseCatalog};
use crate::enrollment::Enrollment;
use crate::ledger::{LedgerStore, StoreError, WriteBatch};
use crate::payment::Payment;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct MemoryLedger {
    courses: DashMap<CourseId, Course>,
    enrollments: DashMap<EnrollmentKey, Enrollment>,
    payments: DashMap<PaymentReference, Payment>,
    /// Payment references in commit order.
    payment_log: RwLock<Vec<PaymentReference>>,
    commit_gate: Mutex<()>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a catalog entry.
    ///
    /// Replacing a course keeps its enrolled-student counter. Existing
    /// enrollments keep their original lecture snapshot.
    pub fn put_course(&self, course: Course) {
        match self.courses.entry(course.id) {
            Entry::Occupied(mut entry) => {
                let enrolled_students = entry.get().enrolled_students;
                entry.insert(Course {
                    enrolled_students,
                    ..course
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(course);
            }
        }
    }

    pub fn enrollment_count(&self) -> usize {
        self.enrollments.len()
    }

    pub fn payment_count(&self) -> usize {
        self.payments.len()
    }

    fn check_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut keys = HashSet::new();
        for enrollment in &batch.enrollments {
            let key = enrollment.key();
            if self.enrollments.contains_key(&key) || !keys.insert(key) {
                return Err(StoreError::EnrollmentExists);
            }
        }
        let mut references = HashSet::new();
        for payment in &batch.payments {
            if self.payments.contains_key(&payment.reference)
                || !references.insert(&payment.reference)
            {
                return Err(StoreError::PaymentExists);
            }
        }
        if batch
            .enrolled_increments
            .iter()
            .any(|course_id| !self.courses.contains_key(course_id))
        {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

impl CourseCatalog for MemoryLedger {
    fn find_course(&self, id: CourseId) -> Option<Course> {
        self.courses.get(&id).map(|entry| entry.value().clone())
    }
}

impl LedgerStore for MemoryLedger {
    fn find_enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StoreError> {
        Ok(self
            .enrollments
            .get(&(student_id, course_id))
            .map(|entry| entry.value().clone()))
    }

    fn enrollments_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Enrollment>, StoreError> {
        let mut enrollments: Vec<Enrollment> = self
            .enrollments
            .iter()
            .filter(|entry| entry.key().0 == student_id)
            .map(|entry| entry.value().clone())
            .collect();
        enrollments.sort_by(|a, b| {
            b.enrolled_at
                .cmp(&a.enrolled_at)
                .then_with(|| b.course_id.cmp(&a.course_id))
        });
        Ok(enrollments)
    }

    fn find_payment(&self, reference: &PaymentReference) -> Result<Option<Payment>, StoreError> {
        Ok(self.payments.get(reference).map(|entry| entry.value().clone()))
    }

    fn payments_for_student(&self, student_id: StudentId) -> Result<Vec<Payment>, StoreError> {
        let log = self.payment_log.read();
        Ok(log
            .iter()
            .rev()
            .filter_map(|reference| self.payments.get(reference))
            .filter(|entry| entry.value().student_id == student_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn update_enrollment(&self, enrollment: &Enrollment) -> Result<Enrollment, StoreError> {
        let mut stored = self
            .enrollments
            .get_mut(&enrollment.key())
            .ok_or(StoreError::NotFound)?;
        if stored.version != enrollment.version {
            return Err(StoreError::VersionConflict);
        }
        let mut updated = enrollment.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let _gate = self.commit_gate.lock();
        self.check_batch(&batch)?;

        for mut enrollment in batch.enrollments {
            enrollment.version = 1;
            self.enrollments.insert(enrollment.key(), enrollment);
        }
        let mut log = self.payment_log.write();
        for payment in batch.payments {
            log.push(payment.reference.clone());
            self.payments.insert(payment.reference.clone(), payment);
        }
        drop(log);
        for course_id in batch.enrolled_increments {
            if let Some(mut course) = self.courses.get_mut(&course_id) {
                course.enrolled_students += 1;
            }
        }
        Ok(())
    }
}
