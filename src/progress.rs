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

//! Lecture progress tracking.
//!
//! Updates are read-modify-write against the ledger with a per-enrollment
//! version check. When another writer got in first, the update is re-read
//! and re-applied instead of overwriting, so two concurrent completions of
//! different lectures both count.

use crate::base::{CourseId, LectureId, StudentId};
use crate::enrollment::Enrollment;
use crate::error::EnrollmentError;
use crate::ledger::{LedgerStore, StoreError};
use crate::notifier::NotificationDispatcher;
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;

pub const DEFAULT_RETRY_LIMIT: u32 = 8;

/// One lecture's progress report from a client.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub lecture_id: LectureId,
    pub completed: bool,
    #[serde(default)]
    pub last_position: Option<f64>,
}

pub struct ProgressTracker {
    ledger: Arc<dyn LedgerStore>,
    notifications: NotificationDispatcher,
    retry_limit: u32,
}

impl ProgressTracker {
    pub fn new(ledger: Arc<dyn LedgerStore>, notifications: NotificationDispatcher) -> Self {
        Self {
            ledger,
            notifications,
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Applies `update` to the student's enrollment and persists it.
    ///
    /// Sends the completion notice when this update is the one that takes the
    /// enrollment to 100%.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::NotEnrolled`] - no enrollment for the pair.
    /// - [`EnrollmentError::LectureNotFound`] - lecture is not in the snapshot.
    /// - [`EnrollmentError::InvalidPosition`] - position is negative or not finite.
    /// - [`EnrollmentError::StorageConflict`] - lost the version race on every retry.
    pub fn update_progress(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        update: ProgressUpdate,
    ) -> Result<Enrollment, EnrollmentError> {
        for attempt in 0..=self.retry_limit {
            let mut enrollment = self
                .ledger
                .find_enrollment(student_id, course_id)?
                .ok_or(EnrollmentError::NotEnrolled)?;
            let delta = enrollment.apply_progress(
                update.lecture_id,
                update.completed,
                update.last_position,
                OffsetDateTime::now_utc(),
            )?;

            match self.ledger.update_enrollment(&enrollment) {
                Ok(stored) => {
                    if delta.crossed_completion() {
                        tracing::info!(%student_id, %course_id, "course completed");
                        self.notifications.completed(student_id, course_id);
                    }
                    return Ok(stored);
                }
                Err(StoreError::VersionConflict) => {
                    tracing::debug!(
                        %student_id,
                        %course_id,
                        lecture_id = %update.lecture_id,
                        attempt,
                        "enrollment changed since read; reapplying"
                    );
                    std::thread::yield_now();
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(%student_id, %course_id, "progress update gave up after retries");
        Err(EnrollmentError::StorageConflict)
    }
}
