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

//! Enrollment records and lecture progress.
//!
//! An [`Enrollment`] is opened once per (student, course) pair with a fixed
//! snapshot of the course's lectures. Later edits to the course never add or
//! remove entries from that snapshot.
//!
//! Lecture transitions:
//!
//! ```text
//!  not completed ──complete──► completed (completedAt stamped, counter +1)
//!        ▲                          │
//!        └────────uncomplete────────┘ (completedAt cleared, counter -1, floored at 0)
//! ```
//!
//! Repeating a transition in the same direction leaves the counters alone.

use crate::base::{CourseId, EnrollmentKey, LectureId, StudentId};
use crate::course::Course;
use crate::error::EnrollmentError;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LectureProgress {
    pub lecture_id: LectureId,
    pub completed: bool,
    /// Playback offset in seconds.
    pub last_position: f64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl LectureProgress {
    fn new(lecture_id: LectureId) -> Self {
        Self {
            lecture_id,
            completed: false,
            last_position: 0.0,
            completed_at: None,
        }
    }
}

/// Summary of what a single progress update changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressDelta {
    pub previous_percentage: u8,
    pub completion_percentage: u8,
}

impl ProgressDelta {
    /// True only on the update that moves the enrollment from below 100% to 100%.
    pub fn crossed_completion(&self) -> bool {
        self.previous_percentage < 100 && self.completion_percentage == 100
    }
}

/// A student's enrollment in a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub progress: Vec<LectureProgress>,
    pub completed_lectures: u32,
    pub total_lectures: u32,
    pub completion_percentage: u8,
    #[serde(with = "time::serde::rfc3339")]
    pub enrolled_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_accessed_at: OffsetDateTime,
    /// Bumped by the store on every successful write; used for compare-and-swap.
    #[serde(default)]
    pub version: u64,
}

/// `round(completed / total * 100)` with halves rounded up, or 0 for an empty course.
pub fn completion_percentage(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = u64::from(completed.min(total));
    let total = u64::from(total);
    ((completed * 200 + total) / (total * 2)) as u8
}

impl Enrollment {
    /// Opens a fresh enrollment, snapshotting the course's lectures in course order.
    pub fn open(student_id: StudentId, course: &Course, now: OffsetDateTime) -> Self {
        let progress: Vec<LectureProgress> = course
            .ordered_lecture_ids()
            .into_iter()
            .map(LectureProgress::new)
            .collect();
        let total_lectures = progress.len() as u32;
        Self {
            student_id,
            course_id: course.id,
            progress,
            completed_lectures: 0,
            total_lectures,
            completion_percentage: 0,
            enrolled_at: now,
            last_accessed_at: now,
            version: 0,
        }
    }

    pub fn key(&self) -> EnrollmentKey {
        (self.student_id, self.course_id)
    }

    pub fn is_complete(&self) -> bool {
        self.completion_percentage == 100
    }

    pub fn lecture(&self, lecture_id: LectureId) -> Option<&LectureProgress> {
        self.progress.iter().find(|p| p.lecture_id == lecture_id)
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.completed_lectures <= self.total_lectures,
            "Invariant violated: completed {} exceeds total {}",
            self.completed_lectures,
            self.total_lectures
        );
        debug_assert_eq!(
            self.completion_percentage,
            completion_percentage(self.completed_lectures, self.total_lectures),
            "Invariant violated: percentage out of sync with counters"
        );
        debug_assert!(
            self.progress
                .iter()
                .all(|p| p.completed == p.completed_at.is_some()),
            "Invariant violated: completedAt set without completed flag"
        );
    }

    /// Applies one lecture update and recomputes the aggregate fields.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::LectureNotFound`] - lecture is not in the snapshot.
    /// - [`EnrollmentError::InvalidPosition`] - position is negative or not finite.
    pub fn apply_progress(
        &mut self,
        lecture_id: LectureId,
        completed: bool,
        last_position: Option<f64>,
        now: OffsetDateTime,
    ) -> Result<ProgressDelta, EnrollmentError> {
        if let Some(position) = last_position {
            if !position.is_finite() || position < 0.0 {
                return Err(EnrollmentError::InvalidPosition);
            }
        }
        let previous_percentage = self.completion_percentage;
        let lecture = self
            .progress
            .iter_mut()
            .find(|p| p.lecture_id == lecture_id)
            .ok_or(EnrollmentError::LectureNotFound)?;

        match (lecture.completed, completed) {
            (false, true) => {
                lecture.completed = true;
                lecture.completed_at = Some(now);
                self.completed_lectures = (self.completed_lectures + 1).min(self.total_lectures);
            }
            (true, false) => {
                lecture.completed = false;
                lecture.completed_at = None;
                self.completed_lectures = self.completed_lectures.saturating_sub(1);
            }
            // Repeat of the current state.
            _ => {}
        }
        if let Some(position) = last_position {
            lecture.last_position = position;
        }

        self.completion_percentage =
            completion_percentage(self.completed_lectures, self.total_lectures);
        self.last_accessed_at = now;
        self.assert_invariants();

        Ok(ProgressDelta {
            previous_percentage,
            completion_percentage: self.completion_percentage,
        })
    }
}
