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

//! Course catalog boundary.
//!
//! Course authoring lives in an external service. This crate only needs to
//! read a course's price and lecture list, and to bump its enrolled-student
//! counter as part of an enrollment commit.

use crate::base::{CourseId, LectureId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lecture {
    pub id: LectureId,
    /// Position within the course. Enrollment snapshots follow this order.
    pub order: u32,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    #[serde(default)]
    pub title: String,
    /// Price in major currency units. Zero means the course is free.
    pub price: Decimal,
    pub lectures: Vec<Lecture>,
    #[serde(default)]
    pub enrolled_students: u64,
}

impl Course {
    pub fn is_free(&self) -> bool {
        self.price <= Decimal::ZERO
    }

    /// Lecture ids sorted by course order.
    pub fn ordered_lecture_ids(&self) -> Vec<LectureId> {
        let mut lectures: Vec<&Lecture> = self.lectures.iter().collect();
        lectures.sort_by_key(|lecture| lecture.order);
        lectures.into_iter().map(|lecture| lecture.id).collect()
    }
}

/// Read access to the course catalog.
pub trait CourseCatalog: Send + Sync {
    fn find_course(&self, id: CourseId) -> Option<Course>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn lecture(id: u64, order: u32) -> Lecture {
        Lecture {
            id: LectureId(id),
            order,
            title: String::new(),
        }
    }

    #[test]
    fn lecture_ids_follow_course_order() {
        let course = Course {
            id: CourseId(1),
            title: "Rust".into(),
            price: dec!(0),
            lectures: vec![lecture(30, 3), lecture(10, 1), lecture(20, 2)],
            enrolled_students: 0,
        };
        assert_eq!(
            course.ordered_lecture_ids(),
            vec![LectureId(10), LectureId(20), LectureId(30)]
        );
    }

    #[test]
    fn zero_price_is_free() {
        let mut course = Course {
            id: CourseId(1),
            title: String::new(),
            price: dec!(0.00),
            lectures: Vec::new(),
            enrolled_students: 0,
        };
        assert!(course.is_free());
        course.price = dec!(50);
        assert!(!course.is_free());
    }
}
