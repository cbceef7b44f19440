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

//! Error types for enrollment, reconciliation, and progress tracking.

use thiserror::Error;

/// Broad classes of failure, used to decide how a caller should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or unknown entity. Never retried automatically.
    Validation,
    /// A uniqueness or version race that could not be resolved locally.
    Conflict,
    /// Upstream gateway trouble. The caller may retry with backoff.
    Transient,
    /// A write unit failed and was rolled back.
    Integrity,
}

/// Enrollment and payment processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentError {
    /// Course id does not resolve in the catalog
    #[error("course not found")]
    CourseNotFound,

    /// Free enrollment attempted on a paid course
    #[error("course is priced; enrollment requires payment")]
    CoursePriced,

    /// Student already holds an enrollment for the course
    #[error("already enrolled in this course")]
    AlreadyEnrolled,

    /// No enrollment exists for the (student, course) pair
    #[error("enrollment not found")]
    NotEnrolled,

    /// Lecture is not part of the enrollment's snapshot
    #[error("lecture not found in enrollment")]
    LectureNotFound,

    /// Playback position is negative or not a finite number
    #[error("invalid playback position")]
    InvalidPosition,

    /// Gateway event lacks usable student/course identifiers
    #[error("invalid payment metadata: {0}")]
    InvalidMetadata(String),

    /// Gateway reports a status other than success
    #[error("payment not successful (status: {0})")]
    PaymentNotSuccessful(String),

    /// Gateway timed out or could not be reached
    #[error("payment gateway unreachable: {0}")]
    GatewayUnreachable(String),

    /// Gateway answered but refused the request
    #[error("payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    /// Concurrent writers kept winning the race for the same record
    #[error("storage conflict")]
    StorageConflict,

    /// A write unit failed and was rolled back
    #[error("storage failure: {0}")]
    Integrity(String),

    /// Webhook signature did not match the recomputed HMAC
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Webhook or gateway payload could not be parsed
    #[error("malformed payment event: {0}")]
    MalformedEvent(String),
}

impl EnrollmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CourseNotFound
            | Self::CoursePriced
            | Self::AlreadyEnrolled
            | Self::NotEnrolled
            | Self::LectureNotFound
            | Self::InvalidPosition
            | Self::InvalidMetadata(_)
            | Self::PaymentNotSuccessful(_)
            | Self::InvalidSignature
            | Self::MalformedEvent(_) => ErrorKind::Validation,
            Self::StorageConflict => ErrorKind::Conflict,
            Self::GatewayUnreachable(_) | Self::GatewayRejected(_) => ErrorKind::Transient,
            Self::Integrity(_) => ErrorKind::Integrity,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayUnreachable(_) | Self::StorageConflict)
    }
}

#[cfg(test)]
mod tests {
    use super::{EnrollmentError, ErrorKind};

    #[test]
    fn error_display_messages() {
        assert_eq!(EnrollmentError::CourseNotFound.to_string(), "course not found");
        assert_eq!(
            EnrollmentError::CoursePriced.to_string(),
            "course is priced; enrollment requires payment"
        );
        assert_eq!(
            EnrollmentError::AlreadyEnrolled.to_string(),
            "already enrolled in this course"
        );
        assert_eq!(EnrollmentError::NotEnrolled.to_string(), "enrollment not found");
        assert_eq!(
            EnrollmentError::LectureNotFound.to_string(),
            "lecture not found in enrollment"
        );
        assert_eq!(
            EnrollmentError::InvalidMetadata("missing course id".into()).to_string(),
            "invalid payment metadata: missing course id"
        );
        assert_eq!(
            EnrollmentError::PaymentNotSuccessful("abandoned".into()).to_string(),
            "payment not successful (status: abandoned)"
        );
        assert_eq!(
            EnrollmentError::GatewayUnreachable("timed out".into()).to_string(),
            "payment gateway unreachable: timed out"
        );
        assert_eq!(EnrollmentError::StorageConflict.to_string(), "storage conflict");
        assert_eq!(
            EnrollmentError::InvalidSignature.to_string(),
            "invalid webhook signature"
        );
    }

    #[test]
    fn errors_classify_into_taxonomy() {
        assert_eq!(EnrollmentError::LectureNotFound.kind(), ErrorKind::Validation);
        assert_eq!(
            EnrollmentError::InvalidMetadata(String::new()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(EnrollmentError::StorageConflict.kind(), ErrorKind::Conflict);
        assert_eq!(
            EnrollmentError::GatewayUnreachable(String::new()).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            EnrollmentError::Integrity(String::new()).kind(),
            ErrorKind::Integrity
        );
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(EnrollmentError::GatewayUnreachable("dns".into()).is_retryable());
        assert!(!EnrollmentError::InvalidSignature.is_retryable());
        assert!(!EnrollmentError::AlreadyEnrolled.is_retryable());
    }
}
