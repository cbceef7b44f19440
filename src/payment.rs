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

//! Payment records.

use crate::base::{CourseId, PaymentReference, StudentId};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// The gateway confirmed the charge. Only confirmed payments are recorded.
    Succeeded,
}

/// A confirmed payment.
///
/// Existence of a payment for a reference proves that the enrollment for
/// that transaction already happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub student_id: StudentId,
    pub course_id: CourseId,
    /// Course price in major units at the time of the transaction.
    pub amount: Decimal,
    pub reference: PaymentReference,
    pub status: PaymentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Payment {
    pub fn succeeded(
        student_id: StudentId,
        course_id: CourseId,
        amount: Decimal,
        reference: PaymentReference,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            student_id,
            course_id,
            amount,
            reference,
            status: PaymentStatus::Succeeded,
            created_at,
        }
    }
}

/// Converts a major-unit price to integer minor units (e.g. cents), halves rounded up.
///
/// Returns `None` if the amount is negative or does not fit in an `i64`.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    if amount.is_sign_negative() {
        return None;
    }
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}
