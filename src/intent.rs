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

//! Reconciliation intent parsing.
//!
//! Gateway payloads arrive from two places (the verify call and the signed
//! webhook) and the gateway has echoed metadata back in more than one shape.
//! Everything shape-dependent is confined to [`ReconciliationIntent::parse`];
//! the reconciler only ever sees resolved identifiers.

use crate::base::{CourseId, PaymentReference, StudentId};
use crate::error::EnrollmentError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SUCCESS_STATUS: &str = "success";
const STUDENT_FIELD: &str = "user_id";
const COURSE_FIELD: &str = "course_id";

/// A gateway transaction as reported by the verify call or a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPaymentEvent {
    pub reference: PaymentReference,
    #[serde(default)]
    pub status: String,
    /// Charged amount in minor units, as reported by the gateway.
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

/// A successful payment with resolved identifiers, ready to reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationIntent {
    pub reference: PaymentReference,
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub amount_minor: Option<i64>,
}

impl ReconciliationIntent {
    /// # Errors
    ///
    /// - [`EnrollmentError::PaymentNotSuccessful`] - status is anything but `success`.
    /// - [`EnrollmentError::MalformedEvent`] - the reference is blank.
    /// - [`EnrollmentError::InvalidMetadata`] - student or course id is missing or not numeric.
    pub fn parse(event: &RawPaymentEvent) -> Result<Self, EnrollmentError> {
        if !event.status.trim().eq_ignore_ascii_case(SUCCESS_STATUS) {
            return Err(EnrollmentError::PaymentNotSuccessful(event.status.clone()));
        }
        if event.reference.as_str().trim().is_empty() {
            return Err(EnrollmentError::MalformedEvent("empty reference".into()));
        }

        let metadata = normalize_metadata(&event.metadata)?;
        let student_id = StudentId(resolve_id(&metadata, STUDENT_FIELD)?);
        let course_id = CourseId(resolve_id(&metadata, COURSE_FIELD)?);

        Ok(Self {
            reference: event.reference.clone(),
            student_id,
            course_id,
            amount_minor: event.amount,
        })
    }
}

/// Metadata is sometimes delivered as a JSON-encoded string.
fn normalize_metadata(metadata: &Value) -> Result<Value, EnrollmentError> {
    match metadata {
        Value::Object(_) => Ok(metadata.clone()),
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(decoded @ Value::Object(_)) => Ok(decoded),
            _ => Err(EnrollmentError::InvalidMetadata(
                "metadata string is not a JSON object".into(),
            )),
        },
        Value::Null => Err(EnrollmentError::InvalidMetadata("missing metadata".into())),
        _ => Err(EnrollmentError::InvalidMetadata(
            "metadata is not an object".into(),
        )),
    }
}

fn custom_field<'a>(metadata: &'a Value, name: &str) -> Option<&'a Value> {
    metadata
        .get("custom_fields")?
        .as_array()?
        .iter()
        .find(|field| field.get("variable_name").and_then(Value::as_str) == Some(name))
        .and_then(|field| field.get("value"))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn resolve_id(metadata: &Value, name: &str) -> Result<u64, EnrollmentError> {
    let value = custom_field(metadata, name)
        .filter(|value| !is_blank(value))
        .or_else(|| metadata.get(name).filter(|value| !is_blank(value)))
        .ok_or_else(|| EnrollmentError::InvalidMetadata(format!("missing {name}")))?;

    let parsed = match value {
        Value::Number(number) => number.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| EnrollmentError::InvalidMetadata(format!("malformed {name}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(status: &str, metadata: Value) -> RawPaymentEvent {
        RawPaymentEvent {
            reference: PaymentReference::new("REF123"),
            status: status.into(),
            amount: Some(5000),
            currency: Some("GHS".into()),
            metadata,
        }
    }

    #[test]
    fn parses_custom_fields_array() {
        let metadata = json!({
            "custom_fields": [
                {"display_name": "User ID", "variable_name": "user_id", "value": "11"},
                {"display_name": "Course ID", "variable_name": "course_id", "value": "22"}
            ]
        });
        let intent = ReconciliationIntent::parse(&event("success", metadata)).unwrap();
        assert_eq!(intent.student_id, StudentId(11));
        assert_eq!(intent.course_id, CourseId(22));
        assert_eq!(intent.amount_minor, Some(5000));
    }

    #[test]
    fn parses_flat_metadata_with_numbers() {
        let metadata = json!({"user_id": 11, "course_id": 22});
        let intent = ReconciliationIntent::parse(&event("success", metadata)).unwrap();
        assert_eq!(intent.student_id, StudentId(11));
        assert_eq!(intent.course_id, CourseId(22));
    }

    #[test]
    fn blank_custom_field_falls_back_to_flat_key() {
        let metadata = json!({
            "custom_fields": [{"variable_name": "user_id", "value": ""}],
            "user_id": "11",
            "course_id": "22"
        });
        let intent = ReconciliationIntent::parse(&event("success", metadata)).unwrap();
        assert_eq!(intent.student_id, StudentId(11));
    }

    #[test]
    fn parses_string_encoded_metadata() {
        let metadata = Value::String(r#"{"user_id":"3","course_id":"4"}"#.into());
        let intent = ReconciliationIntent::parse(&event("SUCCESS", metadata)).unwrap();
        assert_eq!(intent.student_id, StudentId(3));
        assert_eq!(intent.course_id, CourseId(4));
    }

    #[test]
    fn unsuccessful_status_is_rejected_first() {
        let result = ReconciliationIntent::parse(&event("abandoned", Value::Null));
        assert_eq!(
            result,
            Err(EnrollmentError::PaymentNotSuccessful("abandoned".into()))
        );
    }

    #[test]
    fn missing_course_is_invalid_metadata() {
        let result = ReconciliationIntent::parse(&event("success", json!({"user_id": "1"})));
        assert_eq!(
            result,
            Err(EnrollmentError::InvalidMetadata("missing course_id".into()))
        );
    }

    #[test]
    fn non_numeric_id_is_never_guessed() {
        let metadata = json!({"user_id": "64f0c2", "course_id": "2"});
        let result = ReconciliationIntent::parse(&event("success", metadata));
        assert!(matches!(result, Err(EnrollmentError::InvalidMetadata(_))));
    }

    #[test]
    fn missing_metadata_is_invalid() {
        let result = ReconciliationIntent::parse(&event("success", Value::Null));
        assert_eq!(
            result,
            Err(EnrollmentError::InvalidMetadata("missing metadata".into()))
        );
    }

    #[test]
    fn gateway_reply_deserializes_into_raw_event() {
        let data = json!({
            "id": 4099260516u64,
            "status": "success",
            "reference": "REF123",
            "amount": 5000,
            "currency": "GHS",
            "metadata": {"user_id": "1", "course_id": "2"}
        });
        let raw: RawPaymentEvent = serde_json::from_value(data).unwrap();
        assert_eq!(raw.reference, PaymentReference::new("REF123"));
        assert_eq!(raw.amount, Some(5000));
    }
}
