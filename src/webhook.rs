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

//! Signed webhook deliveries.
//!
//! The gateway signs every push with a hex-encoded HMAC-SHA512 of the raw
//! request body, keyed with the account secret. The signature is checked
//! before the body is parsed at all.

use crate::error::EnrollmentError;
use crate::intent::RawPaymentEvent;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";
pub const CHARGE_SUCCESS: &str = "charge.success";

/// Verifies and decodes webhook deliveries.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// What a verified delivery asks the reconciler to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// A successful charge to reconcile.
    ChargeSuccess(RawPaymentEvent),
    /// Any other event type. Acknowledged, never processed.
    Other(String),
}

impl WebhookVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, body: &[u8]) -> HmacSha512 {
        // HMAC accepts keys of any length.
        let mut mac = HmacSha512::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
        mac.update(body);
        mac
    }

    /// Hex signature for `body`. Used by forwarders and tests.
    pub fn sign(&self, body: &[u8]) -> String {
        hex::encode(self.mac(body).finalize().into_bytes())
    }

    /// Constant-time check of a hex signature against `body`.
    pub fn verify(&self, body: &[u8], signature: &str) -> Result<(), EnrollmentError> {
        let expected =
            hex::decode(signature.trim()).map_err(|_| EnrollmentError::InvalidSignature)?;
        self.mac(body)
            .verify_slice(&expected)
            .map_err(|_| EnrollmentError::InvalidSignature)
    }

    /// Verifies the signature, then parses the delivery.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::InvalidSignature`] - missing or mismatched signature.
    /// - [`EnrollmentError::MalformedEvent`] - the signed body is not a valid envelope.
    pub fn open(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, EnrollmentError> {
        let signature = signature.ok_or(EnrollmentError::InvalidSignature)?;
        self.verify(body, signature)?;

        let envelope: Envelope = serde_json::from_slice(body)
            .map_err(|e| EnrollmentError::MalformedEvent(e.to_string()))?;
        if envelope.event != CHARGE_SUCCESS {
            return Ok(WebhookEvent::Other(envelope.event));
        }
        let event: RawPaymentEvent = serde_json::from_value(envelope.data)
            .map_err(|e| EnrollmentError::MalformedEvent(e.to_string()))?;
        Ok(WebhookEvent::ChargeSuccess(event))
    }
}
