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

//! Runtime configuration.
//!
//! Every option can be given as a flag or through the environment. The
//! binary loads a `.env` file first when one is present.

use crate::course::Course;
use crate::gateway::GatewaySettings;
use crate::reconciler::ReconcilerSettings;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Enrollment ledger - payment reconciliation and progress tracking server
#[derive(Parser, Clone)]
#[command(name = "enrollment-ledger", version, about, long_about = None)]
pub struct Config {
    /// Address to serve the HTTP API on
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Base URL of the payment gateway API
    #[arg(long, env = "PAYSTACK_BASE_URL", default_value = "https://api.paystack.co")]
    pub gateway_base_url: String,

    /// Gateway secret key; also keys the webhook signature
    #[arg(long, env = "PAYSTACK_SECRET_KEY", hide_env_values = true)]
    pub gateway_secret_key: String,

    /// Currency code sent with every payment session
    #[arg(long, env = "PAYSTACK_CURRENCY", default_value = "GHS")]
    pub currency: String,

    /// Where the gateway redirects the browser when the client gives no callback
    #[arg(
        long,
        env = "PAYMENT_CALLBACK_URL",
        default_value = "http://localhost:3000/payment/callback"
    )]
    pub default_callback_url: String,

    /// Seconds to wait for a gateway reply
    #[arg(
        long,
        env = "GATEWAY_TIMEOUT_SECS",
        default_value_t = 12,
        value_parser = clap::value_parser!(u64).range(1..=60)
    )]
    pub gateway_timeout_secs: u64,

    /// Re-reads allowed when concurrent progress updates collide
    #[arg(long, env = "PROGRESS_RETRY_LIMIT", default_value_t = 8)]
    pub progress_retry_limit: u32,

    /// JSON file with the course catalog to serve
    #[arg(long, env = "CATALOG_PATH")]
    pub catalog: Option<PathBuf>,
}

impl Config {
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            base_url: self.gateway_base_url.clone(),
            secret_key: self.gateway_secret_key.clone(),
            timeout: self.gateway_timeout(),
        }
    }

    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            currency: self.currency.clone(),
            default_callback_url: self.default_callback_url.clone(),
            gateway_timeout: self.gateway_timeout(),
        }
    }

    /// Reads the catalog file, if one was configured.
    pub fn load_catalog(&self) -> Result<Vec<Course>, CatalogError> {
        let Some(path) = &self.catalog else {
            return Ok(Vec::new());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| CatalogError::Read {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| CatalogError::Parse {
            path: path.clone(),
            reason: e.to_string(),
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("cannot read catalog {path:?}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("cannot parse catalog {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },
}
