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

use clap::Parser;
use enrollment_ledger::api::{AppState, router};
use enrollment_ledger::config::Config;
use enrollment_ledger::telemetry::init_log;
use enrollment_ledger::{
    EnrollmentService, LogNotifier, MemoryLedger, NotificationDispatcher, PaystackClient,
    ProgressTracker, Reconciler, WebhookVerifier,
};
use std::process;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    // A missing .env is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();
    let config = Config::parse();
    init_log("info");

    let ledger = Arc::new(MemoryLedger::new());
    match config.load_catalog() {
        Ok(courses) => {
            tracing::info!(courses = courses.len(), "catalog loaded");
            for course in courses {
                ledger.put_course(course);
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load catalog");
            process::exit(1);
        }
    }

    let gateway = match PaystackClient::new(config.gateway_settings()) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            tracing::error!(error = %e, "failed to build gateway client");
            process::exit(1);
        }
    };

    let (notifications, notifier_worker) = NotificationDispatcher::spawn(Arc::new(LogNotifier));
    let state = AppState {
        reconciler: Arc::new(Reconciler::new(
            ledger.clone(),
            ledger.clone(),
            gateway,
            WebhookVerifier::new(&config.gateway_secret_key),
            notifications.clone(),
            config.reconciler_settings(),
        )),
        enrollments: Arc::new(EnrollmentService::new(
            ledger.clone(),
            ledger.clone(),
            notifications.clone(),
        )),
        progress: Arc::new(
            ProgressTracker::new(ledger.clone(), notifications)
                .with_retry_limit(config.progress_retry_limit),
        ),
    };

    let listener = match TcpListener::bind(config.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(bind = %config.bind, error = %e, "failed to bind");
            process::exit(1);
        }
    };
    tracing::info!(bind = %config.bind, "enrollment ledger listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    };
    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!(error = %e, "server error");
        process::exit(1);
    }

    // The router owned the last dispatcher clones; let queued notices drain.
    let _ = notifier_worker.await;
}
