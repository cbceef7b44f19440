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

//! Out-of-band enrollment and completion notifications.
//!
//! Notifications are queued after the ledger write commits and delivered by
//! a background worker. Queueing never blocks and never fails the caller;
//! delivery errors are logged and dropped.

use crate::base::{CourseId, StudentId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_enrolled(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<(), NotifyError>;

    async fn notify_completed(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Enrolled {
        student_id: StudentId,
        course_id: CourseId,
    },
    Completed {
        student_id: StudentId,
        course_id: CourseId,
    },
}

/// Cloneable handle that queues notifications for the background worker.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    queue: mpsc::UnboundedSender<Notification>,
}

impl NotificationDispatcher {
    /// Starts the delivery worker on the current tokio runtime.
    ///
    /// The worker exits once every dispatcher clone has been dropped and the
    /// queue is drained.
    pub fn spawn(notifier: Arc<dyn Notifier>) -> (Self, JoinHandle<()>) {
        let (queue, mut pending) = mpsc::unbounded_channel::<Notification>();
        let worker = tokio::spawn(async move {
            while let Some(notification) = pending.recv().await {
                deliver(notifier.as_ref(), notification).await;
            }
            tracing::debug!("notification worker stopped");
        });
        (Self { queue }, worker)
    }

    /// A dispatcher with no worker. Every notification is dropped.
    pub fn disabled() -> Self {
        let (queue, _) = mpsc::unbounded_channel();
        Self { queue }
    }

    pub fn enrolled(&self, student_id: StudentId, course_id: CourseId) {
        self.send(Notification::Enrolled {
            student_id,
            course_id,
        });
    }

    pub fn completed(&self, student_id: StudentId, course_id: CourseId) {
        self.send(Notification::Completed {
            student_id,
            course_id,
        });
    }

    fn send(&self, notification: Notification) {
        if self.queue.send(notification).is_err() {
            tracing::debug!(?notification, "notification worker unavailable; dropped");
        }
    }
}

async fn deliver(notifier: &dyn Notifier, notification: Notification) {
    let result = match notification {
        Notification::Enrolled {
            student_id,
            course_id,
        } => notifier.notify_enrolled(student_id, course_id).await,
        Notification::Completed {
            student_id,
            course_id,
        } => notifier.notify_completed(student_id, course_id).await,
    };
    if let Err(e) = result {
        tracing::warn!(?notification, error = %e, "notification failed");
    }
}

/// Notifier that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_enrolled(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<(), NotifyError> {
        tracing::info!(%student_id, %course_id, "enrollment confirmation sent");
        Ok(())
    }

    async fn notify_completed(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<(), NotifyError> {
        tracing::info!(%student_id, %course_id, "completion notice sent");
        Ok(())
    }
}
