/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;

use crate::error;

/// The target part size for an upload request.
#[derive(Debug, Clone, Default)]
pub enum PartSize {
    /// Use the default part size (8 MiB).
    #[default]
    Auto,

    /// Part size explicitly given in bytes.
    ///
    /// Every part except possibly the last one will be exactly this size.
    Target(u64),
}

/// The concurrency settings to use for a single upload request.
#[derive(Debug, Clone, Default)]
pub enum ConcurrencySetting {
    /// Use the default concurrency.
    #[default]
    Auto,

    /// Explicitly configured maximum number of part uploads in flight at once.
    Explicit(usize),
}

/// How new part uploads are admitted once the concurrency window is full.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AdmissionMode {
    /// Any completed part frees a slot for the next part.
    ///
    /// Admission is gated by a counting semaphore so a single slow part never stalls the
    /// rest of the upload.
    #[default]
    FreeSlot,

    /// Parts are admitted in a first-in-first-out window.
    ///
    /// When the window is full the scheduler waits for the _oldest_ outstanding part to finish
    /// before admitting the next one. A single slow part will stall admission of new work even
    /// while other slots are idle.
    OldestFirst,
}

/// Policy for how to handle part uploads still in flight when another part fails.
///
/// Default is to let them run to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FailedPartPolicy {
    /// No new parts are admitted, but every part already dispatched is awaited before the
    /// error is returned.
    #[default]
    DrainInFlight,

    /// No new parts are admitted and every part already dispatched is cancelled (and then
    /// joined) before the error is returned.
    CancelInFlight,
}

/// Policy for how to handle the remote multipart upload session when the upload fails
///
/// Default is to retain the session. The upload ID is logged and remains available via
/// [`UploadHandle::upload_id`](crate::operation::upload::UploadHandle::upload_id) so that the
/// caller can decide what to do with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FailedMultipartUploadPolicy {
    /// Abort the remote multipart upload on any failure after it was initiated
    AbortUpload,
    /// Leave the remote multipart upload in progress.
    #[default]
    Retain,
}

/// Describes the result of aborting an in-progress upload.
#[derive(Debug, Default)]
pub struct AbortedUpload {
    pub(crate) upload_id: Option<String>,
}

impl AbortedUpload {
    /// Get the multipart upload ID that was aborted on the backend
    ///
    /// Not present when no multipart upload was started or when the remote session was retained.
    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }
}

/// The lifecycle state of a single upload session.
///
/// State only ever moves forward:
///
/// ```text
/// Idle -> Initiated -> Uploading -> Completed
///   |         |            |
///   |         +------------+-----> Failed -> Aborted
///   +----------------------------> Failed
///   +----------------------------> Completed (empty payload)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing has been sent to the backend yet
    #[default]
    Idle,
    /// The backend has accepted a new multipart upload session
    Initiated,
    /// Parts are being dispatched
    Uploading,
    /// The multipart upload was finalized (or there was nothing to upload)
    Completed,
    /// The upload failed
    Failed,
    /// The upload failed and the remote session was aborted
    Aborted,
}

impl SessionState {
    /// Returns true if no further transitions are possible except `Failed -> Aborted`
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Aborted
        )
    }

    fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Initiated)
                | (Idle, Completed)
                | (Idle, Failed)
                | (Initiated, Uploading)
                | (Initiated, Failed)
                | (Uploading, Completed)
                | (Uploading, Failed)
                | (Failed, Aborted)
        )
    }

    /// Move to the `next` state, failing if that would reverse or skip the lifecycle.
    pub(crate) fn advance(&mut self, next: SessionState) -> Result<(), error::Error> {
        if !self.can_transition_to(next) {
            return Err(error::Error::new(
                error::ErrorKind::RuntimeError,
                format!("invalid upload session transition: {self} -> {next}"),
            ));
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "Idle",
            SessionState::Initiated => "Initiated",
            SessionState::Uploading => "Uploading",
            SessionState::Completed => "Completed",
            SessionState::Failed => "Failed",
            SessionState::Aborted => "Aborted",
        };
        f.write_str(s)
    }
}
