/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::{Arc, OnceLock};

use aws_smithy_types::error::display::DisplayErrorContext;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::backend::{MultipartBackend, UploadRef};
use crate::error;
use crate::operation::upload::UploadOutput;
use crate::types::{AbortedUpload, FailedMultipartUploadPolicy, SessionState};

/// Response type for a single chunked upload.
///
/// # Cancellation
///
/// The upload runs on a spawned task and keeps running if this handle is dropped. Call
/// [`Self::abort`] to cancel it: every in-progress part upload is cancelled and, depending on the
/// [`FailedMultipartUploadPolicy`], the remote multipart upload is aborted. Errors encountered
/// while aborting the remote multipart upload are returned, the local cancellation has already
/// happened at that point.
///
/// If the upload has already completed before it is aborted, the uploaded object is left as is.
#[derive(Debug)]
#[non_exhaustive]
pub struct UploadHandle {
    /// The session task driving the upload to a terminal state
    task: JoinHandle<Result<UploadOutput, error::Error>>,
    /// Latest published session state
    state: watch::Receiver<SessionState>,
    /// The remote multipart upload, set once initiated
    upload: Arc<OnceLock<UploadRef>>,
    backend: crate::backend::SharedBackend,
    failed_multipart_upload_policy: FailedMultipartUploadPolicy,
}

impl UploadHandle {
    pub(crate) fn new(
        task: JoinHandle<Result<UploadOutput, error::Error>>,
        state: watch::Receiver<SessionState>,
        upload: Arc<OnceLock<UploadRef>>,
        backend: crate::backend::SharedBackend,
        failed_multipart_upload_policy: FailedMultipartUploadPolicy,
    ) -> Self {
        Self {
            task,
            state,
            upload,
            backend,
            failed_multipart_upload_policy,
        }
    }

    /// The current state of the upload session
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session stops making progress and return the state it ended in.
    ///
    /// Unlike [`Self::join`] this does not consume the handle.
    pub async fn final_state(&mut self) -> SessionState {
        // the session drops its end of the channel once it is done
        while self.state.changed().await.is_ok() {}
        *self.state.borrow()
    }

    /// The multipart upload ID, once the backend has started a session
    ///
    /// When an upload fails and the remote session is retained, this is the ID to clean up.
    pub fn upload_id(&self) -> Option<&str> {
        self.upload.get().map(UploadRef::upload_id)
    }

    /// Consume the handle and wait for the upload to complete
    #[tracing::instrument(skip_all, level = "debug", name = "join-upload")]
    pub async fn join(self) -> Result<UploadOutput, error::Error> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(error::operation_cancelled()),
            Err(err) => Err(err.into()),
        }
    }

    /// Abort the upload and cancel any in-progress part uploads.
    #[tracing::instrument(skip_all, level = "debug", name = "abort-upload")]
    pub async fn abort(self) -> Result<AbortedUpload, error::Error> {
        self.task.abort();
        match self.task.await {
            Ok(Ok(_)) => {
                tracing::debug!("upload already completed, nothing to abort");
                Ok(AbortedUpload::default())
            }
            Ok(Err(err)) => {
                // the session already applied the failure policy
                tracing::debug!(
                    "upload already failed, nothing to abort: {}",
                    DisplayErrorContext(&err)
                );
                let upload_id = match *self.state.borrow() {
                    SessionState::Aborted => self.upload.get().map(|u| u.upload_id().to_owned()),
                    _ => None,
                };
                Ok(AbortedUpload { upload_id })
            }
            Err(err) if err.is_cancelled() => {
                if let state @ (SessionState::Failed | SessionState::Aborted) = *self.state.borrow() {
                    // cancelled while applying the failure policy, an abort is already underway
                    tracing::debug!("upload already {state:?}, not aborting again");
                    let upload_id = match self.failed_multipart_upload_policy {
                        FailedMultipartUploadPolicy::AbortUpload => {
                            self.upload.get().map(|u| u.upload_id().to_owned())
                        }
                        FailedMultipartUploadPolicy::Retain => None,
                    };
                    return Ok(AbortedUpload { upload_id });
                }
                abort_remote(
                    &self.backend,
                    self.upload.get(),
                    &self.failed_multipart_upload_policy,
                )
                .await
            }
            Err(err) => Err(err.into()),
        }
    }
}

async fn abort_remote(
    backend: &crate::backend::SharedBackend,
    upload: Option<&UploadRef>,
    policy: &FailedMultipartUploadPolicy,
) -> Result<AbortedUpload, error::Error> {
    let upload = match upload {
        Some(upload) => upload,
        None => {
            tracing::debug!("upload cancelled before a multipart upload was started");
            return Ok(AbortedUpload::default());
        }
    };

    match policy {
        FailedMultipartUploadPolicy::Retain => {
            tracing::info!(
                "upload cancelled, retaining multipart upload {}",
                upload.upload_id()
            );
            Ok(AbortedUpload::default())
        }
        FailedMultipartUploadPolicy::AbortUpload => {
            backend
                .abort_upload(upload)
                .instrument(tracing::debug_span!("abort-multipart-upload"))
                .await
                .map_err(error::from_kind(error::ErrorKind::RuntimeError))?;
            Ok(AbortedUpload {
                upload_id: Some(upload.upload_id().to_owned()),
            })
        }
    }
}
