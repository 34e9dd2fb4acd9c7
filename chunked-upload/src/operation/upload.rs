/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

/// Operation builders
pub mod builders;

pub(crate) mod context;
mod finalizer;
mod handle;
mod input;
mod output;

use std::sync::{Arc, OnceLock};

use aws_smithy_types::error::display::DisplayErrorContext;
use tokio::sync::watch;
use tracing::Instrument;

use crate::backend::{MultipartBackend, UploadRef};
use crate::client::part_size_bytes;
use crate::error;
use crate::io::part_reader::PartReader;
use crate::io::{InputStream, PartPlan};
use crate::runtime::registry::aggregate;
use crate::runtime::scheduler::UploadScheduler;
use crate::types::{FailedMultipartUploadPolicy, SessionState};
use context::UploadContext;

pub use handle::UploadHandle;
/// Request type for chunked uploads
pub use input::{UploadInput, UploadInputBuilder};
/// Response type for chunked uploads
pub use output::UploadOutput;

/// Operation struct for single object upload
#[derive(Clone, Default, Debug)]
pub(crate) struct Upload;

impl Upload {
    /// Execute a single `Upload` operation, driving it on a new task
    pub(crate) fn orchestrate(
        handle: Arc<crate::client::Handle>,
        mut input: UploadInput,
    ) -> Result<UploadHandle, error::Error> {
        let stream = input.take_body();
        let policy = input
            .failed_multipart_upload_policy
            .clone()
            .unwrap_or_else(|| handle.config.failed_multipart_upload_policy().clone());
        let part_size = input
            .part_size
            .as_ref()
            .map(part_size_bytes)
            .unwrap_or_else(|| handle.upload_part_size_bytes());
        let plan = PartPlan::new(stream.content_length(), part_size)?;

        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let upload = Arc::new(OnceLock::new());
        let backend = handle.config.backend().clone();

        let controller = SessionController {
            handle,
            bucket: input.bucket,
            key: input.key,
            policy: policy.clone(),
            state: SessionState::Idle,
            state_tx,
            upload: upload.clone(),
        };
        let task = tokio::spawn(
            controller
                .run(stream, plan)
                .instrument(tracing::debug_span!("upload-session")),
        );

        Ok(UploadHandle::new(task, state_rx, upload, backend, policy))
    }
}

/// Owns the lifecycle of a single upload session, from initiate to a terminal state.
///
/// Every state change is published to the [`UploadHandle`].
#[derive(Debug)]
struct SessionController {
    handle: Arc<crate::client::Handle>,
    bucket: String,
    key: String,
    policy: FailedMultipartUploadPolicy,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    /// set once the backend has started a multipart upload
    upload: Arc<OnceLock<UploadRef>>,
}

impl SessionController {
    fn transition(&mut self, next: SessionState) -> Result<(), error::Error> {
        self.state.advance(next)?;
        tracing::trace!("upload session is now {next}");
        self.state_tx.send_replace(next);
        Ok(())
    }

    async fn run(mut self, stream: InputStream, plan: PartPlan) -> Result<UploadOutput, error::Error> {
        if plan.is_empty() {
            // an initiated session that is never completed would be orphaned
            tracing::debug!("empty payload, nothing to upload");
            self.transition(SessionState::Completed)?;
            return Ok(self.output(None, Vec::new(), 0));
        }

        let result = self.upload_parts(stream, plan).await;
        match result {
            Ok(output) => Ok(output),
            Err(err) => Err(self.fail(err).await),
        }
    }

    async fn upload_parts(
        &mut self,
        stream: InputStream,
        plan: PartPlan,
    ) -> Result<UploadOutput, error::Error> {
        let upload_id = self
            .handle
            .config
            .backend()
            .initiate_upload(&self.bucket, &self.key)
            .instrument(tracing::debug_span!("initiate-upload"))
            .await
            .map_err(error::initiate_failed)?;
        tracing::trace!("multipart upload started with upload id: {upload_id}");

        let upload = UploadRef::new(self.bucket.clone(), self.key.clone(), upload_id);
        // only the controller sets this, once
        let _ = self.upload.set(upload.clone());
        self.transition(SessionState::Initiated)?;

        tracing::trace!(
            "uploading {} bytes in {} parts of {} bytes",
            plan.content_length(),
            plan.num_parts(),
            plan.part_size()
        );
        self.transition(SessionState::Uploading)?;

        let ctx = UploadContext::new(self.handle.clone(), upload);
        let reader = PartReader::new(stream, &plan);
        let (tx, rx) = async_channel::unbounded();
        let (dispatched, aggregated) = tokio::join!(
            UploadScheduler::new(ctx.clone()).run(reader, tx),
            aggregate(rx)
        );
        // a read error stops dispatch before any part failure it may have caused
        let registry = dispatched.and(aggregated)?;
        tracing::trace!("{} parts registered", registry.len());

        let parts = finalizer::finalize(&ctx, registry, plan.num_parts()).await?;
        self.transition(SessionState::Completed)?;
        tracing::debug!("upload completed successfully");

        let upload_id = ctx.upload().upload_id().to_owned();
        Ok(self.output(Some(upload_id), parts, plan.content_length()))
    }

    /// Move to `Failed`, apply the failed multipart upload policy and return the original error.
    async fn fail(&mut self, err: error::Error) -> error::Error {
        if let Err(transition_err) = self.transition(SessionState::Failed) {
            tracing::error!(
                "failed to mark upload as failed: {}",
                DisplayErrorContext(&transition_err)
            );
        }

        let upload = match self.upload.get() {
            Some(upload) => upload.clone(),
            None => {
                tracing::error!("upload failed to start: {}", DisplayErrorContext(&err));
                return err;
            }
        };

        match self.policy {
            FailedMultipartUploadPolicy::Retain => {
                tracing::error!(
                    "upload failed, retaining multipart upload {}: {}",
                    upload.upload_id(),
                    DisplayErrorContext(&err)
                );
            }
            FailedMultipartUploadPolicy::AbortUpload => {
                tracing::error!(
                    "upload failed, aborting multipart upload {}: {}",
                    upload.upload_id(),
                    DisplayErrorContext(&err)
                );
                // outlives the session task if the handle aborts it
                let backend = self.handle.config.backend().clone();
                let remote = upload.clone();
                let aborted = tokio::spawn(
                    async move { backend.abort_upload(&remote).await }
                        .instrument(tracing::debug_span!("abort-multipart-upload")),
                )
                .await;
                match aborted {
                    Ok(Ok(())) => {
                        if let Err(transition_err) = self.transition(SessionState::Aborted) {
                            tracing::error!(
                                "failed to mark upload as aborted: {}",
                                DisplayErrorContext(&transition_err)
                            );
                        }
                    }
                    Ok(Err(abort_err)) => tracing::error!(
                        "failed to abort multipart upload {}: {}",
                        upload.upload_id(),
                        DisplayErrorContext(abort_err.as_ref())
                    ),
                    Err(join_err) => tracing::error!(
                        "abort of multipart upload {} did not finish: {}",
                        upload.upload_id(),
                        join_err
                    ),
                }
            }
        }

        err
    }

    fn output(
        &self,
        upload_id: Option<String>,
        parts: Vec<crate::backend::CompletionToken>,
        content_length: u64,
    ) -> UploadOutput {
        UploadOutput {
            upload_id,
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            parts,
            content_length,
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use aws_sdk_s3::operation::complete_multipart_upload::CompleteMultipartUploadOutput;
    use aws_sdk_s3::operation::create_multipart_upload::CreateMultipartUploadOutput;
    use aws_sdk_s3::operation::upload_part::UploadPartOutput;
    use aws_smithy_mocks_experimental::{mock, mock_client, RuleMode};
    use bytes::Bytes;

    use crate::backend::in_memory::InMemoryBackend;
    use crate::error::ErrorKind;
    use crate::io::InputStream;
    use crate::types::{
        ConcurrencySetting, FailedMultipartUploadPolicy, PartSize, SessionState,
    };

    fn client(backend: Arc<InMemoryBackend>) -> crate::Client {
        let config = crate::Config::builder()
            .backend(backend)
            .part_size(PartSize::Target(10))
            .concurrency(ConcurrencySetting::Explicit(2))
            .build()
            .unwrap();
        crate::Client::new(config)
    }

    #[tokio::test]
    async fn test_basic_mpu() {
        let body = Bytes::from_static(b"every adolescent dog goes bonkers early");
        let stream = InputStream::from(body);

        let create_mpu = mock!(aws_sdk_s3::Client::create_multipart_upload).then_output(|| {
            CreateMultipartUploadOutput::builder()
                .upload_id("test-upload")
                .build()
        });
        let upload_1 = mock!(aws_sdk_s3::Client::upload_part)
            .match_requests(|r| r.part_number() == Some(1) && r.content_length() == Some(30))
            .then_output(|| UploadPartOutput::builder().e_tag("etag-1").build());
        let upload_2 = mock!(aws_sdk_s3::Client::upload_part)
            .match_requests(|r| r.part_number() == Some(2) && r.content_length() == Some(9))
            .then_output(|| UploadPartOutput::builder().e_tag("etag-2").build());
        let complete_mpu = mock!(aws_sdk_s3::Client::complete_multipart_upload)
            .match_requests(|r| {
                r.upload_id() == Some("test-upload")
                    && r.multipart_upload().map(|mpu| mpu.parts().len()) == Some(2)
            })
            .then_output(|| CompleteMultipartUploadOutput::builder().build());

        let client = mock_client!(
            aws_sdk_s3,
            RuleMode::MatchAny,
            &[&create_mpu, &upload_1, &upload_2, &complete_mpu]
        );

        let config = crate::Config::builder()
            .client(client)
            .part_size(PartSize::Target(30))
            .build()
            .unwrap();
        let tm = crate::Client::new(config);

        let handle = tm
            .upload()
            .bucket("test-bucket")
            .key("test-key")
            .body(stream)
            .initiate()
            .unwrap();

        let output = handle.join().await.unwrap();
        assert_eq!(Some("test-upload"), output.upload_id());
        assert_eq!(39, output.content_length());
        assert_eq!(2, output.parts().len());
        assert_eq!(1, complete_mpu.num_calls());
    }

    #[tokio::test]
    async fn test_empty_payload_never_touches_backend() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut handle = client(backend.clone())
            .upload()
            .bucket("bucket")
            .key("key")
            .initiate()
            .unwrap();

        assert_eq!(SessionState::Completed, handle.final_state().await);
        let output = handle.join().await.unwrap();
        assert_eq!(None, output.upload_id());
        assert!(output.parts().is_empty());
        assert!(backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_initiate_failure() {
        let backend = Arc::new(InMemoryBackend::new().fail_initiate());
        let mut handle = client(backend.clone())
            .upload()
            .bucket("bucket")
            .key("key")
            .body(InputStream::from_static(b"some data"))
            .failed_multipart_upload_policy(FailedMultipartUploadPolicy::AbortUpload)
            .initiate()
            .unwrap();

        assert_eq!(SessionState::Failed, handle.final_state().await);
        assert_eq!(None, handle.upload_id());
        let err = handle.join().await.unwrap_err();
        assert_eq!(&ErrorKind::InitiateFailed, err.kind());
        // nothing to abort
        assert_eq!(0, backend.abort_calls().await);
        assert!(backend.upload_part_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_finalize_failure_retains_upload_by_default() {
        let backend = Arc::new(InMemoryBackend::new().fail_complete());
        let mut handle = client(backend.clone())
            .upload()
            .bucket("bucket")
            .key("key")
            .body(InputStream::from_static(b"twenty-five bytes of data"))
            .initiate()
            .unwrap();

        assert_eq!(SessionState::Failed, handle.final_state().await);
        assert_eq!(Some("upload-0"), handle.upload_id());
        let err = handle.join().await.unwrap_err();
        assert_eq!(&ErrorKind::FinalizeFailed, err.kind());
        assert_eq!(0, backend.abort_calls().await);
        assert_eq!(1, backend.pending_uploads().await);
    }

    #[tokio::test]
    async fn test_part_failure_aborts_when_configured() {
        let backend = Arc::new(InMemoryBackend::new().fail_part(2));
        let mut handle = client(backend.clone())
            .upload()
            .bucket("bucket")
            .key("key")
            .body(InputStream::from_static(b"twenty-five bytes of data"))
            .failed_multipart_upload_policy(FailedMultipartUploadPolicy::AbortUpload)
            .initiate()
            .unwrap();

        assert_eq!(SessionState::Aborted, handle.final_state().await);
        let err = handle.join().await.unwrap_err();
        match err.kind() {
            ErrorKind::PartFailed(part) => assert_eq!(2, part.part_number()),
            kind => panic!("unexpected error kind {kind:?}"),
        }
        assert!(backend.complete_calls().await.is_empty());
        assert_eq!(1, backend.abort_calls().await);
        assert_eq!(0, backend.pending_uploads().await);
    }

    #[tokio::test]
    async fn test_abort_handle_cancels_session() {
        let backend =
            Arc::new(InMemoryBackend::new().default_part_delay(Duration::from_secs(30)));
        let handle = client(backend.clone())
            .upload()
            .bucket("bucket")
            .key("key")
            .body(InputStream::from_static(b"twenty-five bytes of data"))
            .failed_multipart_upload_policy(FailedMultipartUploadPolicy::AbortUpload)
            .initiate()
            .unwrap();

        // wait until parts are in flight
        while handle.state() != SessionState::Uploading {
            tokio::task::yield_now().await;
        }
        let upload_id = handle.upload_id().map(str::to_owned);
        assert!(upload_id.is_some());

        let aborted = tokio::time::timeout(Duration::from_secs(5), handle.abort())
            .await
            .expect("abort should not wait on in-flight parts")
            .unwrap();
        assert_eq!(upload_id.as_deref(), aborted.upload_id());
        assert_eq!(1, backend.abort_calls().await);
        assert!(backend.complete_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_abort_handle_during_failure_policy_aborts_once() {
        let backend = Arc::new(
            InMemoryBackend::new()
                .fail_part(1)
                .delay_abort(Duration::from_millis(200)),
        );
        let handle = client(backend.clone())
            .upload()
            .bucket("bucket")
            .key("key")
            .body(InputStream::from_static(b"twenty-five bytes of data"))
            .failed_multipart_upload_policy(FailedMultipartUploadPolicy::AbortUpload)
            .initiate()
            .unwrap();

        // the session is now aborting the remote upload
        while handle.state() != SessionState::Failed {
            tokio::task::yield_now().await;
        }

        let aborted = handle.abort().await.unwrap();
        assert_eq!(Some("upload-0"), aborted.upload_id());

        // the abort started by the session still runs to completion
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(1, backend.abort_calls().await);
        assert_eq!(0, backend.pending_uploads().await);
        assert!(backend.complete_calls().await.is_empty());
    }
}
