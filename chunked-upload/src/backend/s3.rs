/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use tracing::Instrument;

use crate::backend::{CompletionToken, MultipartBackend, UploadRef};
use crate::error::BoxError;
use crate::io::PartData;

/// [`MultipartBackend`] for Amazon S3.
///
/// Maps each capability onto the corresponding S3 API:
///
/// * `initiate_upload` - [`CreateMultipartUpload`](https://docs.aws.amazon.com/AmazonS3/latest/API/API_CreateMultipartUpload.html)
/// * `upload_part` - [`UploadPart`](https://docs.aws.amazon.com/AmazonS3/latest/API/API_UploadPart.html)
/// * `complete_upload` - [`CompleteMultipartUpload`](https://docs.aws.amazon.com/AmazonS3/latest/API/API_CompleteMultipartUpload.html)
/// * `abort_upload` - [`AbortMultipartUpload`](https://docs.aws.amazon.com/AmazonS3/latest/API/API_AbortMultipartUpload.html)
///
/// NOTE: S3 requires every part except the last to be at least 5 MiB.
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: aws_sdk_s3::Client,
}

impl S3Backend {
    /// Create a new backend that sends requests with the given client
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// The Amazon S3 client used to send requests
    pub fn client(&self) -> &aws_sdk_s3::Client {
        &self.client
    }
}

#[async_trait]
impl MultipartBackend for S3Backend {
    async fn initiate_upload(&self, bucket: &str, key: &str) -> Result<String, BoxError> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .instrument(tracing::debug_span!("send-create-multipart-upload"))
            .await?;

        resp.upload_id
            .ok_or_else(|| "CreateMultipartUpload response did not include an upload ID".into())
    }

    async fn upload_part(
        &self,
        upload: &UploadRef,
        part: PartData,
    ) -> Result<CompletionToken, BoxError> {
        let part_number = part.part_number();
        let content_length = i64::try_from(part.len())?;

        let resp = self
            .client
            .upload_part()
            .bucket(upload.bucket())
            .key(upload.key())
            .upload_id(upload.upload_id())
            .part_number(i32::try_from(part_number)?)
            .content_length(content_length)
            .body(ByteStream::from(part.into_data()))
            .send()
            .instrument(tracing::debug_span!("send-upload-part", part_number))
            .await?;

        let e_tag = resp.e_tag.ok_or_else(|| -> BoxError {
            format!("UploadPart response for part {part_number} did not include an ETag").into()
        })?;
        Ok(CompletionToken::new(part_number, e_tag))
    }

    async fn complete_upload(
        &self,
        upload: &UploadRef,
        parts: Vec<CompletionToken>,
    ) -> Result<(), BoxError> {
        let completed_parts = parts
            .into_iter()
            .map(|token| {
                Ok(CompletedPart::builder()
                    .part_number(i32::try_from(token.part_number())?)
                    .e_tag(token.e_tag)
                    .build())
            })
            .collect::<Result<Vec<_>, BoxError>>()?;

        self.client
            .complete_multipart_upload()
            .bucket(upload.bucket())
            .key(upload.key())
            .upload_id(upload.upload_id())
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .instrument(tracing::debug_span!("send-complete-multipart-upload"))
            .await?;

        Ok(())
    }

    async fn abort_upload(&self, upload: &UploadRef) -> Result<(), BoxError> {
        self.client
            .abort_multipart_upload()
            .bucket(upload.bucket())
            .key(upload.key())
            .upload_id(upload.upload_id())
            .send()
            .instrument(tracing::debug_span!("send-abort-multipart-upload"))
            .await?;

        Ok(())
    }
}
