/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::io::PartData;

/// Amazon S3 backend built on `aws-sdk-s3`
pub mod s3;

/// In-memory backend with fault injection, useful for testing
pub mod in_memory;

/// Identifies a multipart upload session that has been initiated on a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRef {
    bucket: String,
    key: String,
    upload_id: String,
}

impl UploadRef {
    /// Create a reference to an existing multipart upload session
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
        }
    }

    /// The bucket the object is being uploaded to
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The key the object is being uploaded to
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The backend assigned upload ID
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }
}

/// Receipt returned by the backend for a successfully uploaded part.
///
/// Every token is required (in ascending part number order) to complete the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionToken {
    part_number: u64,
    e_tag: String,
}

impl CompletionToken {
    /// Create a new token for the given part
    pub fn new(part_number: u64, e_tag: impl Into<String>) -> Self {
        Self {
            part_number,
            e_tag: e_tag.into(),
        }
    }

    /// The (1-based) part number this token was issued for
    pub fn part_number(&self) -> u64 {
        self.part_number
    }

    /// The opaque entity tag the backend assigned to the part
    pub fn e_tag(&self) -> &str {
        &self.e_tag
    }
}

/// The multipart upload protocol an upload is driven against.
///
/// Errors returned from these methods are classified by the caller: a failure from
/// `initiate_upload` surfaces as [`ErrorKind::InitiateFailed`](crate::error::ErrorKind::InitiateFailed),
/// from `upload_part` as [`ErrorKind::PartFailed`](crate::error::ErrorKind::PartFailed) and from
/// `complete_upload` as [`ErrorKind::FinalizeFailed`](crate::error::ErrorKind::FinalizeFailed).
///
/// Implementations must be safe to call concurrently; `upload_part` is invoked for many parts
/// of the same upload at once.
#[async_trait]
pub trait MultipartBackend: fmt::Debug + Send + Sync + 'static {
    /// Start a new multipart upload session, returning the upload ID
    async fn initiate_upload(&self, bucket: &str, key: &str) -> Result<String, BoxError>;

    /// Upload a single part
    async fn upload_part(
        &self,
        upload: &UploadRef,
        part: PartData,
    ) -> Result<CompletionToken, BoxError>;

    /// Complete the upload with the given tokens.
    ///
    /// `parts` is always sorted in ascending part number order.
    async fn complete_upload(
        &self,
        upload: &UploadRef,
        parts: Vec<CompletionToken>,
    ) -> Result<(), BoxError>;

    /// Abort the upload, discarding any uploaded parts
    async fn abort_upload(&self, upload: &UploadRef) -> Result<(), BoxError>;
}

/// A reference-counted backend that can be shared between uploads.
pub type SharedBackend = Arc<dyn MultipartBackend>;

#[async_trait]
impl<T> MultipartBackend for Arc<T>
where
    T: MultipartBackend + ?Sized,
{
    async fn initiate_upload(&self, bucket: &str, key: &str) -> Result<String, BoxError> {
        self.as_ref().initiate_upload(bucket, key).await
    }

    async fn upload_part(
        &self,
        upload: &UploadRef,
        part: PartData,
    ) -> Result<CompletionToken, BoxError> {
        self.as_ref().upload_part(upload, part).await
    }

    async fn complete_upload(
        &self,
        upload: &UploadRef,
        parts: Vec<CompletionToken>,
    ) -> Result<(), BoxError> {
        self.as_ref().complete_upload(upload, parts).await
    }

    async fn abort_upload(&self, upload: &UploadRef) -> Result<(), BoxError> {
        self.as_ref().abort_upload(upload).await
    }
}
