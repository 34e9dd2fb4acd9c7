/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::error;
use crate::io::InputStream;
use crate::types::{FailedMultipartUploadPolicy, PartSize};

/// Input type for a single chunked upload
#[derive(Debug)]
#[non_exhaustive]
pub struct UploadInput {
    /// Object data
    pub body: InputStream,
    /// The bucket to upload to
    pub bucket: String,
    /// The key to upload to
    pub key: String,
    /// Part size override for this upload
    pub part_size: Option<PartSize>,
    /// Failure policy override for this upload
    pub failed_multipart_upload_policy: Option<FailedMultipartUploadPolicy>,
}

impl UploadInput {
    /// Creates a new builder-style object to manufacture [`UploadInput`].
    pub fn builder() -> UploadInputBuilder {
        UploadInputBuilder::default()
    }

    /// Take the body of this upload, leaving an empty stream in its place
    pub(crate) fn take_body(&mut self) -> InputStream {
        std::mem::take(&mut self.body)
    }
}

/// A builder for [`UploadInput`].
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct UploadInputBuilder {
    pub(crate) body: Option<InputStream>,
    pub(crate) bucket: Option<String>,
    pub(crate) key: Option<String>,
    pub(crate) part_size: Option<PartSize>,
    pub(crate) failed_multipart_upload_policy: Option<FailedMultipartUploadPolicy>,
}

impl UploadInputBuilder {
    /// Object data. Defaults to an empty payload.
    pub fn body(mut self, input: InputStream) -> Self {
        self.body = Some(input);
        self
    }

    /// The bucket name to upload to. Required.
    pub fn bucket(mut self, input: impl Into<String>) -> Self {
        self.bucket = Some(input.into());
        self
    }

    /// The object key. Required.
    pub fn key(mut self, input: impl Into<String>) -> Self {
        self.key = Some(input.into());
        self
    }

    /// Override the client's part size for this upload.
    pub fn part_size(mut self, input: PartSize) -> Self {
        self.part_size = Some(input);
        self
    }

    /// Override the client's failed multipart upload policy for this upload.
    pub fn failed_multipart_upload_policy(mut self, input: FailedMultipartUploadPolicy) -> Self {
        self.failed_multipart_upload_policy = Some(input);
        self
    }

    /// Consumes the builder and constructs an [`UploadInput`].
    pub fn build(self) -> Result<UploadInput, error::Error> {
        let bucket = self
            .bucket
            .filter(|bucket| !bucket.is_empty())
            .ok_or_else(|| error::invalid_input("bucket is required"))?;
        let key = self
            .key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| error::invalid_input("key is required"))?;

        Ok(UploadInput {
            body: self.body.unwrap_or_default(),
            bucket,
            key,
            part_size: self.part_size,
            failed_multipart_upload_policy: self.failed_multipart_upload_policy,
        })
    }
}
