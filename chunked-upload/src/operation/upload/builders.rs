/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use crate::error;
use crate::io::InputStream;
use crate::types::{FailedMultipartUploadPolicy, PartSize};

use super::{UploadHandle, UploadInputBuilder};

/// Fluent builder for constructing a single chunked upload
#[derive(Debug)]
pub struct UploadFluentBuilder {
    handle: Arc<crate::client::Handle>,
    inner: UploadInputBuilder,
}

impl UploadFluentBuilder {
    pub(crate) fn new(handle: Arc<crate::client::Handle>) -> Self {
        Self {
            handle,
            inner: ::std::default::Default::default(),
        }
    }

    /// Initiate the upload.
    ///
    /// Returns as soon as the upload has been validated and scheduled. Use the returned
    /// [`UploadHandle`] to drive it to completion. Must be called from within a Tokio runtime.
    pub fn initiate(self) -> Result<UploadHandle, error::Error> {
        let input = self.inner.build()?;
        crate::operation::upload::Upload::orchestrate(self.handle, input)
    }

    /// Object data.
    pub fn body(mut self, body: InputStream) -> Self {
        self.inner = self.inner.body(body);
        self
    }

    /// Object data.
    pub fn get_body(&self) -> &Option<InputStream> {
        &self.inner.body
    }

    /// The bucket name to upload to.
    pub fn bucket(mut self, input: impl Into<String>) -> Self {
        self.inner = self.inner.bucket(input);
        self
    }

    /// The bucket name to upload to.
    pub fn get_bucket(&self) -> &Option<String> {
        &self.inner.bucket
    }

    /// The object key.
    pub fn key(mut self, input: impl Into<String>) -> Self {
        self.inner = self.inner.key(input);
        self
    }

    /// The object key.
    pub fn get_key(&self) -> &Option<String> {
        &self.inner.key
    }

    /// Override the client's target part size for this upload.
    pub fn part_size(mut self, input: PartSize) -> Self {
        self.inner = self.inner.part_size(input);
        self
    }

    /// Override the client's target part size for this upload.
    pub fn get_part_size(&self) -> &Option<PartSize> {
        &self.inner.part_size
    }

    /// Override what happens to the remote multipart upload when this upload fails.
    pub fn failed_multipart_upload_policy(mut self, input: FailedMultipartUploadPolicy) -> Self {
        self.inner = self.inner.failed_multipart_upload_policy(input);
        self
    }

    /// Override what happens to the remote multipart upload when this upload fails.
    pub fn get_failed_multipart_upload_policy(&self) -> &Option<FailedMultipartUploadPolicy> {
        &self.inner.failed_multipart_upload_policy
    }
}

impl crate::operation::upload::input::UploadInputBuilder {
    /// Initiate an upload with this input using the given client.
    pub fn initiate_with(self, client: &crate::Client) -> Result<UploadHandle, error::Error> {
        let mut fluent_builder = client.upload();
        fluent_builder.inner = self;
        fluent_builder.initiate()
    }
}
