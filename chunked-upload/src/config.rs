/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use crate::backend::s3::S3Backend;
use crate::backend::{MultipartBackend, SharedBackend};
use crate::error;
use crate::types::{
    AdmissionMode, ConcurrencySetting, FailedMultipartUploadPolicy, FailedPartPolicy, PartSize,
};

/// Load configuration (and an Amazon S3 backend) from the environment
pub mod loader;

/// Configuration for a [`Client`](crate::client::Client)
#[derive(Debug, Clone)]
pub struct Config {
    target_part_size: PartSize,
    concurrency: ConcurrencySetting,
    admission_mode: AdmissionMode,
    failed_part_policy: FailedPartPolicy,
    failed_multipart_upload_policy: FailedMultipartUploadPolicy,
    backend: SharedBackend,
}

impl Config {
    /// Create a new `Config` builder
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Returns a reference to the target part size to use for uploads
    pub fn part_size(&self) -> &PartSize {
        &self.target_part_size
    }

    /// Returns the maximum number of part uploads in flight for a single upload
    pub fn concurrency(&self) -> &ConcurrencySetting {
        &self.concurrency
    }

    /// Returns how new part uploads are admitted once the concurrency window is full
    pub fn admission_mode(&self) -> &AdmissionMode {
        &self.admission_mode
    }

    /// Returns the policy for part uploads still in flight when another part fails
    pub fn failed_part_policy(&self) -> &FailedPartPolicy {
        &self.failed_part_policy
    }

    /// Returns the default policy for the remote multipart upload when an upload fails
    pub fn failed_multipart_upload_policy(&self) -> &FailedMultipartUploadPolicy {
        &self.failed_multipart_upload_policy
    }

    /// The backend that multipart upload requests are sent to
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }
}

/// Fluent style builder for [Config]
#[derive(Debug, Clone, Default)]
pub struct Builder {
    target_part_size: PartSize,
    concurrency: ConcurrencySetting,
    admission_mode: AdmissionMode,
    failed_part_policy: FailedPartPolicy,
    failed_multipart_upload_policy: FailedMultipartUploadPolicy,
    backend: Option<SharedBackend>,
}

impl Builder {
    /// The target size of each part.
    ///
    /// Every part except the last one will be exactly this size. The value is not adjusted to
    /// fit any backend limits (e.g. the 5 MiB minimum part size of Amazon S3).
    ///
    /// Default is [PartSize::Auto]
    pub fn part_size(mut self, part_size: PartSize) -> Self {
        self.target_part_size = part_size;
        self
    }

    /// Set the maximum number of part uploads in flight for a single upload.
    ///
    /// Default is [ConcurrencySetting::Auto].
    pub fn concurrency(mut self, concurrency: ConcurrencySetting) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set how new part uploads are admitted once the concurrency window is full.
    ///
    /// Default is [AdmissionMode::FreeSlot].
    pub fn admission_mode(mut self, admission_mode: AdmissionMode) -> Self {
        self.admission_mode = admission_mode;
        self
    }

    /// Set the policy for part uploads still in flight when another part fails.
    ///
    /// Default is [FailedPartPolicy::DrainInFlight].
    pub fn failed_part_policy(mut self, policy: FailedPartPolicy) -> Self {
        self.failed_part_policy = policy;
        self
    }

    /// Set the default policy for the remote multipart upload when an upload fails.
    ///
    /// Can be overridden per upload. Default is [FailedMultipartUploadPolicy::Retain].
    pub fn failed_multipart_upload_policy(mut self, policy: FailedMultipartUploadPolicy) -> Self {
        self.failed_multipart_upload_policy = policy;
        self
    }

    /// Set the backend to send multipart upload requests to.
    pub fn backend(mut self, backend: impl MultipartBackend) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Set an explicit S3 client to use.
    ///
    /// Shorthand for `.backend(S3Backend::new(client))`.
    pub fn client(self, client: aws_sdk_s3::Client) -> Self {
        self.backend(S3Backend::new(client))
    }

    /// Consumes the builder and constructs a [`Config`](crate::config::Config)
    pub fn build(self) -> Result<Config, error::Error> {
        let backend = self
            .backend
            .ok_or_else(|| error::invalid_input("a backend or S3 client must be set"))?;

        if let PartSize::Target(0) = self.target_part_size {
            return Err(error::invalid_input("part size must be greater than zero"));
        }
        if let ConcurrencySetting::Explicit(0) = self.concurrency {
            return Err(error::invalid_input("concurrency must be greater than zero"));
        }

        Ok(Config {
            target_part_size: self.target_part_size,
            concurrency: self.concurrency,
            admission_mode: self.admission_mode,
            failed_part_policy: self.failed_part_policy,
            failed_multipart_upload_policy: self.failed_multipart_upload_policy,
            backend,
        })
    }
}
