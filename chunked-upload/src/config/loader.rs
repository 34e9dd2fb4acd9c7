/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use aws_types::region::Region;

use crate::config::Builder;
use crate::error;
use crate::types::{
    AdmissionMode, ConcurrencySetting, FailedMultipartUploadPolicy, FailedPartPolicy, PartSize,
};
use crate::Config;

/// Load upload [`Config`] from the environment.
///
/// Uploads are sent to Amazon S3 using a client configured from the default AWS configuration
/// sources (environment variables, shared config files, etc).
#[derive(Default, Debug)]
pub struct ConfigLoader {
    builder: Builder,
    region: Option<Region>,
}

impl ConfigLoader {
    /// The target size of each part.
    ///
    /// Default is [PartSize::Auto]
    pub fn part_size(mut self, part_size: PartSize) -> Self {
        self.builder = self.builder.part_size(part_size);
        self
    }

    /// Set the maximum number of part uploads in flight for a single upload.
    ///
    /// Default is [ConcurrencySetting::Auto].
    pub fn concurrency(mut self, concurrency: ConcurrencySetting) -> Self {
        self.builder = self.builder.concurrency(concurrency);
        self
    }

    /// Set how new part uploads are admitted once the concurrency window is full.
    pub fn admission_mode(mut self, admission_mode: AdmissionMode) -> Self {
        self.builder = self.builder.admission_mode(admission_mode);
        self
    }

    /// Set the policy for part uploads still in flight when another part fails.
    pub fn failed_part_policy(mut self, policy: FailedPartPolicy) -> Self {
        self.builder = self.builder.failed_part_policy(policy);
        self
    }

    /// Set the default policy for the remote multipart upload when an upload fails.
    pub fn failed_multipart_upload_policy(mut self, policy: FailedMultipartUploadPolicy) -> Self {
        self.builder = self.builder.failed_multipart_upload_policy(policy);
        self
    }

    /// Override the region the S3 client is configured for.
    ///
    /// By default the region is resolved from the environment.
    pub fn region(mut self, region: impl Into<Region>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Load the default configuration
    ///
    /// If fields have been overridden during builder construction, the override values will be
    /// used. Otherwise, the default values for each field will be provided.
    pub async fn load(self) -> Result<Config, error::Error> {
        let mut loader = aws_config::from_env();
        if let Some(region) = self.region {
            loader = loader.region(region);
        }
        let shared_config = loader.load().await;
        let s3_client = aws_sdk_s3::Client::new(&shared_config);
        self.builder.client(s3_client).build()
    }
}
