/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::backend::CompletionToken;

/// Response type for a completed chunked upload
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutput {
    pub(crate) upload_id: Option<String>,
    pub(crate) bucket: String,
    pub(crate) key: String,
    pub(crate) parts: Vec<CompletionToken>,
    pub(crate) content_length: u64,
}

impl UploadOutput {
    /// The multipart upload ID.
    ///
    /// Not present for an empty payload since no remote session is started.
    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    /// The bucket the object was uploaded to
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The key the object was uploaded to
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The completion tokens the upload was finalized with, in ascending part number order
    pub fn parts(&self) -> &[CompletionToken] {
        &self.parts
    }

    /// Total number of payload bytes uploaded
    pub fn content_length(&self) -> u64 {
        self.content_length
    }
}
