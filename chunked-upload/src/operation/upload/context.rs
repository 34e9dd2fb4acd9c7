/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use crate::backend::{SharedBackend, UploadRef};
use crate::metrics::TransferMetrics;

/// Internal context used to drive the parts of a single initiated upload
#[derive(Debug, Clone)]
pub(crate) struct UploadContext {
    /// reference to client handle used to do actual work
    pub(crate) handle: Arc<crate::client::Handle>,
    /// the remote multipart upload session
    upload: Arc<UploadRef>,
}

impl UploadContext {
    pub(crate) fn new(handle: Arc<crate::client::Handle>, upload: UploadRef) -> Self {
        Self {
            handle,
            upload: Arc::new(upload),
        }
    }

    /// The backend to send requests to
    pub(crate) fn backend(&self) -> &SharedBackend {
        self.handle.config.backend()
    }

    /// The multipart upload session being driven
    pub(crate) fn upload(&self) -> &UploadRef {
        &self.upload
    }

    pub(crate) fn metrics(&self) -> &TransferMetrics {
        &self.handle.metrics
    }
}
