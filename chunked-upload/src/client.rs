/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use crate::metrics::unit::ByteUnit;
use crate::metrics::TransferMetrics;
use crate::types::{ConcurrencySetting, PartSize};
use crate::{Config, DEFAULT_CONCURRENCY};

/// Chunked upload client.
///
/// Cheap to clone, clones share the same configuration and metrics.
#[derive(Debug, Clone)]
pub struct Client {
    pub(crate) handle: Arc<Handle>,
}

/// Whatever is needed to carry out operations, e.g. config, metrics, etc
#[derive(Debug)]
pub(crate) struct Handle {
    pub(crate) config: Config,
    pub(crate) metrics: TransferMetrics,
}

impl Handle {
    /// Get the concrete number of part uploads allowed in flight for a single upload.
    pub(crate) fn num_workers(&self) -> usize {
        match self.config.concurrency() {
            ConcurrencySetting::Explicit(concurrency) => *concurrency,
            ConcurrencySetting::Auto => DEFAULT_CONCURRENCY,
        }
    }

    /// Get the concrete target part size to use for uploads
    pub(crate) fn upload_part_size_bytes(&self) -> u64 {
        part_size_bytes(self.config.part_size())
    }
}

pub(crate) fn part_size_bytes(part_size: &PartSize) -> u64 {
    match part_size {
        PartSize::Auto => 8 * ByteUnit::Mebibyte.as_bytes_u64(),
        PartSize::Target(explicit) => *explicit,
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        tracing::debug!(
            "client metrics summary - parts dispatched: {}, completed: {}, failed: {}, transferred: {}",
            self.metrics.parts_dispatched(),
            self.metrics.parts_completed(),
            self.metrics.parts_failed(),
            ByteUnit::display(self.metrics.bytes_transferred())
        );
    }
}

impl Client {
    /// Creates a new client from an upload config.
    pub fn new(config: Config) -> Client {
        let handle = Arc::new(Handle {
            config,
            metrics: TransferMetrics::new(),
        });
        Client { handle }
    }

    /// Returns the client's configuration
    pub fn config(&self) -> &Config {
        &self.handle.config
    }

    /// Returns the client's metrics, aggregated across every upload it has issued
    pub fn metrics(&self) -> &TransferMetrics {
        &self.handle.metrics
    }

    /// Upload a single object.
    ///
    /// Constructs a fluent builder for the
    /// [`Upload`](crate::operation::upload::builders::UploadFluentBuilder) operation.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::error::Error;
    /// use std::path::Path;
    /// use chunked_upload::io::InputStream;
    ///
    /// async fn upload_file(
    ///     client: &chunked_upload::Client,
    ///     path: impl AsRef<Path>
    /// ) -> Result<(), Box<dyn Error>> {
    ///     let stream = InputStream::from_path(path)?;
    ///     let handle = client.upload()
    ///         .bucket("my-bucket")
    ///         .key("my-key")
    ///         .body(stream)
    ///         .initiate()?;
    ///
    ///     // initiate() will return before the transfer is complete.
    ///     // Call the `join()` method on the returned handle to drive the transfer to completion.
    ///     let response = handle.join().await?;
    ///     // ... do something with response
    ///     Ok(())
    /// }
    ///
    /// ```
    pub fn upload(&self) -> crate::operation::upload::builders::UploadFluentBuilder {
        crate::operation::upload::builders::UploadFluentBuilder::new(self.handle.clone())
    }
}
