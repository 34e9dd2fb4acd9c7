/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

/* Automatically managed default lints */
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
/* End of automatically managed default lints */
#![warn(
    missing_debug_implementations,
    missing_docs,
    rustdoc::missing_crate_level_docs,
    unreachable_pub,
    rust_2018_idioms
)]

//! Bounded-concurrency chunked upload orchestrator.
//!
//! A single logical payload (an in-memory buffer or a file) is split into ordered parts which
//! are uploaded concurrently against a multipart upload protocol. At most `W` parts are in
//! flight at any time. Once every part has succeeded the per-part completion tokens are sorted
//! by part number and the remote object is finalized.
//!
//! The storage protocol itself is abstracted behind [`MultipartBackend`](crate::backend::MultipartBackend).
//! An Amazon S3 implementation built on `aws-sdk-s3` is provided in [`backend::s3`], along with
//! an [`InMemoryBackend`](crate::backend::in_memory::InMemoryBackend) useful for testing.
//!
//! # Examples
//!
//! ```no_run
//! # async fn example() -> Result<(), chunked_upload::error::Error> {
//! use chunked_upload::io::InputStream;
//!
//! let config = chunked_upload::from_env().load().await?;
//! let client = chunked_upload::Client::new(config);
//!
//! let handle = client
//!     .upload()
//!     .bucket("my-bucket")
//!     .key("my-key")
//!     .body(InputStream::from_path("large-file.bin")?)
//!     .initiate()?;
//!
//! // wait for every part to be uploaded and the object to be finalized
//! let output = handle.join().await?;
//! println!("uploaded {} parts", output.parts().len());
//! # Ok(())
//! # }
//! ```

pub(crate) const DEFAULT_CONCURRENCY: usize = 8;

/// Error types emitted by `chunked-upload`
pub mod error;

/// Common types used by `chunked-upload`
pub mod types;

/// Types and helpers for I/O
pub mod io;

/// Storage backends implementing the multipart upload protocol
pub mod backend;

/// Upload client
pub mod client;

/// Upload operations
pub mod operation;

/// Client configuration
pub mod config;

/// Internal runtime components
pub(crate) mod runtime;

/// Metrics
pub mod metrics;

pub use self::client::Client;
use self::config::loader::ConfigLoader;
pub use self::config::Config;

/// Create a config loader backed by an Amazon S3 client loaded from the environment
pub fn from_env() -> ConfigLoader {
    ConfigLoader::default()
}
