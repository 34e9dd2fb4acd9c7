/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::path::PathBuf;

use crate::error::{self, ErrorKind};
use crate::io::stream::RawInputStream;
use crate::io::InputStream;

/// Input stream designed to wrap file based input.
#[derive(Debug)]
pub(super) struct PathBody {
    pub(super) path: PathBuf,
    // The total length of data to read from the file
    pub(super) length: u64,
    // The offset in the file to start reading from
    pub(super) offset: u64,
}

/// Builder for creating an `InputStream` from a file/path, with full control over how the file
/// is read.
///
/// ```no_run
/// use chunked_upload::io::InputStream;
///
/// fn part_of_a_file() -> InputStream {
///     InputStream::read_from()
///         .path("docs/some-large-file.csv")
///         .offset(1024)
///         .length(123_456)
///         .build()
///         .expect("valid path")
/// }
/// ```
#[derive(Debug, Default)]
pub struct PathBodyBuilder {
    path: Option<PathBuf>,
    length: Option<u64>,
    offset: Option<u64>,
}

impl PathBodyBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sets the path to read from.
    ///
    /// NOTE: The length (if not explicitly set) will be retrieved from the file metadata when
    /// calling [`build`](Self::build).
    pub fn path(mut self, path: impl AsRef<std::path::Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Specify the offset to start reading from (in bytes)
    ///
    /// When used in conjunction with `length`, allows for reading a single "chunk" of a file.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Specify the length to read (in bytes).
    ///
    /// By pre-specifying the length, this API skips an additional call to retrieve the size
    /// from file-system metadata.
    ///
    /// When used in conjunction with `offset`, allows for reading a single "chunk" of a file.
    pub fn length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Returns a [`InputStream`] from this builder.
    pub fn build(self) -> Result<InputStream, error::Error> {
        let path = self
            .path
            .ok_or_else(|| error::invalid_input("path is required"))?;
        let offset = self.offset.unwrap_or_default();

        let length = match self.length {
            Some(length) => length,
            None => {
                let metadata = std::fs::metadata(&path)?;
                let file_length = metadata.len();
                if offset > file_length {
                    return Err(error::invalid_input(format!(
                        "offset {offset} is past the end of {} ({file_length} bytes)",
                        path.display()
                    )));
                }
                file_length - offset
            }
        };

        if !path.is_file() {
            return Err(error::Error::new(
                ErrorKind::IOError,
                format!("{} is not a readable file", path.display()),
            ));
        }

        let body = PathBody {
            path,
            length,
            offset,
        };

        Ok(InputStream {
            inner: RawInputStream::Fs(body),
        })
    }
}
