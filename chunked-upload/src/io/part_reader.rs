/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::path::PathBuf;

use bytes::{Bytes, BytesMut};

use crate::error;
use crate::io::part_planner::{PartPlan, PartRange, PartRanges};
use crate::io::stream::RawInputStream;
use crate::io::InputStream;

/// Contents and metadata for a single part of a multipart upload.
///
/// The data is a cheaply cloneable, read-only view of the payload.
#[derive(Debug, Clone)]
pub struct PartData {
    // 1-indexed
    pub(crate) part_number: u64,
    pub(crate) offset: u64,
    pub(crate) data: Bytes,
}

impl PartData {
    pub(crate) fn new(part_number: u64, offset: u64, data: impl Into<Bytes>) -> Self {
        Self {
            part_number,
            offset,
            data: data.into(),
        }
    }

    /// The (1-based) part number
    pub fn part_number(&self) -> u64 {
        self.part_number
    }

    /// Offset of this part relative to the start of the payload
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of bytes in this part
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Returns true if this part holds no data
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The part contents
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Consume the part and return its contents
    pub fn into_data(self) -> Bytes {
        self.data
    }
}

/// Reads the parts of a [`PartPlan`] from an [`InputStream`] in order.
///
/// Each part is yielded exactly once; the reader cannot be rewound.
#[derive(Debug)]
pub(crate) struct PartReader {
    source: Source,
    ranges: PartRanges,
}

#[derive(Debug)]
enum Source {
    Bytes(Bytes),
    Fs { path: PathBuf, base_offset: u64 },
}

impl PartReader {
    pub(crate) fn new(stream: InputStream, plan: &PartPlan) -> Self {
        let source = match stream.inner {
            RawInputStream::Buf(buf) => Source::Bytes(buf),
            RawInputStream::Fs(path_body) => Source::Fs {
                path: path_body.path,
                base_offset: path_body.offset,
            },
        };
        Self {
            source,
            ranges: plan.ranges(),
        }
    }

    /// Read the next part, returning `None` once every planned part has been read.
    pub(crate) async fn next_part(&mut self) -> Result<Option<PartData>, error::Error> {
        let range = match self.ranges.next() {
            Some(range) => range,
            None => return Ok(None),
        };

        let part = match &self.source {
            Source::Bytes(buf) => {
                let start = range.offset as usize;
                let end = start + range.length as usize;
                if end > buf.len() {
                    return Err(error::Error::new(
                        error::ErrorKind::IOError,
                        format!(
                            "part {} ends at byte {end} but the buffer is only {} bytes",
                            range.part_number,
                            buf.len()
                        ),
                    ));
                }
                PartData::new(range.part_number, range.offset, buf.slice(start..end))
            }
            Source::Fs { path, base_offset } => {
                read_file_part(path.clone(), *base_offset, range).await?
            }
        };

        Ok(Some(part))
    }
}

async fn read_file_part(
    path: PathBuf,
    base_offset: u64,
    range: PartRange,
) -> Result<PartData, error::Error> {
    let handle = tokio::task::spawn_blocking(move || {
        // TODO - reuse part buffers across reads instead of allocating one per part
        let mut dst = BytesMut::zeroed(range.length as usize);
        file_util::read_file_chunk_sync(&mut dst, path, base_offset + range.offset)?;
        Ok::<PartData, error::Error>(PartData::new(range.part_number, range.offset, dst.freeze()))
    });

    handle.await?
}

mod file_util {
    #[cfg(unix)]
    pub(super) use unix::read_file_chunk_sync;
    #[cfg(windows)]
    pub(super) use windows::read_file_chunk_sync;

    #[cfg(unix)]
    mod unix {
        use std::fs::File;
        use std::io;
        use std::os::unix::fs::FileExt;
        use std::path::Path;

        pub(crate) fn read_file_chunk_sync(
            dst: &mut [u8],
            path: impl AsRef<Path>,
            offset: u64,
        ) -> Result<(), io::Error> {
            let file = File::open(path)?;
            file.read_exact_at(dst, offset)
        }
    }

    #[cfg(windows)]
    mod windows {
        use std::fs::File;
        use std::io;
        use std::io::{Read, Seek, SeekFrom};
        use std::path::Path;

        pub(crate) fn read_file_chunk_sync(
            dst: &mut [u8],
            path: impl AsRef<Path>,
            offset: u64,
        ) -> Result<(), io::Error> {
            let mut file = File::open(path)?;
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(dst)
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use bytes::Bytes;
    use tempfile::NamedTempFile;

    use super::{PartData, PartReader};
    use crate::error::ErrorKind;
    use crate::io::{InputStream, PartPlan};

    async fn collect_parts(mut reader: PartReader) -> Vec<PartData> {
        let mut parts = Vec::new();
        let mut expected_part_number = 1;
        while let Some(part) = reader.next_part().await.unwrap() {
            assert_eq!(expected_part_number, part.part_number);
            expected_part_number += 1;
            parts.push(part);
        }
        parts
    }

    #[tokio::test]
    async fn test_bytes_part_reader() {
        let data = Bytes::from("a lep is a ball, a tay is a hammer, a flix is a comb");
        let plan = PartPlan::new(data.len() as u64, 5).unwrap();
        let expected = data.chunks(5).collect::<Vec<_>>();
        let reader = PartReader::new(InputStream::from(data.clone()), &plan);
        let parts = collect_parts(reader).await;
        let actual = parts.iter().map(|p| p.data.as_ref()).collect::<Vec<_>>();

        assert_eq!(expected, actual);
        assert_eq!(50, parts.last().unwrap().offset());
    }

    #[tokio::test]
    async fn test_reader_is_not_restartable() {
        let plan = PartPlan::new(4, 2).unwrap();
        let mut reader = PartReader::new(InputStream::from_static(b"abcd"), &plan);
        assert!(reader.next_part().await.unwrap().is_some());
        assert!(reader.next_part().await.unwrap().is_some());
        assert!(reader.next_part().await.unwrap().is_none());
        assert!(reader.next_part().await.unwrap().is_none());
    }

    async fn path_reader_test(limit: Option<usize>, offset: Option<usize>) {
        let part_size = 5;
        let mut tmp = NamedTempFile::new().unwrap();
        let contents = b"a lep is a ball, a tay is a hammer, a flix is a comb";
        tmp.write_all(contents).unwrap();

        let start = offset.unwrap_or_default();
        let end = limit.unwrap_or(contents.len());
        let mut builder = InputStream::read_from().path(tmp.path());
        if limit.is_some() {
            builder = builder.length((end - start) as u64);
        }
        if let Some(offset) = offset {
            builder = builder.offset(offset as u64);
        }

        let expected = contents[start..end].chunks(part_size).collect::<Vec<_>>();

        let stream = builder.build().unwrap();
        let plan = PartPlan::new(stream.content_length(), part_size as u64).unwrap();
        let parts = collect_parts(PartReader::new(stream, &plan)).await;
        let actual = parts.iter().map(|p| p.data.as_ref()).collect::<Vec<_>>();

        assert_eq!(expected, actual);
    }

    #[tokio::test]
    async fn test_path_part_reader() {
        path_reader_test(None, None).await;
    }

    #[tokio::test]
    async fn test_path_part_reader_with_offset() {
        path_reader_test(None, Some(8)).await;
    }

    #[tokio::test]
    async fn test_path_part_reader_with_explicit_length() {
        path_reader_test(Some(12), None).await;
    }

    #[tokio::test]
    async fn test_path_part_reader_with_length_and_offset() {
        path_reader_test(Some(23), Some(4)).await;
    }

    #[tokio::test]
    async fn test_short_file_is_io_error() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"only ten b").unwrap();
        // claim more data than the file holds
        let stream = InputStream::read_from()
            .path(tmp.path())
            .length(20)
            .build()
            .unwrap();
        let plan = PartPlan::new(stream.content_length(), 8).unwrap();
        let mut reader = PartReader::new(stream, &plan);

        assert_eq!(8, reader.next_part().await.unwrap().unwrap().len());
        let err = reader.next_part().await.unwrap_err();
        assert_eq!(&ErrorKind::IOError, err.kind());
    }
}
