/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::{Mutex, RwLock};

use crate::backend::{CompletionToken, MultipartBackend, UploadRef};
use crate::error::BoxError;
use crate::io::PartData;

/// A call received by an [`InMemoryBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendCall {
    /// `initiate_upload` was called
    InitiateUpload {
        /// Target bucket
        bucket: String,
        /// Target key
        key: String,
    },
    /// `upload_part` was called
    UploadPart {
        /// Upload the part belongs to
        upload_id: String,
        /// The part number being uploaded
        part_number: u64,
    },
    /// `complete_upload` was called
    CompleteUpload {
        /// Upload being completed
        upload_id: String,
        /// Part numbers in the order they were given
        part_numbers: Vec<u64>,
    },
    /// `abort_upload` was called
    AbortUpload {
        /// Upload being aborted
        upload_id: String,
    },
}

#[derive(Debug, Default)]
struct Faults {
    fail_initiate: bool,
    fail_complete: bool,
    failing_parts: HashSet<u64>,
    part_delays: HashMap<u64, Duration>,
    default_part_delay: Option<Duration>,
    abort_delay: Option<Duration>,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    // part number -> (etag, content)
    parts: HashMap<u64, (String, Bytes)>,
}

/// A [`MultipartBackend`] that keeps everything in memory.
///
/// Parts are stored per upload ID and assembled into an object when the upload is
/// completed. Faults and delays are configured up front, before the backend is handed to a
/// [`Config`](crate::Config):
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use chunked_upload::backend::in_memory::InMemoryBackend;
///
/// let backend = Arc::new(
///     InMemoryBackend::new()
///         .fail_part(3)
///         .delay_part(1, Duration::from_millis(50)),
/// );
/// # let _ = backend;
/// ```
///
/// Keep a clone of the `Arc` around to inspect the call log and stored objects afterwards.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    faults: Faults,
    next_upload_id: AtomicU64,
    uploads: RwLock<HashMap<String, PendingUpload>>,
    // (bucket, key) -> content
    objects: RwLock<HashMap<(String, String), Bytes>>,
    calls: Mutex<Vec<BackendCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryBackend {
    /// Create a new backend with no injected faults
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `upload_part` call for the given part number
    pub fn fail_part(mut self, part_number: u64) -> Self {
        self.faults.failing_parts.insert(part_number);
        self
    }

    /// Fail every `initiate_upload` call
    pub fn fail_initiate(mut self) -> Self {
        self.faults.fail_initiate = true;
        self
    }

    /// Fail every `complete_upload` call
    pub fn fail_complete(mut self) -> Self {
        self.faults.fail_complete = true;
        self
    }

    /// Delay `upload_part` for the given part number before it returns
    pub fn delay_part(mut self, part_number: u64, delay: Duration) -> Self {
        self.faults.part_delays.insert(part_number, delay);
        self
    }

    /// Delay every `upload_part` call that has no part specific delay
    pub fn default_part_delay(mut self, delay: Duration) -> Self {
        self.faults.default_part_delay = Some(delay);
        self
    }

    /// Delay `abort_upload` before the upload is discarded
    pub fn delay_abort(mut self, delay: Duration) -> Self {
        self.faults.abort_delay = Some(delay);
        self
    }

    /// The completed object stored at `bucket`/`key`, if any
    pub async fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned()
    }

    /// Every call received so far, in the order received
    pub async fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().await.clone()
    }

    /// Part numbers of every `upload_part` call, in the order received
    pub async fn upload_part_calls(&self) -> Vec<u64> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                BackendCall::UploadPart { part_number, .. } => Some(*part_number),
                _ => None,
            })
            .collect()
    }

    /// Part numbers given to each `complete_upload` call
    pub async fn complete_calls(&self) -> Vec<Vec<u64>> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                BackendCall::CompleteUpload { part_numbers, .. } => Some(part_numbers.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `abort_upload` calls received
    pub async fn abort_calls(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| matches!(call, BackendCall::AbortUpload { .. }))
            .count()
    }

    /// Number of uploads that have been initiated but neither completed nor aborted
    pub async fn pending_uploads(&self) -> usize {
        self.uploads.read().await.len()
    }

    /// The maximum number of `upload_part` calls ever observed running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn part_delay(&self, part_number: u64) -> Option<Duration> {
        self.faults
            .part_delays
            .get(&part_number)
            .copied()
            .or(self.faults.default_part_delay)
    }

    async fn record(&self, call: BackendCall) {
        self.calls.lock().await.push(call);
    }
}

// decrements the in-flight count even if the part upload future is dropped early
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MultipartBackend for InMemoryBackend {
    async fn initiate_upload(&self, bucket: &str, key: &str) -> Result<String, BoxError> {
        self.record(BackendCall::InitiateUpload {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        })
        .await;

        if self.faults.fail_initiate {
            return Err("injected initiate failure".into());
        }

        let id = self.next_upload_id.fetch_add(1, Ordering::SeqCst);
        let upload_id = format!("upload-{id}");
        self.uploads.write().await.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                parts: HashMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        upload: &UploadRef,
        part: PartData,
    ) -> Result<CompletionToken, BoxError> {
        let part_number = part.part_number();
        self.record(BackendCall::UploadPart {
            upload_id: upload.upload_id().to_owned(),
            part_number,
        })
        .await;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.part_delay(part_number) {
            tokio::time::sleep(delay).await;
        }

        if self.faults.failing_parts.contains(&part_number) {
            return Err(format!("injected failure for part {part_number}").into());
        }

        let mut uploads = self.uploads.write().await;
        let pending = uploads
            .get_mut(upload.upload_id())
            .ok_or_else(|| -> BoxError { format!("no such upload: {}", upload.upload_id()).into() })?;
        let e_tag = format!("\"{}-{part_number}\"", upload.upload_id());
        pending
            .parts
            .insert(part_number, (e_tag.clone(), part.into_data()));

        Ok(CompletionToken::new(part_number, e_tag))
    }

    async fn complete_upload(
        &self,
        upload: &UploadRef,
        parts: Vec<CompletionToken>,
    ) -> Result<(), BoxError> {
        self.record(BackendCall::CompleteUpload {
            upload_id: upload.upload_id().to_owned(),
            part_numbers: parts.iter().map(CompletionToken::part_number).collect(),
        })
        .await;

        if self.faults.fail_complete {
            return Err("injected complete failure".into());
        }

        if parts.is_empty() {
            return Err("at least one part is required to complete an upload".into());
        }
        if parts
            .windows(2)
            .any(|w| w[0].part_number() >= w[1].part_number())
        {
            return Err("parts must be given in strictly ascending part number order".into());
        }

        let mut uploads = self.uploads.write().await;
        let pending = uploads
            .get(upload.upload_id())
            .ok_or_else(|| -> BoxError { format!("no such upload: {}", upload.upload_id()).into() })?;

        let mut combined = BytesMut::new();
        for token in &parts {
            match pending.parts.get(&token.part_number()) {
                Some((e_tag, data)) if e_tag == token.e_tag() => combined.extend_from_slice(data),
                Some(_) => {
                    return Err(format!("etag mismatch for part {}", token.part_number()).into())
                }
                None => return Err(format!("no such part: {}", token.part_number()).into()),
            }
        }

        // validated above, the upload is known to exist
        if let Some(pending) = uploads.remove(upload.upload_id()) {
            self.objects
                .write()
                .await
                .insert((pending.bucket, pending.key), combined.freeze());
        }
        Ok(())
    }

    async fn abort_upload(&self, upload: &UploadRef) -> Result<(), BoxError> {
        self.record(BackendCall::AbortUpload {
            upload_id: upload.upload_id().to_owned(),
        })
        .await;

        if let Some(delay) = self.faults.abort_delay {
            tokio::time::sleep(delay).await;
        }

        match self.uploads.write().await.remove(upload.upload_id()) {
            Some(_) => Ok(()),
            None => Err(format!("no such upload: {}", upload.upload_id()).into()),
        }
    }
}
