/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::VecDeque;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tower::{service_fn, Service, ServiceBuilder, ServiceExt};
use tracing::Instrument;

use crate::backend::{CompletionToken, MultipartBackend};
use crate::error;
use crate::io::part_reader::{PartData, PartReader};
use crate::operation::upload::context::UploadContext;
use crate::runtime::registry::PartOutcome;
use crate::types::{AdmissionMode, FailedPartPolicy};

/// Request/input type for the "upload_part" service.
#[derive(Debug, Clone)]
pub(crate) struct UploadPartRequest {
    ctx: UploadContext,
    part: PartData,
    failure: FailureSignal,
}

/// Raised by the first part upload (or read) that fails. Only ever moves from `false` to `true`.
#[derive(Debug, Clone)]
struct FailureSignal(Arc<watch::Sender<bool>>);

impl FailureSignal {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self(Arc::new(tx))
    }

    fn raise(&self) {
        self.0.send_replace(true);
    }

    fn is_raised(&self) -> bool {
        *self.0.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.0.subscribe()
    }
}

/// Resolves once the failure signal has been raised
async fn raised(rx: &mut watch::Receiver<bool>) {
    let observed = rx.wait_for(|raised| *raised).await.is_ok();
    if !observed {
        // sender dropped, the signal can never be raised
        future::pending::<()>().await;
    }
}

/// handler (service fn) for a single part
async fn upload_part_handler(request: UploadPartRequest) -> Result<CompletionToken, error::Error> {
    let UploadPartRequest { ctx, part, failure } = request;
    let part_number = part.part_number();
    let content_length = part.len();
    let metrics = ctx.metrics();
    let _in_flight = metrics.start_part();
    // dropped before this part gives up its slot so nothing new is admitted in its place
    let unfinished = RaiseOnDrop::new(&failure);

    match ctx.backend().upload_part(ctx.upload(), part).await {
        Ok(token) => {
            unfinished.disarm();
            metrics.record_part_completed(content_length);
            tracing::trace!("completed upload of part number {part_number}");
            Ok(token)
        }
        Err(err) => {
            metrics.record_part_failed();
            failure.raise();
            Err(error::part_failed(part_number, err))
        }
    }
}

/// Raises the failure signal when dropped unless disarmed.
///
/// Covers a part upload that unwinds (panics) without producing a result.
struct RaiseOnDrop<'a> {
    failure: &'a FailureSignal,
    armed: bool,
}

impl<'a> RaiseOnDrop<'a> {
    fn new(failure: &'a FailureSignal) -> Self {
        Self {
            failure,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RaiseOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.failure.raise();
        }
    }
}

/// Create a new tower::Service for uploading individual parts that admits at most
/// `concurrency` requests at once
fn upload_part_service(
    concurrency: usize,
) -> impl Service<UploadPartRequest, Response = CompletionToken, Error = error::Error, Future: Send>
       + Clone
       + Send {
    let svc = service_fn(upload_part_handler);
    ServiceBuilder::new()
        .concurrency_limit(concurrency)
        .service(svc)
}

/// Wait for a single part upload and report its outcome to the aggregator
async fn report<F>(part_number: u64, upload: F, tx: async_channel::Sender<PartOutcome>)
where
    F: Future<Output = Result<CompletionToken, error::Error>>,
{
    let result = upload.await;
    if tx.send(PartOutcome { part_number, result }).await.is_err() {
        tracing::trace!("no aggregator listening, dropping outcome for part {part_number}");
    }
}

/// Spawned part upload that is aborted if the window holding it is dropped early
#[derive(Debug)]
struct AbortOnDrop(JoinHandle<()>);

impl Future for AbortOnDrop {
    type Output = Result<(), JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn record_join(joined: Result<(), JoinError>, result: &mut Result<(), error::Error>) {
    match joined {
        Ok(()) => {}
        Err(err) if err.is_cancelled() => tracing::trace!("part upload task cancelled"),
        Err(err) => {
            tracing::error!("part upload task panicked: {err}");
            if result.is_ok() {
                *result = Err(err.into());
            }
        }
    }
}

/// Dispatches the parts of a single upload with at most `W` part uploads in flight.
///
/// Part outcomes (successful or not) are sent to the aggregator as they finish. Once a part
/// fails no new part is admitted. Every task that was dispatched is joined before
/// [`run`](Self::run) returns, whether or not a part failed.
#[derive(Debug)]
pub(crate) struct UploadScheduler {
    ctx: UploadContext,
    concurrency: usize,
    admission_mode: AdmissionMode,
    failed_part_policy: FailedPartPolicy,
    failure: FailureSignal,
}

impl UploadScheduler {
    pub(crate) fn new(ctx: UploadContext) -> Self {
        let concurrency = ctx.handle.num_workers();
        let admission_mode = ctx.handle.config.admission_mode().clone();
        let failed_part_policy = ctx.handle.config.failed_part_policy().clone();
        Self {
            ctx,
            concurrency,
            admission_mode,
            failed_part_policy,
            failure: FailureSignal::new(),
        }
    }

    /// Read and dispatch every part from `reader`, then join all dispatched tasks.
    ///
    /// Returns an error only if dispatching itself failed (a payload read error or a panicked
    /// task). Part upload failures are reported through `tx`.
    pub(crate) async fn run(
        self,
        reader: PartReader,
        tx: async_channel::Sender<PartOutcome>,
    ) -> Result<(), error::Error> {
        tracing::debug!(
            "dispatching parts with admission mode {:?} and concurrency {}",
            self.admission_mode,
            self.concurrency
        );
        match self.admission_mode {
            AdmissionMode::FreeSlot => self.run_free_slot(reader, tx).await,
            AdmissionMode::OldestFirst => self.run_oldest_first(reader, tx).await,
        }
    }

    fn request(&self, part: PartData) -> UploadPartRequest {
        UploadPartRequest {
            ctx: self.ctx.clone(),
            part,
            failure: self.failure.clone(),
        }
    }

    fn cancel_in_flight(&self) -> bool {
        self.failed_part_policy == FailedPartPolicy::CancelInFlight
    }

    async fn run_free_slot(
        &self,
        mut reader: PartReader,
        tx: async_channel::Sender<PartOutcome>,
    ) -> Result<(), error::Error> {
        let mut svc = upload_part_service(self.concurrency);
        let mut tasks = JoinSet::new();
        let mut failed = self.failure.subscribe();

        let dispatched = loop {
            // wait for any slot to free up
            tokio::select! {
                biased;
                _ = raised(&mut failed) => break Ok(()),
                ready = ServiceExt::<UploadPartRequest>::ready(&mut svc) => {
                    if let Err(err) = ready {
                        break Err(err);
                    }
                }
            }
            // a part may have failed while we were waiting on the slot
            if self.failure.is_raised() {
                break Ok(());
            }

            let part = match reader.next_part().await {
                Ok(Some(part)) => part,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            };
            // file reads yield, a part may have failed in the meantime
            if self.failure.is_raised() {
                break Ok(());
            }
            let part_number = part.part_number();
            let upload = svc.call(self.request(part));
            tasks.spawn(
                report(part_number, upload, tx.clone())
                    .instrument(tracing::debug_span!("upload-part", part_number)),
            );
        };

        if dispatched.is_err() {
            self.failure.raise();
        }
        drop(tx);
        let drained = self.drain_join_set(tasks, &mut failed).await;
        dispatched.and(drained)
    }

    async fn drain_join_set(
        &self,
        mut tasks: JoinSet<()>,
        failed: &mut watch::Receiver<bool>,
    ) -> Result<(), error::Error> {
        let mut cancel_on_failure = self.cancel_in_flight();
        let mut result = Ok(());
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(joined) => record_join(joined, &mut result),
                    None => break,
                },
                _ = raised(failed), if cancel_on_failure => {
                    tracing::debug!("cancelling {} in-flight part uploads", tasks.len());
                    tasks.abort_all();
                    cancel_on_failure = false;
                }
            }
        }
        result
    }

    async fn run_oldest_first(
        &self,
        mut reader: PartReader,
        tx: async_channel::Sender<PartOutcome>,
    ) -> Result<(), error::Error> {
        let mut window: VecDeque<AbortOnDrop> = VecDeque::with_capacity(self.concurrency);
        let mut failed = self.failure.subscribe();
        let mut result = Ok(());

        let dispatched = loop {
            if window.len() >= self.concurrency {
                // only the oldest outstanding part can free the window, even if newer ones are done
                if let Some(mut oldest) = window.pop_front() {
                    tokio::select! {
                        biased;
                        _ = raised(&mut failed) => {
                            window.push_front(oldest);
                            break Ok(());
                        }
                        joined = &mut oldest => record_join(joined, &mut result),
                    }
                }
            }
            // a panicked part never reports an outcome, its join error stops admission too
            if self.failure.is_raised() || result.is_err() {
                break Ok(());
            }

            let part = match reader.next_part().await {
                Ok(Some(part)) => part,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            };
            if self.failure.is_raised() {
                break Ok(());
            }
            let part_number = part.part_number();
            let upload = upload_part_handler(self.request(part));
            window.push_back(AbortOnDrop(tokio::spawn(
                report(part_number, upload, tx.clone())
                    .instrument(tracing::debug_span!("upload-part", part_number)),
            )));
        };

        if dispatched.is_err() {
            self.failure.raise();
        }
        drop(tx);

        let mut cancel_on_failure = self.cancel_in_flight();
        while let Some(mut handle) = window.pop_front() {
            loop {
                tokio::select! {
                    joined = &mut handle => {
                        record_join(joined, &mut result);
                        break;
                    }
                    _ = raised(&mut failed), if cancel_on_failure => {
                        tracing::debug!("cancelling {} in-flight part uploads", window.len() + 1);
                        handle.0.abort();
                        window.iter().for_each(|queued| queued.0.abort());
                        cancel_on_failure = false;
                    }
                }
            }
        }

        dispatched.and(result)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio_test::{assert_pending, assert_ready};

    use super::{raised, FailureSignal, UploadScheduler};
    use crate::backend::in_memory::InMemoryBackend;
    use crate::backend::{CompletionToken, MultipartBackend, UploadRef};
    use crate::error::{BoxError, ErrorKind};
    use crate::io::part_reader::PartReader;
    use crate::io::{InputStream, PartData, PartPlan};
    use crate::operation::upload::context::UploadContext;
    use crate::runtime::registry::PartOutcome;
    use crate::types::{AdmissionMode, ConcurrencySetting, FailedPartPolicy};

    struct Run {
        result: Result<(), crate::error::Error>,
        // outcomes in the order they were reported
        outcomes: Vec<PartOutcome>,
    }

    impl Run {
        fn part_numbers(&self) -> Vec<u64> {
            self.outcomes.iter().map(|o| o.part_number).collect()
        }

        fn failed_parts(&self) -> Vec<u64> {
            self.outcomes
                .iter()
                .filter(|o| o.result.is_err())
                .map(|o| o.part_number)
                .collect()
        }
    }

    #[test]
    fn test_failure_signal_wakes_waiters() {
        let signal = FailureSignal::new();
        let mut rx = signal.subscribe();
        let mut waiter = tokio_test::task::spawn(async move { raised(&mut rx).await });

        assert_pending!(waiter.poll());
        signal.raise();
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
        assert!(signal.is_raised());
    }

    async fn run_scheduler(
        backend: Arc<impl MultipartBackend>,
        concurrency: usize,
        admission_mode: AdmissionMode,
        failed_part_policy: FailedPartPolicy,
        stream: InputStream,
        part_size: u64,
    ) -> Run {
        let config = crate::Config::builder()
            .backend(backend.clone())
            .concurrency(ConcurrencySetting::Explicit(concurrency))
            .admission_mode(admission_mode)
            .failed_part_policy(failed_part_policy)
            .build()
            .unwrap();
        let client = crate::Client::new(config);

        let upload_id = backend.initiate_upload("bucket", "key").await.unwrap();
        let ctx = UploadContext::new(
            client.handle.clone(),
            UploadRef::new("bucket", "key", upload_id),
        );

        let plan = PartPlan::new(stream.content_length(), part_size).unwrap();
        let reader = PartReader::new(stream, &plan);
        let (tx, rx) = async_channel::unbounded();
        let result = UploadScheduler::new(ctx).run(reader, tx).await;

        let mut outcomes = Vec::new();
        while let Ok(outcome) = rx.try_recv() {
            outcomes.push(outcome);
        }
        Run { result, outcomes }
    }

    /// Panics while uploading one part, delegating everything else
    #[derive(Debug, Default)]
    struct PanickingBackend {
        inner: InMemoryBackend,
        part_number: u64,
    }

    #[async_trait::async_trait]
    impl MultipartBackend for PanickingBackend {
        async fn initiate_upload(&self, bucket: &str, key: &str) -> Result<String, BoxError> {
            self.inner.initiate_upload(bucket, key).await
        }

        async fn upload_part(
            &self,
            upload: &UploadRef,
            part: PartData,
        ) -> Result<CompletionToken, BoxError> {
            if part.part_number() == self.part_number {
                panic!("backend panicked uploading part {}", self.part_number);
            }
            self.inner.upload_part(upload, part).await
        }

        async fn complete_upload(
            &self,
            upload: &UploadRef,
            parts: Vec<CompletionToken>,
        ) -> Result<(), BoxError> {
            self.inner.complete_upload(upload, parts).await
        }

        async fn abort_upload(&self, upload: &UploadRef) -> Result<(), BoxError> {
            self.inner.abort_upload(upload).await
        }
    }

    fn payload(len: usize) -> InputStream {
        Bytes::from(vec![7u8; len]).into()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_never_exceeds_window() {
        for mode in [AdmissionMode::FreeSlot, AdmissionMode::OldestFirst] {
            let backend = Arc::new(
                InMemoryBackend::new()
                    .default_part_delay(Duration::from_millis(20))
                    .delay_part(2, Duration::from_millis(60)),
            );
            let run = run_scheduler(
                backend.clone(),
                3,
                mode.clone(),
                FailedPartPolicy::DrainInFlight,
                payload(100),
                10,
            )
            .await;

            run.result.as_ref().unwrap();
            assert_eq!(10, run.outcomes.len(), "mode {mode:?}");
            assert!(run.failed_parts().is_empty());
            assert!(backend.max_in_flight() <= 3, "mode {mode:?}");
            assert!(backend.max_in_flight() > 1, "mode {mode:?}");
        }
    }

    #[tokio::test]
    async fn test_free_slot_admits_around_slow_part() {
        let backend = Arc::new(InMemoryBackend::new().delay_part(1, Duration::from_millis(200)));
        let run = run_scheduler(
            backend,
            2,
            AdmissionMode::FreeSlot,
            FailedPartPolicy::DrainInFlight,
            payload(40),
            10,
        )
        .await;

        run.result.as_ref().unwrap();
        // every other part finishes while part 1 still holds its slot
        assert_eq!(Some(&1), run.part_numbers().last());
    }

    #[tokio::test]
    async fn test_oldest_first_waits_on_oldest_part() {
        let backend = Arc::new(InMemoryBackend::new().delay_part(1, Duration::from_millis(200)));
        let run = run_scheduler(
            backend,
            2,
            AdmissionMode::OldestFirst,
            FailedPartPolicy::DrainInFlight,
            payload(40),
            10,
        )
        .await;

        run.result.as_ref().unwrap();
        // part 3 is not admitted until part 1 is done even though part 2 freed its slot
        assert_eq!(vec![2, 1], run.part_numbers()[..2].to_vec());
        assert_eq!(4, run.outcomes.len());
    }

    #[tokio::test]
    async fn test_failure_stops_admission() {
        for mode in [AdmissionMode::FreeSlot, AdmissionMode::OldestFirst] {
            let backend = Arc::new(InMemoryBackend::new().fail_part(2));
            let run = run_scheduler(
                backend.clone(),
                1,
                mode.clone(),
                FailedPartPolicy::DrainInFlight,
                payload(50),
                10,
            )
            .await;

            run.result.as_ref().unwrap();
            assert_eq!(vec![1, 2], backend.upload_part_calls().await, "mode {mode:?}");
            assert_eq!(vec![2], run.failed_parts());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drain_in_flight_waits_for_siblings() {
        let backend = Arc::new(
            InMemoryBackend::new()
                .fail_part(1)
                .delay_part(1, Duration::from_millis(50))
                .delay_part(2, Duration::from_millis(200)),
        );
        let run = run_scheduler(
            backend.clone(),
            2,
            AdmissionMode::FreeSlot,
            FailedPartPolicy::DrainInFlight,
            payload(50),
            10,
        )
        .await;

        run.result.as_ref().unwrap();
        assert_eq!(vec![1], run.failed_parts());
        // part 2 was already in flight and ran to completion
        assert!(run
            .outcomes
            .iter()
            .any(|o| o.part_number == 2 && o.result.is_ok()));
        assert!(!backend.upload_part_calls().await.contains(&3));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_in_flight_aborts_siblings() {
        for mode in [AdmissionMode::FreeSlot, AdmissionMode::OldestFirst] {
            let backend = Arc::new(
                InMemoryBackend::new()
                    .default_part_delay(Duration::from_secs(30))
                    .delay_part(1, Duration::ZERO)
                    .fail_part(1),
            );
            let run = tokio::time::timeout(
                Duration::from_secs(5),
                run_scheduler(
                    backend.clone(),
                    3,
                    mode.clone(),
                    FailedPartPolicy::CancelInFlight,
                    payload(50),
                    10,
                ),
            )
            .await
            .expect("in-flight parts should have been cancelled");

            run.result.as_ref().unwrap();
            assert_eq!(vec![1], run.part_numbers(), "mode {mode:?}");
        }
    }

    #[tokio::test]
    async fn test_read_error_stops_dispatch() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmp, &[1u8; 25]).unwrap();
        let stream = InputStream::read_from()
            .path(tmp.path())
            .length(40)
            .build()
            .unwrap();

        let backend = Arc::new(InMemoryBackend::new());
        let run = run_scheduler(
            backend.clone(),
            2,
            AdmissionMode::FreeSlot,
            FailedPartPolicy::DrainInFlight,
            stream,
            10,
        )
        .await;

        assert_eq!(&ErrorKind::IOError, run.result.unwrap_err().kind());
        let mut calls = backend.upload_part_calls().await;
        calls.sort();
        assert_eq!(vec![1, 2], calls);
    }

    #[tokio::test]
    async fn test_panicked_part_stops_admission() {
        for mode in [AdmissionMode::FreeSlot, AdmissionMode::OldestFirst] {
            let backend = Arc::new(PanickingBackend {
                part_number: 1,
                ..Default::default()
            });
            let run = run_scheduler(
                backend.clone(),
                1,
                mode.clone(),
                FailedPartPolicy::DrainInFlight,
                payload(100),
                10,
            )
            .await;

            let err = run.result.unwrap_err();
            assert_eq!(&ErrorKind::RuntimeError, err.kind(), "mode {mode:?}");
            // the panicked part reports nothing and nothing is admitted after it
            assert!(run.outcomes.is_empty(), "mode {mode:?}");
            assert!(
                backend.inner.upload_part_calls().await.is_empty(),
                "mode {mode:?}"
            );
        }
    }
}
