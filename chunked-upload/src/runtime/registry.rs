/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::backend::CompletionToken;
use crate::error;

/// The result of uploading a single part, as reported by the task that uploaded it.
#[derive(Debug)]
pub(crate) struct PartOutcome {
    pub(crate) part_number: u64,
    pub(crate) result: Result<CompletionToken, error::Error>,
}

/// Append-only collection of completion tokens, in the order parts finished.
///
/// The registry is owned by a single aggregating task. It does not deduplicate or validate part
/// numbers; a part reported twice is recorded twice.
#[derive(Debug, Default)]
pub(crate) struct CompletionRegistry {
    tokens: Vec<CompletionToken>,
}

impl CompletionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, token: CompletionToken) {
        self.tokens.push(token);
    }

    pub(crate) fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Consume the registry and return every token sorted ascending by part number
    pub(crate) fn into_sorted(mut self) -> Vec<CompletionToken> {
        self.tokens.sort_by_key(CompletionToken::part_number);
        self.tokens
    }
}

/// Collect part outcomes until every sender has been dropped.
///
/// The first failure received is returned once the channel is closed. Outcomes received after
/// a failure are still drained so that no upload task blocks on a full channel.
pub(crate) async fn aggregate(
    rx: async_channel::Receiver<PartOutcome>,
) -> Result<CompletionRegistry, error::Error> {
    let mut registry = CompletionRegistry::new();
    let mut first_err: Option<error::Error> = None;

    while let Ok(outcome) = rx.recv().await {
        match outcome.result {
            Ok(token) => {
                tracing::trace!("registered completion token for part {}", outcome.part_number);
                registry.register(token);
            }
            Err(err) => {
                if first_err.is_none() {
                    tracing::debug!("part {} failed: {err}", outcome.part_number);
                    first_err = Some(err);
                } else {
                    tracing::trace!(
                        "part {} failed after an earlier failure: {err}",
                        outcome.part_number
                    );
                }
            }
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(registry),
    }
}
