/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use tracing::Instrument;

use crate::backend::{CompletionToken, MultipartBackend};
use crate::error::{self, ErrorKind};
use crate::operation::upload::context::UploadContext;
use crate::runtime::registry::CompletionRegistry;

/// Order the registered tokens by part number and complete the upload with them.
///
/// `expected_parts` is the number of parts that were planned. The upload is only completed if
/// the registry holds exactly one token for every part `1..=expected_parts`. Never aborts the
/// upload, that is left to the caller.
pub(super) async fn finalize(
    ctx: &UploadContext,
    registry: CompletionRegistry,
    expected_parts: u64,
) -> Result<Vec<CompletionToken>, error::Error> {
    let parts = validate(registry.into_sorted(), expected_parts)?;

    tracing::trace!("completing multipart upload with {} parts", parts.len());
    ctx.backend()
        .complete_upload(ctx.upload(), parts.clone())
        .instrument(tracing::debug_span!("complete-upload"))
        .await
        .map_err(error::finalize_failed)?;

    Ok(parts)
}

/// Check that `sorted` holds exactly the part numbers `1..=expected_parts`
fn validate(
    sorted: Vec<CompletionToken>,
    expected_parts: u64,
) -> Result<Vec<CompletionToken>, error::Error> {
    if sorted.len() as u64 != expected_parts {
        return Err(error::Error::new(
            ErrorKind::ValidationFailed,
            format!(
                "expected {expected_parts} completed parts but {} were registered",
                sorted.len()
            ),
        ));
    }

    // with the counts equal, any gap implies a duplicate and vice versa
    if let Some((expected, token)) = (1..)
        .zip(sorted.iter())
        .find(|(expected, token)| token.part_number() != *expected)
    {
        return Err(error::Error::new(
            ErrorKind::ValidationFailed,
            format!(
                "expected part {expected} but found part {} in the completed parts",
                token.part_number()
            ),
        ));
    }

    Ok(sorted)
}
