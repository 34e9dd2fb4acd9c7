/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use aws_sdk_s3::operation::abort_multipart_upload::AbortMultipartUploadOutput;
use aws_sdk_s3::operation::complete_multipart_upload::CompleteMultipartUploadOutput;
use aws_sdk_s3::operation::create_multipart_upload::CreateMultipartUploadOutput;
use aws_sdk_s3::operation::upload_part::UploadPartOutput;
use aws_smithy_mocks_experimental::{mock, mock_client, Rule, RuleMode};
use bytes::Bytes;

/// Deterministic payload of `size` bytes where byte `i` is `i % 251`.
///
/// The prime modulus keeps part boundaries from lining up with the pattern so a misplaced part
/// changes the assembled object.
pub fn patterned_payload(size: usize) -> Bytes {
    (0..size).map(|i| (i % 251) as u8).collect::<Vec<_>>().into()
}

/// Write `data` to a new temporary file
pub fn create_test_file(data: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, data).unwrap();
    file
}

/// ETag the mocked S3 client returns for `part_number`
pub fn mock_e_tag(part_number: i32) -> String {
    format!("etag-{part_number}")
}

/// Rules for a multipart upload of `num_parts` parts with the given upload ID.
///
/// The rules are returned so tests can assert on `num_calls()` after the upload.
pub fn multipart_upload_rules(upload_id: &'static str, num_parts: i32) -> Vec<Rule> {
    let mut rules = vec![mock!(aws_sdk_s3::Client::create_multipart_upload)
        .then_output(move || {
            CreateMultipartUploadOutput::builder()
                .upload_id(upload_id)
                .build()
        })];

    rules.extend((1..=num_parts).map(|part_number| {
        mock!(aws_sdk_s3::Client::upload_part)
            .match_requests(move |r| {
                r.upload_id() == Some(upload_id) && r.part_number() == Some(part_number)
            })
            .then_output(move || {
                UploadPartOutput::builder()
                    .e_tag(mock_e_tag(part_number))
                    .build()
            })
    }));

    rules.push(
        mock!(aws_sdk_s3::Client::complete_multipart_upload)
            .match_requests(move |r| r.upload_id() == Some(upload_id))
            .then_output(|| CompleteMultipartUploadOutput::builder().build()),
    );
    rules.push(
        mock!(aws_sdk_s3::Client::abort_multipart_upload)
            .match_requests(move |r| r.upload_id() == Some(upload_id))
            .then_output(|| AbortMultipartUploadOutput::builder().build()),
    );
    rules
}

/// Mocked S3 client that accepts a multipart upload of `num_parts` parts
pub fn mock_s3_client_for_multipart_upload(
    upload_id: &'static str,
    num_parts: i32,
) -> aws_sdk_s3::Client {
    let rules = multipart_upload_rules(upload_id, num_parts);
    mock_client!(aws_sdk_s3, RuleMode::MatchAny, rules.as_slice())
}
