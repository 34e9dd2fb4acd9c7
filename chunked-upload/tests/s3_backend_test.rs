/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use aws_sdk_s3::operation::create_multipart_upload::CreateMultipartUploadOutput;
use aws_sdk_s3::operation::upload_part::UploadPartOutput;
use aws_smithy_mocks_experimental::{mock, mock_client, RuleMode};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_runtime_api::http::StatusCode;
use aws_smithy_types::body::SdkBody;
use chunked_upload::error::ErrorKind;
use chunked_upload::io::InputStream;
use chunked_upload::types::{
    ConcurrencySetting, FailedMultipartUploadPolicy, PartSize, SessionState,
};
use test_common::{
    mock_e_tag, mock_s3_client_for_multipart_upload, multipart_upload_rules, patterned_payload,
};

#[tokio::test]
async fn test_upload_through_s3_client() {
    let client = mock_s3_client_for_multipart_upload("mpu-id", 4);
    let config = chunked_upload::Config::builder()
        .client(client)
        .part_size(PartSize::Target(256))
        .concurrency(ConcurrencySetting::Explicit(2))
        .build()
        .unwrap();
    let tm = chunked_upload::Client::new(config);

    let output = tm
        .upload()
        .bucket("test-bucket")
        .key("test-key")
        .body(InputStream::from(patterned_payload(1000)))
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(Some("mpu-id"), output.upload_id());
    assert_eq!(1000, output.content_length());
    let tokens: Vec<_> = output
        .parts()
        .iter()
        .map(|p| (p.part_number(), p.e_tag().to_owned()))
        .collect();
    assert_eq!(
        vec![
            (1, mock_e_tag(1)),
            (2, mock_e_tag(2)),
            (3, mock_e_tag(3)),
            (4, mock_e_tag(4)),
        ],
        tokens
    );
}

#[tokio::test]
async fn test_completion_request_lists_every_part() {
    let rules = multipart_upload_rules("mpu-id", 3);
    let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, rules.as_slice());
    let config = chunked_upload::Config::builder()
        .client(client)
        .part_size(PartSize::Target(10))
        .build()
        .unwrap();
    let tm = chunked_upload::Client::new(config);

    tm.upload()
        .bucket("test-bucket")
        .key("test-key")
        .body(InputStream::from(patterned_payload(25)))
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();

    // create, one rule per part, complete, abort
    let num_calls: Vec<usize> = rules.iter().map(|r| r.num_calls()).collect();
    assert_eq!(vec![1, 1, 1, 1, 1, 0], num_calls);
}

#[tokio::test]
async fn test_s3_part_failure_aborts_multipart_upload() {
    let create_mpu = mock!(aws_sdk_s3::Client::create_multipart_upload).then_output(|| {
        CreateMultipartUploadOutput::builder()
            .upload_id("mpu-id")
            .build()
    });
    let upload_1 = mock!(aws_sdk_s3::Client::upload_part)
        .match_requests(|r| r.part_number() == Some(1))
        .then_output(|| UploadPartOutput::builder().e_tag("etag-1").build());
    let upload_2 = mock!(aws_sdk_s3::Client::upload_part)
        .match_requests(|r| r.part_number() == Some(2))
        .then_http_response(|| {
            HttpResponse::new(StatusCode::try_from(403).unwrap(), SdkBody::empty())
        });
    let complete_mpu = mock!(aws_sdk_s3::Client::complete_multipart_upload).then_output(|| {
        aws_sdk_s3::operation::complete_multipart_upload::CompleteMultipartUploadOutput::builder()
            .build()
    });
    let abort_mpu = mock!(aws_sdk_s3::Client::abort_multipart_upload)
        .match_requests(|r| r.upload_id() == Some("mpu-id"))
        .then_output(|| {
            aws_sdk_s3::operation::abort_multipart_upload::AbortMultipartUploadOutput::builder()
                .build()
        });
    let client = mock_client!(
        aws_sdk_s3,
        RuleMode::MatchAny,
        &[&create_mpu, &upload_1, &upload_2, &complete_mpu, &abort_mpu]
    );

    let config = chunked_upload::Config::builder()
        .client(client)
        .part_size(PartSize::Target(10))
        .concurrency(ConcurrencySetting::Explicit(1))
        .failed_multipart_upload_policy(FailedMultipartUploadPolicy::AbortUpload)
        .build()
        .unwrap();
    let tm = chunked_upload::Client::new(config);

    let mut handle = tm
        .upload()
        .bucket("test-bucket")
        .key("test-key")
        .body(InputStream::from(patterned_payload(20)))
        .initiate()
        .unwrap();

    assert_eq!(SessionState::Aborted, handle.final_state().await);
    let err = handle.join().await.unwrap_err();
    match err.kind() {
        ErrorKind::PartFailed(part) => assert_eq!(2, part.part_number()),
        kind => panic!("unexpected error kind {kind:?}"),
    }
    assert_eq!(0, complete_mpu.num_calls());
    assert_eq!(1, abort_mpu.num_calls());
}
