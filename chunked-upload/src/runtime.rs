/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

/// Aggregation of per-part completion tokens
pub(crate) mod registry;

/// Concurrency bounded dispatch of part uploads
pub(crate) mod scheduler;
