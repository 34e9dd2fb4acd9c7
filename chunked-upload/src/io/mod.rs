/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

pub(crate) mod part_planner;
pub(crate) mod part_reader;
mod path_body;
mod stream;

// re-exports
pub use self::part_planner::{PartPlan, PartRange, PartRanges};
pub use self::part_reader::PartData;
pub use self::path_body::PathBodyBuilder;
pub use self::stream::InputStream;
