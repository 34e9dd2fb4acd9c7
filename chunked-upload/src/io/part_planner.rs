/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::cmp;

use crate::error;

/// Deterministic split of a payload of `content_length` bytes into parts of `part_size` bytes.
///
/// Every part is exactly `part_size` bytes except for the last one which holds whatever
/// remains (between 1 and `part_size` bytes). An empty payload has no parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    content_length: u64,
    part_size: u64,
}

/// The byte range and (1-based) part number of a single planned part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    /// 1-based part number
    pub part_number: u64,
    /// Offset of the first byte of this part relative to the start of the payload
    pub offset: u64,
    /// Number of bytes in this part
    pub length: u64,
}

impl PartPlan {
    /// Plan the parts for a payload of `content_length` bytes.
    ///
    /// Fails if `part_size` is zero.
    pub fn new(content_length: u64, part_size: u64) -> Result<Self, error::Error> {
        if part_size == 0 {
            return Err(error::invalid_input("part size must be greater than zero"));
        }
        Ok(Self {
            content_length,
            part_size,
        })
    }

    /// Total payload length
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Target part size
    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// The number of parts, `ceil(content_length / part_size)`
    pub fn num_parts(&self) -> u64 {
        self.content_length.div_ceil(self.part_size)
    }

    /// Returns true if there is nothing to upload
    pub fn is_empty(&self) -> bool {
        self.content_length == 0
    }

    /// The parts of this plan in ascending part number order
    pub fn ranges(&self) -> PartRanges {
        PartRanges {
            plan: *self,
            next_offset: 0,
            next_part_number: 1,
        }
    }
}

/// Iterator over the [`PartRange`]s of a [`PartPlan`]
#[derive(Debug)]
pub struct PartRanges {
    plan: PartPlan,
    next_offset: u64,
    next_part_number: u64,
}

impl Iterator for PartRanges {
    type Item = PartRange;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.plan.content_length - self.next_offset;
        if remaining == 0 {
            return None;
        }
        let range = PartRange {
            part_number: self.next_part_number,
            offset: self.next_offset,
            length: cmp::min(self.plan.part_size, remaining),
        };
        self.next_offset += range.length;
        self.next_part_number += 1;
        Some(range)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.plan.num_parts() + 1 - self.next_part_number) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PartRanges {}
