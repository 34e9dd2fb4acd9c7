/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::atomic::{AtomicU64, Ordering};

/// Units of measurement
pub mod unit {
    use std::fmt;

    /// Binary byte units
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ByteUnit {
        /// 1 byte
        Byte,
        /// 2<sup>10</sup> bytes.
        Kibibyte,
        /// 2<sup>20</sup> bytes.
        Mebibyte,
        /// 2<sup>30</sup> bytes.
        Gibibyte,
    }

    impl ByteUnit {
        /// Convert some number of bytes into this unit as an `f64`
        pub fn convert(&self, bytes: u64) -> f64 {
            bytes as f64 / self.as_bytes_u64() as f64
        }

        /// Figure out the best unit to display the given number of bytes in
        /// and return a [`ByteCountDisplayContext`] with the appropriate units set
        pub fn display(total_bytes: u64) -> ByteCountDisplayContext {
            let units = &[ByteUnit::Gibibyte, ByteUnit::Mebibyte, ByteUnit::Kibibyte];
            let mut unit = ByteUnit::Byte;
            for u in units {
                if total_bytes >= u.as_bytes_u64() {
                    unit = *u;
                    break;
                }
            }

            ByteCountDisplayContext::new(total_bytes, unit)
        }

        /// The number of bytes represented by this unit
        pub const fn as_bytes_u64(&self) -> u64 {
            match self {
                ByteUnit::Byte => 1,
                ByteUnit::Kibibyte => 1 << 10,
                ByteUnit::Mebibyte => 1 << 20,
                ByteUnit::Gibibyte => 1 << 30,
            }
        }

        pub(crate) const fn as_str(&self) -> &'static str {
            match self {
                ByteUnit::Byte => "B",
                ByteUnit::Kibibyte => "KiB",
                ByteUnit::Mebibyte => "MiB",
                ByteUnit::Gibibyte => "GiB",
            }
        }
    }

    /// Display context to format a value representing number of bytes in a particular unit
    #[derive(Debug)]
    pub struct ByteCountDisplayContext {
        /// The number of bytes to display
        pub total_bytes: u64,
        /// The precise unit to display the byte count as
        pub unit: ByteUnit,
    }

    impl ByteCountDisplayContext {
        /// Create a new display context for the number of bytes in a specific unit
        pub fn new(total_bytes: u64, unit: ByteUnit) -> Self {
            Self { total_bytes, unit }
        }
    }

    impl fmt::Display for ByteCountDisplayContext {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            if self.total_bytes % self.unit.as_bytes_u64() == 0 {
                let converted = self.total_bytes / self.unit.as_bytes_u64();
                return write!(f, "{converted} {}", self.unit.as_str());
            }
            let precision = f.precision().unwrap_or(3);
            write!(
                f,
                "{1:.*} {2:}",
                precision,
                self.unit.convert(self.total_bytes),
                self.unit.as_str()
            )
        }
    }
}

/// Counters tracking part uploads across every upload issued by a [`Client`](crate::Client).
#[derive(Debug, Default)]
pub struct TransferMetrics {
    parts_dispatched: AtomicU64,
    parts_completed: AtomicU64,
    parts_failed: AtomicU64,
    bytes_transferred: AtomicU64,
    in_flight: AtomicU64,
    in_flight_high_water_mark: AtomicU64,
}

impl TransferMetrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of part uploads handed to the backend
    pub fn parts_dispatched(&self) -> u64 {
        self.parts_dispatched.load(Ordering::SeqCst)
    }

    /// Number of part uploads that returned a completion token
    pub fn parts_completed(&self) -> u64 {
        self.parts_completed.load(Ordering::SeqCst)
    }

    /// Number of part uploads that failed
    pub fn parts_failed(&self) -> u64 {
        self.parts_failed.load(Ordering::SeqCst)
    }

    /// Total payload bytes of successfully uploaded parts
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::SeqCst)
    }

    /// Number of part uploads currently in flight
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The maximum number of part uploads ever observed in flight at the same time
    pub fn in_flight_high_water_mark(&self) -> u64 {
        self.in_flight_high_water_mark.load(Ordering::SeqCst)
    }

    /// Mark a part upload as started. The returned guard marks it finished when dropped.
    pub(crate) fn start_part(&self) -> InFlightGuard<'_> {
        self.parts_dispatched.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.in_flight_high_water_mark
            .fetch_max(current, Ordering::SeqCst);
        InFlightGuard { metrics: self }
    }

    pub(crate) fn record_part_completed(&self, bytes: u64) {
        self.parts_completed.fetch_add(1, Ordering::SeqCst);
        self.bytes_transferred.fetch_add(bytes, Ordering::SeqCst);
    }

    pub(crate) fn record_part_failed(&self) {
        self.parts_failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Decrements the in-flight gauge when dropped
#[must_use]
#[derive(Debug)]
pub(crate) struct InFlightGuard<'a> {
    metrics: &'a TransferMetrics,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
