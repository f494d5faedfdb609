//! Human-readable sequential codes and the allocator contract behind them.
//!
//! Codes have the shape `<PREFIX>-<bucket>-<NNNN>`. The bucket is the
//! month (`YYYYMM`) for loans and the day (`YYYYMMDD`) for payments, and
//! the number restarts at 1 in every bucket. Numbers come from a
//! [`SequenceAllocator`] that owns one counter per `(prefix, bucket)` pair
//! and increments it atomically; they are never derived by scanning the
//! most recent record.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Minimum width of the numeric part of a code.
pub const SEQUENCE_WIDTH: usize = 4;

/// Issues collision-free sequence numbers per `(prefix, bucket)`.
///
/// Implementations must hand out each number at most once, even to
/// concurrent callers. A number handed out to an operation that later
/// aborts is not reclaimed, so buckets may contain gaps but never
/// duplicates.
#[async_trait]
pub trait SequenceAllocator: Send + Sync + fmt::Debug {
    /// Increments the counter for `(prefix, bucket)` and returns the new value.
    ///
    /// The first allocation in a bucket returns 1.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AllocationFailed`] if the increment could not
    /// be committed.
    async fn allocate(&self, prefix: &str, bucket: &str) -> Result<u64, LedgerError>;
}

/// The two kinds of entity that receive sequential codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceScope {
    /// Loans: prefix `L`, monthly bucket.
    Loan,
    /// Payments: prefix `P`, daily bucket.
    Payment,
}

impl SequenceScope {
    /// Code prefix.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Loan => "L",
            Self::Payment => "P",
        }
    }

    /// Number of digits in the bucket key.
    #[must_use]
    pub const fn bucket_len(self) -> usize {
        match self {
            Self::Loan => 6,
            Self::Payment => 8,
        }
    }

    /// Bucket key for the given instant, in UTC.
    #[must_use]
    pub fn bucket_key(self, at: DateTime<Utc>) -> String {
        match self {
            Self::Loan => at.format("%Y%m").to_string(),
            Self::Payment => at.format("%Y%m%d").to_string(),
        }
    }

    /// Formats a code from its bucket and sequence number.
    #[must_use]
    pub fn format_code(self, bucket: &str, sequence: u64) -> String {
        format!(
            "{}-{bucket}-{sequence:0width$}",
            self.prefix(),
            width = SEQUENCE_WIDTH
        )
    }

    /// Allocates the next number for the bucket containing `at` and
    /// returns the formatted code.
    ///
    /// # Errors
    ///
    /// Propagates [`LedgerError::AllocationFailed`] from the allocator.
    pub async fn next_code(
        self,
        allocator: &dyn SequenceAllocator,
        at: DateTime<Utc>,
    ) -> Result<String, LedgerError> {
        let bucket = self.bucket_key(at);
        let sequence = allocator.allocate(self.prefix(), &bucket).await?;
        if sequence == 0 {
            return Err(LedgerError::AllocationFailed(format!(
                "counter {}/{bucket} returned 0",
                self.prefix()
            )));
        }
        Ok(self.format_code(&bucket, sequence))
    }

    /// Splits a code into its bucket and sequence number, checking shape.
    fn split(self, code: &str) -> Option<(&str, u64)> {
        let mut parts = code.splitn(3, '-');
        let prefix = parts.next()?;
        let bucket = parts.next()?;
        let number = parts.next()?;
        if prefix != self.prefix()
            || bucket.len() != self.bucket_len()
            || !bucket.bytes().all(|b| b.is_ascii_digit())
            || number.len() < SEQUENCE_WIDTH
            || !number.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let sequence = number.parse().ok()?;
        if sequence == 0 {
            return None;
        }
        Some((bucket, sequence))
    }
}

macro_rules! sequence_code {
    ($(#[$meta:meta])* $name:ident, $scope:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Scope this code belongs to.
            pub const SCOPE: SequenceScope = $scope;

            /// Validates and wraps a code string.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::InvalidRequest`] if the string does not
            /// have the expected prefix, bucket width and numeric part.
            pub fn parse(code: &str) -> Result<Self, LedgerError> {
                Self::SCOPE
                    .split(code)
                    .map(|_| Self(code.to_string()))
                    .ok_or_else(|| {
                        LedgerError::InvalidRequest(format!("malformed code: {code}"))
                    })
            }

            /// Allocates the next code for the bucket containing `at`.
            ///
            /// # Errors
            ///
            /// Propagates [`LedgerError::AllocationFailed`] from the allocator.
            pub async fn allocate(
                allocator: &dyn SequenceAllocator,
                at: DateTime<Utc>,
            ) -> Result<Self, LedgerError> {
                Self::SCOPE.next_code(allocator, at).await.map(Self)
            }

            /// Returns the code as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns the bucket key embedded in the code.
            #[must_use]
            pub fn bucket(&self) -> &str {
                Self::SCOPE.split(&self.0).map_or("", |(bucket, _)| bucket)
            }

            /// Returns the sequence number embedded in the code.
            #[must_use]
            pub fn sequence(&self) -> u64 {
                Self::SCOPE.split(&self.0).map_or(0, |(_, seq)| seq)
            }
        }

        // Numeric order within a bucket, so `-10000` sorts after `-9999`.
        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                (self.bucket(), self.sequence())
                    .cmp(&(other.bucket(), other.sequence()))
                    .then_with(|| self.0.cmp(&other.0))
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = LedgerError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(code: $name) -> Self {
                code.0
            }
        }
    };
}

sequence_code!(
    /// Human-readable loan code, `L-YYYYMM-NNNN`.
    LoanCode,
    SequenceScope::Loan
);

sequence_code!(
    /// Human-readable payment code, `P-YYYYMMDD-NNNN`.
    PaymentCode,
    SequenceScope::Payment
);
