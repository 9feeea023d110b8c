use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Sortable base32 alphabet: ASCII order matches numeric order.
const S32_CHARS: &[u8; 32] = b"234567abcdefghijklmnopqrstuvwxyz";
const ENCODED_LEN: usize = 13;
const CLOCK_ID_BITS: u32 = 10;
const CLOCK_ID_MASK: u64 = (1 << CLOCK_ID_BITS) - 1;
const TIMESTAMP_MASK: u64 = (1 << 53) - 1;

/// Time identifier: the sort and partition key of time-ordered collections.
///
/// A 64-bit value with the top bit clear, 53 bits of microseconds since the
/// UNIX epoch and a 10-bit clock id. Encoded as 13 characters of sortable
/// base32 and displayed as `xxxx-xxx-xxxx-xx`, so lexical order of either
/// form equals numeric order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tid(u64);

impl Tid {
    /// Build from a microsecond timestamp and a clock id.
    pub fn new(timestamp_us: u64, clock_id: u16) -> Self {
        Self(((timestamp_us & TIMESTAMP_MASK) << CLOCK_ID_BITS) | (clock_id as u64 & CLOCK_ID_MASK))
    }

    /// Next identifier from the process-wide clock.
    pub fn next() -> Self {
        static GLOBAL: OnceLock<TidClock> = OnceLock::new();
        GLOBAL.get_or_init(TidClock::random).next()
    }

    pub fn timestamp_us(&self) -> u64 {
        self.0 >> CLOCK_ID_BITS
    }

    pub fn clock_id(&self) -> u16 {
        (self.0 & CLOCK_ID_MASK) as u16
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns `true` if this identifier sorts strictly before `other`.
    pub fn older_than(&self, other: &Self) -> bool {
        self < other
    }

    /// Returns `true` if this identifier sorts strictly after `other`.
    pub fn newer_than(&self, other: &Self) -> bool {
        self > other
    }

    /// The 13-character encoding without separators.
    pub fn to_s32(&self) -> String {
        (0..ENCODED_LEN)
            .map(|i| {
                let shift = 5 * (ENCODED_LEN - 1 - i) as u32;
                S32_CHARS[((self.0 >> shift) & 31) as usize] as char
            })
            .collect()
    }

    /// Parse either the dashed display form or the bare 13-character form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let compact: String = s.chars().filter(|c| *c != '-').collect();
        if compact.len() != ENCODED_LEN {
            return Err(TypeError::InvalidTid(format!(
                "expected {ENCODED_LEN} characters, got {}: {s}",
                compact.len()
            )));
        }
        let mut value: u64 = 0;
        for (i, c) in compact.bytes().enumerate() {
            let digit = S32_CHARS
                .iter()
                .position(|&d| d == c)
                .ok_or_else(|| TypeError::InvalidTid(format!("invalid character '{}' in {s}", c as char)))?;
            // top bit is always clear, so the leading digit carries three bits
            if i == 0 && digit >= 8 {
                return Err(TypeError::InvalidTid(format!("value out of range: {s}")));
            }
            value = (value << 5) | digit as u64;
        }
        Ok(Self(value))
    }
}

impl fmt::Debug for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tid({self})")
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.to_s32();
        write!(f, "{}-{}-{}-{}", &s[0..4], &s[4..7], &s[7..11], &s[11..13])
    }
}

impl FromStr for Tid {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Tid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Monotonic `Tid` source.
///
/// Each call to [`TidClock::next`] returns an identifier strictly greater than
/// every identifier this clock returned before, even when the wall clock
/// stalls or steps backwards.
#[derive(Debug)]
pub struct TidClock {
    clock_id: u16,
    last_us: AtomicU64,
}

impl TidClock {
    pub fn new(clock_id: u16) -> Self {
        Self {
            clock_id: clock_id & CLOCK_ID_MASK as u16,
            last_us: AtomicU64::new(0),
        }
    }

    /// Clock with a random id, for processes that do not coordinate ids.
    pub fn random() -> Self {
        Self::new(rand::random::<u16>())
    }

    pub fn clock_id(&self) -> u16 {
        self.clock_id
    }

    pub fn next(&self) -> Tid {
        let now_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        let mut prev = self.last_us.load(Ordering::Relaxed);
        loop {
            let ts = now_us.max(prev + 1);
            match self
                .last_us
                .compare_exchange_weak(prev, ts, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Tid::new(ts, self.clock_id),
                Err(actual) => prev = actual,
            }
        }
    }
}
