//! Opaque execution handles.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Non-owning key for a host-owned execution context (a call stack or
/// coroutine). The debugger never allocates or frees what it names.
///
/// Displayed and serialized as a hex token (`0x1f`), which is also how
/// clients refer to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionHandle(u64);

impl ExecutionHandle {
    /// Wrap a raw host identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw host identifier.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Serialize for ExecutionHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExecutionHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Token(String),
            Raw(u64),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Token(token) => token.parse().map_err(D::Error::custom),
            Repr::Raw(raw) => Ok(Self(raw)),
        }
    }
}

/// Error parsing a handle token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid execution handle: {0:?}")]
pub struct ParseHandleError(String);

impl FromStr for ExecutionHandle {
    type Err = ParseHandleError;

    /// Accepts `0x`-prefixed hex or plain decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        };
        parsed
            .map(ExecutionHandle)
            .map_err(|_| ParseHandleError(s.to_string()))
    }
}
