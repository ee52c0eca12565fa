//! Channel names: the client-facing subscription key.
//!
//! A channel is one of two families (`token.<id>`, `user.<id>`) plus the
//! singleton `global`. Matching is exact and flat — the earlier hierarchical
//! form `token.<id>.<event>` is rejected at parse time; event-type
//! discrimination lives in the envelope's `type` field instead.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A validated channel name.
///
/// Cloning is cheap relative to the lifetime of a subscription (held in
/// hash-map keys on the shard's subscription index), so this wraps an owned
/// `String` rather than borrowing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Channel(String);

impl Channel {
    /// The singleton channel subscribed to broker-wide announcements.
    pub const GLOBAL: &'static str = "global";

    /// Parse and validate a channel string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidChannel`] if `raw` is not `global` and does
    /// not match `token.<id>` or `user.<id>` with a non-empty id containing no
    /// further `.` separators.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if raw == Self::GLOBAL {
            return Ok(Self(raw.to_string()));
        }

        let Some((family, id)) = raw.split_once('.') else {
            return Err(CoreError::InvalidChannel(raw.to_string()));
        };

        if id.is_empty() || id.contains('.') {
            return Err(CoreError::InvalidChannel(raw.to_string()));
        }

        match family {
            "token" | "user" => Ok(Self(raw.to_string())),
            _ => Err(CoreError::InvalidChannel(raw.to_string())),
        }
    }

    /// Build the `token.<id>` channel for a token id, without re-validating —
    /// callers that already hold a token id (e.g. from a broker record key)
    /// can skip the parse round trip.
    #[must_use]
    pub fn token(id: &str) -> Self {
        Self(format!("token.{id}"))
    }

    /// Build the `user.<id>` channel for a user id.
    #[must_use]
    pub fn user(id: &str) -> Self {
        Self(format!("user.{id}"))
    }

    /// Borrow the channel as a plain string, e.g. for wire-format echoing.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Channel {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Channel> for String {
    fn from(value: Channel) -> Self {
        value.0
    }
}
