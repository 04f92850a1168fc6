//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// Invalid unknown-agent policy value.
    #[error("invalid unknown agent policy: {value}")]
    InvalidUnknownAgentPolicy { value: String },

    /// Invalid split policy value.
    #[error("invalid split policy: {value}")]
    InvalidSplitPolicy { value: String },
}

/// What the aggregation does with an agent name that has no configured agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownAgentPolicy {
    /// Skip the event and count it.
    #[default]
    Skip,
    /// Abort the whole run.
    Fail,
}

impl UnknownAgentPolicy {
    /// String representation for configuration files.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for UnknownAgentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UnknownAgentPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(Self::Skip),
            "fail" => Ok(Self::Fail),
            _ => Err(ValidationError::InvalidUnknownAgentPolicy {
                value: s.to_string(),
            }),
        }
    }
}

/// How a wrap-up interval is spread over the windows it overlaps.
///
/// `Adjacent` only ever credits the starting and ending window. Intervals
/// longer than one window lose the time that falls in between.
/// `Spanning` also credits every window strictly between the two.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitPolicy {
    #[default]
    Adjacent,
    Spanning,
}

impl SplitPolicy {
    /// String representation for configuration files.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Adjacent => "adjacent",
            Self::Spanning => "spanning",
        }
    }
}

impl fmt::Display for SplitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SplitPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "adjacent" => Ok(Self::Adjacent),
            "spanning" => Ok(Self::Spanning),
            _ => Err(ValidationError::InvalidSplitPolicy {
                value: s.to_string(),
            }),
        }
    }
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// The agent string recorded in the queue log.
    ///
    /// Usually `Agent/<number>`, but the log is free-form and bare numbers
    /// occur too. Resolution to an [`AgentId`] happens outside this crate.
    AgentName, "agent name"
);

define_string_id!(
    /// A validated call identifier from the queue log.
    CallId, "call ID"
);

/// Stable identifier of a configured agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(i64);

impl AgentId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
