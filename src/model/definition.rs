//! Test Definition Model
//!
//! A test definition is the unit that moves between environments: a set of
//! numbered buckets plus ordered allocations that map traffic ranges onto
//! bucket values. Definitions are immutable at a given store revision.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier type a test is keyed on when clients assign buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestType {
    #[default]
    User,
    Page,
    AnonymousUser,
    EmailAddress,
    Account,
    Random,
}

impl TestType {
    /// Wire name of the test type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Page => "PAGE",
            Self::AnonymousUser => "ANONYMOUS_USER",
            Self::EmailAddress => "EMAIL_ADDRESS",
            Self::Account => "ACCOUNT",
            Self::Random => "RANDOM",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload attached to a bucket.
///
/// Serialized with a single key naming the payload type, e.g.
/// `{"stringValue": "blue"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Payload {
    DoubleValue(f64),
    DoubleArray(Vec<f64>),
    LongValue(i64),
    LongArray(Vec<i64>),
    StringValue(String),
    StringArray(Vec<String>),
    Map(BTreeMap<String, Value>),
}

impl Payload {
    /// Name of the payload type as clients declare it in their specification.
    pub fn payload_type(&self) -> &'static str {
        match self {
            Self::DoubleValue(_) => "doubleValue",
            Self::DoubleArray(_) => "doubleArray",
            Self::LongValue(_) => "longValue",
            Self::LongArray(_) => "longArray",
            Self::StringValue(_) => "stringValue",
            Self::StringArray(_) => "stringArray",
            Self::Map(_) => "map",
        }
    }

    /// Check whether `name` is a payload type this model understands.
    pub fn is_known_type(name: &str) -> bool {
        matches!(
            name,
            "doubleValue"
                | "doubleArray"
                | "longValue"
                | "longArray"
                | "stringValue"
                | "stringArray"
                | "map"
        )
    }
}

/// A named, numbered variant of a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestBucket {
    pub name: String,
    pub value: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TestBucket {
    pub fn new(name: impl Into<String>, value: i32) -> Self {
        Self {
            name: name.into(),
            value,
            payload: None,
            description: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A slice of traffic assigned to one bucket value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    pub bucket_value: i32,
    pub length: f64,
}

impl Range {
    pub fn new(bucket_value: i32, length: f64) -> Self {
        Self {
            bucket_value,
            length,
        }
    }
}

/// Ordered ranges, optionally gated by a targeting rule.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default)]
    pub ranges: Vec<Range>,
}

impl Allocation {
    pub fn new(rule: Option<String>, ranges: Vec<Range>) -> Self {
        Self { rule, ranges }
    }

    /// Sum of every range length in this allocation.
    pub fn total_length(&self) -> f64 {
        self.ranges.iter().map(|r| r.length).sum()
    }
}

/// Versioned test configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinition {
    #[serde(default)]
    pub version: String,

    /// Targeting rule; `None` is distinct from an empty rule.
    #[serde(default)]
    pub rule: Option<String>,

    /// `None` only on incoming edits that inherit the existing type.
    #[serde(default)]
    pub test_type: Option<TestType>,

    #[serde(default)]
    pub salt: String,

    #[serde(default)]
    pub buckets: Vec<TestBucket>,

    #[serde(default)]
    pub allocations: Vec<Allocation>,

    #[serde(default)]
    pub constants: BTreeMap<String, Value>,

    #[serde(default)]
    pub special_constants: BTreeMap<String, Value>,

    #[serde(default)]
    pub description: String,
}

impl TestDefinition {
    /// Find a bucket by its numeric value.
    pub fn bucket_by_value(&self, value: i32) -> Option<&TestBucket> {
        self.buckets.iter().find(|b| b.value == value)
    }

    /// Find a bucket by name.
    pub fn bucket_by_name(&self, name: &str) -> Option<&TestBucket> {
        self.buckets.iter().find(|b| b.name == name)
    }
}
