//! Typed catalog predicates.
//!
//! A [`Predicate`] is a small expression tree over run and data-record
//! fields. It can be rendered into a deterministic query document for logging
//! or for a document-store catalog, and evaluated locally with a [`Matcher`].

use std::cmp::Ordering;
use std::collections::HashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use crate::{DataRecord, Run, RunNumber, Time};

/// A queryable field.
///
/// `Number` through `Tags` address a run; the rest address one entry of a
/// run's `data` collection and are only meaningful inside
/// [`Predicate::ElementMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Run number
    Number,
    /// Operating mode
    Mode,
    /// Calibration source
    Source,
    /// Start time
    Start,
    /// Detector subsystem tags
    Detectors,
    /// Operator tags
    Tags,
    /// Record data type
    DataType,
    /// Record host
    Host,
    /// Record transfer status
    Status,
    /// Record storage site
    Location,
    /// Record data identifier
    Did,
}

impl Field {
    /// Document path of the field.
    pub fn path(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Mode => "mode",
            Self::Source => "source",
            Self::Start => "start",
            Self::Detectors => "detectors",
            Self::Tags => "tags",
            Self::DataType => "type",
            Self::Host => "host",
            Self::Status => "status",
            Self::Location => "location",
            Self::Did => "did",
        }
    }
}

/// A scalar compared against field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Integer
    Int(i64),
    /// String
    Text(String),
    /// Timestamp
    Time(Time),
}

impl Value {
    /// Ordering between values of the same kind.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn to_json(&self) -> Json {
        match self {
            Self::Int(i) => json!(i),
            Self::Text(s) => json!(s),
            Self::Time(t) => json!({ "$date": t.to_rfc3339() }),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<RunNumber> for Value {
    fn from(n: RunNumber) -> Self {
        Self::Int(i64::from(n.get()))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Time> for Value {
    fn from(t: Time) -> Self {
        Self::Time(t)
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Equal
    Eq,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }

    fn operator(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }
}

/// A boolean expression over run documents.
///
/// Multi-valued fields satisfy a comparison when any of their values does.
/// A missing field never satisfies `Compare`, `In` or `Matches`, and always
/// satisfies `NotIn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// All children hold (true when empty)
    And(Vec<Predicate>),
    /// Any child holds (false when empty)
    Or(Vec<Predicate>),
    /// Negation
    Not(Box<Predicate>),
    /// Field compared against a value
    Compare {
        /// Compared field
        field: Field,
        /// Operator
        op: CompareOp,
        /// Right-hand side
        value: Value,
    },
    /// Field value is a member of the set
    In {
        /// Tested field
        field: Field,
        /// Accepted values
        values: Vec<Value>,
    },
    /// No field value is a member of the set
    NotIn {
        /// Tested field
        field: Field,
        /// Rejected values
        values: Vec<Value>,
    },
    /// Regex search within a text field
    Matches {
        /// Searched field
        field: Field,
        /// Regular expression
        pattern: String,
    },
    /// At least one data record satisfies the inner predicate
    ElementMatch(Box<Predicate>),
}

impl Predicate {
    /// Predicate matching every run.
    pub fn always() -> Self {
        Self::And(Vec::new())
    }

    /// Conjunction. A single child is returned unwrapped.
    pub fn and(mut children: Vec<Predicate>) -> Self {
        if children.len() == 1 {
            return children.remove(0);
        }
        Self::And(children)
    }

    /// Disjunction. A single child is returned unwrapped.
    pub fn or(mut children: Vec<Predicate>) -> Self {
        if children.len() == 1 {
            return children.remove(0);
        }
        Self::Or(children)
    }

    /// Negation.
    pub fn not(inner: Predicate) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Comparison.
    pub fn compare(field: Field, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare { field, op, value: value.into() }
    }

    /// Equality.
    pub fn eq(field: Field, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    /// Set membership.
    pub fn is_in<V: Into<Value>>(field: Field, values: impl IntoIterator<Item = V>) -> Self {
        Self::In { field, values: values.into_iter().map(Into::into).collect() }
    }

    /// Negated set membership.
    pub fn not_in<V: Into<Value>>(field: Field, values: impl IntoIterator<Item = V>) -> Self {
        Self::NotIn { field, values: values.into_iter().map(Into::into).collect() }
    }

    /// Regex search.
    pub fn matches(field: Field, pattern: impl Into<String>) -> Self {
        Self::Matches { field, pattern: pattern.into() }
    }

    /// Data-record element match.
    pub fn elem_match(inner: Predicate) -> Self {
        Self::ElementMatch(Box::new(inner))
    }

    /// Render as a query document. Key order is stable, so equal predicates
    /// always render identically.
    pub fn to_document(&self) -> Json {
        match self {
            Self::And(children) if children.is_empty() => json!({}),
            Self::And(children) => json!({ "$and": documents(children) }),
            Self::Or(children) => json!({ "$or": documents(children) }),
            Self::Not(inner) => json!({ "$nor": [inner.to_document()] }),
            Self::Compare { field, op: CompareOp::Eq, value } => {
                single(field.path(), value.to_json())
            }
            Self::Compare { field, op, value } => {
                single(field.path(), single(op.operator(), value.to_json()))
            }
            Self::In { field, values } => {
                single(field.path(), json!({ "$in": values.iter().map(Value::to_json).collect::<Vec<_>>() }))
            }
            Self::NotIn { field, values } => {
                single(field.path(), json!({ "$nin": values.iter().map(Value::to_json).collect::<Vec<_>>() }))
            }
            Self::Matches { field, pattern } => single(field.path(), json!({ "$regex": pattern })),
            Self::ElementMatch(inner) => json!({ "data": { "$elemMatch": inner.to_document() } }),
        }
    }

    /// Evaluate against a run.
    pub fn evaluate(&self, run: &Run) -> Result<bool, PredicateError> {
        Ok(Matcher::new(self)?.matches(run))
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_document())
    }
}

fn documents(children: &[Predicate]) -> Vec<Json> {
    children.iter().map(Predicate::to_document).collect()
}

fn single(key: &str, value: Json) -> Json {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Json::Object(map)
}

/// Errors raised while preparing a predicate for evaluation.
#[derive(Debug, thiserror::Error)]
pub enum PredicateError {
    /// A `Matches` node carries a pattern that does not compile
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// Compilation failure
        #[source]
        source: regex::Error,
    },
}

/// Something a predicate can be evaluated against.
pub trait Document {
    /// All values of `field`; empty when absent.
    fn values(&self, field: Field) -> Vec<Value>;

    /// Nested data records.
    fn records(&self) -> &[DataRecord];
}

impl Document for Run {
    fn values(&self, field: Field) -> Vec<Value> {
        match field {
            Field::Number => vec![self.number.into()],
            Field::Mode => self.mode.iter().map(|m| m.as_str().into()).collect(),
            Field::Source => self.source.iter().map(|s| s.as_str().into()).collect(),
            Field::Start => self.start.iter().map(|t| Value::Time(*t)).collect(),
            Field::Detectors => self.detectors.iter().map(|d| d.as_str().into()).collect(),
            Field::Tags => self.tags.iter().map(|t| t.as_str().into()).collect(),
            _ => Vec::new(),
        }
    }

    fn records(&self) -> &[DataRecord] {
        &self.data
    }
}

impl Document for DataRecord {
    fn values(&self, field: Field) -> Vec<Value> {
        match field {
            Field::DataType => vec![self.data_type.as_str().into()],
            Field::Host => vec![self.host.as_str().into()],
            Field::Status => vec![self.status.as_str().into()],
            Field::Location => self.location.iter().map(|l| l.as_str().into()).collect(),
            Field::Did => self.did.iter().map(|d| d.as_str().into()).collect(),
            _ => Vec::new(),
        }
    }

    fn records(&self) -> &[DataRecord] {
        &[]
    }
}

/// A predicate with its patterns compiled, ready for repeated evaluation.
pub struct Matcher<'a> {
    predicate: &'a Predicate,
    patterns: HashMap<&'a str, Regex>,
}

impl<'a> Matcher<'a> {
    /// Compile every pattern in `predicate`.
    pub fn new(predicate: &'a Predicate) -> Result<Self, PredicateError> {
        let mut patterns = HashMap::new();
        compile_patterns(predicate, &mut patterns)?;
        Ok(Self { predicate, patterns })
    }

    /// Whether `doc` satisfies the predicate.
    pub fn matches<D: Document>(&self, doc: &D) -> bool {
        self.eval(self.predicate, doc)
    }

    fn eval<D: Document>(&self, predicate: &Predicate, doc: &D) -> bool {
        match predicate {
            Predicate::And(children) => children.iter().all(|c| self.eval(c, doc)),
            Predicate::Or(children) => children.iter().any(|c| self.eval(c, doc)),
            Predicate::Not(inner) => !self.eval(inner, doc),
            Predicate::Compare { field, op, value } => doc
                .values(*field)
                .iter()
                .any(|v| v.compare(value).is_some_and(|o| op.holds(o))),
            Predicate::In { field, values } => {
                doc.values(*field).iter().any(|v| values.contains(v))
            }
            Predicate::NotIn { field, values } => {
                !doc.values(*field).iter().any(|v| values.contains(v))
            }
            Predicate::Matches { field, pattern } => {
                let Some(re) = self.patterns.get(pattern.as_str()) else {
                    return false;
                };
                doc.values(*field)
                    .iter()
                    .any(|v| matches!(v, Value::Text(s) if re.is_match(s)))
            }
            Predicate::ElementMatch(inner) => {
                doc.records().iter().any(|r| self.eval(inner, r))
            }
        }
    }
}

fn compile_patterns<'a>(
    predicate: &'a Predicate,
    patterns: &mut HashMap<&'a str, Regex>,
) -> Result<(), PredicateError> {
    match predicate {
        Predicate::And(children) | Predicate::Or(children) => {
            for child in children {
                compile_patterns(child, patterns)?;
            }
        }
        Predicate::Not(inner) | Predicate::ElementMatch(inner) => {
            compile_patterns(inner, patterns)?;
        }
        Predicate::Matches { pattern, .. } if !patterns.contains_key(pattern.as_str()) => {
            let re = Regex::new(pattern).map_err(|source| PredicateError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            patterns.insert(pattern.as_str(), re);
        }
        _ => {}
    }
    Ok(())
}
