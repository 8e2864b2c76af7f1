//! Store-native filter predicates.
//!
//! A [`Predicate`] is a conjunction of comparison clauses over record keys and
//! properties. It renders to the OData `$filter` syntax understood by
//! key-ordered table services and can be evaluated in-process by adapters
//! without a native filter language.

use std::cmp::Ordering;
use std::fmt;

use chrono::SecondsFormat;

use super::{PropertyValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn keyword(self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
        }
    }
}

/// Addressable part of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    PartitionKey,
    RowKey,
    Timestamp,
    Property(String),
}

impl Field {
    pub fn property(name: impl Into<String>) -> Self {
        Field::Property(name.into())
    }

    fn name(&self) -> &str {
        match self {
            Field::PartitionKey => "PartitionKey",
            Field::RowKey => "RowKey",
            Field::Timestamp => "Timestamp",
            Field::Property(name) => name,
        }
    }

    fn resolve(&self, record: &Record) -> Option<PropertyValue> {
        match self {
            Field::PartitionKey => Some(PropertyValue::String(record.partition_key.clone())),
            Field::RowKey => Some(PropertyValue::String(record.row_key.clone())),
            Field::Timestamp => record.timestamp.map(PropertyValue::DateTime),
            Field::Property(name) => record.get(name).cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: Field,
        op: CompareOp,
        value: PropertyValue,
    },
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn compare(field: Field, op: CompareOp, value: impl Into<PropertyValue>) -> Self {
        Predicate::Compare {
            field,
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: Field, value: impl Into<PropertyValue>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    /// Joins clauses with AND. No clauses means no predicate at all.
    pub fn all(clauses: Vec<Predicate>) -> Option<Predicate> {
        let mut flat = Vec::with_capacity(clauses.len());
        for clause in clauses {
            match clause {
                Predicate::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Predicate::And(flat)),
        }
    }

    /// Half-open partition key range `[lower, upper)`.
    pub fn partition_key_range(lower: impl Into<String>, upper: impl Into<String>) -> Self {
        Predicate::And(vec![
            Self::compare(Field::PartitionKey, CompareOp::Ge, lower.into()),
            Self::compare(Field::PartitionKey, CompareOp::Lt, upper.into()),
        ])
    }

    /// Top-level conjuncts in evaluation order.
    pub fn clauses(&self) -> Vec<&Predicate> {
        match self {
            Predicate::And(inner) => inner.iter().flat_map(|p| p.clauses()).collect(),
            leaf => vec![leaf],
        }
    }

    /// The partition key demanded by an equality conjunct, if any.
    pub fn partition_key_eq(&self) -> Option<&str> {
        self.clauses().into_iter().find_map(|clause| match clause {
            Predicate::Compare {
                field: Field::PartitionKey,
                op: CompareOp::Eq,
                value: PropertyValue::String(pk),
            } => Some(pk.as_str()),
            _ => None,
        })
    }

    /// Evaluates the predicate against a record.
    ///
    /// A comparison against a missing property, or between values of
    /// incompatible types, is false.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::And(inner) => inner.iter().all(|p| p.matches(record)),
            Predicate::Compare { field, op, value } => field
                .resolve(record)
                .and_then(|actual| actual.compare(value))
                .is_some_and(|ordering| op.holds(ordering)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { field, op, value } => {
                write!(f, "{} {} ", field.name(), op.keyword())?;
                write_literal(f, value)
            }
            Predicate::And(inner) => {
                for (i, clause) in inner.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    if matches!(clause, Predicate::And(_)) {
                        write!(f, "({clause})")?;
                    } else {
                        write!(f, "{clause}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &PropertyValue) -> fmt::Result {
    match value {
        PropertyValue::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        PropertyValue::Int(i) => write!(f, "{i}L"),
        PropertyValue::Double(d) => write!(f, "{d:?}"),
        PropertyValue::Bool(b) => write!(f, "{b}"),
        PropertyValue::DateTime(t) => write!(f, "datetime'{}'", t.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }
}
