//! Predicate accumulation and translation to engine filters.

use crate::error::{CoreError, CoreResult};
use crate::metadata::EntityMeta;
use scopedb_engine::{CmpOp, Filter, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A predicate comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Comparator {
    /// `=`: equality. Textual literals are parsed for identifier columns.
    Eq,
    /// `>`: numeric at-least. Inclusive despite the symbol.
    AtLeast,
    /// `<`: numeric strictly-less.
    LessThan,
    /// `like`: pattern match with `%` and `_`.
    Like,
}

impl Comparator {
    /// Returns the symbol callers use for this comparator.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::AtLeast => ">",
            Comparator::LessThan => "<",
            Comparator::Like => "like",
        }
    }

    fn op(self) -> CmpOp {
        match self {
            Comparator::Eq => CmpOp::Eq,
            Comparator::AtLeast => CmpOp::Ge,
            Comparator::LessThan => CmpOp::Lt,
            Comparator::Like => CmpOp::Like,
        }
    }
}

impl FromStr for Comparator {
    type Err = CoreError;

    /// Accepts `=`, `==`, `>`, `>=`, `<` and `like` (any case, surrounding
    /// whitespace ignored). `>` and `>=` are the same comparator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "=" | "==" => Ok(Comparator::Eq),
            ">" | ">=" => Ok(Comparator::AtLeast),
            "<" => Ok(Comparator::LessThan),
            _ if trimmed.eq_ignore_ascii_case("like") => Ok(Comparator::Like),
            _ => Err(CoreError::UnsupportedComparator {
                comparator: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The predicates of one query: at most one value per (property, comparator).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateSet {
    entries: BTreeMap<(String, Comparator), Value>,
}

impl PredicateSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value for a (property, comparator) pair, replacing any earlier one.
    pub fn set(&mut self, property: impl Into<String>, comparator: Comparator, value: Value) {
        self.entries.insert((property.into(), comparator), value);
    }

    /// Returns the value for a (property, comparator) pair.
    #[must_use]
    pub fn get(&self, property: &str, comparator: Comparator) -> Option<&Value> {
        self.entries.get(&(property.to_string(), comparator))
    }

    /// Removes every predicate.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the number of predicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no predicates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over (property, comparator, value) in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Comparator, &Value)> {
        self.entries.iter().map(|((p, c), v)| (p.as_str(), *c, v))
    }

    /// Builds the conjunctive engine filter, mapping properties to columns and
    /// coercing equality literals for their column type.
    ///
    /// # Errors
    ///
    /// `UnresolvedColumn` if a property is not mapped, or an engine
    /// `InvalidLiteral` if an equality literal cannot be coerced.
    pub fn to_filter(&self, meta: &EntityMeta) -> CoreResult<Filter> {
        let mut filter = Filter::new();
        for ((property, comparator), value) in &self.entries {
            let prop = meta
                .property(property)
                .ok_or_else(|| CoreError::unresolved_column(meta.name(), property))?;
            let value = match comparator {
                Comparator::Eq => prop.coerce(value.clone())?,
                _ => value.clone(),
            };
            filter.push(&prop.def.column, comparator.op(), value);
        }
        Ok(filter)
    }
}
