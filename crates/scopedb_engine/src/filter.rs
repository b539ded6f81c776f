//! Conjunctive row filters and bulk-update assignments.

use crate::error::{EngineError, EngineResult};
use crate::schema::{ColumnType, TableSchema};
use crate::value::Value;
use crate::Row;
use std::cmp::Ordering;
use std::fmt;

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CmpOp {
    /// Equality.
    Eq,
    /// Numeric greater-or-equal.
    Ge,
    /// Numeric strictly-less.
    Lt,
    /// Pattern match with `%` and `_` wildcards.
    Like,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Eq => "=",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Like => "LIKE",
        })
    }
}

/// One `column op value` term.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Column name.
    pub column: String,
    /// Operator.
    pub op: CmpOp,
    /// Literal operand.
    pub value: Value,
}

impl Condition {
    fn validate(&self, schema: &TableSchema) -> EngineResult<()> {
        let column = schema.require_column(&self.column)?;
        match self.op {
            CmpOp::Eq => {
                if !column.ty.accepts(&self.value) {
                    return Err(EngineError::type_mismatch(
                        &self.column,
                        format!(
                            "cannot compare {} column with {} value",
                            column.ty,
                            self.value.type_name()
                        ),
                    ));
                }
            }
            CmpOp::Ge | CmpOp::Lt => {
                if !column.ty.is_numeric() || !self.value.is_numeric() {
                    return Err(EngineError::type_mismatch(
                        &self.column,
                        format!(
                            "{} needs a numeric column and value, got {} and {}",
                            self.op,
                            column.ty,
                            self.value.type_name()
                        ),
                    ));
                }
            }
            CmpOp::Like => {
                if column.ty != ColumnType::Text || self.value.as_text().is_none() {
                    return Err(EngineError::type_mismatch(
                        &self.column,
                        format!(
                            "LIKE needs a text column and pattern, got {} and {}",
                            column.ty,
                            self.value.type_name()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return false;
        };
        match self.op {
            CmpOp::Eq => actual.sql_eq(&self.value),
            CmpOp::Ge => matches!(
                actual.numeric_cmp(&self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            CmpOp::Lt => matches!(actual.numeric_cmp(&self.value), Some(Ordering::Less)),
            CmpOp::Like => match (actual.as_text(), self.value.as_text()) {
                (Some(text), Some(pattern)) => like_matches(pattern, text),
                _ => false,
            },
        }
    }
}

/// A conjunction of conditions. The empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition, builder style.
    #[must_use]
    pub fn and(mut self, column: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        self.push(column, op, value);
        self
    }

    /// Adds a condition.
    pub fn push(&mut self, column: impl Into<String>, op: CmpOp, value: impl Into<Value>) {
        self.conditions.push(Condition {
            column: column.into(),
            op,
            value: value.into(),
        });
    }

    /// Returns the conditions.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns true if the filter has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Checks every condition against the table definition.
    pub fn validate(&self, schema: &TableSchema) -> EngineResult<()> {
        self.conditions.iter().try_for_each(|c| c.validate(schema))
    }

    /// Evaluates the conjunction against a row.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("TRUE");
        }
        for (i, c) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{} {} {}", c.column, c.op, c.value)?;
        }
        Ok(())
    }
}

/// Column assignments for a bulk update, in application order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignments {
    entries: Vec<(String, Value)>,
}

impl Assignments {
    /// Creates an empty assignment list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column, replacing an earlier assignment to the same column.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    /// Iterates over the assignments.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Returns the number of assignments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks columns, types and nullability against the table definition.
    pub fn validate(&self, schema: &TableSchema) -> EngineResult<()> {
        for (column, value) in &self.entries {
            let def = schema.require_column(column)?;
            if *column == schema.primary_key {
                return Err(EngineError::ImmutableColumn {
                    table: schema.name.clone(),
                    column: column.clone(),
                });
            }
            if !def.ty.accepts(value) {
                return Err(EngineError::type_mismatch(
                    column,
                    format!("cannot assign {} value to {} column", value.type_name(), def.ty),
                ));
            }
            if value.is_null() && !def.nullable {
                return Err(EngineError::NotNull {
                    table: schema.name.clone(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    /// Applies the assignments to a row in place.
    pub fn apply(&self, schema: &TableSchema, row: &mut Row) {
        for (column, value) in &self.entries {
            let value = match schema.column(column) {
                Some(def) => def.ty.normalize(value.clone()),
                None => value.clone(),
            };
            row.insert(column.clone(), value);
        }
    }
}

/// SQL `LIKE` over whole values: `%` matches any run, `_` one character.
#[must_use]
pub fn like_matches(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    // reachable[j]: pattern prefix consumed so far can end at text position j
    let mut reachable = vec![false; t.len() + 1];
    reachable[0] = true;
    for pc in &p {
        let mut next = vec![false; t.len() + 1];
        match pc {
            '%' => {
                let mut seen = false;
                for j in 0..=t.len() {
                    seen |= reachable[j];
                    next[j] = seen;
                }
            }
            '_' => {
                for j in 0..t.len() {
                    next[j + 1] = reachable[j];
                }
            }
            c => {
                for j in 0..t.len() {
                    next[j + 1] = reachable[j] && t[j] == *c;
                }
            }
        }
        reachable = next;
    }
    reachable[t.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ColumnType};

    fn schema() -> TableSchema {
        TableSchema::new("items", "id")
            .with_column(ColumnDef::new("id", ColumnType::Int).nullable(false))
            .with_column(ColumnDef::new("name", ColumnType::Text))
            .with_column(ColumnDef::new("qty", ColumnType::Int))
            .with_column(ColumnDef::new("tag", ColumnType::Uuid))
    }

    fn row(id: i64, name: &str, qty: i64) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::Int(id));
        row.insert("name".into(), Value::from(name));
        row.insert("qty".into(), Value::Int(qty));
        row.insert("tag".into(), Value::Null);
        row
    }

    #[test]
    fn like_wildcards() {
        assert!(like_matches("t%", "t2"));
        assert!(like_matches("t_", "t2"));
        assert!(!like_matches("t_", "t22"));
        assert!(like_matches("%2%", "a2b"));
        assert!(like_matches("%", ""));
        assert!(!like_matches("abc", "abcd"));
        assert!(like_matches("a%c", "abbbc"));
    }

    #[test]
    fn ge_is_inclusive_and_lt_is_strict() {
        let f = Filter::new().and("qty", CmpOp::Ge, 5).and("qty", CmpOp::Lt, 10);
        assert!(f.matches(&row(1, "a", 5)));
        assert!(f.matches(&row(1, "a", 9)));
        assert!(!f.matches(&row(1, "a", 10)));
        assert!(!f.matches(&row(1, "a", 4)));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&row(1, "a", 1)));
        assert_eq!(Filter::new().to_string(), "TRUE");
    }

    #[test]
    fn validate_rejects_unknown_column() {
        let f = Filter::new().and("missing", CmpOp::Eq, 1);
        assert!(matches!(
            f.validate(&schema()),
            Err(EngineError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn validate_rejects_text_for_uuid_column() {
        let f = Filter::new().and("tag", CmpOp::Eq, "not-a-uuid");
        assert!(matches!(
            f.validate(&schema()),
            Err(EngineError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn validate_rejects_non_numeric_range() {
        let f = Filter::new().and("qty", CmpOp::Ge, "five");
        assert!(f.validate(&schema()).is_err());
        let f = Filter::new().and("name", CmpOp::Lt, 3);
        assert!(f.validate(&schema()).is_err());
    }

    #[test]
    fn display_renders_conjunction() {
        let f = Filter::new().and("name", CmpOp::Eq, "t2").and("qty", CmpOp::Ge, 3);
        assert_eq!(f.to_string(), "name = 't2' AND qty >= 3");
    }

    #[test]
    fn assignments_overwrite_and_validate() {
        let mut a = Assignments::new();
        a.set("name", "x");
        a.set("name", "y");
        assert_eq!(a.len(), 1);
        a.validate(&schema()).unwrap();

        let mut r = row(1, "a", 1);
        a.apply(&schema(), &mut r);
        assert_eq!(r["name"], Value::from("y"));

        let mut pk = Assignments::new();
        pk.set("id", 3);
        assert!(matches!(
            pk.validate(&schema()),
            Err(EngineError::ImmutableColumn { .. })
        ));
    }

    mod like_properties {
        use crate::filter::like_matches;
        use proptest::prelude::*;

        fn plain_text() -> impl Strategy<Value = String> {
            prop::string::string_regex("[a-z0-9 ]{0,12}").expect("Invalid regex")
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn text_without_wildcards_matches_itself(text in plain_text()) {
                prop_assert!(like_matches(&text, &text));
                prop_assert!(like_matches("%", &text));
            }

            #[test]
            fn prefix_pattern_matches_extensions(prefix in plain_text(), rest in plain_text()) {
                let text = format!("{prefix}{rest}");
                let prefix_pattern = format!("{prefix}%");
                let suffix_pattern = format!("%{rest}");
                prop_assert!(like_matches(&prefix_pattern, &text));
                prop_assert!(like_matches(&suffix_pattern, &text));
            }

            #[test]
            fn underscores_match_exact_length(text in plain_text(), extra in 1usize..4) {
                let len = text.chars().count();
                prop_assert!(like_matches(&"_".repeat(len), &text));
                prop_assert!(!like_matches(&"_".repeat(len + extra), &text));
            }
        }
    }
}
