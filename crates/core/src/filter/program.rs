use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::FilterError;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterProgram {
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Predicate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by_count: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Aggregate>,
}

impl FilterProgram {
    pub fn from_model_json(raw: &str) -> Result<Self, FilterError> {
        serde_json::from_str(raw.trim()).map_err(|error| FilterError::Malformed(error.to_string()))
    }

    /// Every column the program names, in the order they appear.
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut columns = Vec::new();
        if let Some(predicate) = &self.predicate {
            predicate.collect_columns(&mut columns);
        }
        columns.extend(self.select.iter().map(String::as_str));
        if let Some(column) = &self.group_by_count {
            columns.push(column.as_str());
        }
        columns
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predicate {
    All { all: Vec<Predicate> },
    Any { any: Vec<Predicate> },
    Not { not: Box<Predicate> },
    Compare(Comparison),
}

impl Predicate {
    fn collect_columns<'a>(&'a self, columns: &mut Vec<&'a str>) {
        match self {
            Self::All { all: predicates } | Self::Any { any: predicates } => {
                for predicate in predicates {
                    predicate.collect_columns(columns);
                }
            }
            Self::Not { not } => not.collect_columns(columns),
            Self::Compare(comparison) => columns.push(comparison.column.as_str()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Comparison {
    pub column: String,
    pub op: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub case_insensitive: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[serde(alias = "==")]
    Eq,
    #[serde(alias = "!=")]
    Ne,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Gte,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Lte,
    IsEmpty,
    NotEmpty,
    LengthGt,
    LengthLt,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::NotStartsWith => "not_starts_with",
            Self::EndsWith => "ends_with",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::IsEmpty => "is_empty",
            Self::NotEmpty => "not_empty",
            Self::LengthGt => "length_gt",
            Self::LengthLt => "length_lt",
        }
    }

    pub fn needs_value(&self) -> bool {
        !matches!(self, Self::IsEmpty | Self::NotEmpty)
    }

    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortSpec {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Count,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{FilterProgram, Operator, Predicate};
    use crate::filter::FilterError;

    #[test]
    fn nested_predicates_decode() {
        let program = FilterProgram::from_model_json(
            r#"{
                "where": {"all": [
                    {"column": "Address", "op": "not_starts_with", "value": "https"},
                    {"not": {"column": "Title 1", "op": "is_empty"}}
                ]},
                "select": ["Address"],
                "limit": 3
            }"#,
        )
        .expect("program should decode");

        let Some(Predicate::All { all }) = &program.predicate else {
            panic!("expected an `all` predicate, got {:?}", program.predicate);
        };
        assert_eq!(all.len(), 2);
        assert!(matches!(&all[1], Predicate::Not { .. }));
        assert_eq!(program.limit, Some(3));
        assert_eq!(program.referenced_columns(), vec!["Address", "Title 1", "Address"]);
    }

    #[test]
    fn symbolic_operators_are_accepted() {
        let program = FilterProgram::from_model_json(
            r#"{"where": {"column": "Word Count", "op": ">=", "value": 300}}"#,
        )
        .expect("program should decode");

        let Some(Predicate::Compare(comparison)) = program.predicate else {
            panic!("expected a comparison");
        };
        assert_eq!(comparison.op, Operator::Gte);
        assert_eq!(comparison.value, Some(json!(300)));
    }

    #[test]
    fn free_form_code_is_rejected() {
        let error = FilterProgram::from_model_json("df[df['Address'].str.startswith('http://')]")
            .expect_err("code is not a filter program");
        assert!(matches!(error, FilterError::Malformed(_)));

        let error = FilterProgram::from_model_json(r#"{"where": null, "exec": "import os"}"#)
            .expect_err("unknown keys are rejected");
        assert!(matches!(error, FilterError::Malformed(_)));
    }
}
