use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use super::program::{Comparison, FilterProgram, Operator, Predicate, SortSpec};
use super::FilterError;
use crate::table::{parse_number, ColumnKind, Table};

pub const COUNT_COLUMN: &str = "count";

/// Shape of an evaluated program.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterOutput {
    Table(Table),
    /// Group-by-count result: one `(value, count)` pair per distinct value.
    Series { column: String, counts: Vec<(Value, u64)> },
    Scalar(Value),
}

impl FilterOutput {
    /// Series are promoted to a two-column table. Scalars have no table form.
    pub fn into_table(self) -> Option<Table> {
        match self {
            Self::Table(table) => Some(table),
            Self::Series { column, counts } => {
                let rows = counts
                    .into_iter()
                    .map(|(value, count)| vec![value, Value::from(count)])
                    .collect();
                Some(Table::new(vec![column, COUNT_COLUMN.to_string()], rows))
            }
            Self::Scalar(_) => None,
        }
    }
}

impl FilterProgram {
    /// Checks the program against the real schema without evaluating it.
    pub fn validate(&self, table: &Table) -> Result<(), FilterError> {
        for column in self.referenced_columns() {
            resolve_column(table, column)?;
        }

        if self.group_by_count.is_some() && !self.select.is_empty() {
            return Err(FilterError::Conflict(
                "`group_by_count` and `select` cannot be combined".to_string(),
            ));
        }
        if self.group_by_count.as_deref() == Some(COUNT_COLUMN) {
            return Err(FilterError::Conflict(format!(
                "cannot group by `{COUNT_COLUMN}`: the grouped result already has a `{COUNT_COLUMN}` column"
            )));
        }
        if self.aggregate.is_some() && (self.group_by_count.is_some() || !self.select.is_empty()) {
            return Err(FilterError::Conflict(
                "`aggregate` cannot be combined with `select` or `group_by_count`".to_string(),
            ));
        }

        if let Some(sort) = &self.sort {
            match &self.group_by_count {
                Some(group) if sort.column != *group && sort.column != COUNT_COLUMN => {
                    return Err(FilterError::Conflict(format!(
                        "grouped results can only be sorted by `{group}` or `{COUNT_COLUMN}`"
                    )));
                }
                Some(_) => {}
                None => {
                    resolve_column(table, &sort.column)?;
                }
            }
        }

        if let Some(predicate) = &self.predicate {
            validate_predicate(table, predicate)?;
        }

        Ok(())
    }

    /// Runs `where`, then `group_by_count` or `sort` + `select`, then `limit`.
    /// `aggregate: count` counts the rows that pass `where`.
    pub fn evaluate(&self, table: &Table) -> Result<FilterOutput, FilterError> {
        self.validate(table)?;

        let mut rows = match &self.predicate {
            Some(predicate) => {
                let mut kept = Vec::new();
                for row in table.rows() {
                    if matches_row(table, predicate, row)? {
                        kept.push(row.clone());
                    }
                }
                kept
            }
            None => table.rows().to_vec(),
        };

        if self.aggregate.is_some() {
            return Ok(FilterOutput::Scalar(Value::from(rows.len() as u64)));
        }

        if let Some(group) = &self.group_by_count {
            let index = resolve_column(table, group)?;
            let mut counts = group_counts(&rows, index);
            if let Some(sort) = &self.sort {
                let by_count = sort.column == COUNT_COLUMN;
                counts.sort_by(|left, right| {
                    let ordering = if by_count {
                        left.1.cmp(&right.1)
                    } else {
                        compare_values(&left.0, &right.0)
                    };
                    if sort.descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                });
            }
            if let Some(limit) = self.limit {
                counts.truncate(limit);
            }
            return Ok(FilterOutput::Series { column: group.clone(), counts });
        }

        if let Some(sort) = &self.sort {
            sort_rows(table, sort, &mut rows)?;
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }

        if self.select.is_empty() {
            return Ok(FilterOutput::Table(Table::new(table.columns().to_vec(), rows)));
        }

        let indices = self
            .select
            .iter()
            .map(|column| resolve_column(table, column))
            .collect::<Result<Vec<_>, _>>()?;
        let projected = rows
            .iter()
            .map(|row| indices.iter().map(|index| row[*index].clone()).collect())
            .collect();
        Ok(FilterOutput::Table(Table::new(self.select.clone(), projected)))
    }
}

fn resolve_column(table: &Table, column: &str) -> Result<usize, FilterError> {
    table.column_index(column).ok_or_else(|| FilterError::UnknownColumn {
        column: column.to_string(),
        available: table.columns().join(", "),
    })
}

fn validate_predicate(table: &Table, predicate: &Predicate) -> Result<(), FilterError> {
    match predicate {
        Predicate::All { all: predicates } | Predicate::Any { any: predicates } => {
            predicates.iter().try_for_each(|predicate| validate_predicate(table, predicate))
        }
        Predicate::Not { not } => validate_predicate(table, not),
        Predicate::Compare(comparison) => validate_comparison(table, comparison),
    }
}

fn validate_comparison(table: &Table, comparison: &Comparison) -> Result<(), FilterError> {
    let index = resolve_column(table, &comparison.column)?;
    let op = comparison.op;

    if !op.needs_value() {
        return Ok(());
    }
    let value = comparison
        .value
        .as_ref()
        .ok_or_else(|| FilterError::MissingValue { op, column: comparison.column.clone() })?;

    let invalid = |reason: &str| FilterError::InvalidValue {
        op,
        column: comparison.column.clone(),
        reason: reason.to_string(),
    };

    match op {
        _ if op.is_ordering() => {
            if numeric_literal(value).is_none() {
                return Err(invalid("value must be a number"));
            }
            // An empty table has no kinds to check against.
            if !table.is_empty() && table.column_kind(index) != ColumnKind::Numeric {
                return Err(invalid("column is not numeric"));
            }
        }
        Operator::LengthGt | Operator::LengthLt => {
            if numeric_literal(value).map(|length| length < 0.0).unwrap_or(true) {
                return Err(invalid("value must be a non-negative number"));
            }
        }
        _ => {
            if value.is_array() || value.is_object() {
                return Err(invalid("value must be a string, number or boolean"));
            }
        }
    }

    Ok(())
}

fn matches_row(table: &Table, predicate: &Predicate, row: &[Value]) -> Result<bool, FilterError> {
    match predicate {
        Predicate::All { all } => {
            for predicate in all {
                if !matches_row(table, predicate, row)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Any { any } => {
            for predicate in any {
                if matches_row(table, predicate, row)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::Not { not } => Ok(!matches_row(table, not, row)?),
        Predicate::Compare(comparison) => {
            let index = resolve_column(table, &comparison.column)?;
            Ok(compare_cell(&row[index], comparison))
        }
    }
}

fn compare_cell(cell: &Value, comparison: &Comparison) -> bool {
    let text = cell_text(cell);
    let Some(value) = &comparison.value else {
        return match comparison.op {
            Operator::IsEmpty => text.trim().is_empty(),
            Operator::NotEmpty => !text.trim().is_empty(),
            _ => false,
        };
    };

    match comparison.op {
        Operator::Eq => values_equal(cell, value, comparison.case_insensitive),
        Operator::Ne => !values_equal(cell, value, comparison.case_insensitive),
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            let (Some(left), Some(right)) = (cell.as_f64(), numeric_literal(value)) else {
                return false;
            };
            match comparison.op {
                Operator::Gt => left > right,
                Operator::Gte => left >= right,
                Operator::Lt => left < right,
                _ => left <= right,
            }
        }
        Operator::LengthGt | Operator::LengthLt => {
            let Some(limit) = numeric_literal(value) else {
                return false;
            };
            let length = text.chars().count() as f64;
            if comparison.op == Operator::LengthGt {
                length > limit
            } else {
                length < limit
            }
        }
        Operator::IsEmpty => text.trim().is_empty(),
        Operator::NotEmpty => !text.trim().is_empty(),
        Operator::Contains
        | Operator::NotContains
        | Operator::StartsWith
        | Operator::NotStartsWith
        | Operator::EndsWith => {
            let (haystack, needle) =
                fold_case(text, cell_text(value), comparison.case_insensitive);
            match comparison.op {
                Operator::Contains => haystack.contains(&needle),
                Operator::NotContains => !haystack.contains(&needle),
                Operator::StartsWith => haystack.starts_with(&needle),
                Operator::NotStartsWith => !haystack.starts_with(&needle),
                _ => haystack.ends_with(&needle),
            }
        }
    }
}

fn values_equal(cell: &Value, value: &Value, case_insensitive: bool) -> bool {
    if let (Some(left), Some(right)) = (cell.as_f64(), numeric_literal(value)) {
        return left == right;
    }
    let (left, right) = fold_case(cell_text(cell), cell_text(value), case_insensitive);
    left == right
}

fn fold_case(left: String, right: String, case_insensitive: bool) -> (String, String) {
    if case_insensitive {
        (left.to_lowercase(), right.to_lowercase())
    } else {
        (left, right)
    }
}

fn numeric_literal(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_number(text).and_then(|number| number.as_f64()),
        _ => None,
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn group_counts(rows: &[Vec<Value>], index: usize) -> Vec<(Value, u64)> {
    let mut order = Vec::new();
    let mut counts = HashMap::new();
    for row in rows {
        let key = cell_text(&row[index]);
        let count = counts.entry(key).or_insert(0_u64);
        if *count == 0 {
            order.push(row[index].clone());
        }
        *count += 1;
    }

    let mut grouped = order
        .into_iter()
        .map(|value| {
            let count = counts.get(&cell_text(&value)).copied().unwrap_or_default();
            (value, count)
        })
        .collect::<Vec<_>>();
    grouped.sort_by(|left, right| right.1.cmp(&left.1));
    grouped
}

fn sort_rows(table: &Table, sort: &SortSpec, rows: &mut [Vec<Value>]) -> Result<(), FilterError> {
    let index = resolve_column(table, &sort.column)?;
    rows.sort_by(|left, right| {
        let ordering = compare_values(&left[index], &right[index]);
        if sort.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
    Ok(())
}

/// Numbers order before text; numbers compare numerically, text lexically.
fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left.as_f64(), right.as_f64()) {
        (Some(left), Some(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => cell_text(left).cmp(&cell_text(right)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{FilterOutput, COUNT_COLUMN};
    use crate::filter::{FilterError, FilterProgram};
    use crate::table::Table;

    const CRAWL: &str = "Address,Status Code,Title 1,Title 1 Length,Indexability\n\
https://example.com/,200,Home,4,Indexable\n\
http://example.com/about,200,About us,8,Indexable\n\
http://example.com/old,301,,0,Non-Indexable\n\
https://example.com/blog,200,Blog - Latest news from the team,32,Indexable\n\
https://example.com/private,404,Private,7,Non-Indexable\n";

    fn crawl() -> Table {
        Table::from_csv_str(CRAWL).expect("fixture should decode")
    }

    fn run(program: &str) -> Result<FilterOutput, FilterError> {
        FilterProgram::from_model_json(program)
            .expect("fixture program should decode")
            .evaluate(&crawl())
    }

    fn addresses(output: FilterOutput) -> Vec<String> {
        output
            .into_table()
            .expect("tabular output")
            .records()
            .into_iter()
            .map(|record| record["Address"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn non_https_addresses_are_selected() {
        let output = run(r#"{"where": {"column": "Address", "op": "not_starts_with", "value": "https"}}"#)
            .expect("program should evaluate");

        assert_eq!(addresses(output), vec!["http://example.com/about", "http://example.com/old"]);
    }

    #[test]
    fn boolean_trees_and_numeric_comparisons_compose() {
        let output = run(
            r#"{"where": {"any": [
                {"column": "Status Code", "op": "gte", "value": 400},
                {"all": [
                    {"column": "Indexability", "op": "eq", "value": "non-indexable", "case_insensitive": true},
                    {"not": {"column": "Status Code", "op": "==", "value": "200"}}
                ]}
            ]}}"#,
        )
        .expect("program should evaluate");

        assert_eq!(addresses(output), vec!["http://example.com/old", "https://example.com/private"]);
    }

    #[test]
    fn empty_and_length_checks() {
        let missing = run(r#"{"where": {"column": "Title 1", "op": "is_empty"}}"#)
            .expect("program should evaluate");
        assert_eq!(addresses(missing), vec!["http://example.com/old"]);

        let long = run(r#"{"where": {"column": "Title 1", "op": "length_gt", "value": 30}}"#)
            .expect("program should evaluate");
        assert_eq!(addresses(long), vec!["https://example.com/blog"]);
    }

    #[test]
    fn select_sort_and_limit_apply_in_order() {
        let output = run(
            r#"{"select": ["Address", "Title 1 Length"],
                "sort": {"column": "Title 1 Length", "descending": true},
                "limit": 2}"#,
        )
        .expect("program should evaluate");

        let table = output.into_table().expect("tabular output");
        assert_eq!(table.columns(), ["Address", "Title 1 Length"]);
        let records = table.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Title 1 Length"], json!(32));
        assert_eq!(records[1]["Title 1 Length"], json!(8));
    }

    #[test]
    fn group_by_count_is_promoted_to_a_table() {
        let output = run(r#"{"group_by_count": "Indexability"}"#).expect("program should evaluate");

        let FilterOutput::Series { column, counts } = &output else {
            panic!("expected a series, got {output:?}");
        };
        assert_eq!(column, "Indexability");
        assert_eq!(counts[0], (json!("Indexable"), 3));

        let table = output.into_table().expect("series promotes to a table");
        assert_eq!(table.columns(), ["Indexability", COUNT_COLUMN]);
        assert_eq!(table.records()[1]["count"], json!(2));
    }

    #[test]
    fn aggregate_count_is_scalar_without_table_form() {
        let output = run(r#"{"where": {"column": "Status Code", "op": "eq", "value": 200}, "aggregate": "count"}"#)
            .expect("program should evaluate");

        assert_eq!(output, FilterOutput::Scalar(json!(3)));
        assert_eq!(output.into_table(), None);
    }

    #[test]
    fn unknown_columns_fail_closed_with_real_schema() {
        let error = run(r#"{"where": {"column": "Adress", "op": "contains", "value": "http"}}"#)
            .expect_err("unknown column should fail");

        let message = error.to_string();
        assert!(message.contains("unknown column `Adress`"));
        assert!(message.contains("Address, Status Code, Title 1"));
    }

    #[test]
    fn invalid_programs_are_rejected_before_evaluation() {
        assert!(matches!(
            run(r#"{"where": {"column": "Address", "op": "contains"}}"#),
            Err(FilterError::MissingValue { .. })
        ));
        assert!(matches!(
            run(r#"{"where": {"column": "Address", "op": "gt", "value": 3}}"#),
            Err(FilterError::InvalidValue { .. })
        ));
        assert!(matches!(
            run(r#"{"select": ["Address"], "group_by_count": "Indexability"}"#),
            Err(FilterError::Conflict(_))
        ));
    }

    #[test]
    fn grouping_by_a_column_named_count_is_rejected() {
        let table = Table::from_csv_str("Address,count
https://example.com/,3
https://example.com/a,3
")
            .expect("csv should decode");
        let program = FilterProgram::from_model_json(r#"{"group_by_count": "count"}"#).expect("program decodes");

        let error = program.evaluate(&table).expect_err("ambiguous count column should fail");
        assert!(matches!(error, FilterError::Conflict(_)));
        assert!(error.to_string().contains("cannot group by `count`"));
    }

    #[test]
    fn ordering_filters_on_a_header_only_export_match_nothing() {
        let table = Table::from_csv_str("Address,Status Code
").expect("csv should decode");
        let program = FilterProgram::from_model_json(r#"{"where": {"column": "Status Code", "op": "gte", "value": 400}}"#)
            .expect("program decodes");

        let output = program.evaluate(&table).expect("empty table should evaluate");
        assert!(output.into_table().expect("tabular output").is_empty());
    }

    #[test]
    fn ordering_filters_on_an_all_blank_column_are_rejected() {
        let table = Table::from_csv_str("Address,Word Count
https://example.com/,
").expect("csv should decode");
        let program = FilterProgram::from_model_json(r#"{"where": {"column": "Word Count", "op": "gt", "value": 10}}"#)
            .expect("program decodes");

        assert!(matches!(program.evaluate(&table), Err(FilterError::InvalidValue { .. })));
    }
}
