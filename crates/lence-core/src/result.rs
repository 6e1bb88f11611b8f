//! Uniform tabular execution results

use serde::{Deserialize, Serialize};

/// Column metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,

    /// Engine type name, e.g. `VARCHAR` or `BIGINT`
    #[serde(rename = "type")]
    pub column_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// Result of a query in row-major table format
///
/// `row_count` always equals `data.len()` and every row has exactly one
/// entry per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    columns: Vec<ColumnInfo>,
    data: Vec<Vec<serde_json::Value>>,
    row_count: usize,
}

/// A row did not line up with the column list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("row {row} has {actual} values but the result has {expected} columns")]
pub struct ShapeError {
    pub row: usize,
    pub expected: usize,
    pub actual: usize,
}

impl ExecutionResult {
    /// Build a result, checking that every row matches the columns
    pub fn new(columns: Vec<ColumnInfo>, data: Vec<Vec<serde_json::Value>>) -> Result<Self, ShapeError> {
        if let Some((row, values)) = data
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != columns.len())
        {
            return Err(ShapeError {
                row,
                expected: columns.len(),
                actual: values.len(),
            });
        }

        let row_count = data.len();
        Ok(Self {
            columns,
            data,
            row_count,
        })
    }

    /// A result with columns but no rows
    pub fn empty(columns: Vec<ColumnInfo>) -> Self {
        Self {
            columns,
            data: Vec::new(),
            row_count: 0,
        }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn data(&self) -> &[Vec<serde_json::Value>] {
        &self.data
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Look up a single cell by row index and column name
    pub fn value(&self, row: usize, column: &str) -> Option<&serde_json::Value> {
        let idx = self.columns.iter().position(|c| c.name == column)?;
        self.data.get(row).and_then(|values| values.get(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_aligned_result() {
        let result = ExecutionResult::new(
            vec![ColumnInfo::new("region", "VARCHAR"), ColumnInfo::new("total", "BIGINT")],
            vec![vec![json!("west"), json!(10)], vec![json!("east"), json!(7)]],
        )
        .unwrap();

        assert_eq!(result.row_count(), 2);
        assert_eq!(result.value(1, "total"), Some(&json!(7)));
        assert_eq!(result.value(0, "missing"), None);
    }

    #[test]
    fn rejects_misaligned_rows() {
        let err = ExecutionResult::new(
            vec![ColumnInfo::new("a", "INTEGER")],
            vec![vec![json!(1)], vec![json!(2), json!(3)]],
        )
        .unwrap_err();

        assert_eq!(err.row, 1);
        assert_eq!(err.expected, 1);
        assert_eq!(err.actual, 2);
    }

    #[test]
    fn wire_shape() {
        let result = ExecutionResult::new(vec![ColumnInfo::new("n", "INTEGER")], vec![vec![json!(1)]]).unwrap();
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(
            value,
            json!({"columns": [{"name": "n", "type": "INTEGER"}], "data": [[1]], "row_count": 1})
        );
    }
}
