use crate::domain::errors::PipelineError;

/// Row-ordered table of optional text cells, as read from an upload.
///
/// Missing cells are `None`. Numeric interpretation happens per column on demand.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(
        headers: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    ) -> Result<Self, PipelineError> {
        for row in &rows {
            if row.len() != headers.len() {
                return Err(PipelineError::ShapeMismatch {
                    context: "raw table row width".to_string(),
                    expected: headers.len(),
                    actual: row.len(),
                });
            }
        }
        Ok(Self { headers, rows })
    }

    /// Builds a fully numeric table from named columns of equal length.
    pub fn from_columns(columns: &[(&str, Vec<f64>)]) -> Result<Self, PipelineError> {
        let len = columns.first().map(|(_, values)| values.len()).unwrap_or(0);
        for (name, values) in columns {
            if values.len() != len {
                return Err(PipelineError::ShapeMismatch {
                    context: format!("column {}", name),
                    expected: len,
                    actual: values.len(),
                });
            }
        }
        let headers = columns.iter().map(|(name, _)| name.to_string()).collect();
        let rows = (0..len)
            .map(|i| {
                columns
                    .iter()
                    .map(|(_, values)| Some(values[i].to_string()))
                    .collect()
            })
            .collect();
        Self::new(headers, rows)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize, PipelineError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PipelineError::MissingColumn {
                column: name.to_string(),
            })
    }

    pub fn text_column(&self, name: &str) -> Result<Vec<Option<&str>>, PipelineError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[idx].as_deref()).collect())
    }

    /// Parses a column as numbers. Any present cell that does not parse is an error.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>, PipelineError> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row_idx, row)| match row[idx].as_deref() {
                None => Ok(None),
                Some(cell) => parse_number(cell).map(Some).ok_or_else(|| {
                    PipelineError::InvalidData {
                        column: name.to_string(),
                        reason: format!("row {} holds non-numeric value '{}'", row_idx, cell),
                    }
                }),
            })
            .collect()
    }

    /// Names of columns whose present cells all parse as numbers.
    pub fn numeric_column_names(&self) -> Vec<String> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| {
                self.rows
                    .iter()
                    .filter_map(|row| row[*idx].as_deref())
                    .all(|cell| parse_number(cell).is_some())
            })
            .map(|(_, name)| name.clone())
            .collect()
    }
}

fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn test_row_width_is_checked() {
        let result = RawTable::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![cell("1")]],
        );
        assert!(matches!(result, Err(PipelineError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_numeric_column_with_missing_cells() {
        let table = RawTable::new(
            vec!["a".to_string(), "g".to_string()],
            vec![vec![cell("1.5"), cell("M")], vec![None, cell("F")]],
        )
        .unwrap();
        assert_eq!(table.numeric_column("a").unwrap(), vec![Some(1.5), None]);
        assert!(matches!(
            table.numeric_column("g"),
            Err(PipelineError::InvalidData { .. })
        ));
        assert!(matches!(
            table.numeric_column("zzz"),
            Err(PipelineError::MissingColumn { .. })
        ));
        assert_eq!(table.numeric_column_names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_from_columns() {
        let table = RawTable::from_columns(&[("x", vec![1.0, 2.0]), ("y", vec![3.0, 4.0])]).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.numeric_column("y").unwrap(), vec![Some(3.0), Some(4.0)]);
    }
}
