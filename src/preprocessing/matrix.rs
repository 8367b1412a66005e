//! Row-major feature matrix handed to the model

use polars::prelude::*;

/// Named-column numeric matrix, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Vec<f64>,
    rows: usize,
}

impl FeatureMatrix {
    /// Build from column-major data.
    pub fn from_columns<C: AsRef<[f64]>>(names: Vec<String>, columns: &[C], rows: usize) -> Self {
        let mut values = Vec::with_capacity(rows * columns.len());
        for row in 0..rows {
            values.extend(columns.iter().map(|c| c.as_ref()[row]));
        }
        Self {
            columns: names,
            values,
            rows,
        }
    }

    /// Build from a numeric frame, keeping its column order. Null cells
    /// read as 0.
    pub fn from_frame(frame: &DataFrame) -> PolarsResult<Self> {
        let names = frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let columns = frame
            .get_columns()
            .iter()
            .map(|series| -> PolarsResult<Vec<f64>> {
                let series = series.cast(&DataType::Float64)?;
                Ok(series.f64()?.into_iter().map(|v| v.unwrap_or(0.0)).collect())
            })
            .collect::<PolarsResult<Vec<_>>>()?;
        Ok(Self::from_columns(names, &columns, frame.height()))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All values, row after row.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let width = self.cols();
        &self.values[index * width..(index + 1) * width]
    }

    /// Copy of one named column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some((0..self.rows).map(|r| self.row(r)[index]).collect())
    }

    /// Values narrowed to `f32` for the inference runtime.
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_major_to_row_major() {
        let m = FeatureMatrix::from_columns(
            vec!["a".into(), "b".into()],
            &[vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]],
            3,
        );
        assert_eq!(m.values(), &[1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
        assert_eq!(m.row(2), &[3.0, 30.0]);
        assert_eq!(m.column("b"), Some(vec![10.0, 20.0, 30.0]));
        assert_eq!(m.column("c"), None);
    }

    #[test]
    fn test_from_frame() {
        let frame = DataFrame::new(vec![
            Series::new("a", &[1.0, 2.0]),
            Series::new("flag", &[Some(true), None]),
        ])
        .unwrap();
        let m = FeatureMatrix::from_frame(&frame).unwrap();

        assert_eq!(m.columns(), &["a".to_string(), "flag".to_string()]);
        assert_eq!(m.values(), &[1.0, 1.0, 2.0, 0.0]);
        assert_eq!(m.to_f32(), vec![1.0f32, 1.0, 2.0, 0.0]);
    }
}
