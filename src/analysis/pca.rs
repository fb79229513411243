// file: src/analysis/pca.rs
// description: standardized first-principal-component loadings of metric columns
// reference: Jacobi eigenvalue iteration for small symmetric matrices

use crate::error::{PipelineError, Result};
use crate::models::{ComponentLoadings, Loading};
use std::path::Path;
use tracing::{debug, info};

const MAX_SWEEPS: usize = 100;
const OFF_DIAGONAL_EPS: f64 = 1e-22;

/// Cells read as missing, matching the default NA markers of pandas.
const MISSING_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || MISSING_MARKERS.contains(&cell)
}

/// Complete numeric rows of the selected columns.
#[derive(Debug, Clone)]
pub struct MetricTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub dropped: usize,
}

#[derive(Debug, Clone)]
pub struct PrincipalComponent {
    pub weights: Vec<f64>,
    pub eigenvalue: f64,
    pub explained_variance_ratio: f64,
}

impl MetricTable {
    /// Loads `columns` from a csv, dropping rows with an empty, NA or NaN cell
    /// in any of them.
    pub fn from_csv(path: &Path, columns: &[String]) -> Result<Self> {
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let indices = columns
            .iter()
            .map(|column| {
                headers
                    .iter()
                    .position(|h| h.trim() == column)
                    .ok_or_else(|| {
                        PipelineError::Analysis(format!(
                            "Column '{}' not found in {}",
                            column,
                            path.display()
                        ))
                    })
            })
            .collect::<Result<Vec<usize>>>()?;

        let mut rows = Vec::new();
        let mut dropped = 0;

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let mut row = Vec::with_capacity(indices.len());

            for (&index, column) in indices.iter().zip(columns) {
                let cell = record.get(index).unwrap_or("").trim();
                if is_missing(cell) {
                    break;
                }

                let value: f64 = cell.parse().map_err(|_| {
                    PipelineError::Validation(format!(
                        "Non-numeric value '{}' in column '{}' (data row {})",
                        cell,
                        column,
                        line + 1
                    ))
                })?;

                if value.is_nan() {
                    break;
                }
                if value.is_infinite() {
                    return Err(PipelineError::Validation(format!(
                        "Infinite value '{}' in column '{}' (data row {})",
                        cell,
                        column,
                        line + 1
                    )));
                }
                row.push(value);
            }

            if row.len() == indices.len() {
                rows.push(row);
            } else {
                dropped += 1;
            }
        }

        debug!(
            "Loaded {} complete rows ({} dropped) from {}",
            rows.len(),
            dropped,
            path.display()
        );

        Ok(Self {
            columns: columns.to_vec(),
            rows,
            dropped,
        })
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if rows.iter().any(|row| row.len() != columns.len()) {
            return Err(PipelineError::Analysis(
                "Row width does not match column count".to_string(),
            ));
        }

        Ok(Self {
            columns,
            rows,
            dropped: 0,
        })
    }
}

/// Centers each column and scales it to unit population variance; constant
/// columns are only centered.
pub fn standardize(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(width) = rows.first().map(|row| row.len()) else {
        return Vec::new();
    };
    let n = rows.len() as f64;

    let means: Vec<f64> = (0..width)
        .map(|j| rows.iter().map(|row| row[j]).sum::<f64>() / n)
        .collect();

    let scales: Vec<f64> = (0..width)
        .map(|j| {
            let variance = rows
                .iter()
                .map(|row| (row[j] - means[j]).powi(2))
                .sum::<f64>()
                / n;
            let std = variance.sqrt();
            if std > f64::EPSILON { std } else { 1.0 }
        })
        .collect();

    rows.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(j, value)| (value - means[j]) / scales[j])
                .collect()
        })
        .collect()
}

/// Sample covariance of already-centered rows.
pub fn covariance(centered: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let width = centered.first().map(|row| row.len()).unwrap_or(0);
    let denominator = (centered.len().max(2) - 1) as f64;

    let mut matrix = vec![vec![0.0; width]; width];
    for i in 0..width {
        for j in i..width {
            let sum: f64 = centered.iter().map(|row| row[i] * row[j]).sum();
            matrix[i][j] = sum / denominator;
            matrix[j][i] = matrix[i][j];
        }
    }
    matrix
}

/// Eigenvalues and eigenvectors (as columns of the returned matrix) of a
/// symmetric matrix.
pub fn symmetric_eigen(matrix: &[Vec<f64>]) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = matrix.len();
    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut v: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for _ in 0..MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .map(|(i, j)| a[i][j] * a[i][j])
            .sum();
        if off < OFF_DIAGONAL_EPS {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                if a[p][q].abs() < f64::MIN_POSITIVE {
                    continue;
                }

                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for row in a.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
                for k in 0..n {
                    let (pk, qk) = (a[p][k], a[q][k]);
                    a[p][k] = c * pk - s * qk;
                    a[q][k] = s * pk + c * qk;
                }
                for row in v.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[i][i]).collect();
    (eigenvalues, v)
}

pub fn first_component(table: &MetricTable) -> Result<PrincipalComponent> {
    if table.rows.len() < 2 {
        return Err(PipelineError::Analysis(format!(
            "Need at least 2 complete rows, found {}",
            table.rows.len()
        )));
    }

    if table.rows.iter().flatten().any(|value| !value.is_finite()) {
        return Err(PipelineError::Analysis(
            "Metric table contains non-finite values".to_string(),
        ));
    }

    let standardized = standardize(&table.rows);
    let cov = covariance(&standardized);
    let (eigenvalues, vectors) = symmetric_eigen(&cov);

    let total: f64 = eigenvalues.iter().sum();
    if !total.is_finite() {
        return Err(PipelineError::Analysis(
            "Covariance of selected columns is not finite".to_string(),
        ));
    }
    if total <= f64::EPSILON {
        return Err(PipelineError::Analysis(
            "Selected columns have no variance".to_string(),
        ));
    }

    let (best, eigenvalue) = eigenvalues
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |acc, (i, value)| {
            if value > acc.1 { (i, value) } else { acc }
        });

    let weights = vectors.iter().map(|row| row[best]).collect();

    Ok(PrincipalComponent {
        weights,
        eigenvalue,
        explained_variance_ratio: eigenvalue / total,
    })
}

/// PC1 absolute loadings of `table`, strongest first.
pub fn component_loadings(
    name: &str,
    source: &str,
    table: &MetricTable,
) -> Result<ComponentLoadings> {
    let component = first_component(table)?;

    let mut loadings: Vec<Loading> = table
        .columns
        .iter()
        .zip(&component.weights)
        .map(|(column, weight)| Loading {
            column: column.clone(),
            loading: weight.abs(),
        })
        .collect();

    loadings.sort_by(|a, b| b.loading.total_cmp(&a.loading));

    info!(
        "{}: PC1 explains {:.2}% of variance over {} rows",
        name,
        component.explained_variance_ratio * 100.0,
        table.rows.len()
    );

    Ok(ComponentLoadings {
        name: name.to_string(),
        source: source.to_string(),
        rows_used: table.rows.len(),
        explained_variance_ratio: component.explained_variance_ratio,
        loadings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_standardize_population_std() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let z = standardize(&rows);
        assert_close(z[0][0], -1.0);
        assert_close(z[1][0], 1.0);
        assert_close(z[0][1], 0.0);
        assert_close(z[1][1], 0.0);
    }

    #[test]
    fn test_symmetric_eigen_two_by_two() {
        let (values, vectors) = symmetric_eigen(&[vec![2.0, 1.0], vec![1.0, 2.0]]);
        let (max_index, max_value) = if values[0] > values[1] {
            (0, values[0])
        } else {
            (1, values[1])
        };
        assert_close(max_value, 3.0);
        assert_close(values[0] + values[1], 4.0);
        let inv_sqrt2 = 1.0 / 2f64.sqrt();
        assert_close(vectors[0][max_index].abs(), inv_sqrt2);
        assert_close(vectors[1][max_index].abs(), inv_sqrt2);
    }

    #[test]
    fn test_correlated_columns_share_first_component() {
        let table = MetricTable::from_rows(
            cols(&["a", "b", "noise"]),
            vec![
                vec![1.0, 3.0, 1.0],
                vec![2.0, 5.0, -1.0],
                vec![3.0, 7.0, -1.0],
                vec![4.0, 9.0, 1.0],
            ],
        )
        .unwrap();

        let result = component_loadings("Faithfulness", "inline", &table).unwrap();

        let inv_sqrt2 = 1.0 / 2f64.sqrt();
        assert_close(result.get("a").unwrap(), inv_sqrt2);
        assert_close(result.get("b").unwrap(), inv_sqrt2);
        assert_close(result.get("noise").unwrap(), 0.0);
        assert_close(result.explained_variance_ratio, 2.0 / 3.0);
        assert_eq!(result.loadings[2].column, "noise");
        assert_eq!(result.rows_used, 4);
    }

    #[test]
    fn test_from_csv_drops_incomplete_rows() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scores.csv");
        fs::write(
            &path,
            "model,ttr_diff,ner_diff,extra\n\
             t5,0.1,1.0,x\n\
             bart,,2.0,x\n\
             qwen,0.3,NaN,x\n\
             deepseek,0.4,4.0,x\n",
        )
        .unwrap();

        let table = MetricTable::from_csv(&path, &cols(&["ttr_diff", "ner_diff"])).unwrap();
        assert_eq!(table.rows, vec![vec![0.1, 1.0], vec![0.4, 4.0]]);
        assert_eq!(table.dropped, 2);
    }

    #[test]
    fn test_from_csv_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scores.csv");
        fs::write(&path, "h_bleu,h_rouge\n0.5,high\n").unwrap();

        assert!(matches!(
            MetricTable::from_csv(&path, &cols(&["h_bleu", "h_lora"])),
            Err(PipelineError::Analysis(_))
        ));
        assert!(matches!(
            MetricTable::from_csv(&path, &cols(&["h_bleu", "h_rouge"])),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn test_from_csv_treats_na_markers_as_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scores.csv");
        fs::write(
            &path,
            "a,b\n1,2\nNA,3\n4,N/A\nnull,None\n-nan,1\n<NA>,2\n5,6\n",
        )
        .unwrap();

        let table = MetricTable::from_csv(&path, &cols(&["a", "b"])).unwrap();
        assert_eq!(table.rows, vec![vec![1.0, 2.0], vec![5.0, 6.0]]);
        assert_eq!(table.dropped, 5);
    }

    #[test]
    fn test_infinite_values_are_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scores.csv");
        fs::write(&path, "a,b\n1,2\ninf,3\n2,5\n").unwrap();

        assert!(matches!(
            MetricTable::from_csv(&path, &cols(&["a", "b"])),
            Err(PipelineError::Validation(_))
        ));

        let table = MetricTable::from_rows(
            cols(&["a", "b"]),
            vec![vec![1.0, 2.0], vec![f64::INFINITY, 3.0], vec![2.0, 5.0]],
        )
        .unwrap();
        assert!(matches!(
            component_loadings("Faithfulness", "inline", &table),
            Err(PipelineError::Analysis(_))
        ));
    }

    #[test]
    fn test_needs_two_rows_and_variance() {
        let single = MetricTable::from_rows(cols(&["a", "b"]), vec![vec![1.0, 2.0]]).unwrap();
        assert!(first_component(&single).is_err());

        let flat = MetricTable::from_rows(
            cols(&["a", "b"]),
            vec![vec![1.0, 2.0], vec![1.0, 2.0], vec![1.0, 2.0]],
        )
        .unwrap();
        assert!(matches!(
            first_component(&flat),
            Err(PipelineError::Analysis(_))
        ));
    }
}
