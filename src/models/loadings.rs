// file: src/models/loadings.rs
// description: first principal component loadings of a metric table
// reference: internal data structures

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loading {
    pub column: String,
    pub loading: f64,
}

/// PC1 loadings for one metric group, strongest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentLoadings {
    pub name: String,
    pub source: String,
    pub rows_used: usize,
    pub explained_variance_ratio: f64,
    pub loadings: Vec<Loading>,
}

impl ComponentLoadings {
    pub fn get(&self, column: &str) -> Option<f64> {
        self.loadings
            .iter()
            .find(|l| l.column == column)
            .map(|l| l.loading)
    }

    pub fn format(&self) -> String {
        let width = self
            .loadings
            .iter()
            .map(|l| l.column.len())
            .max()
            .unwrap_or(0);

        let mut output = format!(
            "{} PC1 loadings (abs) - {} rows, {:.2}% variance explained:\n",
            self.name,
            self.rows_used,
            self.explained_variance_ratio * 100.0
        );

        for loading in &self.loadings {
            output.push_str(&format!(
                "  {:<width$}  {:.6}\n",
                loading.column,
                loading.loading,
                width = width
            ));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_lists_columns_in_order() {
        let loadings = ComponentLoadings {
            name: "Richness".to_string(),
            source: "rich.csv".to_string(),
            rows_used: 3,
            explained_variance_ratio: 0.5,
            loadings: vec![
                Loading {
                    column: "ttr_diff".to_string(),
                    loading: 0.8,
                },
                Loading {
                    column: "ner_diff".to_string(),
                    loading: 0.6,
                },
            ],
        };

        let text = loadings.format();
        let ttr = text.find("ttr_diff").unwrap();
        let ner = text.find("ner_diff").unwrap();
        assert!(ttr < ner);
        assert!(text.contains("50.00%"));
        assert_eq!(loadings.get("ner_diff"), Some(0.6));
        assert_eq!(loadings.get("missing"), None);
    }
}
