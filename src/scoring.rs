//! Scoring unlabeled data with a fitted workflow

use crate::data::{write_csv, Column, Dataset};
use crate::error::Result;
use crate::workflow::FitResult;
use std::path::Path;
use tracing::info;

/// One scored record
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub record_id: usize,
    /// Identifier values in the recipe's identifier order
    pub identifiers: Vec<String>,
    pub probability: f64,
}

/// Scored records, highest positive-class probability first
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTable {
    identifier_names: Vec<String>,
    positive: String,
    rows: Vec<ScoredRow>,
}

impl ScoredTable {
    pub fn rows(&self) -> &[ScoredRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn identifier_names(&self) -> &[String] {
        &self.identifier_names
    }

    /// Name of the probability column, `.pred_<positive level>`
    pub fn probability_column(&self) -> String {
        format!(".pred_{}", self.positive)
    }

    /// Rows with probability at or above `threshold`, order kept
    pub fn above(&self, threshold: f64) -> ScoredTable {
        ScoredTable {
            identifier_names: self.identifier_names.clone(),
            positive: self.positive.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| r.probability >= threshold)
                .cloned()
                .collect(),
        }
    }

    pub fn to_dataset(&self) -> Result<Dataset> {
        let mut columns = vec![Column::numeric(
            "record_id",
            self.rows.iter().map(|r| r.record_id as f64).collect(),
        )];
        for (i, name) in self.identifier_names.iter().enumerate() {
            columns.push(Column::categorical(
                name.as_str(),
                self.rows.iter().map(|r| r.identifiers[i].clone()).collect::<Vec<_>>(),
            ));
        }
        columns.push(Column::numeric(
            self.probability_column(),
            self.rows.iter().map(|r| r.probability).collect(),
        ));
        Dataset::from_columns(columns)
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        write_csv(&self.to_dataset()?, path)
    }
}

/// Score every record of `data`, sorted by descending probability with ties
/// broken by record id
pub fn score(fit: &FitResult, data: &Dataset) -> Result<ScoredTable> {
    let probabilities = fit.predict_proba(data)?;
    let identifier_names: Vec<String> = fit
        .recipe()
        .identifiers()?
        .iter()
        .filter(|name| data.has_column(name))
        .cloned()
        .collect();
    let id_columns = identifier_names
        .iter()
        .map(|name| data.require(name))
        .collect::<Result<Vec<_>>>()?;

    let mut rows: Vec<ScoredRow> = probabilities
        .iter()
        .enumerate()
        .map(|(i, &probability)| ScoredRow {
            record_id: data.record_ids()[i],
            identifiers: id_columns
                .iter()
                .map(|c| c.key(i).unwrap_or_default())
                .collect(),
            probability,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then(a.record_id.cmp(&b.record_id))
    });

    info!(records = rows.len(), "Scored dataset");
    Ok(ScoredTable {
        identifier_names,
        positive: fit.levels().positive.clone(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelSpec;
    use crate::recipe::{Recipe, Role};
    use crate::workflow::Workflow;

    fn training() -> Dataset {
        let n = 40;
        Dataset::from_columns(vec![
            Column::categorical("name", (0..n).map(|i| format!("p{}", i)).collect::<Vec<_>>()),
            Column::numeric("hits", (0..n).map(|i| i as f64).collect()),
            Column::categorical(
                "hof",
                (0..n).map(|i| if i >= 30 { "Y" } else { "N" }).collect::<Vec<_>>(),
            ),
        ])
        .unwrap()
    }

    fn eligible() -> Dataset {
        Dataset::from_columns(vec![
            Column::categorical("name", vec!["a", "b", "c", "d"]),
            Column::numeric("hits", vec![5.0, 39.0, 20.0, 39.0]),
        ])
        .unwrap()
    }

    fn fit() -> FitResult {
        Workflow::bind(
            Recipe::new("hof").update_role("name", Role::Identifier),
            ModelSpec::logistic_regression(),
        )
        .into_concrete()
        .unwrap()
        .fit(&training())
        .unwrap()
    }

    #[test]
    fn test_sorted_descending_with_id_ties() {
        let table = score(&fit(), &eligible()).unwrap();
        let ids: Vec<usize> = table.rows().iter().map(|r| r.record_id).collect();
        assert_eq!(ids, vec![1, 3, 2, 0]);
        assert_eq!(table.rows()[0].identifiers, vec!["b".to_string()]);
        assert_eq!(table.probability_column(), ".pred_Y");
    }

    #[test]
    fn test_above_threshold() {
        let table = score(&fit(), &eligible()).unwrap();
        let top = table.above(0.5);
        assert!(top.rows().iter().all(|r| r.probability >= 0.5));
        assert!(top.len() < table.len());
    }

    #[test]
    fn test_write_csv() {
        let table = score(&fit(), &eligible()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scored.csv");
        table.write_csv(&path).unwrap();
        let back = crate::data::read_csv(&path, b',').unwrap();
        assert_eq!(back.n_rows(), 4);
        assert!(back.has_column(".pred_Y"));
    }
}
