//! Preprocessing steps
//!
//! A [`Step`] is the declared operation; fitting it on training data yields a
//! [`TrainedStep`] holding every learned statistic. Applying a trained step
//! never looks at the statistics of its input.

use crate::data::stats::{median, RunningStats};
use crate::data::{Column, ColumnData, Dataset, FieldType};
use crate::error::{KolosalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which predictor columns a step operates on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selector {
    /// Every numeric predictor
    AllNumericPredictors,
    /// Every predictor regardless of type
    AllPredictors,
    /// Named columns; each must exist at fit time
    Columns(Vec<String>),
}

impl Selector {
    pub fn columns<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Selector::Columns(names.into_iter().map(Into::into).collect())
    }

    /// Resolve against the predictor columns of `data`, keeping only columns
    /// of `only` type when given
    fn resolve(&self, data: &Dataset, only: Option<FieldType>) -> Result<Vec<String>> {
        let keep = |c: &Column| only.map_or(true, |t| c.field_type() == t);
        match self {
            Selector::AllNumericPredictors => Ok(data
                .columns()
                .iter()
                .filter(|c| c.field_type() == FieldType::Numeric && keep(c))
                .map(|c| c.name().to_string())
                .collect()),
            Selector::AllPredictors => Ok(data
                .columns()
                .iter()
                .filter(|c| keep(c))
                .map(|c| c.name().to_string())
                .collect()),
            Selector::Columns(names) => {
                let mut out = Vec::with_capacity(names.len());
                for name in names {
                    let column = data.require(name)?;
                    if keep(column) {
                        out.push(name.clone());
                    }
                }
                Ok(out)
            }
        }
    }
}

/// A declared preprocessing operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// Subtract the training mean
    Center(Selector),
    /// Divide by the training standard deviation
    Scale(Selector),
    /// Center and scale in one step
    Normalize(Selector),
    /// Remove columns whose training variance is below `threshold`
    NearZeroVariance { selector: Selector, threshold: f64 },
    /// Remove constant columns
    ZeroVariance(Selector),
    /// Remove columns unconditionally
    Drop(Selector),
    /// Replace missing numeric values with the training mean
    ImputeMean(Selector),
    /// Replace missing numeric values with the training median
    ImputeMedian(Selector),
    /// One-hot encode categorical columns, dropping the first level
    Dummy(Selector),
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Center(_) => "center",
            Step::Scale(_) => "scale",
            Step::Normalize(_) => "normalize",
            Step::NearZeroVariance { .. } => "nzv",
            Step::ZeroVariance(_) => "zv",
            Step::Drop(_) => "drop",
            Step::ImputeMean(_) => "impute_mean",
            Step::ImputeMedian(_) => "impute_median",
            Step::Dummy(_) => "dummy",
        }
    }

    /// Learn this step's parameters from (already preprocessed) training data
    pub fn fit(&self, data: &Dataset) -> Result<TrainedStep> {
        let numeric = |sel: &Selector| sel.resolve(data, Some(FieldType::Numeric));
        let stats = |name: &str| -> Result<RunningStats> {
            Ok(RunningStats::from_slice(data.numeric(name)?))
        };

        let trained = match self {
            Step::Center(sel) => TrainedStep::Center {
                means: numeric(sel)?
                    .into_iter()
                    .map(|c| Ok((c.clone(), finite_or(stats(&c)?.mean(), 0.0))))
                    .collect::<Result<_>>()?,
            },
            Step::Scale(sel) => TrainedStep::Scale {
                sds: numeric(sel)?
                    .into_iter()
                    .map(|c| Ok((c.clone(), safe_scale(stats(&c)?.std()))))
                    .collect::<Result<_>>()?,
            },
            Step::Normalize(sel) => TrainedStep::Normalize {
                params: numeric(sel)?
                    .into_iter()
                    .map(|c| {
                        let s = stats(&c)?;
                        Ok((c.clone(), finite_or(s.mean(), 0.0), safe_scale(s.std())))
                    })
                    .collect::<Result<_>>()?,
            },
            Step::NearZeroVariance {
                selector,
                threshold,
            } => {
                if !(threshold.is_finite() && *threshold >= 0.0) {
                    return Err(KolosalError::invalid_parameter(
                        "threshold",
                        threshold,
                        "must be a non-negative number",
                    ));
                }
                let mut removed = Vec::new();
                for c in numeric(selector)? {
                    if stats(&c)?.variance() < *threshold {
                        removed.push(c);
                    }
                }
                TrainedStep::Remove { columns: removed }
            }
            Step::ZeroVariance(sel) => {
                let mut removed = Vec::new();
                for c in sel.resolve(data, None)? {
                    if is_constant(data.require(&c)?) {
                        removed.push(c);
                    }
                }
                TrainedStep::Remove { columns: removed }
            }
            Step::Drop(sel) => TrainedStep::Remove {
                columns: sel.resolve(data, None)?,
            },
            Step::ImputeMean(sel) => TrainedStep::Impute {
                values: numeric(sel)?
                    .into_iter()
                    .map(|c| Ok((c.clone(), finite_or(stats(&c)?.mean(), 0.0))))
                    .collect::<Result<_>>()?,
            },
            Step::ImputeMedian(sel) => TrainedStep::Impute {
                values: numeric(sel)?
                    .into_iter()
                    .map(|c| Ok((c.clone(), finite_or(median(data.numeric(&c)?), 0.0))))
                    .collect::<Result<_>>()?,
            },
            Step::Dummy(sel) => {
                let mut levels = Vec::new();
                for c in sel.resolve(data, Some(FieldType::Categorical))? {
                    let values = data.keys(&c)?;
                    let distinct: BTreeSet<String> = values.into_iter().collect();
                    levels.push((c, distinct.into_iter().collect()));
                }
                TrainedStep::Dummy { levels }
            }
        };
        Ok(trained)
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn safe_scale(sd: f64) -> f64 {
    if sd.is_finite() && sd > 0.0 {
        sd
    } else {
        1.0
    }
}

fn is_constant(column: &Column) -> bool {
    match column.data() {
        ColumnData::Numeric(v) => RunningStats::from_slice(v).variance() == 0.0,
        ColumnData::Categorical(v) => v.windows(2).all(|w| w[0] == w[1]),
    }
}

/// A step with its learned parameters frozen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrainedStep {
    Center { means: Vec<(String, f64)> },
    Scale { sds: Vec<(String, f64)> },
    Normalize { params: Vec<(String, f64, f64)> },
    Remove { columns: Vec<String> },
    Impute { values: Vec<(String, f64)> },
    Dummy { levels: Vec<(String, Vec<String>)> },
}

impl TrainedStep {
    /// Apply frozen parameters to `data`
    pub fn apply(&self, data: &Dataset) -> Result<Dataset> {
        match self {
            TrainedStep::Center { means } => {
                map_numeric(data, means, |x, mean| x - mean)
            }
            TrainedStep::Scale { sds } => map_numeric(data, sds, |x, sd| x / sd),
            TrainedStep::Normalize { params } => {
                let mut out = data.clone();
                for (name, mean, sd) in params {
                    let values = out.numeric(name)?.iter().map(|x| (x - mean) / sd).collect();
                    out = out.with_column(Column::numeric(name.clone(), values))?;
                }
                Ok(out)
            }
            TrainedStep::Remove { columns } => Ok(data.without(columns)),
            TrainedStep::Impute { values } => map_numeric(data, values, |x, fill| {
                if x.is_nan() {
                    fill
                } else {
                    x
                }
            }),
            TrainedStep::Dummy { levels } => {
                let mut out = data.clone();
                for (name, known) in levels {
                    let values = out.keys(name)?;
                    out = out.without(&[name.as_str()]);
                    for level in known.iter().skip(1) {
                        let generated = format!("{}_{}", name, level);
                        if out.has_column(&generated) {
                            return Err(KolosalError::SchemaMismatch(format!(
                                "indicator '{}' for '{}' collides with an existing column",
                                generated, name
                            )));
                        }
                        let indicator = values
                            .iter()
                            .map(|v| if v == level { 1.0 } else { 0.0 })
                            .collect();
                        out = out.with_column(Column::numeric(generated, indicator))?;
                    }
                }
                Ok(out)
            }
        }
    }

    /// Columns this step removes
    pub fn removed(&self) -> &[String] {
        match self {
            TrainedStep::Remove { columns } => columns,
            _ => &[],
        }
    }
}

fn map_numeric(
    data: &Dataset,
    params: &[(String, f64)],
    f: impl Fn(f64, f64) -> f64,
) -> Result<Dataset> {
    let mut out = data.clone();
    for (name, param) in params {
        let values = out.numeric(name)?.iter().map(|&x| f(x, *param)).collect();
        out = out.with_column(Column::numeric(name.clone(), values))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> Dataset {
        Dataset::from_columns(vec![
            Column::numeric("a", vec![1.0, 2.0, 3.0, 4.0]),
            Column::numeric("b", vec![5.0, 5.0, 5.0, 5.0]),
            Column::numeric("c", vec![1.0, f64::NAN, 3.0, 8.0]),
            Column::categorical("league", vec!["AL", "NL", "AL", "FL"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_center_uses_fit_mean() {
        let trained = Step::Center(Selector::columns(["a"])).fit(&data()).unwrap();
        let other = Dataset::from_columns(vec![Column::numeric("a", vec![10.0])]).unwrap();
        let out = trained.apply(&other).unwrap();
        assert_eq!(out.numeric("a").unwrap(), &[7.5]);
    }

    #[test]
    fn test_scale_constant_column() {
        let trained = Step::Scale(Selector::columns(["b"])).fit(&data()).unwrap();
        assert_eq!(
            trained,
            TrainedStep::Scale {
                sds: vec![("b".to_string(), 1.0)]
            }
        );
    }

    #[test]
    fn test_zero_variance_and_nzv() {
        let zv = Step::ZeroVariance(Selector::AllPredictors).fit(&data()).unwrap();
        assert_eq!(zv.removed(), &["b".to_string()]);

        let nzv = Step::NearZeroVariance {
            selector: Selector::AllNumericPredictors,
            threshold: 2.0,
        }
        .fit(&data())
        .unwrap();
        // var(a) = 1.667, var(b) = 0, var(c) = 13
        assert_eq!(nzv.removed(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_impute_median() {
        let trained = Step::ImputeMedian(Selector::columns(["c"])).fit(&data()).unwrap();
        let out = trained.apply(&data()).unwrap();
        assert_eq!(out.numeric("c").unwrap(), &[1.0, 3.0, 3.0, 8.0]);
    }

    #[test]
    fn test_dummy_drops_reference_level() {
        let trained = Step::Dummy(Selector::AllPredictors).fit(&data()).unwrap();
        let out = trained.apply(&data()).unwrap();
        assert!(!out.has_column("league"));
        assert!(!out.has_column("league_AL"));
        assert_eq!(out.numeric("league_FL").unwrap(), &[0.0, 0.0, 0.0, 1.0]);
        assert_eq!(out.numeric("league_NL").unwrap(), &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_dummy_name_collision() {
        let clash = data()
            .with_column(Column::numeric("league_NL", vec![9.0; 4]))
            .unwrap();
        let err = Step::Dummy(Selector::columns(["league"])).fit(&clash).unwrap_err();
        assert!(matches!(err, KolosalError::SchemaMismatch(_)));

        let trained = Step::Dummy(Selector::columns(["league"])).fit(&data()).unwrap();
        assert!(matches!(
            trained.apply(&clash),
            Err(KolosalError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_column() {
        let err = Step::Center(Selector::columns(["nope"])).fit(&data()).unwrap_err();
        assert!(matches!(err, KolosalError::SchemaMismatch(_)));
    }
}
