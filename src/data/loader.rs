//! CSV ingestion and output via polars

use super::{Column, ColumnData, Dataset};
use crate::error::{KolosalError, Result};
use polars::prelude::{
    CsvParseOptions, CsvReadOptions, CsvWriter, DataFrame, DataType, SerReader, SerWriter,
};
use std::fs::File;
use std::path::Path;
use tracing::debug;

fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Boolean
    )
}

/// Read a delimited file with a header row.
///
/// Integer, float and boolean columns become numeric (nulls become `NaN`);
/// everything else is read as categorical text (nulls become empty strings).
pub fn read_csv(path: impl AsRef<Path>, delimiter: u8) -> Result<Dataset> {
    let path = path.as_ref();
    let file = File::open(path)?;

    let parse_opts = CsvParseOptions::default().with_separator(delimiter);
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .with_parse_options(parse_opts)
        .into_reader_with_file_handle(file)
        .finish()?;

    let dataset = from_dataframe(&df)?;
    debug!(
        path = %path.display(),
        rows = dataset.n_rows(),
        cols = dataset.n_cols(),
        "Loaded CSV"
    );
    Ok(dataset)
}

/// Convert a polars DataFrame into a [`Dataset`]
pub fn from_dataframe(df: &DataFrame) -> Result<Dataset> {
    let columns = df
        .get_columns()
        .iter()
        .map(|col| {
            let name = col.name().to_string();
            if is_numeric_dtype(col.dtype()) {
                let values: Vec<f64> = col
                    .cast(&DataType::Float64)?
                    .f64()?
                    .into_iter()
                    .map(|v| v.unwrap_or(f64::NAN))
                    .collect();
                Ok(Column::numeric(name, values))
            } else {
                let values: Vec<String> = col
                    .cast(&DataType::String)?
                    .str()?
                    .into_iter()
                    .map(|v| v.unwrap_or("").to_string())
                    .collect();
                Ok(Column::categorical(name, values))
            }
        })
        .collect::<Result<Vec<_>>>()?;

    Dataset::from_columns(columns)
}

/// Convert a [`Dataset`] into a polars DataFrame
pub fn to_dataframe(dataset: &Dataset) -> Result<DataFrame> {
    let columns = dataset
        .columns()
        .iter()
        .map(|c| match c.data() {
            ColumnData::Numeric(v) => polars::prelude::Column::new(c.name().into(), v.as_slice()),
            ColumnData::Categorical(v) => {
                polars::prelude::Column::new(c.name().into(), v.as_slice())
            }
        })
        .collect::<Vec<_>>();
    DataFrame::new(columns).map_err(KolosalError::from)
}

/// Write a dataset as comma-separated text with a header row
pub fn write_csv(dataset: &Dataset, path: impl AsRef<Path>) -> Result<()> {
    let mut df = to_dataframe(dataset)?;
    let mut file = File::create(path.as_ref())?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}
