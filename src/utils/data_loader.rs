//! Data loading utilities
//!
//! A [`RunManifest`] lists the response variables to evaluate. Each entry
//! points at a CSV file and names the covariate columns, the response column
//! and optionally a group column. [`DataLoader`] turns an entry into a
//! [`Dataset`].

use crate::data::Dataset;
use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// One response variable to evaluate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Report label, e.g. "Raw Mullen (6m)"
    pub label: String,
    /// CSV file holding covariates and response
    pub path: PathBuf,
    pub covariates: Vec<String>,
    pub response: String,
    #[serde(default)]
    pub group_column: Option<String>,
}

/// Ordered list of runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub runs: Vec<ManifestEntry>,
}

impl RunManifest {
    /// Read a manifest from JSON. Relative data paths resolve against the
    /// manifest's directory.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let mut manifest: Self = serde_json::from_str(&json)?;
        if let Some(dir) = path.parent() {
            for run in &mut manifest.runs {
                if run.path.is_relative() {
                    run.path = dir.join(&run.path);
                }
            }
        }
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.runs.is_empty() {
            return Err(HarnessError::ConfigError("manifest lists no runs".to_string()));
        }
        for run in &self.runs {
            if run.label.trim().is_empty() {
                return Err(HarnessError::ConfigError(format!(
                    "run for response '{}' has an empty label",
                    run.response
                )));
            }
            if run.covariates.is_empty() {
                return Err(HarnessError::ConfigError(format!(
                    "run '{}' selects no covariates",
                    run.label
                )));
            }
        }
        Ok(())
    }
}

/// CSV loader backed by polars
pub struct DataLoader {
    delimiter: u8,
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            infer_schema_length: 100,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let start = Instant::now();
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| HarnessError::DataError(format!("{}: {}", path.display(), e)))?;

        let parse_opts = CsvParseOptions::default().with_separator(self.delimiter);
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| HarnessError::DataError(format!("{}: {}", path.display(), e)))?;

        debug!(
            path = %path.display(),
            rows = df.height(),
            columns = df.width(),
            ms = start.elapsed().as_millis() as u64,
            "csv loaded"
        );
        Ok(df)
    }

    /// Load the dataset described by a manifest entry
    pub fn load_entry(&self, entry: &ManifestEntry) -> Result<Dataset> {
        let df = self.load_csv(&entry.path)?;
        dataset_from_frame(
            &df,
            &entry.covariates,
            &entry.response,
            entry.group_column.as_deref(),
        )
    }

    /// Row count and optional group ids of a CSV file
    pub fn load_groups(
        &self,
        path: impl AsRef<Path>,
        group_column: Option<&str>,
    ) -> Result<(usize, Option<Array1<i64>>)> {
        let df = self.load_csv(path)?;
        let groups = group_column.map(|g| group_ids(&df, g)).transpose()?;
        Ok((df.height(), groups))
    }
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|c| c.as_materialized_series())
        .map_err(|_| HarnessError::FeatureNotFound(name.to_string()))
}

/// Numeric view of a column; nulls and unparsable cells become `None`
fn float_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = column(df, name)?.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

/// Map group labels to integers in first-seen order
fn group_ids(df: &DataFrame, name: &str) -> Result<Array1<i64>> {
    let series = column(df, name)?.cast(&DataType::String)?;
    let mut ids: HashMap<String, i64> = HashMap::new();
    let mut out = Vec::with_capacity(series.len());
    for (row, value) in series.str()?.into_iter().enumerate() {
        let value = value.ok_or_else(|| {
            HarnessError::DataError(format!("group column '{}' is missing at row {}", name, row))
        })?;
        let next = ids.len() as i64;
        out.push(*ids.entry(value.to_string()).or_insert(next));
    }
    Ok(Array1::from(out))
}

/// Build a dataset from selected columns of a frame.
///
/// Missing covariate cells become NaN. A missing response value is an error.
pub fn dataset_from_frame(
    df: &DataFrame,
    covariates: &[String],
    response: &str,
    group_column: Option<&str>,
) -> Result<Dataset> {
    let n_rows = df.height();

    // resolve every column up front so a typo is reported before any parsing
    for name in covariates
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(response))
        .chain(group_column)
    {
        column(df, name)?;
    }

    let mut x = Array2::<f64>::from_elem((n_rows, covariates.len()), f64::NAN);
    for (j, name) in covariates.iter().enumerate() {
        for (i, value) in float_values(df, name)?.into_iter().enumerate() {
            if let Some(v) = value {
                x[[i, j]] = v;
            }
        }
    }

    let y = float_values(df, response)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.filter(|v| v.is_finite()).ok_or_else(|| {
                HarnessError::DataError(format!(
                    "response '{}' is missing at row {}",
                    response, row
                ))
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    let dataset = Dataset::with_feature_names(x, Array1::from(y), covariates.to_vec())?;
    match group_column {
        Some(g) => dataset.with_groups(group_ids(df, g)?),
        None => Ok(dataset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_dataset_with_missing_covariate() {
        let file = write_csv("a,b,y,subject\n1.0,2.0,3.0,s1\n,4.0,5.0,s2\n5.0,6.0,7.0,s1\n");
        let df = DataLoader::new().load_csv(file.path()).unwrap();
        let ds = dataset_from_frame(
            &df,
            &["a".to_string(), "b".to_string()],
            "y",
            Some("subject"),
        )
        .unwrap();
        assert_eq!(ds.n_samples(), 3);
        assert!(ds.x()[[1, 0]].is_nan());
        assert_eq!(ds.x()[[2, 1]], 6.0);
        assert_eq!(ds.groups().unwrap().to_vec(), vec![0, 1, 0]);
        assert_eq!(ds.feature_names(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_missing_column_is_feature_not_found() {
        let file = write_csv("a,y\n1,2\n3,4\n");
        let df = DataLoader::new().load_csv(file.path()).unwrap();
        let err = dataset_from_frame(&df, &["zzz".to_string()], "y", None).unwrap_err();
        assert!(matches!(err, HarnessError::FeatureNotFound(ref c) if c == "zzz"));
    }

    #[test]
    fn test_missing_label_is_data_error() {
        let file = write_csv("a,y\n1,2\n3,\n");
        let df = DataLoader::new().load_csv(file.path()).unwrap();
        let err = dataset_from_frame(&df, &["a".to_string()], "y", None).unwrap_err();
        assert!(matches!(err, HarnessError::DataError(_)));
    }
}
