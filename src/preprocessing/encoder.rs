//! Categorical encoding implementations

use super::normalize_name;
use crate::error::{ModelingError, Result};
use crate::schema::AttributeSchema;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument, warn};

/// Rendering of a missing categorical value for label-index encoding
const NULL_CATEGORY: &str = "null";

/// Type of encoding applied to categorical columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingStrategy {
    /// Integer code per distinct value, over every categorical column
    LabelIndex,
    /// Drop-first indicator columns, over the curated one-hot subset only
    OneHot,
    /// Leave the frame unchanged
    #[default]
    Identity,
}

impl EncodingStrategy {
    /// Parse a strategy name, falling back to [`EncodingStrategy::Identity`]
    /// with a warning when the name is not recognized.
    pub fn parse_or_identity(name: &str) -> Self {
        match name.parse() {
            Ok(strategy) => strategy,
            Err(_) => {
                warn!(strategy = name, "unrecognized encoding strategy, data passes through unchanged");
                EncodingStrategy::Identity
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingStrategy::LabelIndex => "label_index",
            EncodingStrategy::OneHot => "one_hot",
            EncodingStrategy::Identity => "identity",
        }
    }
}

impl fmt::Display for EncodingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncodingStrategy {
    type Err = ModelingError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_name(s).as_str() {
            "label_index" | "label" | "labelencoder" => Ok(EncodingStrategy::LabelIndex),
            "one_hot" | "onehot" | "onehotencoder" => Ok(EncodingStrategy::OneHot),
            "identity" | "none" => Ok(EncodingStrategy::Identity),
            _ => Err(ModelingError::Configuration(format!(
                "unknown encoding strategy '{s}', expected one of label_index, one_hot, identity"
            ))),
        }
    }
}

/// Categorical encoder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encoder {
    strategy: EncodingStrategy,
    // Column name -> sorted distinct categories, in schema order
    mappings: Vec<(String, Vec<String>)>,
    is_fitted: bool,
}

impl Encoder {
    /// Create a new encoder
    pub fn new(strategy: EncodingStrategy) -> Self {
        Self {
            strategy,
            mappings: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn strategy(&self) -> EncodingStrategy {
        self.strategy
    }

    /// Learn the categories of every column the strategy applies to
    pub fn fit(&mut self, df: &DataFrame, schema: &AttributeSchema) -> Result<&mut Self> {
        let columns = match self.strategy {
            EncodingStrategy::LabelIndex => schema.present_categorical(df),
            EncodingStrategy::OneHot => schema.present_one_hot(df),
            EncodingStrategy::Identity => Vec::new(),
        };

        self.mappings.clear();
        for col_name in columns {
            let categories = self.build_categories(df, col_name)?;
            debug!(column = col_name, n_categories = categories.len(), "fitted categories");
            self.mappings.push((col_name.to_string(), categories));
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Transform the data
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(ModelingError::ModelNotFitted);
        }

        match self.strategy {
            EncodingStrategy::LabelIndex => self.transform_label(df),
            EncodingStrategy::OneHot => self.transform_onehot(df),
            EncodingStrategy::Identity => Ok(df.clone()),
        }
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame, schema: &AttributeSchema) -> Result<DataFrame> {
        self.fit(df, schema)?;
        self.transform(df)
    }

    /// Sorted distinct values. Label index keeps nulls as their own category,
    /// one-hot ignores them.
    fn build_categories(&self, df: &DataFrame, col_name: &str) -> Result<Vec<String>> {
        let strings = string_values(df, col_name)?;
        let ca = strings.str()?;

        let categories: BTreeSet<&str> = match self.strategy {
            EncodingStrategy::LabelIndex => ca
                .into_iter()
                .map(|v| v.unwrap_or(NULL_CATEGORY))
                .collect(),
            _ => ca.into_iter().flatten().collect(),
        };

        Ok(categories.into_iter().map(str::to_string).collect())
    }

    fn transform_label(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut result = df.clone();

        for (col_name, categories) in &self.mappings {
            if df.column(col_name).is_err() {
                continue;
            }
            let index: HashMap<&str, i64> = categories
                .iter()
                .enumerate()
                .map(|(i, c)| (c.as_str(), i as i64))
                .collect();

            let strings = string_values(df, col_name)?;
            let values: Vec<Option<i64>> = strings
                .str()?
                .into_iter()
                .map(|v| index.get(v.unwrap_or(NULL_CATEGORY)).copied())
                .collect();

            result.with_column(Series::new(col_name.as_str().into(), values))?;
        }

        Ok(result)
    }

    fn transform_onehot(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut result = df.clone();

        for (col_name, categories) in &self.mappings {
            if df.column(col_name).is_err() {
                continue;
            }
            let strings = string_values(df, col_name)?;
            let ca = strings.str()?;

            result = result.drop(col_name)?;

            // First category is the dropped reference level
            for category in categories.iter().skip(1) {
                let new_col_name = format!("{}_{}", col_name, category);
                if result.column(&new_col_name).is_ok() {
                    return Err(ModelingError::Configuration(format!(
                        "one-hot column '{new_col_name}' for '{col_name}' collides with an existing column"
                    )));
                }
                let values: Vec<i32> = ca
                    .into_iter()
                    .map(|v| i32::from(v == Some(category.as_str())))
                    .collect();
                result.with_column(Series::new(new_col_name.into(), values))?;
            }
        }

        Ok(result)
    }
}

/// Render a column as strings so numeric identifiers (e.g. postal codes) encode like text
fn string_values(df: &DataFrame, col_name: &str) -> Result<Series> {
    let column = df
        .column(col_name)
        .map_err(|_| ModelingError::FeatureNotFound(col_name.to_string()))?;
    Ok(column.as_materialized_series().cast(&DataType::String)?)
}

/// Encode the categorical attributes of `df` with `strategy`.
///
/// The input is not modified. Columns named by the schema but missing from the
/// frame are skipped.
#[instrument(skip(df, schema), fields(rows = df.height(), cols = df.width()))]
pub fn encode(strategy: EncodingStrategy, df: &DataFrame, schema: &AttributeSchema) -> Result<DataFrame> {
    let mut encoder = Encoder::new(strategy);
    let encoded = encoder.fit_transform(df, schema)?;
    debug!(cols_out = encoded.width(), "encoding complete");
    Ok(encoded)
}
