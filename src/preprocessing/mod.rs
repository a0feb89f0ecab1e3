//! Data preprocessing module
//!
//! Provides the two target-independent stages of the pipeline:
//! - Categorical encoding (label index, drop-first one-hot)
//! - Numeric scaling (standardize, min-max, log1p)
//!
//! Both stages read their column groups from an [`AttributeSchema`](crate::schema::AttributeSchema)
//! and skip columns missing from the frame.

mod encoder;
mod scaler;

pub use encoder::{encode, Encoder, EncodingStrategy};
pub use scaler::{scale, Scaler, ScalingStrategy};

use crate::error::{ModelingError, Result};
use polars::prelude::*;

/// Normalize a strategy name for matching: lowercase, `-` and spaces become `_`
fn normalize_name(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
        .replace(['-', ' '], "_")
}

/// Read a column as `f64` values, casting integer and boolean columns.
pub(crate) fn float_values(df: &DataFrame, name: &str) -> Result<Float64Chunked> {
    let column = df
        .column(name)
        .map_err(|_| ModelingError::FeatureNotFound(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    Ok(series.f64()?.clone())
}
