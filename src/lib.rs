//! Insurance Models - predictive modeling pipeline for motor insurance portfolios
//!
//! This crate turns a cleaned policy dataset into comparable models for three
//! business targets: claim occurrence (`risk`), claim severity (`severity`) and
//! underwriting margin (`margin`).
//!
//! # Modules
//!
//! ## Stages
//! - [`preprocessing`] - Categorical encoding and numeric scaling
//! - [`split`] - Stratified or uniform train/test partitioning
//! - [`training`] - Linear, tree, bagged ensemble and boosted model families
//! - [`evaluation`] - Holdout metrics per target type
//!
//! ## Orchestration
//! - [`pipeline`] - One end-to-end run for a target
//! - [`cli`] - Command-line interface
//!
//! ## Data model
//! - [`schema`] - Attribute groups of a dataset
//! - [`target`] - Business targets and their label columns

// Core error handling
pub mod error;

// Data model
pub mod schema;
pub mod target;

// Stages
pub mod preprocessing;
pub mod split;
pub mod training;
pub mod evaluation;

// Orchestration
pub mod pipeline;
pub mod cli;

pub use error::{ModelingError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ModelingError, Result};

    // Data model
    pub use crate::schema::AttributeSchema;
    pub use crate::target::TargetType;

    // Preprocessing
    pub use crate::preprocessing::{encode, scale, Encoder, EncodingStrategy, Scaler, ScalingStrategy};

    // Split
    pub use crate::split::{split, SplitResult};

    // Training
    pub use crate::training::{train, Model, ModelBundle, ModelFamily, TrainingConfig};

    // Evaluation
    pub use crate::evaluation::{evaluate, evaluate_bundle, EvaluationReport, MetricKind};

    // Pipeline
    pub use crate::pipeline::{ModelReport, Pipeline, PipelineConfig, PipelineOutcome};
}
