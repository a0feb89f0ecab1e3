//! Model training module
//!
//! Provides the four model families fitted for every target:
//! - Ordinary least squares linear regression
//! - CART regression tree
//! - Bagged random forest
//! - Second-order gradient boosted trees with a per-target objective

mod config;
mod engine;
mod models;
pub mod decision_tree;
pub mod linear_models;
pub mod random_forest;
pub mod xgboost;

pub use config::TrainingConfig;
pub use decision_tree::{DecisionTree, TreeNode};
pub use engine::{train, ModelBundle};
pub use linear_models::LinearRegression;
pub use models::{Model, ModelFamily};
pub use random_forest::{MaxFeatures, RandomForest};
pub use xgboost::{BoostedTrees, BoostingConfig, EvalMetric, Objective};
