//! Attribute schema describing which columns belong to which attribute group
//!
//! Stages never infer groups from data types; they receive an explicit
//! [`AttributeSchema`] and operate on the subset of its columns that is
//! actually present in the frame.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

const INSURANCE_NUMERIC: &[&str] = &[
    "UnderwrittenCoverID",
    "PolicyID",
    "PostalCode",
    "mmcode",
    "RegistrationYear",
    "Cylinders",
    "cubiccapacity",
    "kilowatts",
    "NumberOfDoors",
    "CustomValueEstimate",
    "NumberOfVehiclesInFleet",
    "SumInsured",
    "CalculatedPremiumPerTerm",
    "TotalPremium",
    "TotalClaims",
];

const INSURANCE_CATEGORICAL: &[&str] = &[
    "Citizenship",
    "LegalType",
    "Title",
    "Language",
    "Bank",
    "AccountType",
    "MaritalStatus",
    "Gender",
    "Country",
    "Province",
    "MainCrestaZone",
    "SubCrestaZone",
    "ItemType",
    "VehicleType",
    "make",
    "Model",
    "bodytype",
    "VehicleIntroDate",
    "AlarmImmobiliser",
    "TrackingDevice",
    "CapitalOutstanding",
    "NewVehicle",
    "WrittenOff",
    "Rebuilt",
    "Converted",
    "CrossBorder",
    "TermFrequency",
    "ExcessSelected",
    "CoverCategory",
    "CoverType",
    "CoverGroup",
    "Section",
    "Product",
    "StatutoryClass",
    "StatutoryRiskType",
];

const INSURANCE_BOOLEAN: &[&str] = &["IsVATRegistered"];

const INSURANCE_DATE: &[&str] = &["TransactionMonth", "VehicleIntroDate"];

/// Raw columns the label columns are derived from
const INSURANCE_LABEL_SOURCES: &[&str] = &["TotalClaims"];

/// Geography and vehicle identity columns expanded by one-hot encoding
const INSURANCE_ONE_HOT: &[&str] = &["Province", "PostalCode", "Bank", "VehicleType", "make", "Model"];

/// Column groups of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AttributeSchema {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
    pub boolean: Vec<String>,
    pub date: Vec<String>,
    /// Curated subset that one-hot encoding expands
    pub one_hot: Vec<String>,
    /// Columns the labels are computed from; never used as features
    pub label_sources: Vec<String>,
}

fn owned(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

impl AttributeSchema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema of the motor insurance policy dataset
    pub fn insurance() -> Self {
        Self {
            numeric: owned(INSURANCE_NUMERIC),
            categorical: owned(INSURANCE_CATEGORICAL),
            boolean: owned(INSURANCE_BOOLEAN),
            date: owned(INSURANCE_DATE),
            one_hot: owned(INSURANCE_ONE_HOT),
            label_sources: owned(INSURANCE_LABEL_SOURCES),
        }
    }

    /// Builder method to set numeric columns
    pub fn with_numeric<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.numeric = cols.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Builder method to set categorical columns
    pub fn with_categorical<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.categorical = cols.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Builder method to set boolean columns
    pub fn with_boolean<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.boolean = cols.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Builder method to set date columns
    pub fn with_date<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.date = cols.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Builder method to set the one-hot subset
    pub fn with_one_hot<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.one_hot = cols.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Builder method to set the label source columns
    pub fn with_label_sources<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.label_sources = cols.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Numeric columns present in `df`, in schema order
    pub fn present_numeric<'a>(&'a self, df: &DataFrame) -> Vec<&'a str> {
        present(&self.numeric, df)
    }

    /// Categorical columns present in `df`, in schema order
    pub fn present_categorical<'a>(&'a self, df: &DataFrame) -> Vec<&'a str> {
        present(&self.categorical, df)
    }

    /// One-hot subset columns present in `df`, in schema order
    pub fn present_one_hot<'a>(&'a self, df: &DataFrame) -> Vec<&'a str> {
        present(&self.one_hot, df)
    }

    pub fn is_date(&self, column: &str) -> bool {
        self.date.iter().any(|c| c == column)
    }

    pub fn is_boolean(&self, column: &str) -> bool {
        self.boolean.iter().any(|c| c == column)
    }

    pub fn is_label_source(&self, column: &str) -> bool {
        self.label_sources.iter().any(|c| c == column)
    }
}

fn present<'a>(cols: &'a [String], df: &DataFrame) -> Vec<&'a str> {
    cols.iter()
        .map(String::as_str)
        .filter(|c| df.column(c).is_ok())
        .collect()
}
