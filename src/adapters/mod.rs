//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external formats:
//! - `model`: JSON model artifacts (logistic regression, random forest) and their manifest
//! - `table`: CSV batch input and result export

pub mod model;
pub mod table;
