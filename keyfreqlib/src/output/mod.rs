//! Output projections: present ranked data.
//!
//! This module is the last stage of the pipeline. It only formats and
//! indexes; all grouping, filtering and sorting happens in `query`.
//!
//! - **FreqTable**: table-ready rows with counts and percentages
//! - **MatrixExport**: compact JSON shape with indexed contexts and actions

pub mod matrix;
pub mod table;

pub use matrix::MatrixExport;
pub use table::{FreqRow, FreqTable};
