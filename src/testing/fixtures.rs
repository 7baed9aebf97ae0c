//! Pre-built frames for adapter tests.

use crate::frame::DataFrame;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A row of the [`sample_frame`] table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleScore {
    pub id: i64,
    pub name: String,
    pub score: f64,
    pub active: bool,
}

/// Four rows with an integer, text, float and boolean column.
///
/// # Example
///
/// ```
/// use ironadapt::testing::sample_rows;
///
/// assert_eq!(sample_rows().len(), 4);
/// ```
#[must_use]
pub fn sample_rows() -> Vec<SampleScore> {
    vec![
        SampleScore {
            id: 1,
            name: "alice".to_string(),
            score: 91.5,
            active: true,
        },
        SampleScore {
            id: 2,
            name: "bob".to_string(),
            score: 78.25,
            active: false,
        },
        SampleScore {
            id: 3,
            name: "carol".to_string(),
            score: 66.75,
            active: true,
        },
        SampleScore {
            id: 4,
            name: "dave".to_string(),
            score: 84.125,
            active: false,
        },
    ]
}

/// [`sample_rows`] as a frame.
///
/// # Errors
/// Only if the rows cannot be converted.
pub fn sample_frame() -> Result<DataFrame> {
    DataFrame::from_rows(&sample_rows())
}

/// A row with nullable columns, see [`mixed_frame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixedRow {
    pub id: i64,
    pub label: Option<String>,
    pub value: Option<f64>,
}

/// Rows with nulls scattered through the text and float columns.
#[must_use]
pub fn mixed_rows() -> Vec<MixedRow> {
    vec![
        MixedRow {
            id: 10,
            label: Some("north".to_string()),
            value: Some(1.5),
        },
        MixedRow {
            id: 11,
            label: None,
            value: Some(-2.25),
        },
        MixedRow {
            id: 12,
            label: Some("south".to_string()),
            value: None,
        },
    ]
}

/// [`mixed_rows`] as a frame.
///
/// # Errors
/// Only if the rows cannot be converted.
pub fn mixed_frame() -> Result<DataFrame> {
    DataFrame::from_rows(&mixed_rows())
}
