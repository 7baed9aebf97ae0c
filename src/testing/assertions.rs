//! Assertions for comparing frames.

use crate::frame::DataFrame;
use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;

/// Render every cell of `column` as text (`None` for nulls).
fn column_cells(frame: &DataFrame, column: &str) -> Vec<Option<String>> {
    let Some(array) = frame.column(column) else {
        panic!("column '{column}' missing from frame");
    };
    let text = cast(array, &DataType::Utf8)
        .unwrap_or_else(|e| panic!("column '{column}' cannot be rendered as text: {e}"));
    let strings = text.as_string::<i32>();
    (0..strings.len())
        .map(|i| (!strings.is_null(i)).then(|| strings.value(i).to_string()))
        .collect()
}

/// Assert that two frames hold the same columns, in the same order, with the same
/// values row by row.
///
/// Values are compared through their text rendering, so physical type differences
/// that do not change a value (`Utf8` vs `LargeUtf8`, nullable vs non-nullable)
/// are ignored.
///
/// # Panics
///
/// Panics if column names, row counts or any cell differ.
///
/// # Example
///
/// ```
/// use ironadapt::testing::{assert_frames_equal, sample_frame};
///
/// let frame = sample_frame().unwrap();
/// assert_frames_equal(&frame, &frame.clone());
/// ```
pub fn assert_frames_equal(actual: &DataFrame, expected: &DataFrame) {
    assert_eq!(
        actual.column_names(),
        expected.column_names(),
        "Column mismatch:\n  Expected: {:?}\n  Actual: {:?}",
        expected.column_names(),
        actual.column_names()
    );
    assert_eq!(
        actual.num_rows(),
        expected.num_rows(),
        "Row count mismatch:\n  Expected: {}\n  Actual: {}",
        expected.num_rows(),
        actual.num_rows()
    );

    for column in expected.column_names() {
        let a = column_cells(actual, &column);
        let e = column_cells(expected, &column);
        for (row, (a, e)) in a.iter().zip(&e).enumerate() {
            assert_eq!(
                a, e,
                "Value mismatch in column '{column}' at row {row}:\n  Expected: {e:?}\n  Actual: {a:?}"
            );
        }
    }
}
