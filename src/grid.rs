//! Enumeration of the input grid into table pages.
//!
//! The last range supplies the rows and the range before it the columns. With three
//! ranges the first one is fixed per page, giving one page per value:
//!
//! | ranges | fixed | columns | rows |
//! |--------|-------|---------|------|
//! | 2      | -     | first   | second |
//! | 3      | first | second  | third  |
//!
//! Whatever the layout, the function always receives its inputs in the order the
//! ranges were given.

use itertools::Itertools;

use crate::errors::GenerateError;
use crate::range::RangeSpec;

/// The outer-axis value a 3D page is pinned to.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedAxis {
    pub name: String,
    pub unit: Option<String>,
    pub value: f64,
}

/// One two-dimensional slice of the sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPage {
    pub fixed_axis: Option<FixedAxis>,
    pub row_axis: RangeSpec,
    pub col_axis: RangeSpec,
}

impl GridPage {
    /// Input tuple for the cell at (`row`, `col`), in original range order.
    pub fn inputs(&self, row: f64, col: f64) -> Vec<f64> {
        match &self.fixed_axis {
            Some(fixed) => vec![fixed.value, col, row],
            None => vec![col, row],
        }
    }

    /// All cells in row-major order as `(row index, col index, inputs)`.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, Vec<f64>)> + '_ {
        let rows = self.row_axis.values().iter().enumerate();
        let cols = self.col_axis.values().iter().enumerate();
        rows.cartesian_product(cols)
            .map(|((r, &row), (c, &col))| (r, c, self.inputs(row, col)))
    }

    /// `rows x columns`.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.row_axis.len(), self.col_axis.len())
    }
}

/// Splits 2 or 3 ranges into pages, outer values in sequence order.
///
/// An empty outer range yields no pages; that is not an error.
///
/// # Errors
/// `GenerateError::UnsupportedDimensions` for any other number of ranges.
pub fn enumerate_pages(ranges: &[RangeSpec]) -> Result<Vec<GridPage>, GenerateError> {
    match ranges {
        [first, second] => Ok(vec![GridPage {
            fixed_axis: None,
            row_axis: second.clone(),
            col_axis: first.clone(),
        }]),
        [first, second, third] => Ok(first
            .values()
            .iter()
            .map(|&value| GridPage {
                fixed_axis: Some(FixedAxis {
                    name: first.name().to_string(),
                    unit: first.unit().map(str::to_string),
                    value,
                }),
                row_axis: third.clone(),
                col_axis: second.clone(),
            })
            .collect()),
        _ => Err(GenerateError::UnsupportedDimensions(ranges.len())),
    }
}
