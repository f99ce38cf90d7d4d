//! Rendering of grid pages into markdown tables.
//!
//! A page renders as
//!
//! ```text
//! # BMI: age = 30 years
//!
//! notes, verbatim
//!
//! | ↓height (cm), weight (kg)→ | 50 | 60 |
//! | --- | --- | --- |
//! | 150 | 22.22 | 26.67 |
//! ```
//!
//! Every number on the page, headers included, goes through the same
//! [`NumberFormat`], so identical inputs give byte-identical output.

use std::fmt;

use log::{debug, warn};

use crate::config::DEFAULT_PRECISION;
use crate::errors::FunctionRuntimeError;
use crate::function::ResolvedFunction;
use crate::grid::GridPage;

/// Marker written in place of a value whose evaluation failed.
pub const ERROR_MARKER: &str = "ERROR";

/// Fixed decimal rendering policy.
///
/// Values are rounded to `precision` decimals with ties to even, then trailing zeros
/// and a dangling decimal point are removed. `-0` is written `0`, non-finite values
/// `NaN`, `inf` and `-inf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    pub precision: usize,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
        }
    }
}

impl NumberFormat {
    pub fn new(precision: usize) -> Self {
        Self { precision }
    }

    pub fn format(&self, value: f64) -> String {
        if value.is_nan() {
            return "NaN".to_string();
        }
        if value.is_infinite() {
            return if value > 0.0 { "inf" } else { "-inf" }.to_string();
        }

        let text = format!("{value:.prec$}", prec = self.precision);
        let text = if text.contains('.') {
            text.trim_end_matches('0').trim_end_matches('.')
        } else {
            text.as_str()
        };
        if text == "-0" {
            "0".to_string()
        } else {
            text.to_string()
        }
    }
}

/// Content of one table cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Value(f64),
    Error(FunctionRuntimeError),
}

/// A fully evaluated page, ready to be written.
#[derive(Debug, Clone)]
pub struct TableDocument {
    title: String,
    notes: Option<String>,
    page: GridPage,
    /// Row-major, `rows * cols` entries.
    cells: Vec<Cell>,
}

impl TableDocument {
    /// Evaluates `function` on every cell of `page`.
    ///
    /// Failed evaluations become [`Cell::Error`] and are logged; they never abort the
    /// page.
    pub fn build(
        title: &str,
        notes: Option<&str>,
        page: GridPage,
        function: &ResolvedFunction,
    ) -> Self {
        let cells: Vec<Cell> = page
            .cells()
            .map(|(_, _, inputs)| match function.evaluate(&inputs) {
                Ok(value) => Cell::Value(value),
                Err(e) => {
                    warn!("{e}");
                    Cell::Error(e)
                }
            })
            .collect();

        let (rows, cols) = page.dimensions();
        debug!(
            "evaluated {rows}x{cols} page{}",
            page.fixed_axis
                .as_ref()
                .map(|fixed| format!(" {} = {}", fixed.name, fixed.value))
                .unwrap_or_default()
        );

        Self {
            title: title.to_string(),
            notes: notes.map(str::to_string),
            page,
            cells,
        }
    }

    pub fn page(&self) -> &GridPage {
        &self.page
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The cell at (`row`, `col`), indexed into the row and column axes.
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        let (rows, cols) = self.page.dimensions();
        if row >= rows || col >= cols {
            return None;
        }
        self.cells.get(row * cols + col)
    }

    pub fn failed_cells(&self) -> usize {
        self.cells
            .iter()
            .filter(|cell| matches!(cell, Cell::Error(_)))
            .count()
    }

    pub fn to_markdown(&self, format: &NumberFormat) -> String {
        Markdown {
            document: self,
            format,
        }
        .to_string()
    }
}

struct Markdown<'a> {
    document: &'a TableDocument,
    format: &'a NumberFormat,
}

impl fmt::Display for Markdown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let document = self.document;
        let page = &document.page;
        let number = |value: f64| self.format.format(value);

        write!(f, "# {}", document.title)?;
        if let Some(fixed) = &page.fixed_axis {
            write!(f, ": {} = {}", fixed.name, number(fixed.value))?;
            if let Some(unit) = &fixed.unit {
                write!(f, " {unit}")?;
            }
        }
        writeln!(f)?;
        writeln!(f)?;

        if let Some(notes) = &document.notes {
            write!(f, "{notes}")?;
            writeln!(f)?;
            writeln!(f)?;
        }

        write!(
            f,
            "| ↓{}, {}→ |",
            escape(&page.row_axis.label()),
            escape(&page.col_axis.label())
        )?;
        for &col in page.col_axis.values() {
            write!(f, " {} |", number(col))?;
        }
        writeln!(f)?;

        write!(f, "| --- |")?;
        for _ in page.col_axis.values() {
            write!(f, " --- |")?;
        }
        writeln!(f)?;

        let cols = page.col_axis.len();
        for (r, &row) in page.row_axis.values().iter().enumerate() {
            write!(f, "| {} |", number(row))?;
            for cell in &document.cells[r * cols..(r + 1) * cols] {
                match cell {
                    Cell::Value(value) => write!(f, " {} |", number(*value))?,
                    Cell::Error(_) => write!(f, " {ERROR_MARKER} |")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Keeps a label from splitting a table cell.
fn escape(label: &str) -> String {
    label.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalBackend;
    use crate::function::FunctionDescriptor;
    use crate::grid::enumerate_pages;
    use crate::range::RangeSpec;

    fn document(function: &str, ranges: &[&str]) -> Vec<TableDocument> {
        let ranges: Vec<RangeSpec> = ranges.iter().map(|r| r.parse().unwrap()).collect();
        let function = FunctionDescriptor::from_input(function)
            .resolve(ranges.len(), EvalBackend::Jit)
            .unwrap();
        enumerate_pages(&ranges)
            .unwrap()
            .into_iter()
            .map(|page| TableDocument::build("Title", Some("Some notes."), page, &function))
            .collect()
    }

    #[test]
    fn test_number_format() {
        let format = NumberFormat::default();
        assert_eq!(format.format(4.0), "4");
        assert_eq!(format.format(2.5), "2.5");
        assert_eq!(format.format(1.0 / 3.0), "0.33");
        assert_eq!(format.format(2.0 / 3.0), "0.67");
        assert_eq!(format.format(-0.001), "0");
        assert_eq!(format.format(-0.0), "0");
        assert_eq!(format.format(1234.5678), "1234.57");
        assert_eq!(format.format(f64::NAN), "NaN");
        assert_eq!(format.format(f64::NEG_INFINITY), "-inf");
        assert_eq!(NumberFormat::new(0).format(12.7), "13");
        assert_eq!(NumberFormat::new(4).format(0.1 + 0.2), "0.3");
    }

    #[test]
    fn test_product_table() {
        let docs = document("|a| a[0] * a[1]", &["x:1:3:1", "y:1:2:1"]);
        let doc = &docs[0];
        assert_eq!(doc.page().dimensions(), (2, 3));
        // row y = 2, column x = 2
        assert_eq!(doc.cell(1, 1), Some(&Cell::Value(4.0)));
        assert_eq!(doc.cell(2, 0), None);
        assert_eq!(
            doc.to_markdown(&NumberFormat::default()),
            "# Title\n\
             \n\
             Some notes.\n\
             \n\
             | ↓y, x→ | 1 | 2 | 3 |\n\
             | --- | --- | --- | --- |\n\
             | 1 | 1 | 2 | 3 |\n\
             | 2 | 2 | 4 | 6 |\n"
        );
    }

    #[test]
    fn test_notes_are_copied_verbatim() {
        let notes = include_str!("../demos/bmi_notes.md");
        let ranges: Vec<RangeSpec> = ["w:50:50:1", "h:180:180:1"]
            .iter()
            .map(|r| r.parse().unwrap())
            .collect();
        let function = FunctionDescriptor::from_input("|a| a[0] / (a[1] / 100) ^ 2")
            .resolve(2, EvalBackend::Interpreter)
            .unwrap();
        let page = enumerate_pages(&ranges).unwrap().remove(0);
        let markdown = TableDocument::build("BMI", Some(notes), page.clone(), &function)
            .to_markdown(&NumberFormat::default());
        assert!(
            markdown.starts_with(&format!("# BMI\n\n{notes}\n\n| ↓h, w→ |")),
            "{markdown}"
        );

        // whitespace is kept as well
        let markdown = TableDocument::build("BMI", Some("  indented\n"), page, &function)
            .to_markdown(&NumberFormat::default());
        assert!(markdown.starts_with("# BMI\n\n  indented\n\n\n|"), "{markdown}");
    }

    #[test]
    fn test_error_cell() {
        let docs = document("|a| 1 / (a[0] - a[1])", &["x:1:2:1", "y:1:2:1"]);
        let doc = &docs[0];
        assert_eq!(doc.failed_cells(), 2);
        assert!(matches!(doc.cell(0, 0), Some(Cell::Error(_))));
        let markdown = doc.to_markdown(&NumberFormat::default());
        assert!(markdown.contains("| 1 | ERROR | 1 |"), "{markdown}");
        assert!(markdown.contains("| 2 | -1 | ERROR |"), "{markdown}");
    }

    #[test]
    fn test_fixed_axis_heading() {
        let docs = document(
            "|a| a[0] + a[1] + a[2]",
            &["age:20:30:10:years", "w:1:1:1", "h:1:1:1:cm"],
        );
        assert_eq!(docs.len(), 2);
        let markdown = docs[1].to_markdown(&NumberFormat::default());
        assert!(markdown.starts_with("# Title: age = 30 years\n"), "{markdown}");
        assert!(markdown.contains("| ↓h (cm), w→ | 1 |"), "{markdown}");
        assert!(markdown.contains("| 1 | 32 |"), "{markdown}");
    }

    #[test]
    fn test_non_finite_values() {
        let docs = document("|a| exp(a[0] * a[1])", &["x:1:1:1", "y:1000:1000:1"]);
        let markdown = docs[0].to_markdown(&NumberFormat::default());
        assert!(markdown.contains("| 1000 | inf |"), "{markdown}");
    }
}
