//! Orchestration of a table generation run.
//!
//! ```text
//! ranges ─┐
//!         ├─ enumerate_pages ─ TableDocument::build (per page, parallel) ─ OutputWriter
//! function┘
//! ```
//!
//! Everything that can be rejected up front (range syntax, the function, the number
//! of ranges, file name collisions and existing files) is checked before the first
//! file is written. After that, failed cells and failed writes are counted and
//! reported but never stop the run.

use std::path::PathBuf;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::GeneratorConfig;
use crate::errors::{GenerateError, OutputError};
use crate::function::{FunctionDescriptor, ResolvedFunction};
use crate::grid::enumerate_pages;
use crate::output::OutputWriter;
use crate::range::RangeSpec;
use crate::render::{NumberFormat, TableDocument};

/// Outcome of a completed run.
#[derive(Debug, Default)]
pub struct GenerationReport {
    /// Number of pages the sweep was split into.
    pub pages: usize,
    /// Files written, in page order.
    pub written: Vec<PathBuf>,
    /// Cells rendered as errors, over all pages.
    pub failed_cells: usize,
    /// Pages whose file could not be written.
    pub write_failures: Vec<OutputError>,
}

impl GenerationReport {
    pub fn is_clean(&self) -> bool {
        self.failed_cells == 0 && self.write_failures.is_empty()
    }
}

/// Drives resolve, enumerate, render and write.
#[derive(Debug, Clone, Default)]
pub struct TableGenerator {
    config: GeneratorConfig,
}

impl TableGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn number_format(&self) -> NumberFormat {
        NumberFormat::new(self.config.precision)
    }

    /// Parses raw descriptors, resolves the function and generates the tables.
    ///
    /// All parsing and compilation happens before any file is touched.
    pub fn run<S: AsRef<str>>(
        &self,
        function_input: &str,
        range_inputs: &[S],
        writer: &OutputWriter,
    ) -> Result<GenerationReport, GenerateError> {
        let ranges = range_inputs
            .iter()
            .map(|input| RangeSpec::parse(input.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        check_dimensions(&ranges)?;

        let descriptor = FunctionDescriptor::from_input(function_input);
        let function = descriptor.resolve(ranges.len(), self.config.backend)?;
        info!("resolved {descriptor} as {function}");

        self.generate(&ranges, &function, writer)
    }

    /// Evaluates every page of the sweep in memory, in page order.
    pub fn render(
        &self,
        ranges: &[RangeSpec],
        function: &ResolvedFunction,
    ) -> Result<Vec<TableDocument>, GenerateError> {
        check_dimensions(ranges)?;
        if function.arity() != ranges.len() {
            return Err(GenerateError::ArityMismatch {
                function: function.arity(),
                ranges: ranges.len(),
            });
        }
        for range in ranges.iter().filter(|range| range.is_empty()) {
            warn!("range {} has no values", range.name());
        }

        let pages = enumerate_pages(ranges)?;
        if pages.is_empty() {
            warn!("the sweep has no pages, nothing to render");
        }
        debug!("rendering {} page(s)", pages.len());

        let title = self.config.title.as_str();
        let notes = self.config.notes.as_deref();
        let documents: Vec<TableDocument> = if self.config.parallel {
            pages
                .into_par_iter()
                .map(|page| TableDocument::build(title, notes, page, function))
                .collect()
        } else {
            pages
                .into_iter()
                .map(|page| TableDocument::build(title, notes, page, function))
                .collect()
        };
        Ok(documents)
    }

    /// Renders and writes all pages.
    ///
    /// # Errors
    /// Fails before writing if the ranges are unusable or a target is rejected by
    /// `OutputWriter::check_targets`. Per-page write errors end up in the report.
    pub fn generate(
        &self,
        ranges: &[RangeSpec],
        function: &ResolvedFunction,
        writer: &OutputWriter,
    ) -> Result<GenerationReport, GenerateError> {
        let documents = self.render(ranges, function)?;
        let format = self.number_format();

        let paths: Vec<PathBuf> = documents
            .iter()
            .map(|document| writer.path_for(document.page(), &format))
            .collect();
        writer.check_targets(&paths)?;

        let mut report = GenerationReport {
            pages: documents.len(),
            ..GenerationReport::default()
        };
        for (document, path) in documents.iter().zip(paths) {
            report.failed_cells += document.failed_cells();
            match writer.write(&path, &document.to_markdown(&format)) {
                Ok(()) => report.written.push(path),
                Err(e) => {
                    warn!("{e}");
                    report.write_failures.push(e);
                }
            }
        }

        info!(
            "wrote {} of {} table(s) to {}, {} failed cell(s)",
            report.written.len(),
            report.pages,
            writer.dir().display(),
            report.failed_cells
        );
        Ok(report)
    }
}

fn check_dimensions(ranges: &[RangeSpec]) -> Result<(), GenerateError> {
    match ranges.len() {
        2 | 3 => Ok(()),
        n => Err(GenerateError::UnsupportedDimensions(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalBackend;
    use crate::errors::{RangeError, ResolveError};
    use crate::output::OverwritePolicy;
    use std::fs;
    use std::path::Path;

    fn generator(parallel: bool) -> TableGenerator {
        TableGenerator::new(GeneratorConfig {
            title: "Test".to_string(),
            notes: Some("Generated for tests.".to_string()),
            parallel,
            ..GeneratorConfig::default()
        })
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test_log::test]
    fn test_two_dimensional_run() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path(), OverwritePolicy::FailIfExists);
        let report = generator(true)
            .run("|args| args[0] * args[1]", &["x:1:3:1", "y:1:2:1"], &writer)
            .unwrap();

        assert_eq!(report.pages, 1);
        assert!(report.is_clean());
        assert_eq!(listing(dir.path()), vec!["x2y.md"]);

        let markdown = fs::read_to_string(dir.path().join("x2y.md")).unwrap();
        assert!(markdown.starts_with("# Test\n\nGenerated for tests.\n\n"));
        assert!(markdown.contains("| 2 | 2 | 4 | 6 |"), "{markdown}");
    }

    #[test_log::test]
    fn test_three_dimensional_run() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path(), OverwritePolicy::FailIfExists);
        let report = generator(true)
            .run(
                "fn f(v: &[f64]) -> f64 { v[0] + v[1] * v[2] }",
                &["k:1:4:1", "b:0:2:1", "c:1:5:1"],
                &writer,
            )
            .unwrap();

        assert_eq!(report.pages, 4);
        assert_eq!(
            listing(dir.path()),
            vec!["k_1.md", "k_2.md", "k_3.md", "k_4.md"]
        );
        for path in &report.written {
            let markdown = fs::read_to_string(path).unwrap();
            let rows = markdown
                .lines()
                .filter(|line| line.starts_with('|'))
                .skip(2)
                .count();
            assert_eq!(rows, 5);
            let header = markdown.lines().find(|line| line.starts_with('|')).unwrap();
            assert_eq!(header.matches('|').count(), 3 + 2);
        }
    }

    #[test_log::test]
    fn test_runtime_errors_do_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path(), OverwritePolicy::FailIfExists);
        let report = generator(false)
            .run("|a| a[0] / (a[1] - 2)", &["x:1:2:1", "y:1:3:1"], &writer)
            .unwrap();

        assert_eq!(report.failed_cells, 2);
        assert_eq!(report.written.len(), 1);
        let markdown = fs::read_to_string(&report.written[0]).unwrap();
        assert!(markdown.contains("| 2 | ERROR | ERROR |"), "{markdown}");
    }

    #[test]
    fn test_output_is_deterministic() {
        let inputs = ["t:0:1:0.1", "u:-1:1:0.25:m"];
        let function = "|a| sin(a[0]) * a[1] ^ 3 / 7";

        let mut outputs = Vec::new();
        for (parallel, backend) in [
            (true, EvalBackend::Jit),
            (false, EvalBackend::Jit),
            (true, EvalBackend::Interpreter),
        ] {
            let dir = tempfile::tempdir().unwrap();
            let writer = OutputWriter::new(dir.path(), OverwritePolicy::Overwrite);
            let generator = TableGenerator::new(GeneratorConfig {
                parallel,
                backend,
                ..GeneratorConfig::default()
            });
            generator.run(function, &inputs, &writer).unwrap();
            generator.run(function, &inputs, &writer).unwrap();
            outputs.push(fs::read(dir.path().join("t2u.md")).unwrap());
        }
        assert!(outputs.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_existing_target_prevents_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("k_3.md"), "keep me").unwrap();
        let writer = OutputWriter::new(dir.path(), OverwritePolicy::FailIfExists);

        let result = generator(true).run(
            "|v| v[0]",
            &["k:1:4:1", "a:1:2:1", "b:1:2:1"],
            &writer,
        );
        assert!(matches!(
            result,
            Err(GenerateError::Output(OutputError::AlreadyExists { .. }))
        ));
        assert_eq!(listing(dir.path()), vec!["k_3.md"]);
        assert_eq!(
            fs::read_to_string(dir.path().join("k_3.md")).unwrap(),
            "keep me"
        );
    }

    #[test_log::test]
    fn test_write_failure_is_per_page() {
        let dir = tempfile::tempdir().unwrap();
        // a directory in place of a table file cannot be replaced
        fs::create_dir(dir.path().join("k_2.md")).unwrap();
        let writer = OutputWriter::new(dir.path(), OverwritePolicy::Overwrite);

        let report = generator(false)
            .run("|v| v[0] * v[1] * v[2]", &["k:1:3:1", "a:1:2:1", "b:1:2:1"], &writer)
            .unwrap();
        assert_eq!(report.pages, 3);
        assert_eq!(report.write_failures.len(), 1);
        assert!(matches!(
            report.write_failures[0],
            OutputError::Write { .. }
        ));
        assert_eq!(
            report.written,
            vec![dir.path().join("k_1.md"), dir.path().join("k_3.md")]
        );
    }

    #[test]
    fn test_input_errors_are_fatal_and_early() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path(), OverwritePolicy::FailIfExists);
        let generator = generator(true);

        assert!(matches!(
            generator.run("|v| v[0]", &["x:1:2:0", "y:1:2:1"], &writer),
            Err(GenerateError::Range(RangeError::InvalidStep { .. }))
        ));
        assert!(matches!(
            generator.run("|v| v[0] +", &["x:1:2:1", "y:1:2:1"], &writer),
            Err(GenerateError::Resolve(ResolveError::Compile { .. }))
        ));
        assert!(matches!(
            generator.run("|v| v[0]", &["x:1:2:1"], &writer),
            Err(GenerateError::UnsupportedDimensions(1))
        ));
        assert!(listing(dir.path()).is_empty());
    }

    #[test_log::test]
    fn test_empty_outer_range_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path(), OverwritePolicy::FailIfExists);
        let report = generator(true)
            .run("|v| v[0]", &["k:4:1:1", "a:1:2:1", "b:1:2:1"], &writer)
            .unwrap();
        assert_eq!(report.pages, 0);
        assert!(report.written.is_empty());
    }

    #[test]
    fn test_arity_mismatch() {
        let function = FunctionDescriptor::from_input("|v| v[0]")
            .resolve(3, EvalBackend::Interpreter)
            .unwrap();
        let ranges: Vec<RangeSpec> = ["x:1:2:1", "y:1:2:1"]
            .iter()
            .map(|r| r.parse().unwrap())
            .collect();
        assert!(matches!(
            generator(true).render(&ranges, &function),
            Err(GenerateError::ArityMismatch {
                function: 3,
                ranges: 2
            })
        ));
    }
}
