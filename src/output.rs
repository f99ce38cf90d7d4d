//! Writing rendered pages to disk.
//!
//! File names are derived from the range names:
//!
//! - two ranges `x`, `y`: a single `x2y.md`
//! - three ranges `a`, `b`, `c`: one `a_<value>.md` per value of `a`, the value
//!   rendered with the table number format
//!
//! 3D names sort by their text, not by page order: `a_-1.md` / `a_-2.md` and the
//! pages of a descending outer range come out of a plain or natural file sort in a
//! different order than they were generated.
//!
//! Files are written through a temporary file in the target directory and then
//! persisted, so a reader never sees a half-written table.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::errors::OutputError;
use crate::grid::GridPage;
use crate::render::NumberFormat;

/// What to do when a target file already exists. Applies to every file of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Abort before writing anything if any target exists
    #[default]
    FailIfExists,
    /// Replace existing files
    Overwrite,
}

/// Writes table files into one directory.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
    policy: OverwritePolicy,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>, policy: OverwritePolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> OverwritePolicy {
        self.policy
    }

    /// File name of `page`.
    pub fn file_name(page: &GridPage, format: &NumberFormat) -> String {
        match &page.fixed_axis {
            Some(fixed) => format!("{}_{}.md", fixed.name, format.format(fixed.value)),
            None => format!("{}2{}.md", page.col_axis.name(), page.row_axis.name()),
        }
    }

    pub fn path_for(&self, page: &GridPage, format: &NumberFormat) -> PathBuf {
        self.dir.join(Self::file_name(page, format))
    }

    /// Validates a run's targets before anything is written.
    ///
    /// # Errors
    /// - `OutputError::Write` if the directory does not exist or is not a directory
    /// - `OutputError::NameCollision` if two pages share a file name
    /// - `OutputError::AlreadyExists` if a target exists under `FailIfExists`
    pub fn check_targets(&self, paths: &[PathBuf]) -> Result<(), OutputError> {
        let metadata = fs::metadata(&self.dir).map_err(|source| OutputError::Write {
            path: self.dir.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(OutputError::Write {
                path: self.dir.clone(),
                source: io::Error::other("not a directory"),
            });
        }

        let mut seen = HashSet::new();
        for path in paths {
            if !seen.insert(path) {
                return Err(OutputError::NameCollision { path: path.clone() });
            }
            if self.policy == OverwritePolicy::FailIfExists && path.exists() {
                return Err(OutputError::AlreadyExists { path: path.clone() });
            }
        }
        Ok(())
    }

    /// Atomically writes `contents` to `path`, honouring the overwrite policy.
    pub fn write(&self, path: &Path, contents: &str) -> Result<(), OutputError> {
        let write_error = |source: io::Error| OutputError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut temp = NamedTempFile::new_in(&self.dir).map_err(write_error)?;
        temp.write_all(contents.as_bytes()).map_err(write_error)?;
        temp.flush().map_err(write_error)?;

        match self.policy {
            OverwritePolicy::Overwrite => {
                temp.persist(path).map_err(|e| write_error(e.error))?;
            }
            OverwritePolicy::FailIfExists => {
                temp.persist_noclobber(path).map_err(|e| {
                    if e.error.kind() == io::ErrorKind::AlreadyExists {
                        OutputError::AlreadyExists {
                            path: path.to_path_buf(),
                        }
                    } else {
                        write_error(e.error)
                    }
                })?;
            }
        }
        debug!("wrote {} ({} bytes)", path.display(), contents.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::enumerate_pages;
    use crate::range::RangeSpec;

    fn pages(ranges: &[&str]) -> Vec<GridPage> {
        let ranges: Vec<RangeSpec> = ranges.iter().map(|r| r.parse().unwrap()).collect();
        enumerate_pages(&ranges).unwrap()
    }

    #[test]
    fn test_file_names() {
        let format = NumberFormat::default();
        let flat = pages(&["weight:50:60:10", "height:150:160:10"]);
        assert_eq!(OutputWriter::file_name(&flat[0], &format), "weight2height.md");

        let paged = pages(&["age:0.5:1.5:0.5", "w:1:2:1", "h:1:2:1"]);
        let names: Vec<String> = paged
            .iter()
            .map(|page| OutputWriter::file_name(page, &format))
            .collect();
        assert_eq!(names, vec!["age_0.5.md", "age_1.md", "age_1.5.md"]);
    }

    #[test]
    fn test_write_and_overwrite_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x2y.md");

        let strict = OutputWriter::new(dir.path(), OverwritePolicy::FailIfExists);
        strict.check_targets(&[path.clone()]).unwrap();
        strict.write(&path, "first\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\n");

        assert!(matches!(
            strict.check_targets(&[path.clone()]),
            Err(OutputError::AlreadyExists { .. })
        ));
        assert!(matches!(
            strict.write(&path, "second\n"),
            Err(OutputError::AlreadyExists { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\n");

        let lenient = OutputWriter::new(dir.path(), OverwritePolicy::Overwrite);
        lenient.check_targets(&[path.clone()]).unwrap();
        lenient.write(&path, "second\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");

        // no temporary files are left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let writer = OutputWriter::new(&missing, OverwritePolicy::Overwrite);
        assert!(matches!(
            writer.check_targets(&[]),
            Err(OutputError::Write { .. })
        ));
        assert!(matches!(
            writer.write(&missing.join("a.md"), "text"),
            Err(OutputError::Write { .. })
        ));
    }

    #[test]
    fn test_name_collision() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path(), OverwritePolicy::Overwrite);
        let format = NumberFormat::new(0);
        let paths: Vec<PathBuf> = pages(&["a:0:0.2:0.1", "b:1:1:1", "c:1:1:1"])
            .iter()
            .map(|page| writer.path_for(page, &format))
            .collect();
        assert!(matches!(
            writer.check_targets(&paths),
            Err(OutputError::NameCollision { .. })
        ));
    }
}
