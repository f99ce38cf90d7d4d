//! Range descriptors.
//!
//! A range is written `name:start:stop:step` or `name:start:stop:step:unit` and expands
//! into the inclusive lattice `start, start + step, ...` up to `stop` in the direction
//! of `step`.
//!
//! ```
//! use lutgen::RangeSpec;
//!
//! let range: RangeSpec = "x:10:1:-2".parse().unwrap();
//! assert_eq!(range.values(), &[10.0, 8.0, 6.0, 4.0, 2.0]);
//! ```

use std::fmt;
use std::str::FromStr;

use crate::errors::RangeError;

/// Relative tolerance used when deciding whether `stop` lies on the step lattice.
const LATTICE_EPSILON: f64 = 1e-9;

/// A named, finite sequence of sample points along one input dimension.
///
/// The values are computed once at parse time and never change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSpec {
    name: String,
    unit: Option<String>,
    values: Vec<f64>,
}

impl RangeSpec {
    /// Parses a range descriptor.
    ///
    /// # Errors
    /// - `RangeError::Malformed` if the field count is not 4 or 5, the name is empty or
    ///   contains a path separator, or a numeric field is not a finite number
    /// - `RangeError::InvalidStep` if the step is zero
    ///
    /// A range whose step points away from `stop` is not an error: it has no values.
    pub fn parse(spec: &str) -> Result<Self, RangeError> {
        let malformed = |reason: &str| RangeError::Malformed {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = spec.trim().split(':').collect();
        if fields.len() != 4 && fields.len() != 5 {
            return Err(malformed(&format!(
                "expected name:start:stop:step[:unit], got {} field(s)",
                fields.len()
            )));
        }

        let name = fields[0].trim();
        if name.is_empty() {
            return Err(malformed("range name is empty"));
        }
        if name.contains(['/', '\\']) {
            return Err(malformed("range name must not contain path separators"));
        }

        let number = |label: &str, field: &str| -> Result<f64, RangeError> {
            match field.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(value),
                _ => Err(malformed(&format!("{label} '{field}' is not a number"))),
            }
        };
        let start = number("start", fields[1])?;
        let stop = number("stop", fields[2])?;
        let step = number("step", fields[3])?;

        if step == 0.0 {
            return Err(RangeError::InvalidStep {
                spec: spec.to_string(),
            });
        }

        let unit = fields
            .get(4)
            .map(|unit| unit.trim())
            .filter(|unit| !unit.is_empty())
            .map(str::to_string);

        Ok(Self {
            name: name.to_string(),
            unit,
            values: lattice(start, stop, step),
        })
    }

    /// Builds a range directly from precomputed values.
    pub fn from_values(name: impl Into<String>, unit: Option<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            unit,
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The name followed by the unit in parentheses, if there is one.
    pub fn label(&self) -> String {
        match &self.unit {
            Some(unit) => format!("{} ({unit})", self.name),
            None => self.name.clone(),
        }
    }
}

impl FromStr for RangeSpec {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} values]", self.label(), self.values.len())
    }
}

/// Enumerates `start + i * step` while the point has not passed `stop`.
///
/// Points are computed by multiplication rather than accumulation so rounding error
/// does not build up along long ranges. A final point within the tolerance of `stop`
/// is snapped onto `stop`.
fn lattice(start: f64, stop: f64, step: f64) -> Vec<f64> {
    let tolerance = LATTICE_EPSILON * step.abs().max(1.0);
    let within = |value: f64| {
        if step > 0.0 {
            value <= stop + tolerance
        } else {
            value >= stop - tolerance
        }
    };

    let mut values = Vec::new();
    let mut index = 0u64;
    loop {
        let value = start + index as f64 * step;
        if !within(value) {
            break;
        }
        values.push(if (value - stop).abs() <= tolerance {
            stop
        } else {
            value
        });
        index += 1;
    }
    values
}
