use std::sync::Arc;

/// Result of one call into a JIT-compiled table function.
///
/// `faulted` is set when any guarded operation (division, `ln`, `sqrt`, power)
/// saw an operand for which the checked interpreter could raise an error. The
/// value is only authoritative when `faulted` is false.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitOutcome {
    pub value: f64,
    pub faulted: bool,
}

/// Type alias for a JIT-compiled function that evaluates a single expression.
///
/// This represents a function that:
/// - Takes a slice of input values in positional order
/// - Returns the computed value together with the fault flag
/// - Is both Send and Sync so pages can be evaluated on worker threads
pub type JitFunction = Arc<dyn Fn(&[f64]) -> JitOutcome + Send + Sync>;

/// Raw signature of the compiled code: input pointer, fault flag pointer, result.
pub(crate) type RawTableFn = extern "C" fn(*const f64, *mut u8) -> f64;
