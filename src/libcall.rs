//! Functions for linking and calling transcendental functions in JIT-compiled code.
//!
//! This module provides functionality to:
//! - Register the `extern "C"` implementations with a `JITBuilder`
//! - Declare them as imports of a Cranelift module
//! - Generate Cranelift IR instructions to call them
//!
//! The interpreter calls the very same functions, so a value computed by the JIT and
//! by the checked tree walk is bit-identical.

use std::collections::HashMap;

use cranelift::prelude::FunctionBuilder;
use cranelift_codegen::ir::types::F64;
use cranelift_codegen::ir::{AbiParam, InstBuilder, Value};
use cranelift_jit::JITBuilder;
use cranelift_module::{FuncId, Linkage, Module};

use crate::errors::BuilderError;

/// A runtime function that compiled tables may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum LibCall {
    Exp,
    Ln,
    Sin,
    Cos,
    Pow,
}

impl LibCall {
    pub(crate) const ALL: [LibCall; 5] = [
        LibCall::Exp,
        LibCall::Ln,
        LibCall::Sin,
        LibCall::Cos,
        LibCall::Pow,
    ];

    /// Symbol name the function is registered under.
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            LibCall::Exp => "lutgen_exp",
            LibCall::Ln => "lutgen_ln",
            LibCall::Sin => "lutgen_sin",
            LibCall::Cos => "lutgen_cos",
            LibCall::Pow => "lutgen_pow",
        }
    }

    fn arity(self) -> usize {
        match self {
            LibCall::Pow => 2,
            _ => 1,
        }
    }

    fn address(self) -> *const u8 {
        match self {
            LibCall::Exp => lutgen_exp as *const u8,
            LibCall::Ln => lutgen_ln as *const u8,
            LibCall::Sin => lutgen_sin as *const u8,
            LibCall::Cos => lutgen_cos as *const u8,
            LibCall::Pow => lutgen_pow as *const u8,
        }
    }
}

pub(crate) extern "C" fn lutgen_exp(x: f64) -> f64 {
    x.exp()
}

pub(crate) extern "C" fn lutgen_ln(x: f64) -> f64 {
    x.ln()
}

pub(crate) extern "C" fn lutgen_sin(x: f64) -> f64 {
    x.sin()
}

pub(crate) extern "C" fn lutgen_cos(x: f64) -> f64 {
    x.cos()
}

pub(crate) extern "C" fn lutgen_pow(base: f64, exponent: f64) -> f64 {
    base.powf(exponent)
}

/// Makes every runtime function resolvable by the JIT linker.
pub(crate) fn register_symbols(builder: &mut JITBuilder) {
    for call in LibCall::ALL {
        builder.symbol(call.symbol(), call.address());
    }
}

/// Declared imports of one module, so each function is declared at most once.
#[derive(Default)]
pub(crate) struct LinkedCalls {
    ids: HashMap<LibCall, FuncId>,
}

impl LinkedCalls {
    /// Declares `call` in `module` (once) and returns its function id.
    ///
    /// The signature is `(f64) -> f64`, or `(f64, f64) -> f64` for `pow`.
    pub(crate) fn link(
        &mut self,
        module: &mut dyn Module,
        call: LibCall,
    ) -> Result<FuncId, BuilderError> {
        if let Some(id) = self.ids.get(&call) {
            return Ok(*id);
        }

        let mut sig = module.make_signature();
        for _ in 0..call.arity() {
            sig.params.push(AbiParam::new(F64));
        }
        sig.returns.push(AbiParam::new(F64));

        let id = module
            .declare_function(call.symbol(), Linkage::Import, &sig)
            .map_err(|e| BuilderError::DeclarationError(e.to_string()))?;
        self.ids.insert(call, id);
        Ok(id)
    }
}

/// Generates Cranelift IR instructions to call a previously linked function.
///
/// # Arguments
/// * `builder` - The Cranelift function builder being used to construct the function
/// * `module` - The Cranelift module containing the function declaration
/// * `func_id` - The function ID returned by `LinkedCalls::link`
/// * `args` - The Cranelift IR values to pass as arguments
///
/// # Returns
/// The Cranelift IR value containing the result of the call
pub(crate) fn call(
    builder: &mut FunctionBuilder,
    module: &mut dyn Module,
    func_id: FuncId,
    args: &[Value],
) -> Value {
    let func = module.declare_func_in_func(func_id, builder.func);
    let call = builder.ins().call(func, args);
    builder.inst_results(call)[0]
}
