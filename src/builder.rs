//! This module provides functionality for JIT compilation of table functions.
//! It uses Cranelift as the backend compiler to generate native machine code.
//!
//! The compiled function has the signature `fn(inputs: *const f64, fault: *mut u8) -> f64`.
//! It writes a non-zero byte to `fault` if any guarded operation saw a suspicious
//! operand, see [`crate::expr`] for the guard rules.

use std::sync::Arc;

use cranelift::prelude::*;
use cranelift_codegen::{ir::immediates::Offset32, Context};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module};
use isa::TargetIsa;

use crate::{
    errors::BuilderError,
    expr::{CodegenContext, Expr},
    libcall::{self, LinkedCalls},
    types::{JitFunction, JitOutcome, RawTableFn},
};

struct ThreadSafeFunction(*const u8);
unsafe impl Send for ThreadSafeFunction {}
unsafe impl Sync for ThreadSafeFunction {}

impl ThreadSafeFunction {
    fn as_table_fn(&self) -> RawTableFn {
        // SAFETY: the pointer was produced by `compile_and_finalize` for a function
        // compiled with exactly the `RawTableFn` signature.
        unsafe { std::mem::transmute::<*const u8, RawTableFn>(self.0) }
    }
}

/// Builds a JIT-compiled function from an expression tree.
///
/// # Arguments
/// * `expr` - The expression AST to compile
/// * `arity` - Number of inputs the function reads; calls with a shorter slice panic
///
/// # Returns
/// A thread-safe function that takes the input tuple and returns the value with its
/// fault flag. The function is wrapped in an Arc to allow sharing between threads.
///
/// # Errors
/// Returns a `BuilderError` if the host is not supported or compilation fails.
pub fn build_function(expr: &Expr, arity: usize) -> Result<JitFunction, BuilderError> {
    let isa = create_isa()?;
    let (mut module, mut ctx) = create_module_and_context(isa);
    build_function_body(&mut ctx, expr, &mut module)?;
    let code = compile_and_finalize(&mut module, &mut ctx)?;

    // The module is dropped here; Cranelift does not unmap finalized code on drop, so
    // the function pointer stays valid for the lifetime of the process.
    Ok(Arc::new(move |inputs: &[f64]| {
        assert!(
            inputs.len() >= arity,
            "compiled function reads {arity} inputs, got {}",
            inputs.len()
        );
        let mut fault = 0u8;
        let value = (code.as_table_fn())(inputs.as_ptr(), &mut fault);
        JitOutcome {
            value,
            faulted: fault != 0,
        }
    }))
}

/// Creates an Instruction Set Architecture (ISA) target for code generation.
///
/// # Errors
/// Returns a BuilderError if:
/// - The host machine architecture is not supported
/// - Code generation configuration fails
pub(crate) fn create_isa() -> Result<Arc<dyn TargetIsa>, BuilderError> {
    let mut flag_builder = settings::builder();

    let target_triple = target_lexicon::Triple::host();
    let is_x86 = matches!(
        target_triple.architecture,
        target_lexicon::Architecture::X86_64
    );
    let colocated = if is_x86 { "true" } else { "false" };
    for (name, value) in [
        ("opt_level", "speed"),
        ("use_colocated_libcalls", colocated),
        ("is_pic", "false"),
    ] {
        flag_builder
            .set(name, value)
            .map_err(|e| BuilderError::Settings(format!("{name}={value}: {e}")))?;
    }

    let isa_builder = cranelift_native::builder()
        .map_err(|msg| BuilderError::HostMachineNotSupported(msg.to_string()))?;

    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(BuilderError::CodegenError)
}

/// Creates a new JIT module and function context.
///
/// The module has the runtime functions of [`crate::libcall`] registered and the
/// context carries the `(ptr, ptr) -> f64` signature.
pub(crate) fn create_module_and_context(isa: Arc<dyn TargetIsa>) -> (JITModule, Context) {
    let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
    libcall::register_symbols(&mut builder);

    let module = JITModule::new(builder);
    let mut ctx = module.make_context();

    let pointer = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(pointer)); // inputs
    sig.params.push(AbiParam::new(pointer)); // fault flag
    sig.returns.push(AbiParam::new(types::F64));
    ctx.func.signature = sig;

    (module, ctx)
}

/// Builds the function body by generating Cranelift IR from the expression tree.
///
/// This function:
/// 1. Creates a new function builder and entry block
/// 2. Binds the input pointer and fault pointer parameters
/// 3. Generates code from the AST, accumulating the fault flag
/// 4. Stores the flag and returns the value
fn build_function_body(
    ctx: &mut Context,
    ast: &Expr,
    module: &mut dyn Module,
) -> Result<(), BuilderError> {
    let mut builder_ctx = FunctionBuilderContext::new();
    let mut func_builder = FunctionBuilder::new(&mut ctx.func, &mut builder_ctx);

    let entry_block = func_builder.create_block();
    func_builder.append_block_params_for_function_params(entry_block);
    func_builder.switch_to_block(entry_block);
    func_builder.seal_block(entry_block);

    let input_ptr = func_builder.block_params(entry_block)[0];
    let fault_ptr = func_builder.block_params(entry_block)[1];
    let no_fault = func_builder.ins().iconst(types::I8, 0);

    let mut codegen_ctx = CodegenContext {
        input_ptr,
        fault: no_fault,
        calls: LinkedCalls::default(),
    };
    let result = ast.codegen(&mut func_builder, module, &mut codegen_ctx)?;

    func_builder.ins().store(
        MemFlags::trusted(),
        codegen_ctx.fault,
        fault_ptr,
        Offset32::new(0),
    );
    func_builder.ins().return_(&[result]);
    func_builder.finalize();

    Ok(())
}

/// Compiles and finalizes the function, returning its code pointer.
///
/// # Errors
/// Returns a BuilderError if:
/// - Function declaration fails
/// - Function definition fails
/// - Module finalization fails
fn compile_and_finalize(
    module: &mut JITModule,
    ctx: &mut Context,
) -> Result<ThreadSafeFunction, BuilderError> {
    let func_id = module
        .declare_function("lutgen_table_fn", Linkage::Local, &ctx.func.signature)
        .map_err(|msg| BuilderError::DeclarationError(msg.to_string()))?;

    module
        .define_function(func_id, ctx)
        .map_err(|msg| BuilderError::FunctionError(msg.to_string()))?;

    module.clear_context(ctx);
    module
        .finalize_definitions()
        .map_err(BuilderError::ModuleError)?;

    Ok(ThreadSafeFunction(module.get_finalized_function(func_id)))
}
