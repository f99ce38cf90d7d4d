//! Expression module for representing table functions.
//!
//! This module defines the expression tree every resolved function is lowered into,
//! regardless of whether it came from a native closure or a foreign source file:
//!
//! - `Expr`: an enum representing the supported arithmetic operations
//! - `VarRef`: a positional reference into the input tuple
//!
//! The tree can be:
//! - Evaluated with full error checking (`eval`)
//! - Simplified by folding constant subtrees that cannot fail
//! - JIT compiled into machine code using Cranelift (`codegen`)
//!
//! # Evaluation semantics
//! Division by zero, `ln` of a non-positive number, `sqrt` of a negative number, a
//! negative base raised to a non-integer power and zero raised to a negative power
//! are errors. Every other operation follows IEEE-754, so overflow yields an
//! infinity and `inf - inf` yields NaN.
//!
//! The compiled code cannot raise errors. Instead each partial operation ORs a
//! conservative guard into a fault flag; when the flag is set the caller re-runs the
//! checked evaluation. Both paths perform the same floating point operations in the
//! same order, so their values agree bit for bit.

use cranelift::prelude::*;
use cranelift_codegen::ir::immediates::Offset32;
use cranelift_module::Module;

use crate::errors::{BuilderError, EvalError};
use crate::libcall::{self, LibCall, LinkedCalls};

/// Represents a positional reference into the input tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub name: String,
    pub index: u32,
}

/// An expression tree node representing a supported operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant floating point value
    Const(f64),
    /// A reference to one of the inputs
    Var(VarRef),
    /// Addition of two expressions
    Add(Box<Expr>, Box<Expr>),
    /// Subtraction of two expressions
    Sub(Box<Expr>, Box<Expr>),
    /// Multiplication of two expressions
    Mul(Box<Expr>, Box<Expr>),
    /// Division of two expressions
    Div(Box<Expr>, Box<Expr>),
    /// Negation of an expression
    Neg(Box<Expr>),
    /// Absolute value of an expression
    Abs(Box<Expr>),
    /// Exponentiation of an expression by an integer constant
    Pow(Box<Expr>, i64),
    /// Exponentiation of an expression by a non-integer constant
    PowFloat(Box<Expr>, f64),
    /// Exponentiation of an expression by another expression
    PowExpr(Box<Expr>, Box<Expr>),
    /// Exponential function of an expression
    Exp(Box<Expr>),
    /// Natural logarithm of an expression
    Ln(Box<Expr>),
    /// Square root of an expression
    Sqrt(Box<Expr>),
    /// Sine of an expression (argument in radians)
    Sin(Box<Expr>),
    /// Cosine of an expression (argument in radians)
    Cos(Box<Expr>),
    /// Rounding to the nearest integer, ties to even
    Round(Box<Expr>),
    /// Largest integer not greater than the expression
    Floor(Box<Expr>),
    /// Smallest integer not less than the expression
    Ceil(Box<Expr>),
    /// Minimum of two expressions (NaN if either is NaN)
    Min(Box<Expr>, Box<Expr>),
    /// Maximum of two expressions (NaN if either is NaN)
    Max(Box<Expr>, Box<Expr>),
}

/// State threaded through code generation.
pub(crate) struct CodegenContext {
    /// Pointer to the first input value
    pub input_ptr: Value,
    /// Accumulated fault flag (I8, non-zero once any guard fired)
    pub fault: Value,
    pub calls: LinkedCalls,
}

impl CodegenContext {
    fn raise_if(&mut self, builder: &mut FunctionBuilder, condition: Value) {
        self.fault = builder.ins().bor(self.fault, condition);
    }
}

impl Expr {
    /// Creates a reference to input `index`.
    pub fn var(name: impl Into<String>, index: u32) -> Expr {
        Expr::Var(VarRef {
            name: name.into(),
            index,
        })
    }

    /// Evaluates the expression with full error checking.
    ///
    /// # Arguments
    /// * `inputs` - Input values in positional order
    ///
    /// # Errors
    /// Returns `EvalError` for division by zero, domain errors and for a variable whose
    /// index lies outside `inputs`.
    pub fn eval(&self, inputs: &[f64]) -> Result<f64, EvalError> {
        Ok(match self {
            Expr::Const(value) => *value,
            Expr::Var(var_ref) => {
                *inputs
                    .get(var_ref.index as usize)
                    .ok_or(EvalError::InvalidInputLength {
                        expected: var_ref.index as usize + 1,
                        got: inputs.len(),
                    })?
            }
            Expr::Add(left, right) => left.eval(inputs)? + right.eval(inputs)?,
            Expr::Sub(left, right) => left.eval(inputs)? - right.eval(inputs)?,
            Expr::Mul(left, right) => left.eval(inputs)? * right.eval(inputs)?,
            Expr::Div(left, right) => {
                let numerator = left.eval(inputs)?;
                let denominator = right.eval(inputs)?;
                if denominator == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                numerator / denominator
            }
            Expr::Neg(expr) => -expr.eval(inputs)?,
            Expr::Abs(expr) => expr.eval(inputs)?.abs(),
            Expr::Pow(base, exp) => {
                let base = base.eval(inputs)?;
                if *exp < 0 && base == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                powi_by_squaring(base, *exp)
            }
            Expr::PowFloat(base, exp) => checked_powf(base.eval(inputs)?, *exp)?,
            Expr::PowExpr(base, exponent) => {
                let base = base.eval(inputs)?;
                checked_powf(base, exponent.eval(inputs)?)?
            }
            Expr::Exp(expr) => libcall::lutgen_exp(expr.eval(inputs)?),
            Expr::Ln(expr) => {
                let value = expr.eval(inputs)?;
                if value <= 0.0 {
                    return Err(EvalError::Domain {
                        function: "ln",
                        argument: value,
                    });
                }
                libcall::lutgen_ln(value)
            }
            Expr::Sqrt(expr) => {
                let value = expr.eval(inputs)?;
                if value < 0.0 {
                    return Err(EvalError::Domain {
                        function: "sqrt",
                        argument: value,
                    });
                }
                value.sqrt()
            }
            Expr::Sin(expr) => libcall::lutgen_sin(expr.eval(inputs)?),
            Expr::Cos(expr) => libcall::lutgen_cos(expr.eval(inputs)?),
            Expr::Round(expr) => expr.eval(inputs)?.round_ties_even(),
            Expr::Floor(expr) => expr.eval(inputs)?.floor(),
            Expr::Ceil(expr) => expr.eval(inputs)?.ceil(),
            Expr::Min(left, right) => nan_min(left.eval(inputs)?, right.eval(inputs)?),
            Expr::Max(left, right) => nan_max(left.eval(inputs)?, right.eval(inputs)?),
        })
    }

    /// Direct children of this node, left to right.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Const(_) | Expr::Var(_) => Vec::new(),
            Expr::Add(l, r)
            | Expr::Sub(l, r)
            | Expr::Mul(l, r)
            | Expr::Div(l, r)
            | Expr::PowExpr(l, r)
            | Expr::Min(l, r)
            | Expr::Max(l, r) => vec![&**l, &**r],
            Expr::Neg(e)
            | Expr::Abs(e)
            | Expr::Pow(e, _)
            | Expr::PowFloat(e, _)
            | Expr::Exp(e)
            | Expr::Ln(e)
            | Expr::Sqrt(e)
            | Expr::Sin(e)
            | Expr::Cos(e)
            | Expr::Round(e)
            | Expr::Floor(e)
            | Expr::Ceil(e) => vec![&**e],
        }
    }

    /// Rebuilds this node with every child replaced by `f(child)`.
    fn map_children<F>(&self, mut f: F) -> Expr
    where
        F: FnMut(&Expr) -> Expr,
    {
        let mut m = |e: &Box<Expr>| Box::new(f(&**e));
        match self {
            Expr::Const(_) | Expr::Var(_) => self.clone(),
            Expr::Add(l, r) => Expr::Add(m(l), m(r)),
            Expr::Sub(l, r) => Expr::Sub(m(l), m(r)),
            Expr::Mul(l, r) => Expr::Mul(m(l), m(r)),
            Expr::Div(l, r) => Expr::Div(m(l), m(r)),
            Expr::PowExpr(l, r) => Expr::PowExpr(m(l), m(r)),
            Expr::Min(l, r) => Expr::Min(m(l), m(r)),
            Expr::Max(l, r) => Expr::Max(m(l), m(r)),
            Expr::Neg(e) => Expr::Neg(m(e)),
            Expr::Abs(e) => Expr::Abs(m(e)),
            Expr::Pow(e, n) => Expr::Pow(m(e), *n),
            Expr::PowFloat(e, c) => Expr::PowFloat(m(e), *c),
            Expr::Exp(e) => Expr::Exp(m(e)),
            Expr::Ln(e) => Expr::Ln(m(e)),
            Expr::Sqrt(e) => Expr::Sqrt(m(e)),
            Expr::Sin(e) => Expr::Sin(m(e)),
            Expr::Cos(e) => Expr::Cos(m(e)),
            Expr::Round(e) => Expr::Round(m(e)),
            Expr::Floor(e) => Expr::Floor(m(e)),
            Expr::Ceil(e) => Expr::Ceil(m(e)),
        }
    }

    /// Simplifies the expression without changing its observable behaviour.
    ///
    /// # Constant Folding
    /// A node whose children are all constants is replaced by its value, but only if
    /// the checked evaluation succeeds with a finite result. `1 / 0` therefore stays in
    /// the tree and still fails at evaluation time.
    ///
    /// # Identity Rules
    /// - `x + 0`, `0 + x`, `x - 0` → `x`
    /// - `x * 1`, `1 * x`, `x / 1` → `x`
    /// - `x^1` → `x`, `v^0` → `1` for a plain input `v`
    /// - `-(-x)` → `x`, `||x||` → `|x|`, `|-x|` → `|x|`
    ///
    /// Rules such as `x * 0 → 0` or `x / x → 1` are deliberately absent: they are
    /// wrong for NaN inputs or at `x = 0`.
    pub fn simplify(&self) -> Box<Expr> {
        let node = self.map_children(|child| *child.simplify());

        let foldable = !matches!(node, Expr::Const(_) | Expr::Var(_))
            && node
                .children()
                .iter()
                .all(|child| matches!(child, Expr::Const(_)));
        if foldable {
            if let Ok(value) = node.eval(&[]) {
                if value.is_finite() {
                    return Box::new(Expr::Const(value));
                }
            }
        }

        Box::new(match node {
            Expr::Add(x, c) | Expr::Add(c, x) if *c == Expr::Const(0.0) => *x,
            Expr::Sub(x, c) if *c == Expr::Const(0.0) => *x,
            Expr::Mul(x, c) | Expr::Mul(c, x) if *c == Expr::Const(1.0) => *x,
            Expr::Div(x, c) if *c == Expr::Const(1.0) => *x,
            Expr::Pow(x, 1) => *x,
            Expr::Pow(x, 0) if matches!(*x, Expr::Var(_)) => Expr::Const(1.0),
            Expr::Neg(inner) => match *inner {
                Expr::Neg(x) => *x,
                other => Expr::Neg(Box::new(other)),
            },
            Expr::Abs(inner) => match *inner {
                Expr::Abs(x) | Expr::Neg(x) => Expr::Abs(x),
                other => Expr::Abs(Box::new(other)),
            },
            other => other,
        })
    }

    /// Generates Cranelift IR computing this expression.
    ///
    /// Guards for partial operations are OR-ed into `ctx.fault`. A guard may fire for
    /// operands that turn out to be fine (for example `0 ^ y` with `y > 0`); the checked
    /// evaluation then produces the value instead.
    pub(crate) fn codegen(
        &self,
        builder: &mut FunctionBuilder,
        module: &mut dyn Module,
        ctx: &mut CodegenContext,
    ) -> Result<Value, BuilderError> {
        Ok(match self {
            Expr::Const(value) => builder.ins().f64const(*value),
            Expr::Var(var_ref) => {
                let offset = Offset32::new(var_ref.index as i32 * 8);
                builder.ins().load(
                    types::F64,
                    MemFlags::trusted().with_readonly(),
                    ctx.input_ptr,
                    offset,
                )
            }
            Expr::Add(left, right) => {
                let l = left.codegen(builder, module, ctx)?;
                let r = right.codegen(builder, module, ctx)?;
                builder.ins().fadd(l, r)
            }
            Expr::Sub(left, right) => {
                let l = left.codegen(builder, module, ctx)?;
                let r = right.codegen(builder, module, ctx)?;
                builder.ins().fsub(l, r)
            }
            Expr::Mul(left, right) => {
                let l = left.codegen(builder, module, ctx)?;
                let r = right.codegen(builder, module, ctx)?;
                builder.ins().fmul(l, r)
            }
            Expr::Div(left, right) => {
                let l = left.codegen(builder, module, ctx)?;
                let r = right.codegen(builder, module, ctx)?;
                let zero = builder.ins().f64const(0.0);
                let is_zero = builder.ins().fcmp(FloatCC::Equal, r, zero);
                ctx.raise_if(builder, is_zero);
                builder.ins().fdiv(l, r)
            }
            Expr::Neg(expr) => {
                let v = expr.codegen(builder, module, ctx)?;
                builder.ins().fneg(v)
            }
            Expr::Abs(expr) => {
                let v = expr.codegen(builder, module, ctx)?;
                builder.ins().fabs(v)
            }
            Expr::Pow(base, exp) => {
                let b = base.codegen(builder, module, ctx)?;
                if *exp < 0 {
                    let zero = builder.ins().f64const(0.0);
                    let is_zero = builder.ins().fcmp(FloatCC::Equal, b, zero);
                    ctx.raise_if(builder, is_zero);
                }
                generate_power(builder, b, *exp)
            }
            Expr::PowFloat(base, exp) => {
                let b = base.codegen(builder, module, ctx)?;
                let zero = builder.ins().f64const(0.0);
                // a negative exponent also fails on a zero base
                let cc = if *exp < 0.0 {
                    FloatCC::LessThanOrEqual
                } else {
                    FloatCC::LessThan
                };
                let out_of_domain = builder.ins().fcmp(cc, b, zero);
                ctx.raise_if(builder, out_of_domain);
                let e = builder.ins().f64const(*exp);
                let id = ctx.calls.link(module, LibCall::Pow)?;
                libcall::call(builder, module, id, &[b, e])
            }
            Expr::PowExpr(base, exponent) => {
                let b = base.codegen(builder, module, ctx)?;
                let e = exponent.codegen(builder, module, ctx)?;
                let zero = builder.ins().f64const(0.0);
                let not_positive = builder.ins().fcmp(FloatCC::LessThanOrEqual, b, zero);
                ctx.raise_if(builder, not_positive);
                let id = ctx.calls.link(module, LibCall::Pow)?;
                libcall::call(builder, module, id, &[b, e])
            }
            Expr::Exp(expr) => {
                let v = expr.codegen(builder, module, ctx)?;
                let id = ctx.calls.link(module, LibCall::Exp)?;
                libcall::call(builder, module, id, &[v])
            }
            Expr::Ln(expr) => {
                let v = expr.codegen(builder, module, ctx)?;
                let zero = builder.ins().f64const(0.0);
                let not_positive = builder.ins().fcmp(FloatCC::LessThanOrEqual, v, zero);
                ctx.raise_if(builder, not_positive);
                let id = ctx.calls.link(module, LibCall::Ln)?;
                libcall::call(builder, module, id, &[v])
            }
            Expr::Sqrt(expr) => {
                let v = expr.codegen(builder, module, ctx)?;
                let zero = builder.ins().f64const(0.0);
                let negative = builder.ins().fcmp(FloatCC::LessThan, v, zero);
                ctx.raise_if(builder, negative);
                builder.ins().sqrt(v)
            }
            Expr::Sin(expr) => {
                let v = expr.codegen(builder, module, ctx)?;
                let id = ctx.calls.link(module, LibCall::Sin)?;
                libcall::call(builder, module, id, &[v])
            }
            Expr::Cos(expr) => {
                let v = expr.codegen(builder, module, ctx)?;
                let id = ctx.calls.link(module, LibCall::Cos)?;
                libcall::call(builder, module, id, &[v])
            }
            Expr::Round(expr) => {
                let v = expr.codegen(builder, module, ctx)?;
                builder.ins().nearest(v)
            }
            Expr::Floor(expr) => {
                let v = expr.codegen(builder, module, ctx)?;
                builder.ins().floor(v)
            }
            Expr::Ceil(expr) => {
                let v = expr.codegen(builder, module, ctx)?;
                builder.ins().ceil(v)
            }
            Expr::Min(left, right) => {
                let l = left.codegen(builder, module, ctx)?;
                let r = right.codegen(builder, module, ctx)?;
                builder.ins().fmin(l, r)
            }
            Expr::Max(left, right) => {
                let l = left.codegen(builder, module, ctx)?;
                let r = right.codegen(builder, module, ctx)?;
                builder.ins().fmax(l, r)
            }
        })
    }
}

/// Integer power by binary exponentiation.
///
/// `generate_power` emits exactly this multiplication sequence, which keeps
/// interpreted and compiled results identical.
pub(crate) fn powi_by_squaring(base: f64, exp: i64) -> f64 {
    let mut result = 1.0;
    let mut current = base;
    let mut remaining = exp.unsigned_abs();
    while remaining > 0 {
        if remaining & 1 == 1 {
            result *= current;
        }
        if remaining > 1 {
            current *= current;
        }
        remaining >>= 1;
    }
    if exp < 0 {
        1.0 / result
    } else {
        result
    }
}

fn checked_powf(base: f64, exponent: f64) -> Result<f64, EvalError> {
    if exponent < 0.0 && base == 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    if base < 0.0 && exponent.fract() != 0.0 {
        return Err(EvalError::Domain {
            function: "pow",
            argument: base,
        });
    }
    Ok(libcall::lutgen_pow(base, exponent))
}

/// `fmin` as Cranelift defines it: NaN if either side is NaN, `-0 < +0`.
fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_negative() {
            a
        } else {
            b
        }
    } else {
        a.min(b)
    }
}

/// `fmax` as Cranelift defines it: NaN if either side is NaN, `+0 > -0`.
fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_negative() {
            b
        } else {
            a
        }
    } else {
        a.max(b)
    }
}

/// Emits binary exponentiation, mirroring `powi_by_squaring`.
fn generate_power(builder: &mut FunctionBuilder, base: Value, exp: i64) -> Value {
    let mut result = builder.ins().f64const(1.0);
    let mut current = base;
    let mut remaining = exp.unsigned_abs();

    while remaining > 0 {
        if remaining & 1 == 1 {
            result = builder.ins().fmul(result, current);
        }
        if remaining > 1 {
            current = builder.ins().fmul(current, current);
        }
        remaining >>= 1;
    }

    if exp < 0 {
        let one = builder.ins().f64const(1.0);
        builder.ins().fdiv(one, result)
    } else {
        result
    }
}

/// Implements string formatting for expressions.
///
/// Binary operations are wrapped in parentheses, functions use call notation,
/// absolute value uses `|x|` and exponents use `^`.
impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Const(val) => write!(f, "{val}"),
            Expr::Var(var_ref) => write!(f, "{}", var_ref.name),
            Expr::Add(left, right) => write!(f, "({left} + {right})"),
            Expr::Sub(left, right) => write!(f, "({left} - {right})"),
            Expr::Mul(left, right) => write!(f, "({left} * {right})"),
            Expr::Div(left, right) => write!(f, "({left} / {right})"),
            Expr::Neg(expr) => write!(f, "-({expr})"),
            Expr::Abs(expr) => write!(f, "|{expr}|"),
            Expr::Pow(base, exp) => write!(f, "({base}^{exp})"),
            Expr::PowFloat(base, exp) => write!(f, "({base}^{exp})"),
            Expr::PowExpr(base, exponent) => write!(f, "({base}^{exponent})"),
            Expr::Exp(expr) => write!(f, "exp({expr})"),
            Expr::Ln(expr) => write!(f, "ln({expr})"),
            Expr::Sqrt(expr) => write!(f, "sqrt({expr})"),
            Expr::Sin(expr) => write!(f, "sin({expr})"),
            Expr::Cos(expr) => write!(f, "cos({expr})"),
            Expr::Round(expr) => write!(f, "round({expr})"),
            Expr::Floor(expr) => write!(f, "floor({expr})"),
            Expr::Ceil(expr) => write!(f, "ceil({expr})"),
            Expr::Min(left, right) => write!(f, "min({left}, {right})"),
            Expr::Max(left, right) => write!(f, "max({left}, {right})"),
        }
    }
}
