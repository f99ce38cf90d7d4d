//! Conversion module for transforming evalexpr AST nodes into our internal expression representation.
//!
//! Parsing is delegated to evalexpr; this module decides what of evalexpr's language a
//! table function may use. Only arithmetic, positional inputs, numeric constants and
//! a small set of pure functions survive the conversion, so nothing an evaluated
//! expression does can touch the environment.
//!
//! The main entry point is the `build_ast` function which recursively traverses the
//! evalexpr AST and builds up our expression tree.

use std::collections::HashMap;

use evalexpr::{Node, Operator};

use crate::{errors::ConvertError, expr::Expr};

/// Converts an evalexpr AST node into our internal expression representation.
///
/// # Arguments
/// * `node` - The evalexpr AST node to convert
/// * `var_map` - A mapping of input names to their positions in the input tuple
///
/// # Returns
/// * `Result<Expr, ConvertError>` - The converted expression or an error if conversion fails
///
/// # Supported operations
/// * Arithmetic: `+`, `-`, `*`, `/`, unary `-`, `^`
/// * Inputs named in `var_map` and the constant `pi`
/// * Numeric constants
/// * Functions: `abs`, `sqrt`, `exp`, `ln`/`log`, `sin`, `cos`, `round`, `floor`, `ceil`,
///   `min`, `max`, `pow`
pub fn build_ast(node: &Node, var_map: &HashMap<String, u32>) -> Result<Expr, ConvertError> {
    match node.operator() {
        // Addition operator - combines multiple children into a series of binary Add expressions
        Operator::Add => fold_children(node, var_map, |acc, child| {
            Expr::Add(Box::new(acc), Box::new(child))
        }),
        // Multiplication operator - combines multiple children into a series of binary Mul expressions
        Operator::Mul => fold_children(node, var_map, |acc, child| {
            Expr::Mul(Box::new(acc), Box::new(child))
        }),
        Operator::Div => {
            let (left, right) = binary(node, var_map)?;
            Ok(Expr::Div(Box::new(left), Box::new(right)))
        }
        Operator::Sub => {
            let (left, right) = binary(node, var_map)?;
            Ok(Expr::Sub(Box::new(left), Box::new(right)))
        }
        Operator::Neg => {
            let children = node.children();
            match children {
                [operand] => Ok(Expr::Neg(Box::new(build_ast(operand, var_map)?))),
                _ => Err(ConvertError::UnsupportedOperator(format!(
                    "negation with {} operands",
                    children.len()
                ))),
            }
        }
        // Exponentiation - constant exponents are specialised, anything else is PowExpr
        Operator::Exp => {
            let children = node.children();
            if children.len() != 2 {
                return Err(ConvertError::UnsupportedOperator(format!(
                    "exponentiation with {} operands",
                    children.len()
                )));
            }
            let base = Box::new(build_ast(&children[0], var_map)?);
            Ok(match children[1].operator() {
                Operator::Const {
                    value: evalexpr::Value::Int(exp),
                } => Expr::Pow(base, *exp),
                Operator::Const {
                    value: evalexpr::Value::Float(exp),
                } if exp.fract() == 0.0 && exp.abs() < i64::MAX as f64 => {
                    Expr::Pow(base, *exp as i64)
                }
                Operator::Const {
                    value: evalexpr::Value::Float(exp),
                } => Expr::PowFloat(base, *exp),
                _ => Expr::PowExpr(base, Box::new(build_ast(&children[1], var_map)?)),
            })
        }
        // Constant value - integers are widened to floats
        Operator::Const { value } => match value {
            evalexpr::Value::Float(f) => Ok(Expr::Const(*f)),
            evalexpr::Value::Int(i) => Ok(Expr::Const(*i as f64)),
            _ => Err(ConvertError::ConstOperator(format!("{value:?}"))),
        },
        // Variable reference - looks up the input's position in var_map
        Operator::VariableIdentifierRead { identifier } => {
            if let Some(index) = var_map.get(identifier.as_str()) {
                Ok(Expr::var(identifier.as_str(), *index))
            } else if identifier == "pi" {
                Ok(Expr::Const(std::f64::consts::PI))
            } else {
                Err(ConvertError::VariableNotFound(identifier.to_string()))
            }
        }
        Operator::FunctionIdentifier { identifier } => build_call(identifier, node, var_map),
        // Root node (also produced by parentheses) - should have exactly one child
        Operator::RootNode => {
            let children = node.children();
            if children.len() == 1 {
                build_ast(&children[0], var_map)
            } else {
                Err(ConvertError::RootNode(children.len()))
            }
        }
        // Any other operator is unsupported
        other => Err(ConvertError::UnsupportedOperator(format!("{other:?}"))),
    }
}

fn fold_children<F>(
    node: &Node,
    var_map: &HashMap<String, u32>,
    combine: F,
) -> Result<Expr, ConvertError>
where
    F: Fn(Expr, Expr) -> Expr,
{
    let children = node.children();
    let [first, rest @ ..] = children else {
        return Err(ConvertError::UnsupportedOperator(format!(
            "{:?} without operands",
            node.operator()
        )));
    };
    // a dangling operator (`a +`) leaves a single operand
    if rest.is_empty() {
        return Err(ConvertError::UnsupportedOperator(format!(
            "{:?} with 1 operand",
            node.operator()
        )));
    }
    rest.iter().try_fold(build_ast(first, var_map)?, |acc, child| {
        Ok(combine(acc, build_ast(child, var_map)?))
    })
}

fn binary(node: &Node, var_map: &HashMap<String, u32>) -> Result<(Expr, Expr), ConvertError> {
    match node.children() {
        [left, right] => Ok((build_ast(left, var_map)?, build_ast(right, var_map)?)),
        children => Err(ConvertError::UnsupportedOperator(format!(
            "{:?} with {} operands",
            node.operator(),
            children.len()
        ))),
    }
}

/// Collects the arguments of a function call.
///
/// evalexpr wraps call arguments in parentheses (a root node) and several arguments in a
/// tuple; both layers are peeled off here.
fn call_arguments(node: &Node) -> Vec<&Node> {
    let mut current = match node.children() {
        [only] => only,
        children => return children.iter().collect(),
    };
    while matches!(current.operator(), Operator::RootNode) && current.children().len() == 1 {
        current = &current.children()[0];
    }
    match current.operator() {
        Operator::Tuple => current.children().iter().collect(),
        _ => vec![current],
    }
}

fn build_call(
    identifier: &str,
    node: &Node,
    var_map: &HashMap<String, u32>,
) -> Result<Expr, ConvertError> {
    let args = call_arguments(node);
    let arity_error = |expected: &str| ConvertError::FunctionArity {
        name: identifier.to_string(),
        expected: expected.to_string(),
        got: args.len(),
    };

    let unary = |build: fn(Box<Expr>) -> Expr| -> Result<Expr, ConvertError> {
        match args.as_slice() {
            [arg] => Ok(build(Box::new(build_ast(arg, var_map)?))),
            _ => Err(arity_error("1")),
        }
    };

    match identifier {
        "abs" => unary(Expr::Abs),
        "sqrt" => unary(Expr::Sqrt),
        "exp" => unary(Expr::Exp),
        "ln" | "log" => unary(Expr::Ln),
        "sin" => unary(Expr::Sin),
        "cos" => unary(Expr::Cos),
        "round" => unary(Expr::Round),
        "floor" => unary(Expr::Floor),
        "ceil" => unary(Expr::Ceil),
        "pow" => match args.as_slice() {
            [base, exponent] => Ok(Expr::PowExpr(
                Box::new(build_ast(base, var_map)?),
                Box::new(build_ast(exponent, var_map)?),
            )),
            _ => Err(arity_error("2")),
        },
        "min" | "max" => {
            let Some((first, rest)) = args.split_first() else {
                return Err(arity_error("at least 1"));
            };
            rest.iter().try_fold(build_ast(first, var_map)?, |acc, arg| {
                let arg = Box::new(build_ast(arg, var_map)?);
                Ok(if identifier == "min" {
                    Expr::Min(Box::new(acc), arg)
                } else {
                    Expr::Max(Box::new(acc), arg)
                })
            })
        }
        _ => Err(ConvertError::UnsupportedFunction(identifier.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalexpr::{build_operator_tree, DefaultNumericTypes};

    fn positional(arity: u32) -> HashMap<String, u32> {
        (0..arity).map(|i| (format!("arg_{i}"), i)).collect()
    }

    fn convert(text: &str) -> Result<Expr, ConvertError> {
        let node = build_operator_tree::<DefaultNumericTypes>(text).unwrap();
        build_ast(&node, &positional(3))
    }

    #[test]
    fn test_arithmetic() {
        let expr = convert("arg_0 * 2.5 + arg_1 - arg_2 * 0.3").unwrap();
        assert_eq!(
            expr.eval(&[1.0, 2.0, 3.0]).unwrap(),
            1.0 * 2.5 + 2.0 - 3.0 * 0.3
        );
    }

    #[test]
    fn test_integer_literals_are_floats() {
        // 7 / 2 must not be integer division
        assert_eq!(convert("7 / 2").unwrap().eval(&[]).unwrap(), 3.5);
    }

    #[test]
    fn test_exponents() {
        assert!(matches!(convert("arg_0 ^ 2").unwrap(), Expr::Pow(_, 2)));
        assert!(matches!(convert("arg_0 ^ 2.0").unwrap(), Expr::Pow(_, 2)));
        assert!(matches!(convert("arg_0 ^ 0.5").unwrap(), Expr::PowFloat(_, _)));
        assert!(matches!(convert("arg_0 ^ arg_1").unwrap(), Expr::PowExpr(_, _)));
    }

    #[test]
    fn test_functions() {
        let expr = convert("max(arg_0, arg_1, 10) + min(abs(arg_2), 1)").unwrap();
        assert_eq!(expr.eval(&[3.0, 4.0, -0.5]).unwrap(), 10.5);
        let expr = convert("round(sqrt(arg_0)) + pow(arg_1, 2) + ln(1)").unwrap();
        assert_eq!(expr.eval(&[10.0, 3.0, 0.0]).unwrap(), 3.0 + 9.0);
    }

    #[test]
    fn test_pi_constant() {
        assert_eq!(
            convert("2 * pi").unwrap().eval(&[]).unwrap(),
            2.0 * std::f64::consts::PI
        );
    }

    #[test]
    fn test_unknown_identifier_is_rejected() {
        assert!(matches!(
            convert("arg_0 + secret"),
            Err(ConvertError::VariableNotFound(name)) if name == "secret"
        ));
        // positions beyond the arity are unknown as well
        assert!(matches!(
            convert("arg_3"),
            Err(ConvertError::VariableNotFound(_))
        ));
    }

    #[test]
    fn test_dangling_operators_are_rejected() {
        for text in ["arg_0 +", "arg_0 *", "(arg_0 +)", "arg_0 * arg_1 -"] {
            // evalexpr may reject some of these itself
            if let Ok(node) = build_operator_tree::<DefaultNumericTypes>(text) {
                assert!(
                    matches!(
                        build_ast(&node, &positional(3)),
                        Err(ConvertError::UnsupportedOperator(_))
                    ),
                    "{text}"
                );
            }
        }
    }

    #[test]
    fn test_unsupported_constructs() {
        assert!(matches!(
            convert("str::len(\"abc\")"),
            Err(ConvertError::UnsupportedFunction(_))
        ));
        assert!(matches!(
            convert("arg_0 > 1"),
            Err(ConvertError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            convert("\"text\""),
            Err(ConvertError::ConstOperator(_))
        ));
        assert!(matches!(
            convert("sqrt(arg_0, arg_1)"),
            Err(ConvertError::FunctionArity { .. })
        ));
    }
}
