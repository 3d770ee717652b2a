use serde_json::{Map, Value};

use super::parser::{BinOp, Expr, UnaryOp};
use super::ExprError;
use crate::functions;
use crate::value::{json_cmp, json_eq, type_name};

pub(crate) fn eval(expr: &Expr, env: &Map<String, Value>) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Ident(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::UnknownName(name.clone())),
        Expr::Field(base, field) => {
            let base = eval(base, env)?;
            match base {
                Value::Object(map) => Ok(map.get(field).cloned().unwrap_or(Value::Null)),
                other => Err(ExprError::BadFieldAccess {
                    field: field.clone(),
                    type_name: type_name(&other),
                }),
            }
        }
        Expr::Call(name, args) => {
            let f = functions::lookup(name)
                .ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
            let mut vals = Vec::with_capacity(args.len());
            for a in args {
                vals.push(eval(a, env)?);
            }
            f(&vals).map_err(ExprError::Function)
        }
        Expr::Unary(op, inner) => {
            let v = eval(inner, env)?;
            match op {
                UnaryOp::Not => match v {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(ExprError::BadOperand {
                        op: "not",
                        expected: "boolean",
                        actual: type_name(&other),
                    }),
                },
                UnaryOp::Neg => match &v {
                    Value::Number(n) => {
                        if let Some(i) = n.as_i64() {
                            Ok(Value::from(-i))
                        } else if let Some(f) = n.as_f64() {
                            Ok(serde_json::Number::from_f64(-f)
                                .map(Value::Number)
                                .unwrap_or(Value::Null))
                        } else {
                            Err(ExprError::BadOperand {
                                op: "-",
                                expected: "number",
                                actual: type_name(&v),
                            })
                        }
                    }
                    _ => Err(ExprError::BadOperand {
                        op: "-",
                        expected: "number",
                        actual: type_name(&v),
                    }),
                },
            }
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, env),
    }
}

fn eval_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    env: &Map<String, Value>,
) -> Result<Value, ExprError> {
    // `and`/`or` short-circuit and require boolean operands.
    if matches!(op, BinOp::And | BinOp::Or) {
        let l = require_bool(op, eval(lhs, env)?)?;
        return match (op, l) {
            (BinOp::And, false) => Ok(Value::Bool(false)),
            (BinOp::Or, true) => Ok(Value::Bool(true)),
            _ => Ok(Value::Bool(require_bool(op, eval(rhs, env)?)?)),
        };
    }

    let l = eval(lhs, env)?;
    let r = eval(rhs, env)?;

    match op {
        BinOp::Eq => Ok(Value::Bool(json_eq(&l, &r))),
        BinOp::Ne => Ok(Value::Bool(!json_eq(&l, &r))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ord = json_cmp(&l, &r).ok_or_else(|| ExprError::BadOperands {
                op: op.symbol(),
                lhs: type_name(&l),
                rhs: type_name(&r),
            })?;
            Ok(Value::Bool(match op {
                BinOp::Lt => ord.is_lt(),
                BinOp::Le => ord.is_le(),
                BinOp::Gt => ord.is_gt(),
                BinOp::Ge => ord.is_ge(),
                _ => unreachable!(),
            }))
        }
        BinOp::Add => {
            if let (Value::String(a), Value::String(b)) = (&l, &r) {
                return Ok(Value::String(format!("{a}{b}")));
            }
            arith(op, &l, &r)
        }
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => arith(op, &l, &r),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn require_bool(op: BinOp, v: Value) -> Result<bool, ExprError> {
    match v {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::BadOperand {
            op: op.symbol(),
            expected: "boolean",
            actual: type_name(&other),
        }),
    }
}

/// Integer arithmetic stays integral; anything else goes through f64.
fn arith(op: BinOp, l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (Value::Number(a), Value::Number(b)) = (l, r) else {
        return Err(ExprError::BadOperands {
            op: op.symbol(),
            lhs: type_name(l),
            rhs: type_name(r),
        });
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let out = match op {
            BinOp::Add => x.checked_add(y),
            BinOp::Sub => x.checked_sub(y),
            BinOp::Mul => x.checked_mul(y),
            BinOp::Div => {
                if y == 0 {
                    return Err(ExprError::DivisionByZero);
                }
                x.checked_div(y)
            }
            BinOp::Rem => {
                if y == 0 {
                    return Err(ExprError::DivisionByZero);
                }
                x.checked_rem(y)
            }
            _ => unreachable!(),
        };
        if let Some(n) = out {
            return Ok(Value::from(n));
        }
        // Fall through to f64 on overflow.
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    let (Some(x), Some(y)) = (x, y) else {
        return Err(ExprError::BadOperands {
            op: op.symbol(),
            lhs: type_name(l),
            rhs: type_name(r),
        });
    };
    if matches!(op, BinOp::Div | BinOp::Rem) && y == 0.0 {
        return Err(ExprError::DivisionByZero);
    }
    let out = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => x / y,
        BinOp::Rem => x % y,
        _ => unreachable!(),
    };
    Ok(serde_json::Number::from_f64(out)
        .map(Value::Number)
        .unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Predicate;
    use serde_json::json;

    fn run(src: &str, env: Value) -> Result<Value, ExprError> {
        let map = env.as_object().cloned().unwrap_or_default();
        Predicate::compile(src).unwrap().eval(&map)
    }

    #[test]
    fn short_circuit_skips_rhs_errors() {
        assert_eq!(run("false and nosuch", json!({})).unwrap(), json!(false));
        assert_eq!(run("true or nosuch", json!({})).unwrap(), json!(true));
    }

    #[test]
    fn integer_division_stays_integral() {
        assert_eq!(run("7 / 2", json!({})).unwrap(), json!(3));
        assert_eq!(run("7.0 / 2", json!({})).unwrap(), json!(3.5));
    }

    #[test]
    fn division_by_zero_is_reported() {
        assert!(matches!(
            run("1 / 0", json!({})).unwrap_err(),
            ExprError::DivisionByZero
        ));
    }

    #[test]
    fn mixed_type_ordering_is_an_error() {
        assert!(matches!(
            run("1 < 'a'", json!({})).unwrap_err(),
            ExprError::BadOperands { .. }
        ));
    }
}
