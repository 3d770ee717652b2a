//! Boolean predicate expressions evaluated against the per-request
//! environment.
//!
//! `Predicate::compile` turns a source string into an immutable AST;
//! evaluation resolves identifiers in the environment mapping first and in
//! the standard function library second. A predicate whose final value is
//! not a boolean is reported as a type error that names the offending type
//! and echoes the source.

mod eval;
mod lexer;
mod parser;

use serde_json::{Map, Value};
use thiserror::Error;

pub(crate) use parser::Expr;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },
    #[error("unknown name '{0}'")]
    UnknownName(String),
    #[error("cannot access field '{field}' on a {type_name} value")]
    BadFieldAccess {
        field: String,
        type_name: &'static str,
    },
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("{0}")]
    Function(String),
    #[error("operator '{op}' cannot be applied to {lhs} and {rhs}")]
    BadOperands {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("operator '{op}' expects a {expected} operand, got {actual}")]
    BadOperand {
        op: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("incorrect type {type_name} returned when evaluating expression '{expr_source}'. Expected 'boolean'")]
    NotBoolean {
        type_name: String,
        expr_source: String,
    },
}

/// A compiled predicate. Read-only after compilation and safe to share
/// across threads.
#[derive(Debug, Clone)]
pub struct Predicate {
    source: String,
    root: Expr,
}

impl Predicate {
    pub fn compile(source: &str) -> Result<Self, ExprError> {
        let tokens = lexer::lex(source)?;
        let root = parser::parse(&tokens)?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate to an arbitrary value.
    pub fn eval(&self, env: &Map<String, Value>) -> Result<Value, ExprError> {
        eval::eval(&self.root, env)
    }

    /// Evaluate and require a boolean result.
    pub fn eval_bool(&self, env: &Map<String, Value>) -> Result<bool, ExprError> {
        match self.eval(env)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExprError::NotBoolean {
                type_name: crate::value::type_name(&other).to_string(),
                expr_source: self.source.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(v: Value) -> Map<String, Value> {
        v.as_object().expect("object").clone()
    }

    #[test]
    fn literal_true_holds_for_any_environment() {
        let p = Predicate::compile("true").unwrap();
        assert!(p.eval_bool(&Map::new()).unwrap());
        assert!(p.eval_bool(&env(json!({"data": {"x": 1}}))).unwrap());
    }

    #[test]
    fn field_access_and_comparison() {
        let p = Predicate::compile(r#"data.lastName == "Doe""#).unwrap();
        assert!(p
            .eval_bool(&env(json!({"data": {"lastName": "Doe"}})))
            .unwrap());
        assert!(!p
            .eval_bool(&env(json!({"data": {"lastName": "Smith"}})))
            .unwrap());
    }

    #[test]
    fn missing_object_key_is_null_not_error() {
        let p = Predicate::compile(r#"data.foo != "bar""#).unwrap();
        assert!(p.eval_bool(&env(json!({"data": {}}))).unwrap());
    }

    #[test]
    fn boolean_connectives_and_arithmetic() {
        let p = Predicate::compile("response.status >= 200 and response.status < 300").unwrap();
        assert!(p
            .eval_bool(&env(json!({"response": {"status": 204}})))
            .unwrap());
        assert!(!p
            .eval_bool(&env(json!({"response": {"status": 502}})))
            .unwrap());

        let q = Predicate::compile("1 + 2 * 3 == 7").unwrap();
        assert!(q.eval_bool(&Map::new()).unwrap());
    }

    #[test]
    fn not_and_parentheses() {
        let p = Predicate::compile("not (1 > 2) && !(false)").unwrap();
        assert!(p.eval_bool(&Map::new()).unwrap());
    }

    #[test]
    fn function_calls_resolve_in_the_library() {
        let p = Predicate::compile(r#"b64dec(secret.user) == "admin""#).unwrap();
        assert!(p
            .eval_bool(&env(json!({"secret": {"user": "YWRtaW4="}})))
            .unwrap());
    }

    #[test]
    fn string_concatenation() {
        let p = Predicate::compile(r#"data.first + " " + data.last == "John Doe""#).unwrap();
        assert!(p
            .eval_bool(&env(json!({"data": {"first": "John", "last": "Doe"}})))
            .unwrap());
    }

    #[test]
    fn non_boolean_result_names_type_and_source() {
        let p = Predicate::compile("response").unwrap();
        let err = p
            .eval_bool(&env(json!({"response": "ok"})))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "incorrect type string returned when evaluating expression 'response'. Expected 'boolean'"
        );
    }

    #[test]
    fn parse_error_carries_offset() {
        let err = Predicate::compile("!=").unwrap_err();
        assert!(err.to_string().contains("offset"), "got: {err}");
    }

    #[test]
    fn unknown_name_is_an_eval_error() {
        let p = Predicate::compile("nosuch == 1").unwrap();
        assert!(matches!(
            p.eval(&Map::new()).unwrap_err(),
            ExprError::UnknownName(_)
        ));
    }

    #[test]
    fn field_access_on_null_is_an_error() {
        let p = Predicate::compile("secret.user == 'x'").unwrap();
        assert!(matches!(
            p.eval(&env(json!({"secret": null}))).unwrap_err(),
            ExprError::BadFieldAccess { .. }
        ));
    }
}
