//! Text templating for action specifications.
//!
//! Delimiters are `{{ ... }}`. An action is either an output pipeline
//! (`{{ .secret.password | b64dec }}`), or part of a conditional block
//! (`{{if eq .data.x "John"}}A{{else}}B{{end}}`). A command whose first
//! term is a name calls that function with the remaining terms as
//! arguments; a piped value is appended as the last argument. Unknown
//! function references fail at parse time.

mod parser;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::functions;
use crate::value::{display_string, truthy};

use parser::{Command, Node, Pipeline, Term};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("template '{name}': unclosed '{{{{' at offset {offset}")]
    Unclosed { name: String, offset: usize },
    #[error("template '{name}': parse error at offset {offset}: {message}")]
    Parse {
        name: String,
        offset: usize,
        message: String,
    },
    #[error("template '{name}': unknown function '{function}'")]
    UnknownFunction { name: String, function: String },
    #[error("template '{name}': {message}")]
    Render { name: String, message: String },
}

/// Parse and render `template` against the environment mapping.
pub fn render(
    name: &str,
    template: &str,
    env: &Map<String, Value>,
) -> Result<String, TemplateError> {
    let nodes = parser::parse(name, template)?;
    let mut out = String::with_capacity(template.len());
    render_nodes(name, &nodes, env, &mut out)?;
    Ok(out)
}

fn render_nodes(
    name: &str,
    nodes: &[Node],
    env: &Map<String, Value>,
    out: &mut String,
) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Output(p) => {
                let v = eval_pipeline(p, env).map_err(|message| TemplateError::Render {
                    name: name.to_string(),
                    message,
                })?;
                out.push_str(&display_string(&v));
            }
            Node::If { cond, then, els } => {
                let v = eval_pipeline(cond, env).map_err(|message| TemplateError::Render {
                    name: name.to_string(),
                    message,
                })?;
                if truthy(&v) {
                    render_nodes(name, then, env, out)?;
                } else {
                    render_nodes(name, els, env, out)?;
                }
            }
        }
    }
    Ok(())
}

fn eval_pipeline(pipeline: &Pipeline, env: &Map<String, Value>) -> Result<Value, String> {
    let mut piped: Option<Value> = None;
    for cmd in &pipeline.cmds {
        piped = Some(eval_command(cmd, piped.take(), env)?);
    }
    piped.ok_or_else(|| "empty pipeline".to_string())
}

fn eval_command(
    cmd: &Command,
    piped: Option<Value>,
    env: &Map<String, Value>,
) -> Result<Value, String> {
    match &cmd.terms[0] {
        Term::Ident(name) => {
            let f = functions::lookup(name).ok_or_else(|| format!("unknown function '{name}'"))?;
            let mut args = Vec::with_capacity(cmd.terms.len());
            for term in &cmd.terms[1..] {
                args.push(eval_term(term, env)?);
            }
            if let Some(v) = piped {
                args.push(v);
            }
            f(&args)
        }
        term => {
            if piped.is_some() {
                return Err("expected a function in pipeline position".to_string());
            }
            eval_term(term, env)
        }
    }
}

fn eval_term(term: &Term, env: &Map<String, Value>) -> Result<Value, String> {
    match term {
        Term::Path(path) => {
            if path.is_empty() {
                return Ok(Value::Object(env.clone()));
            }
            let mut cur = env.get(&path[0]).cloned().unwrap_or(Value::Null);
            for seg in &path[1..] {
                cur = match cur {
                    // Missing keys and null stay null, so optional payload
                    // fields render as empty text.
                    Value::Object(map) => map.get(seg).cloned().unwrap_or(Value::Null),
                    Value::Null => Value::Null,
                    other => {
                        return Err(format!(
                            "cannot access field '{seg}' on a {} value",
                            crate::value::type_name(&other)
                        ))
                    }
                };
            }
            Ok(cur)
        }
        Term::Str(s) => Ok(Value::String(s.clone())),
        Term::Int(n) => Ok(Value::from(*n)),
        Term::Float(f) => Ok(serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        Term::Bool(b) => Ok(Value::Bool(*b)),
        Term::Ident(name) => {
            let f = functions::lookup(name).ok_or_else(|| format!("unknown function '{name}'"))?;
            f(&[])
        }
        Term::Paren(p) => eval_pipeline(p, env),
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
    fn renders_simple_field_access() {
        let out = render("t", "{{ .data.x }}", &env(json!({"data": {"x": "v"}}))).unwrap();
        assert_eq!(out, "v");
    }

    #[test]
    fn renders_adjacent_fields_with_literal_text() {
        let out = render(
            "t",
            "{{.data.firstName}} {{.data.lastName}}",
            &env(json!({"data": {"firstName": "John", "lastName": "Doe"}})),
        )
        .unwrap();
        assert_eq!(out, "John Doe");
    }

    #[test]
    fn if_else_selects_branch() {
        let tpl = r#"id={{if eq .data.firstName "John"}}A{{else}}B{{end}}"#;
        assert_eq!(
            render("t", tpl, &env(json!({"data": {"firstName": "John"}}))).unwrap(),
            "id=A"
        );
        assert_eq!(
            render("t", tpl, &env(json!({"data": {"firstName": "Jane"}}))).unwrap(),
            "id=B"
        );
    }

    #[test]
    fn pipeline_appends_piped_value_last() {
        let out = render(
            "t",
            "{{ .secret.username | b64dec }}:{{ .secret.password | b64dec }}",
            &env(json!({"secret": {"username": "YWRtaW4=", "password": "c+KCrGNy4oKsdA=="}})),
        )
        .unwrap();
        assert_eq!(out, "admin:s€cr€t");
    }

    #[test]
    fn missing_fields_render_empty() {
        let out = render("t", "[{{ .data.missing }}]", &env(json!({"data": {}}))).unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn unknown_function_fails_at_parse_time() {
        let err = render("t", "{{ sprocket .data.x }}", &env(json!({"data": {}}))).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownFunction { ref function, .. } if function == "sprocket"));
    }

    #[test]
    fn unclosed_delimiter_is_reported() {
        let err = render("t", "a {{ .data.x", &Map::new()).unwrap_err();
        assert!(matches!(err, TemplateError::Unclosed { .. }));
    }

    #[test]
    fn nested_conditionals() {
        let tpl = "{{if .a}}{{if .b}}both{{else}}a-only{{end}}{{else}}none{{end}}";
        assert_eq!(
            render("t", tpl, &env(json!({"a": true, "b": false}))).unwrap(),
            "a-only"
        );
        assert_eq!(
            render("t", tpl, &env(json!({"a": false, "b": true}))).unwrap(),
            "none"
        );
    }

    #[test]
    fn parenthesized_command_as_argument() {
        let out = render(
            "t",
            r#"{{ upper (trim .data.name) }}"#,
            &env(json!({"data": {"name": "  ok  "}})),
        )
        .unwrap();
        assert_eq!(out, "OK");
    }

    #[test]
    fn whole_environment_dot() {
        let out = render("t", "{{ . }}", &env(json!({"k": 1}))).unwrap();
        assert_eq!(out, r#"{"k":1}"#);
    }
}
