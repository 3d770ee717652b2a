//! The standard function library shared by predicate expressions and
//! templates.
//!
//! Both engines resolve names through [`lookup`]; adding a function here
//! makes it available to `preCondition`/`postCondition` expressions and to
//! `action` templates alike.

use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::{json, Value};

use crate::value::{display_string, json_cmp, json_eq, truthy};

pub type Func = fn(&[Value]) -> Result<Value, String>;

/// Resolve a library function by name. `None` means the name is unknown,
/// which template parsing treats as a compile-time error.
pub fn lookup(name: &str) -> Option<Func> {
    Some(match name {
        "urlPathEscape" => url_path_escape,
        "urlQueryEscape" => url_query_escape,
        "urlParse" => url_parse,
        "env" => env_var,
        "expandenv" => expandenv,
        "b64enc" => b64enc,
        "b64dec" => b64dec,
        "toDate" => to_date,
        "dateInZone" => date_in_zone,
        "upper" => upper,
        "lower" => lower,
        "trim" => trim,
        "trimPrefix" => trim_prefix,
        "trimSuffix" => trim_suffix,
        "contains" => contains,
        "hasPrefix" => has_prefix,
        "hasSuffix" => has_suffix,
        "replace" => replace,
        "split" => split,
        "join" => join,
        "quote" => quote,
        "default" => default_value,
        "eq" => cmp_eq,
        "ne" => cmp_ne,
        "lt" => cmp_lt,
        "le" => cmp_le,
        "gt" => cmp_gt,
        "ge" => cmp_ge,
        "and" => bool_and,
        "or" => bool_or,
        "not" => bool_not,
        _ => return None,
    })
}

fn arg<'a>(name: &str, args: &'a [Value], i: usize) -> Result<&'a Value, String> {
    args.get(i)
        .ok_or_else(|| format!("{name}: missing argument {}", i + 1))
}

/// Coerce a scalar argument to text; composites are rejected rather than
/// silently serialized.
fn str_arg(name: &str, args: &[Value], i: usize) -> Result<String, String> {
    let v = arg(name, args, i)?;
    match v {
        Value::Array(_) | Value::Object(_) => Err(format!(
            "{name}: argument {} must be a scalar, got {}",
            i + 1,
            crate::value::type_name(v)
        )),
        other => Ok(display_string(other)),
    }
}

fn url_path_escape(args: &[Value]) -> Result<Value, String> {
    let s = str_arg("urlPathEscape", args, 0)?;
    Ok(Value::String(urlencoding::encode(&s).into_owned()))
}

fn url_query_escape(args: &[Value]) -> Result<Value, String> {
    let s = str_arg("urlQueryEscape", args, 0)?;
    // Query escaping uses `+` for spaces, unlike path escaping.
    Ok(Value::String(
        urlencoding::encode(&s).replace("%20", "+"),
    ))
}

fn url_parse(args: &[Value]) -> Result<Value, String> {
    let s = str_arg("urlParse", args, 0)?;
    let u = url::Url::parse(&s).map_err(|e| format!("urlParse: {e}"))?;
    Ok(json!({
        "scheme": u.scheme(),
        "host": u.host_str().unwrap_or(""),
        "port": u.port(),
        "path": u.path(),
        "query": u.query().unwrap_or(""),
        "fragment": u.fragment().unwrap_or(""),
    }))
}

fn env_var(args: &[Value]) -> Result<Value, String> {
    let name = str_arg("env", args, 0)?;
    Ok(Value::String(std::env::var(&name).unwrap_or_default()))
}

static ENV_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").expect("valid regex")
});

fn expandenv(args: &[Value]) -> Result<Value, String> {
    let s = str_arg("expandenv", args, 0)?;
    let out = ENV_REF_RE.replace_all(&s, |caps: &regex::Captures<'_>| {
        let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        name.and_then(|n| std::env::var(n).ok()).unwrap_or_default()
    });
    Ok(Value::String(out.into_owned()))
}

fn b64enc(args: &[Value]) -> Result<Value, String> {
    let s = str_arg("b64enc", args, 0)?;
    Ok(Value::String(BASE64.encode(s.as_bytes())))
}

fn b64dec(args: &[Value]) -> Result<Value, String> {
    let s = str_arg("b64dec", args, 0)?;
    let bytes = BASE64.decode(s.as_bytes()).map_err(|e| format!("b64dec: {e}"))?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|e| format!("b64dec: {e}"))
}

/// `toDate format value` parses `value` with a chrono format string and
/// normalizes to an RFC 3339 UTC timestamp. Date-only formats resolve to
/// midnight.
fn to_date(args: &[Value]) -> Result<Value, String> {
    let fmt = str_arg("toDate", args, 0)?;
    let s = str_arg("toDate", args, 1)?;

    let naive = NaiveDateTime::parse_from_str(&s, &fmt).or_else(|_| {
        NaiveDate::parse_from_str(&s, &fmt)
            .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight is valid"))
    });
    let naive = naive.map_err(|e| format!("toDate: cannot parse '{s}' with '{fmt}': {e}"))?;
    Ok(Value::String(
        DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).to_rfc3339(),
    ))
}

/// `dateInZone format value zone` formats an RFC 3339 value in `UTC`,
/// `Local`, or a fixed `±HH:MM` offset.
fn date_in_zone(args: &[Value]) -> Result<Value, String> {
    let fmt = str_arg("dateInZone", args, 0)?;
    let s = str_arg("dateInZone", args, 1)?;
    let zone = str_arg("dateInZone", args, 2)?;

    let dt = DateTime::parse_from_rfc3339(&s)
        .map_err(|e| format!("dateInZone: cannot parse '{s}': {e}"))?;

    let out = match zone.as_str() {
        "UTC" | "utc" => dt.with_timezone(&Utc).format(&fmt).to_string(),
        "Local" | "local" => dt.with_timezone(&Local).format(&fmt).to_string(),
        offset => {
            let off = parse_fixed_offset(offset)
                .ok_or_else(|| format!("dateInZone: unsupported zone '{offset}'"))?;
            dt.with_timezone(&off).format(&fmt).to_string()
        }
    };
    Ok(Value::String(out))
}

fn parse_fixed_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let (h, m) = rest.split_once(':')?;
    let secs = sign * (h.parse::<i32>().ok()? * 3600 + m.parse::<i32>().ok()? * 60);
    FixedOffset::east_opt(secs)
}

fn upper(args: &[Value]) -> Result<Value, String> {
    Ok(Value::String(str_arg("upper", args, 0)?.to_uppercase()))
}

fn lower(args: &[Value]) -> Result<Value, String> {
    Ok(Value::String(str_arg("lower", args, 0)?.to_lowercase()))
}

fn trim(args: &[Value]) -> Result<Value, String> {
    Ok(Value::String(str_arg("trim", args, 0)?.trim().to_string()))
}

fn trim_prefix(args: &[Value]) -> Result<Value, String> {
    let prefix = str_arg("trimPrefix", args, 0)?;
    let s = str_arg("trimPrefix", args, 1)?;
    Ok(Value::String(
        s.strip_prefix(&prefix).unwrap_or(&s).to_string(),
    ))
}

fn trim_suffix(args: &[Value]) -> Result<Value, String> {
    let suffix = str_arg("trimSuffix", args, 0)?;
    let s = str_arg("trimSuffix", args, 1)?;
    Ok(Value::String(
        s.strip_suffix(&suffix).unwrap_or(&s).to_string(),
    ))
}

fn contains(args: &[Value]) -> Result<Value, String> {
    let needle = str_arg("contains", args, 0)?;
    let s = str_arg("contains", args, 1)?;
    Ok(Value::Bool(s.contains(&needle)))
}

fn has_prefix(args: &[Value]) -> Result<Value, String> {
    let prefix = str_arg("hasPrefix", args, 0)?;
    let s = str_arg("hasPrefix", args, 1)?;
    Ok(Value::Bool(s.starts_with(&prefix)))
}

fn has_suffix(args: &[Value]) -> Result<Value, String> {
    let suffix = str_arg("hasSuffix", args, 0)?;
    let s = str_arg("hasSuffix", args, 1)?;
    Ok(Value::Bool(s.ends_with(&suffix)))
}

fn replace(args: &[Value]) -> Result<Value, String> {
    let old = str_arg("replace", args, 0)?;
    let new = str_arg("replace", args, 1)?;
    let s = str_arg("replace", args, 2)?;
    Ok(Value::String(s.replace(&old, &new)))
}

fn split(args: &[Value]) -> Result<Value, String> {
    let sep = str_arg("split", args, 0)?;
    let s = str_arg("split", args, 1)?;
    Ok(Value::Array(
        s.split(&sep)
            .map(|p| Value::String(p.to_string()))
            .collect(),
    ))
}

fn join(args: &[Value]) -> Result<Value, String> {
    let sep = str_arg("join", args, 0)?;
    let list = arg("join", args, 1)?;
    let Value::Array(items) = list else {
        return Err(format!(
            "join: argument 2 must be an array, got {}",
            crate::value::type_name(list)
        ));
    };
    Ok(Value::String(
        items
            .iter()
            .map(display_string)
            .collect::<Vec<_>>()
            .join(&sep),
    ))
}

fn quote(args: &[Value]) -> Result<Value, String> {
    let s = str_arg("quote", args, 0)?;
    Ok(Value::String(format!("\"{s}\"")))
}

fn default_value(args: &[Value]) -> Result<Value, String> {
    let fallback = arg("default", args, 0)?;
    let v = arg("default", args, 1)?;
    Ok(if truthy(v) { v.clone() } else { fallback.clone() })
}

fn cmp_eq(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(json_eq(
        arg("eq", args, 0)?,
        arg("eq", args, 1)?,
    )))
}

fn cmp_ne(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(!json_eq(
        arg("ne", args, 0)?,
        arg("ne", args, 1)?,
    )))
}

fn ordering(name: &str, args: &[Value]) -> Result<std::cmp::Ordering, String> {
    let a = arg(name, args, 0)?;
    let b = arg(name, args, 1)?;
    json_cmp(a, b).ok_or_else(|| {
        format!(
            "{name}: cannot order {} and {}",
            crate::value::type_name(a),
            crate::value::type_name(b)
        )
    })
}

fn cmp_lt(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(ordering("lt", args)?.is_lt()))
}

fn cmp_le(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(ordering("le", args)?.is_le()))
}

fn cmp_gt(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(ordering("gt", args)?.is_gt()))
}

fn cmp_ge(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(ordering("ge", args)?.is_ge()))
}

// Template-style boolean forms: return the deciding argument, like the
// text/template builtins they mirror.
fn bool_and(args: &[Value]) -> Result<Value, String> {
    let mut last = arg("and", args, 0)?;
    for v in args {
        if !truthy(v) {
            return Ok(v.clone());
        }
        last = v;
    }
    Ok(last.clone())
}

fn bool_or(args: &[Value]) -> Result<Value, String> {
    for v in args {
        if truthy(v) {
            return Ok(v.clone());
        }
    }
    Ok(args.last().cloned().unwrap_or(Value::Null))
}

fn bool_not(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(!truthy(arg("not", args, 0)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Value {
        lookup(name).expect("known function")(args).expect("call succeeds")
    }

    #[test]
    fn base64_round_trip() {
        let enc = call("b64enc", &[json!("admin")]);
        assert_eq!(enc, json!("YWRtaW4="));
        assert_eq!(call("b64dec", &[enc]), json!("admin"));
    }

    #[test]
    fn query_escape_uses_plus_for_spaces() {
        assert_eq!(call("urlQueryEscape", &[json!("a b&c")]), json!("a+b%26c"));
        assert_eq!(call("urlPathEscape", &[json!("a b")]), json!("a%20b"));
    }

    #[test]
    fn url_parse_exposes_components() {
        let parsed = call("urlParse", &[json!("https://example.com:8443/p?q=1#frag")]);
        assert_eq!(parsed["scheme"], json!("https"));
        assert_eq!(parsed["host"], json!("example.com"));
        assert_eq!(parsed["fragment"], json!("frag"));
    }

    #[test]
    fn to_date_normalizes_to_rfc3339() {
        let d = call("toDate", &[json!("%Y-%m-%d"), json!("2017-12-31")]);
        assert_eq!(d, json!("2017-12-31T00:00:00+00:00"));
    }

    #[test]
    fn date_in_zone_formats_with_offset() {
        let out = call(
            "dateInZone",
            &[
                json!("%H:%M"),
                json!("2017-12-31T12:00:00+00:00"),
                json!("+02:00"),
            ],
        );
        assert_eq!(out, json!("14:00"));
    }

    #[test]
    fn expandenv_replaces_known_and_drops_unknown() {
        std::env::set_var("AXON_FN_TEST_VAR", "v");
        assert_eq!(
            call("expandenv", &[json!("x=${AXON_FN_TEST_VAR},y=$AXON_FN_NO_SUCH")]),
            json!("x=v,y=")
        );
    }

    #[test]
    fn default_picks_fallback_for_empty() {
        assert_eq!(call("default", &[json!("d"), json!("")]), json!("d"));
        assert_eq!(call("default", &[json!("d"), json!("v")]), json!("v"));
    }

    #[test]
    fn unknown_function_is_none() {
        assert!(lookup("nope").is_none());
    }
}
