//! Leaf executors: concrete implementations of the interpreter's leaf seam.

pub mod http;
pub mod script;

pub use http::HttpLeafExecutor;
pub use script::ScriptLeafExecutor;

use serde_json::Value;
use testflow_core::flow::ExecutionContext;

/// Replace `${name}` placeholders with context variable values.
///
/// Unknown references are left as-is; objects and arrays render as compact
/// JSON.
pub(crate) fn resolve_placeholders(template: &str, ctx: &ExecutionContext) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match ctx.get_var(name) {
                    Some(value) => result.push_str(&value_to_string(value)),
                    None => {
                        result.push_str("${");
                        result.push_str(name);
                        result.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

/// Convert a JSON value to a display string for placeholder substitution.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_placeholders() {
        let mut ctx = ExecutionContext::new();
        ctx.set_var("host", json!("api.example.com"));
        ctx.set_var("count", json!(3));

        assert_eq!(
            resolve_placeholders("https://${host}/items?limit=${count}", &ctx),
            "https://api.example.com/items?limit=3"
        );
    }

    #[test]
    fn test_unknown_placeholder_left_as_is() {
        let ctx = ExecutionContext::new();
        assert_eq!(resolve_placeholders("x=${missing}", &ctx), "x=${missing}");
    }

    #[test]
    fn test_unterminated_placeholder_left_as_is() {
        let ctx = ExecutionContext::new();
        assert_eq!(resolve_placeholders("broken ${tail", &ctx), "broken ${tail");
    }

    #[test]
    fn test_object_value_renders_as_json() {
        let mut ctx = ExecutionContext::new();
        ctx.set_var("payload", json!({"a": 1}));
        assert_eq!(
            resolve_placeholders("body=${payload}", &ctx),
            r#"body={"a":1}"#
        );
    }
}
