//! Expression evaluation seam for conditions and variable references.
//!
//! The interpreter consumes an [`ExpressionEvaluator`]: a pure function over
//! a context snapshot that never mutates state and reports failures as
//! ordinary errors. [`JexlEvaluator`] is the default implementation, wrapping
//! `jexl_eval::Evaluator` with a standard transform set.
//!
//! **Security note:** snapshots are always passed as context objects, NEVER
//! interpolated into expression strings.

use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during expression evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("expression evaluation failed: {0}")]
    Failed(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("variable reference '{reference}' could not be resolved: {reason}")]
    Unresolvable { reference: String, reason: String },
}

// ---------------------------------------------------------------------------
// ExpressionEvaluator trait
// ---------------------------------------------------------------------------

/// A pure expression evaluator over a `{variables, results}` snapshot.
///
/// Implementations must be side-effect free: the same expression and snapshot
/// always produce the same result, and errors are returned, never panicked.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate an expression to a boolean (truthiness-coerced).
    fn eval_bool(&self, expression: &str, snapshot: &Value) -> Result<bool, EvalError>;

    /// Evaluate an expression to its raw JSON value.
    fn eval_value(&self, expression: &str, snapshot: &Value) -> Result<Value, EvalError>;
}

// ---------------------------------------------------------------------------
// Variable references
// ---------------------------------------------------------------------------

/// Resolve a `${name}` variable reference against a snapshot.
///
/// Used by `foreach` for its `items` field. The reference must be exactly
/// `${name}`; the named variable must exist in the snapshot's `variables`
/// map. Sequence-ness is checked by the caller, which owns the error wording.
pub fn resolve_reference<'a>(reference: &str, snapshot: &'a Value) -> Result<&'a Value, EvalError> {
    let name = reference
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(|| EvalError::Unresolvable {
            reference: reference.to_string(),
            reason: "expected a reference of the form ${name}".to_string(),
        })?;

    if name.is_empty() {
        return Err(EvalError::Unresolvable {
            reference: reference.to_string(),
            reason: "reference name is empty".to_string(),
        });
    }

    snapshot
        .get("variables")
        .and_then(|vars| vars.get(name))
        .ok_or_else(|| EvalError::Unresolvable {
            reference: reference.to_string(),
            reason: format!("variable '{name}' is not defined"),
        })
}

// ---------------------------------------------------------------------------
// JexlEvaluator
// ---------------------------------------------------------------------------

/// JEXL expression evaluator with standard transforms pre-registered.
///
/// Expressions see the snapshot directly: `variables.<name>` and
/// `results.<step_id>.output` are the usual entry points.
pub struct JexlEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

impl JexlEvaluator {
    /// Create a new evaluator with all standard transforms registered.
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            // String transforms
            .with_transform("lower", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_lowercase()))
            })
            .with_transform("upper", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_uppercase()))
            })
            .with_transform("trim", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.trim()))
            })
            .with_transform("split", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let delimiter = args.get(1).and_then(|v| v.as_str()).unwrap_or(",");
                let parts: Vec<&str> = s.split(delimiter).collect();
                Ok(json!(parts))
            })
            // Boolean transforms
            .with_transform("not", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                Ok(json!(!truthy(&val)))
            })
            // String search transforms
            .with_transform("contains", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let search = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.contains(search)))
            })
            .with_transform("startsWith", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let prefix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.starts_with(prefix)))
            })
            .with_transform("endsWith", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let suffix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.ends_with(suffix)))
            })
            .with_transform("match", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let pattern = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                // Simple substring match (not regex, for security/simplicity)
                Ok(json!(subject.contains(pattern)))
            })
            // Length transform (works on strings, arrays, and objects)
            .with_transform("length", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                let len = match &val {
                    Value::String(s) => s.len(),
                    Value::Array(a) => a.len(),
                    Value::Object(o) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            });

        Self { evaluator }
    }
}

impl Default for JexlEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEvaluator for JexlEvaluator {
    fn eval_bool(&self, expression: &str, snapshot: &Value) -> Result<bool, EvalError> {
        let result = self.eval_value(expression, snapshot)?;
        Ok(truthy(&result))
    }

    fn eval_value(&self, expression: &str, snapshot: &Value) -> Result<Value, EvalError> {
        if !snapshot.is_object() {
            return Err(EvalError::InvalidSnapshot(
                "snapshot must be a JSON object".to_string(),
            ));
        }

        self.evaluator
            .eval_in_context(expression, snapshot)
            .map_err(|e| EvalError::Failed(e.to_string()))
    }
}

/// JavaScript-like truthiness for condition coercion.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
