//! HTTP leaf executor: performs `http` steps with reqwest.
//!
//! Resolves `${var}` placeholders against the context, applies the merged
//! environment's domain binding (base URL + default headers), and maps
//! request timeouts to the `timeout` step status.

use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use testflow_core::flow::{ExecutionContext, LeafError, LeafExecutor};
use testflow_types::workflow::{Step, StepConfig};
use tokio_util::sync::CancellationToken;

use super::resolve_placeholders;

/// Executor for `http` leaf steps.
#[derive(Default)]
pub struct HttpLeafExecutor {
    client: reqwest::Client,
}

impl HttpLeafExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeafExecutor for HttpLeafExecutor {
    fn execute<'a>(
        &'a self,
        step: &'a Step,
        ctx: &'a mut ExecutionContext,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, LeafError>> {
        Box::pin(async move {
            let StepConfig::Http {
                method,
                url,
                domain,
                headers,
                body,
                timeout_ms,
            } = &step.config
            else {
                return Err(LeafError::Failed("not an http step".to_string()));
            };

            let mut full_url = resolve_placeholders(url, ctx);
            let mut header_pairs: Vec<(String, String)> = Vec::new();

            if let Some(domain_name) = domain {
                let Some(env) = ctx.environment() else {
                    return Err(LeafError::Failed(format!(
                        "step references domain '{domain_name}' but no environment is bound"
                    )));
                };
                let Some(binding) = env.domains.get(domain_name) else {
                    return Err(LeafError::Failed(format!(
                        "unknown domain binding '{domain_name}'"
                    )));
                };
                full_url = format!("{}{}", binding.base_url.trim_end_matches('/'), full_url);
                header_pairs.extend(
                    binding
                        .headers
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone())),
                );
            }

            // Step headers override domain defaults on the same key.
            if let Some(headers) = headers {
                for (key, value) in headers {
                    header_pairs.retain(|(k, _)| k != key);
                    header_pairs.push((key.clone(), resolve_placeholders(value, ctx)));
                }
            }

            let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|_| LeafError::Failed(format!("invalid HTTP method '{method}'")))?;

            tracing::debug!(
                step_id = step.id.as_str(),
                %method,
                url = full_url.as_str(),
                "http step request"
            );

            let mut request = self.client.request(method, &full_url);
            for (key, value) in &header_pairs {
                request = request.header(key.as_str(), value.as_str());
            }
            if let Some(body) = body {
                request = request.body(resolve_placeholders(body, ctx));
            }
            if let Some(timeout_ms) = timeout_ms {
                request = request.timeout(std::time::Duration::from_millis(*timeout_ms));
            }

            let response = tokio::select! {
                response = request.send() => response,
                _ = cancel.cancelled() => return Err(LeafError::Cancelled),
            };

            let response = match response {
                Ok(response) => response,
                Err(e) if e.is_timeout() => return Err(LeafError::Timeout),
                Err(e) => return Err(LeafError::Failed(e.to_string())),
            };

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| LeafError::Failed(e.to_string()))?;
            let body_value =
                serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text.clone()));

            if !status.is_success() {
                let preview: String = text.chars().take(200).collect();
                return Err(LeafError::Failed(format!("HTTP {status}: {preview}")));
            }

            Ok(json!({ "status": status.as_u16(), "body": body_value }))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
