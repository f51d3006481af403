//! Per-tenant provisioning parameter resolution
//!
//! A slice's provisioning request carries one value per property declared in
//! the shared plan's parameter schema. Each value comes from, in order:
//!
//! 1. the slice's own `params`
//! 2. the secret published by the shared instance, selected by
//!    `serviceName=<serviceType>,serviceInstanceID=<shared instance ID>`
//! 3. nothing: the property is left out of the request
//!
//! Once step 2 is reached the selector must match exactly one secret.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::crd::SharedServiceSlice;
use crate::secrets::{find_unique, instance_secret_labels, SecretStore};
use crate::Error;

/// Resolves slice provisioning parameters
pub struct ParamResolver {
    secrets: Arc<dyn SecretStore>,
    namespace: String,
}

impl ParamResolver {
    /// Resolver reading secrets from `namespace`
    pub fn new(secrets: Arc<dyn SecretStore>, namespace: impl Into<String>) -> Self {
        Self {
            secrets,
            namespace: namespace.into(),
        }
    }

    /// Resolve a single parameter
    ///
    /// Returns `Ok(None)` when neither the slice nor the matched secret
    /// provide `key`.
    pub async fn resolve_param(
        &self,
        slice: &SharedServiceSlice,
        shared_instance_id: &str,
        key: &str,
        schema_entry: &Value,
    ) -> Result<Option<Value>, Error> {
        if let Some(value) = slice.spec.params.get(key) {
            return Ok(Some(value.clone()));
        }

        let labels = instance_secret_labels(&slice.spec.service_type, shared_instance_id);
        let secret = find_unique(self.secrets.as_ref(), &self.namespace, &labels).await?;

        Ok(secret
            .data
            .get(key)
            .map(|raw| coerce_to_schema(raw, schema_entry)))
    }

    /// Build the full parameter object for a slice from a plan schema
    ///
    /// Properties listed under `required` must resolve to a value.
    pub async fn build_parameters(
        &self,
        slice: &SharedServiceSlice,
        shared_instance_id: &str,
        schema: &Value,
    ) -> Result<Map<String, Value>, Error> {
        let mut params = Map::new();
        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return Ok(params);
        };

        for (key, entry) in properties {
            match self
                .resolve_param(slice, shared_instance_id, key, entry)
                .await?
            {
                Some(value) => {
                    params.insert(key.clone(), value);
                }
                None => debug!(param = %key, "No value for optional parameter"),
            }
        }

        let missing: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|key| !params.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(Error::validation(format!(
                "required parameters have no value: {}",
                missing.join(", ")
            )));
        }

        Ok(params)
    }
}

/// Convert a secret string to the type the schema declares, when it parses
fn coerce_to_schema(raw: &str, schema_entry: &Value) -> Value {
    let parsed = match schema_entry.get("type").and_then(Value::as_str) {
        Some("integer") => raw.trim().parse::<i64>().ok().map(Value::from),
        // JSON has no NaN or infinity
        Some("number") => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        Some("boolean") => raw.trim().parse::<bool>().ok().map(Value::from),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::String(raw.to_string()))
}
