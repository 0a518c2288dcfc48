//! The fixed model registry advertised on `/v1/models`.
//!
//! The registry is built once at startup and never mutated afterwards; the
//! upstream service only distinguishes models by the `x-selected-model`
//! header, so nothing here needs runtime updates.

use serde::Serialize;

/// An OpenAI-compatible model descriptor as returned by `/v1/models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

/// Immutable table of the models this gateway serves.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    default_model: String,
}

impl ModelRegistry {
    /// The two GPT-OSS models the upstream exposes, with `gpt-oss-120b` as
    /// the default when a request omits `model`.
    pub fn builtin() -> Self {
        let created = chrono::Utc::now().timestamp();
        let descriptor = |id: &str| ModelDescriptor {
            id: id.to_string(),
            object: "model".to_string(),
            created,
            owned_by: "gpt-oss".to_string(),
        };

        Self {
            models: vec![descriptor("gpt-oss-120b"), descriptor("gpt-oss-20b")],
            default_model: "gpt-oss-120b".to_string(),
        }
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.models.iter().any(|m| m.id == id)
    }

    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    #[must_use]
    pub fn descriptors(&self) -> &[ModelDescriptor] {
        &self.models
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_models() {
        let registry = ModelRegistry::builtin();
        assert!(registry.contains("gpt-oss-120b"));
        assert!(registry.contains("gpt-oss-20b"));
        assert!(!registry.contains("gpt-oss-7b"));
        assert_eq!(registry.default_model(), "gpt-oss-120b");
        assert_eq!(registry.descriptors().len(), 2);
    }

    #[test]
    fn test_descriptor_shape() {
        let registry = ModelRegistry::builtin();
        let json = serde_json::to_value(&registry.descriptors()[0]).unwrap();
        assert_eq!(json["id"], "gpt-oss-120b");
        assert_eq!(json["object"], "model");
        assert_eq!(json["owned_by"], "gpt-oss");
        assert!(json["created"].as_i64().unwrap() > 0);
    }
}
