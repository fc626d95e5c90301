use crate::error::AiError;
use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Text-to-vector client. Deterministic within a model version: the same
/// text always maps to the same vector.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn generate(&self, text: &str) -> Result<Vec<f32>, AiError>;

    async fn batch_generate(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError>;

    fn model_id(&self) -> &str;
}

/// OpenAI-compatible embeddings client.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpEmbeddingClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let url = format!("{}/embeddings", self.base_url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(model = %self.model, inputs = inputs.len(), "embedding request");

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AiError::Embedding(format!("status {}: {}", status, text)));
        }

        let payload: Value = response.json().await?;
        let data = payload["data"]
            .as_array()
            .ok_or_else(|| AiError::MalformedResponse("missing data array".to_string()))?;

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let embedding = item["embedding"]
                .as_array()
                .ok_or_else(|| AiError::MalformedResponse("missing embedding".to_string()))?;
            let vector: Vec<f32> = embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            vectors.push(vector);
        }

        if vectors.len() != inputs.len() {
            return Err(AiError::MalformedResponse(format!(
                "requested {} embeddings, got {}",
                inputs.len(),
                vectors.len()
            )));
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn generate(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let vectors = self.request(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| AiError::Embedding("empty embedding response".to_string()))
    }

    async fn batch_generate(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Hash-seeded embedder: reproducible vectors without a model server.
/// Used by the test suites and as a degraded offline mode.
pub struct DeterministicEmbedder {
    model_id: String,
    dims: usize,
}

impl DeterministicEmbedder {
    pub fn new(model_id: impl Into<String>, dims: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dims: dims.max(1),
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut hasher = Sha256::new();
        hasher.update(self.model_id.as_bytes());
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();

        let mut out = Vec::with_capacity(self.dims);
        for i in 0..self.dims {
            let byte = digest[i % digest.len()];
            out.push((byte as f32 / 127.5) - 1.0);
        }
        out
    }
}

#[async_trait]
impl EmbeddingClient for DeterministicEmbedder {
    async fn generate(&self, text: &str) -> Result<Vec<f32>, AiError> {
        Ok(self.embed(text))
    }

    async fn batch_generate(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_embedder_is_reproducible() {
        let embedder = DeterministicEmbedder::new("embedding-default-v1", 8);
        let a = embedder.generate("hello").await.unwrap();
        let b = embedder.generate("hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[tokio::test]
    async fn deterministic_embedder_changes_with_model() {
        let a = DeterministicEmbedder::new("embedding-default-v1", 8)
            .generate("hello")
            .await
            .unwrap();
        let b = DeterministicEmbedder::new("embedding-alt-v1", 8)
            .generate("hello")
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn batch_generate_matches_single() {
        let embedder = DeterministicEmbedder::new("m", 16);
        let batch = embedder
            .batch_generate(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(batch[0], embedder.generate("a").await.unwrap());
        assert_eq!(batch[1], embedder.generate("b").await.unwrap());
    }
}
