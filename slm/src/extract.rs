//! Query attribute extraction.
//!
//! Turns a free-form query into typed attributes (`name`, `type`,
//! `importance`, `context`) and, optionally, a rewritten query. The primary
//! path is a schema-constrained chat call; any chat failure falls back to a
//! rule-based token extractor so recall can always proceed.

use crate::chat::{ChatClient, LlmMessage};
use crate::error::AiError;
use serde_json::{json, Value};
use std::sync::Arc;

const EXTRACTION_TEMPERATURE: f32 = 0.2;
const EXTRACTION_MAX_TOKENS: u32 = 2000;
const FALLBACK_MAX_ATTRIBUTES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    High,
    Medium,
    Low,
}

impl Importance {
    pub fn confidence(&self) -> f32 {
        match self {
            Importance::High => 0.9,
            Importance::Medium => 0.7,
            Importance::Low => 0.5,
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "high" => Importance::High,
            "low" => Importance::Low,
            _ => Importance::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::High => "high",
            Importance::Medium => "medium",
            Importance::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryAttribute {
    pub name: String,
    pub attr_type: String,
    pub context: String,
    pub importance: Importance,
}

impl QueryAttribute {
    pub fn confidence(&self) -> f32 {
        self.importance.confidence()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeExtraction {
    pub attributes: Vec<QueryAttribute>,
    pub rewritten_query: Option<String>,
    /// True when the chat path failed and the rule extractor produced the
    /// attributes instead.
    pub used_fallback: bool,
}

pub struct AttributeExtractor {
    chat: Arc<dyn ChatClient>,
}

impl AttributeExtractor {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self { chat }
    }

    /// Extract attributes, optionally asking for a query rewrite in the
    /// same call. Chat failures degrade to the rule extractor.
    pub async fn extract(&self, query: &str, enable_rewrite: bool) -> AttributeExtraction {
        match self.extract_with_chat(query, enable_rewrite).await {
            Ok(extraction) if !extraction.attributes.is_empty() => extraction,
            Ok(_) => {
                tracing::debug!("chat extracted no attributes, using rule fallback");
                self.fallback(query)
            }
            Err(err) => {
                tracing::warn!(error = %err, "attribute extraction failed, using rule fallback");
                self.fallback(query)
            }
        }
    }

    async fn extract_with_chat(
        &self,
        query: &str,
        enable_rewrite: bool,
    ) -> Result<AttributeExtraction, AiError> {
        let prompt = if enable_rewrite {
            render_prompt_with_rewrite(query)
        } else {
            render_prompt(query)
        };
        let schema = if enable_rewrite {
            extraction_schema_with_rewrite()
        } else {
            extraction_schema()
        };

        let messages = [LlmMessage::user(prompt)];
        let response = self
            .chat
            .chat_with_schema(
                &messages,
                &schema,
                EXTRACTION_TEMPERATURE,
                EXTRACTION_MAX_TOKENS,
            )
            .await?;

        let attributes = parse_attributes(&response);
        let rewritten_query = if enable_rewrite {
            response["rewritten_query"]
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != query)
                .map(str::to_string)
        } else {
            None
        };

        Ok(AttributeExtraction {
            attributes,
            rewritten_query,
            used_fallback: false,
        })
    }

    /// Rule-based fallback: distinct word tokens of length >= 2 become
    /// `topic` attributes of medium importance.
    fn fallback(&self, query: &str) -> AttributeExtraction {
        let mut seen = std::collections::HashSet::new();
        let mut attributes = Vec::new();

        for token in query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 2)
        {
            let normalized = token.to_lowercase();
            if !seen.insert(normalized) {
                continue;
            }
            attributes.push(QueryAttribute {
                name: token.to_string(),
                attr_type: "topic".to_string(),
                context: query.to_string(),
                importance: Importance::Medium,
            });
            if attributes.len() >= FALLBACK_MAX_ATTRIBUTES {
                break;
            }
        }

        AttributeExtraction {
            attributes,
            rewritten_query: None,
            used_fallback: true,
        }
    }
}

fn render_prompt(query: &str) -> String {
    format!(
        "Extract the searchable attributes from the user query below. For each \
         attribute give its name, a type tag (person/location/time/topic/action/\
         organization/product or another short tag), the context it appears in, \
         and its importance (high/medium/low).\n\nQuery: {query}"
    )
}

fn render_prompt_with_rewrite(query: &str) -> String {
    format!(
        "{}\n\nAlso rewrite the query into a cleaner, self-contained search \
         request. If the query is already clear, return it unchanged as \
         rewritten_query.",
        render_prompt(query)
    )
}

fn extraction_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "attributes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "type": {"type": "string"},
                        "context": {"type": "string"},
                        "importance": {"type": "string"}
                    },
                    "required": ["name", "type", "importance"]
                }
            }
        },
        "required": ["attributes"]
    })
}

fn extraction_schema_with_rewrite() -> Value {
    json!({
        "type": "object",
        "properties": {
            "attributes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "type": {"type": "string"},
                        "context": {"type": "string"},
                        "importance": {"type": "string"}
                    },
                    "required": ["name", "type", "importance"]
                }
            },
            "rewritten_query": {"type": "string"}
        },
        "required": ["attributes", "rewritten_query"]
    })
}

fn parse_attributes(response: &Value) -> Vec<QueryAttribute> {
    let Some(items) = response["attributes"].as_array() else {
        return Vec::new();
    };

    let mut attributes = Vec::new();
    for item in items {
        let name = item["name"].as_str().unwrap_or("").trim();
        let attr_type = item["type"].as_str().unwrap_or("").trim();
        if name.is_empty() || attr_type.is_empty() {
            continue;
        }

        attributes.push(QueryAttribute {
            name: name.to_string(),
            attr_type: attr_type.to_string(),
            context: item["context"].as_str().unwrap_or("").trim().to_string(),
            importance: Importance::parse(item["importance"].as_str().unwrap_or("medium").trim()),
        });
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ScriptedChatClient;

    #[tokio::test]
    async fn extracts_attributes_and_rewrite_from_chat() {
        let chat = Arc::new(ScriptedChatClient::new(vec![json!({
            "attributes": [
                {"name": "iPhone", "type": "topic", "importance": "high", "context": "product launch"},
                {"name": "Cupertino", "type": "location", "importance": "low"}
            ],
            "rewritten_query": "iPhone launch event in Cupertino"
        })]));
        let extractor = AttributeExtractor::new(chat);

        let extraction = extractor.extract("iphone cupertino??", true).await;
        assert!(!extraction.used_fallback);
        assert_eq!(extraction.attributes.len(), 2);
        assert_eq!(extraction.attributes[0].name, "iPhone");
        assert_eq!(extraction.attributes[0].confidence(), 0.9);
        assert_eq!(extraction.attributes[1].importance, Importance::Low);
        assert_eq!(
            extraction.rewritten_query.as_deref(),
            Some("iPhone launch event in Cupertino")
        );
    }

    #[tokio::test]
    async fn chat_failure_falls_back_to_rules() {
        let extractor = AttributeExtractor::new(Arc::new(ScriptedChatClient::failing()));

        let extraction = extractor.extract("rust async runtimes", true).await;
        assert!(extraction.used_fallback);
        assert!(extraction.rewritten_query.is_none());

        let names: Vec<&str> = extraction
            .attributes
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["rust", "async", "runtimes"]);
        assert!(extraction
            .attributes
            .iter()
            .all(|a| a.attr_type == "topic" && a.importance == Importance::Medium));
    }

    #[tokio::test]
    async fn malformed_entries_are_dropped() {
        let chat = Arc::new(ScriptedChatClient::new(vec![json!({
            "attributes": [
                {"name": "", "type": "topic", "importance": "high"},
                {"name": "valid", "type": "topic", "importance": "weird"}
            ]
        })]));
        let extractor = AttributeExtractor::new(chat);

        let extraction = extractor.extract("query", false).await;
        assert_eq!(extraction.attributes.len(), 1);
        assert_eq!(extraction.attributes[0].importance, Importance::Medium);
    }

    #[tokio::test]
    async fn unchanged_rewrite_is_treated_as_none() {
        let chat = Arc::new(ScriptedChatClient::new(vec![json!({
            "attributes": [{"name": "ai", "type": "topic", "importance": "medium"}],
            "rewritten_query": "ai"
        })]));
        let extractor = AttributeExtractor::new(chat);

        let extraction = extractor.extract("ai", true).await;
        assert!(extraction.rewritten_query.is_none());
    }
}
