//! Wire types for the Anthropic Messages API

use serde::{Deserialize, Serialize};

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Usage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

/// Anthropic API message format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

/// Anthropic API request format
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Anthropic API response format
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicResponse {
    #[allow(dead_code)]
    pub id: String,
    pub content: Vec<AnthropicContent>,
    pub usage: Option<Usage>,
}

/// Content block in Anthropic response
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

impl AnthropicResponse {
    /// Concatenate every text block of the response
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_joins_text_blocks() {
        let json = r#"{
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "{\"goal\": "},
                {"type": "tool_use"},
                {"type": "text", "text": "\"plan\"}"}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 5}
        }"#;
        let response: AnthropicResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text(), "{\"goal\": \"plan\"}");
        assert_eq!(response.usage.map(|u| u.total()), Some(17));
    }

    #[test]
    fn test_request_omits_unset_temperature() {
        let request = AnthropicRequest {
            model: "m".to_string(),
            max_tokens: 10,
            system: Some("sys".to_string()),
            messages: vec![],
            temperature: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["system"], "sys");
    }
}
