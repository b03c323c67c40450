use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use log::debug;

use super::{ build_http_client, ChatClient, CompletionResponse };
use crate::llm::{ GenerationParams, LlmConfig };

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

fn extract_text(resp: GeminiResponse) -> Result<String, Box<dyn StdError + Send + Sync>> {
    let candidate = resp.candidates
        .into_iter()
        .next()
        .ok_or("Gemini response contained no candidates")?;
    let content = candidate.content.ok_or("Gemini candidate has no content")?;
    let text: String = content.parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err("Gemini candidate text is empty".into());
    }
    Ok(text)
}

pub struct GeminiChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        http: HttpClient
    ) -> Self {
        Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Google API key is required for GeminiChatClient".to_string())?;
        let http = build_http_client(config.timeout)?;
        Ok(Self::new(api_key, config.completion_model.clone(), config.base_url.clone(), http))
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn complete(
        &self,
        prompt: &str,
        params: &GenerationParams
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let req = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart { text: Some(prompt.to_string()) }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: params.temperature,
                top_p: params.top_p,
                top_k: params.top_k,
                max_output_tokens: params.max_output_tokens,
            },
        };
        debug!("GeminiChatClient::complete() → model={} prompt_len={}", self.model, prompt.len());

        let resp = self.http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<GeminiResponse>()
            .await?;

        Ok(CompletionResponse { response: extract_text(resp)? })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GeminiResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn joins_candidate_parts() {
        let resp = parse(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello "},{"text":"there "}]}}]}"#
        );
        assert_eq!(extract_text(resp).unwrap(), "Hello there");
    }

    #[test]
    fn missing_or_blank_text_is_malformed() {
        assert!(extract_text(parse(r#"{"candidates":[]}"#)).is_err());
        assert!(extract_text(parse(r#"{}"#)).is_err());
        assert!(extract_text(parse(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#)).is_err());
        assert!(extract_text(parse(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#)).is_err());
    }

    #[test]
    fn request_shape() {
        let req = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".into()),
                parts: vec![GeminiPart { text: Some("hi".into()) }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.5,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 256,
            },
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(value["generationConfig"]["topK"], 40);
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 256);
    }
}
