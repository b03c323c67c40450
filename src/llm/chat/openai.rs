use async_trait::async_trait;
use reqwest::{ Client as HttpClient, header::AUTHORIZATION };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ build_http_client, ChatClient, CompletionResponse };
use crate::llm::{ GenerationParams, LlmConfig };

pub struct OpenAIChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

impl OpenAIChatClient {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>, http: HttpClient) -> Self {
        Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| "gpt-4o".to_string()),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "OpenAI API key is required".to_string())?;
        let http = build_http_client(config.timeout)?;
        Ok(Self::new(api_key, config.completion_model.clone(), config.base_url.clone(), http))
    }

    /// The chat API has no top-k knob, so `params.top_k` is dropped.
    fn request(&self, prompt: &str, params: &GenerationParams) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_output_tokens,
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(
        &self,
        prompt: &str,
        params: &GenerationParams
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));

        let req = self.request(prompt, params);

        let resp = self.http.post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<OpenAIResponse>()
            .await?;

        let content = resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| "No response from OpenAI API".to_string())?;

        Ok(CompletionResponse { response: content })
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

    fn client() -> OpenAIChatClient {
        OpenAIChatClient::new("sk-test".into(), None, None, HttpClient::new())
    }

    #[test]
    fn request_shape() {
        let params = GenerationParams { temperature: 0.5, top_p: 0.8, top_k: 40, max_output_tokens: 256 };
        let value = serde_json::to_value(client().request("hi", &params)).unwrap();

        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "hi");
        assert_eq!(value["max_tokens"], 256);
        assert_eq!(value["temperature"], 0.5);
        assert!(value.get("top_p").is_some());
        assert!(value.get("top_k").is_none());
    }

    #[test]
    fn choice_without_content_decodes() {
        let resp: OpenAIResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant"}}]}"#
        ).unwrap();
        assert!(resp.choices[0].message.content.is_none());
    }
}
