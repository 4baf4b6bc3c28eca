//! LM Studio 预测客户端
//!
//! 通过 OpenAI 兼容的 `/v1/chat/completions` 接口请求本地模型。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use aixterm_core::{ChatCompletionRequest, ChatCompletionResponse, PredictionKind};

use crate::predictor::{PredictionError, Predictor};
use crate::prompt::build_messages;

/// 默认接口地址
pub const DEFAULT_ENDPOINT: &str = "http://localhost:1234/v1/chat/completions";

/// 预测客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Chat Completions 接口地址
    pub endpoint: String,
    /// 模型名称，缺省时由服务端决定
    pub model: Option<String>,
    pub temperature: f32,
    /// -1 表示不限制
    pub max_tokens: i32,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: None,
            temperature: 0.7,
            max_tokens: -1,
            timeout_secs: 30,
        }
    }
}

pub struct LmStudioPredictor {
    client: reqwest::Client,
    config: PredictorConfig,
}

impl LmStudioPredictor {
    pub fn new(config: PredictorConfig) -> Result<Self, PredictionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PredictionError::Network(format!("创建 HTTP 客户端失败: {}", e)))?;

        tracing::info!("[预测] 客户端已初始化: endpoint={}", config.endpoint);

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    fn build_request(
        &self,
        kind: PredictionKind,
        prompt: &str,
        context: &str,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: build_messages(kind, prompt, context),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        }
    }
}

/// 从响应体中取出第一个候选的内容
pub fn parse_completion(body: &str) -> Result<String, PredictionError> {
    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| PredictionError::Parse(e.to_string()))?;

    response
        .first_content()
        .map(|s| s.to_string())
        .ok_or_else(|| PredictionError::Parse("响应中没有 choices".to_string()))
}

#[async_trait]
impl Predictor for LmStudioPredictor {
    async fn predict(
        &self,
        kind: PredictionKind,
        prompt: &str,
        context: &str,
    ) -> Result<String, PredictionError> {
        let request = self.build_request(kind, prompt, context);

        tracing::debug!("[预测] 发起请求: kind={}, prompt={:?}", kind, prompt);

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| PredictionError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PredictionError::Network(format!("读取响应失败: {}", e)))?;

        if !status.is_success() {
            return Err(PredictionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        parse_completion(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PredictorConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.max_tokens, -1);
        assert!(config.model.is_none());
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"ckout main"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "ckout main");
    }

    #[test]
    fn test_parse_completion_errors() {
        assert!(matches!(
            parse_completion("not json"),
            Err(PredictionError::Parse(_))
        ));
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(PredictionError::Parse(_))
        ));
    }

    #[test]
    fn test_build_request_uses_config() {
        let predictor = LmStudioPredictor::new(PredictorConfig {
            model: Some("qwen2.5-coder".to_string()),
            temperature: 0.2,
            ..Default::default()
        })
        .unwrap();

        let request = predictor.build_request(PredictionKind::Autocomplete, "gi", "");
        assert_eq!(request.model.as_deref(), Some("qwen2.5-coder"));
        assert_eq!(request.temperature, 0.2);
        assert!(!request.stream);
        assert_eq!(request.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let predictor = LmStudioPredictor::new(PredictorConfig {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();

        let result = predictor
            .predict(PredictionKind::Autocomplete, "gi", "")
            .await;
        assert!(matches!(result, Err(PredictionError::Network(_))));
    }
}
