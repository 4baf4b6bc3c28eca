//! 预测服务抽象
//!
//! 核心只依赖 `predict(kind, prompt, context)` 这一契约，传输方式由实现决定。

use async_trait::async_trait;
use thiserror::Error;

use aixterm_core::PredictionKind;

/// 预测错误类型
#[derive(Debug, Error)]
pub enum PredictionError {
    /// 网络请求失败（含超时）
    #[error("请求失败: {0}")]
    Network(String),

    /// 服务返回非 2xx 状态
    #[error("预测服务错误 {status}: {body}")]
    Api { status: u16, body: String },

    /// 响应解析失败
    #[error("解析响应失败: {0}")]
    Parse(String),
}

/// 预测服务
#[async_trait]
pub trait Predictor: Send + Sync {
    /// 发起一次预测
    ///
    /// # 参数
    /// - `kind`: 预测类型
    /// - `prompt`: 用户输入（补全时为当前命令前缀）
    /// - `context`: 终端最近输出
    async fn predict(
        &self,
        kind: PredictionKind,
        prompt: &str,
        context: &str,
    ) -> Result<String, PredictionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_error_display() {
        assert_eq!(
            PredictionError::Network("connection refused".to_string()).to_string(),
            "请求失败: connection refused"
        );
        assert_eq!(
            PredictionError::Api {
                status: 503,
                body: "busy".to_string()
            }
            .to_string(),
            "预测服务错误 503: busy"
        );
        assert_eq!(
            PredictionError::Parse("eof".to_string()).to_string(),
            "解析响应失败: eof"
        );
    }
}
