//! 预测请求数据模型
//!
//! 包含预测类型枚举和跨边界返回的结果结构。

use serde::{Deserialize, Serialize};

/// 预测类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    /// 根据自然语言生成命令
    CommandGeneration,
    /// 命令行内联补全
    Autocomplete,
    /// 解释命令或输出
    Explanation,
    /// 通用对话
    Generic,
}

impl PredictionKind {
    /// 宽松解析，未知类型回退为 `Generic`
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or(PredictionKind::Generic)
    }
}

impl std::fmt::Display for PredictionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictionKind::CommandGeneration => write!(f, "command_generation"),
            PredictionKind::Autocomplete => write!(f, "autocomplete"),
            PredictionKind::Explanation => write!(f, "explanation"),
            PredictionKind::Generic => write!(f, "generic"),
        }
    }
}

impl std::str::FromStr for PredictionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "command_generation" => Ok(PredictionKind::CommandGeneration),
            "autocomplete" => Ok(PredictionKind::Autocomplete),
            "explanation" => Ok(PredictionKind::Explanation),
            "generic" => Ok(PredictionKind::Generic),
            _ => Err(format!("未知的预测类型: {}", s)),
        }
    }
}

/// 预测结果
///
/// 失败以 `success: false` + `error` 表示，不会以错误形式穿越边界。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionResponse {
    pub fn ok(data: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

impl<E: std::fmt::Display> From<Result<String, E>> for PredictionResponse {
    fn from(result: Result<String, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_kind_roundtrip_names() {
        for kind in [
            PredictionKind::CommandGeneration,
            PredictionKind::Autocomplete,
            PredictionKind::Explanation,
            PredictionKind::Generic,
        ] {
            assert_eq!(kind.to_string().parse::<PredictionKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_prediction_kind_parse_lossy() {
        assert_eq!(
            PredictionKind::parse_lossy("AUTOCOMPLETE"),
            PredictionKind::Autocomplete
        );
        assert_eq!(
            PredictionKind::parse_lossy("summarize"),
            PredictionKind::Generic
        );
    }

    #[test]
    fn test_prediction_response_serialize() {
        let ok = serde_json::to_string(&PredictionResponse::ok("ls -la")).unwrap();
        assert_eq!(ok, r#"{"success":true,"data":"ls -la"}"#);

        let err = serde_json::to_string(&PredictionResponse::err("timeout")).unwrap();
        assert_eq!(err, r#"{"success":false,"error":"timeout"}"#);
    }

    #[test]
    fn test_prediction_response_from_result() {
        let resp: PredictionResponse = Err::<String, _>("boom").into();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("boom"));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// 任意字符串都能解析出类型，未知值回落到 Generic
        #[test]
        fn prop_parse_lossy_total(s in "\\PC{0,24}") {
            let kind = PredictionKind::parse_lossy(&s);
            let known = ["command_generation", "autocomplete", "explanation", "generic"];
            if !known.contains(&s.to_lowercase().as_str()) {
                prop_assert_eq!(kind, PredictionKind::Generic);
            } else {
                prop_assert_eq!(kind.to_string(), s.to_lowercase());
            }
        }
    }
}
