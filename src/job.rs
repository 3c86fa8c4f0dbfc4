use serde::{Deserialize, Serialize};

use crate::error::JobError;

pub const MISSING_FIELDS_MESSAGE: &str = "Video URL and output file path are required";
pub const MISSING_BODY_MESSAGE: &str = "No JSON data provided";

/// 调用方发送的原始请求体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJobRequest {
    /// 待处理视频的 URL
    pub video_url: Option<String>,
    /// 上传到存储桶时使用的对象键
    pub output_file: Option<String>,
}

/// 校验通过的字幕任务请求，在一次调用内不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub video_url: String,
    pub output_file: String,
}

impl JobRequest {
    pub fn new(video_url: impl Into<String>, output_file: impl Into<String>) -> Self {
        Self {
            video_url: video_url.into(),
            output_file: output_file.into(),
        }
    }

    /// 从请求体字节解析请求
    ///
    /// 空请求体或非 JSON 对象返回 "No JSON data provided"，
    /// 缺少任意字段（或字段为空字符串）返回缺少字段的提示。
    pub fn from_body(body: &[u8]) -> Result<Self, JobError> {
        let raw: RawJobRequest = match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(value @ serde_json::Value::Object(_)) => serde_json::from_value(value)
                .map_err(|_| JobError::Validation(MISSING_FIELDS_MESSAGE.to_string()))?,
            _ => return Err(JobError::Validation(MISSING_BODY_MESSAGE.to_string())),
        };
        Self::try_from(raw)
    }
}

impl TryFrom<RawJobRequest> for JobRequest {
    type Error = JobError;

    fn try_from(raw: RawJobRequest) -> Result<Self, Self::Error> {
        let present = |field: Option<String>| field.filter(|v| !v.trim().is_empty());
        match (present(raw.video_url), present(raw.output_file)) {
            (Some(video_url), Some(output_file)) => Ok(Self { video_url, output_file }),
            _ => Err(JobError::Validation(MISSING_FIELDS_MESSAGE.to_string())),
        }
    }
}

/// 一次调用的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// 处理成功，返回上传后的公开地址
    Success { output_url: String },
    /// 请求不合法（400）
    Rejected(String),
    /// 处理过程中出现任意错误（500）
    Failed(String),
}

impl JobOutcome {
    pub fn status_code(&self) -> u16 {
        match self {
            JobOutcome::Success { .. } => 200,
            JobOutcome::Rejected(_) => 400,
            JobOutcome::Failed(_) => 500,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }
}

impl From<JobError> for JobOutcome {
    fn from(err: JobError) -> Self {
        if err.is_client_error() {
            JobOutcome::Rejected(err.to_string())
        } else {
            JobOutcome::Failed(err.to_string())
        }
    }
}

/// 成功响应体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessBody {
    pub status: String,
    pub output_url: String,
}

/// 失败响应体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_request() {
        let body = br#"{"video_url": "https://example.com/a.mp4", "output_file": "clip42.mp4"}"#;
        let request = JobRequest::from_body(body).unwrap();
        assert_eq!(request, JobRequest::new("https://example.com/a.mp4", "clip42.mp4"));
    }

    #[test]
    fn missing_or_empty_fields_are_rejected() {
        for body in [
            &br#"{"video_url": "https://example.com/a.mp4"}"#[..],
            br#"{"output_file": "clip42.mp4"}"#,
            br#"{"video_url": "", "output_file": "clip42.mp4"}"#,
            br#"{}"#,
        ] {
            let err = JobRequest::from_body(body).unwrap_err();
            assert_eq!(err.to_string(), MISSING_FIELDS_MESSAGE);
            assert!(err.is_client_error());
        }
    }

    #[test]
    fn non_json_body_is_rejected() {
        for body in [&b""[..], b"not json", b"[1, 2]", b"null"] {
            let err = JobRequest::from_body(body).unwrap_err();
            assert_eq!(err.to_string(), MISSING_BODY_MESSAGE);
        }
    }

    #[test]
    fn outcome_status_codes() {
        assert_eq!(JobOutcome::Success { output_url: "u".into() }.status_code(), 200);
        assert_eq!(JobOutcome::from(JobError::Validation("x".into())).status_code(), 400);
        assert_eq!(
            JobOutcome::from(JobError::TranscriptionTimeout { attempts: 3 }).status_code(),
            500
        );
    }
}
