use thiserror::Error;

/// 字幕任务在编排层暴露的错误
///
/// 除了请求校验错误以外，所有错误最终都会被统一转换为 500 响应，
/// 这里区分类型只是为了日志和测试。
#[derive(Debug, Error)]
pub enum JobError {
    /// 请求缺少必填字段或请求体不是 JSON
    #[error("{0}")]
    Validation(String),

    /// 转写服务返回了 error 终态
    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    /// 轮询次数用尽，转写服务仍未进入终态
    #[error("Transcription did not finish after {attempts} status checks")]
    TranscriptionTimeout { attempts: u32 },

    /// 下载、音频提取、渲染、上传等步骤中的任意错误
    #[error("{0:#}")]
    Pipeline(#[from] anyhow::Error),
}

impl JobError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, JobError::Validation(_))
    }
}
