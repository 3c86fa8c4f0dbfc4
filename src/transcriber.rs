use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::JobError;

/// 转写任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl TranscriptStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TranscriptStatus::Completed | TranscriptStatus::Error)
    }
}

/// 单词级时间戳（毫秒）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start: u64,
    pub end: u64,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Word {
    pub fn new(text: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            confidence: None,
        }
    }
}

/// 转写服务返回的任务信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: String,
    pub status: TranscriptStatus,
    /// 只有 completed 状态才会带上单词列表
    #[serde(default)]
    pub words: Option<Vec<Word>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// 转写服务接口
#[async_trait]
pub trait TranscriptionApi: Send + Sync {
    /// 提交音频文件，返回新建的转写任务
    async fn submit(&self, audio_path: &Path) -> Result<Transcript>;

    /// 查询转写任务的当前状态
    async fn fetch(&self, transcript_id: &str) -> Result<Transcript>;
}

/// 轮询策略：固定间隔，最多查询 `max_attempts` 次
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 400,
        }
    }
}

/// 提交音频并等待转写进入终态，返回单词列表
pub async fn transcribe(
    api: &dyn TranscriptionApi,
    audio_path: &Path,
    policy: PollPolicy,
) -> Result<Vec<Word>, JobError> {
    let transcript = api
        .submit(audio_path)
        .await
        .context("提交转写任务失败")?;
    info!("📝 [转写] 已提交转写任务: id={}", transcript.id);
    wait_for_completion(api, transcript, policy).await
}

/// 轮询直到转写完成或失败
///
/// error 终态直接返回服务端的错误信息；次数用尽返回超时错误。
pub async fn wait_for_completion(
    api: &dyn TranscriptionApi,
    mut transcript: Transcript,
    policy: PollPolicy,
) -> Result<Vec<Word>, JobError> {
    let start = Instant::now();
    let mut attempts = 0;

    loop {
        match transcript.status {
            TranscriptStatus::Completed => {
                let words = transcript.words.unwrap_or_default();
                info!(
                    "✅ [转写] 转写完成，共 {} 个单词，等待 {:.2}秒",
                    words.len(),
                    start.elapsed().as_secs_f64()
                );
                return Ok(words);
            }
            TranscriptStatus::Error => {
                let message = transcript
                    .error
                    .unwrap_or_else(|| "unknown error".to_string());
                return Err(JobError::TranscriptionFailed(message));
            }
            TranscriptStatus::Queued | TranscriptStatus::Processing => {}
        }

        if attempts >= policy.max_attempts {
            return Err(JobError::TranscriptionTimeout { attempts });
        }

        debug!(
            "⏳ [转写] 任务 {} 状态: {:?}，{:.1}秒后重新查询",
            transcript.id,
            transcript.status,
            policy.interval.as_secs_f64()
        );
        tokio::time::sleep(policy.interval).await;
        attempts += 1;
        transcript = api
            .fetch(&transcript.id)
            .await
            .context("查询转写状态失败")?;
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Serialize)]
struct TranscriptRequest<'a> {
    audio_url: &'a str,
}

/// AssemblyAI REST 客户端
pub struct AssemblyAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AssemblyAiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .context("创建 HTTP 客户端失败")?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v2/{}", self.base_url, path)
    }

    async fn read_transcript(response: reqwest::Response) -> Result<Transcript> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("转写服务返回错误: HTTP {} - {}", status, error_text);
        }
        response.json().await.context("解析转写结果失败")
    }

    /// 上传音频文件，返回服务端可访问的地址
    async fn upload_audio(&self, audio_path: &Path) -> Result<String> {
        let audio = tokio::fs::read(audio_path)
            .await
            .with_context(|| format!("读取音频文件失败: {}", audio_path.display()))?;

        let response = self
            .client
            .post(self.endpoint("upload"))
            .header("authorization", &self.api_key)
            .body(audio)
            .send()
            .await
            .context("上传音频失败")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("上传音频失败: HTTP {} - {}", status, error_text);
        }

        let upload: UploadResponse = response.json().await.context("解析上传结果失败")?;
        Ok(upload.upload_url)
    }
}

#[async_trait]
impl TranscriptionApi for AssemblyAiClient {
    async fn submit(&self, audio_path: &Path) -> Result<Transcript> {
        let audio_url = self.upload_audio(audio_path).await?;
        debug!("音频已上传: {}", audio_url);

        let response = self
            .client
            .post(self.endpoint("transcript"))
            .header("authorization", &self.api_key)
            .json(&TranscriptRequest { audio_url: &audio_url })
            .send()
            .await
            .context("创建转写任务失败")?;

        Self::read_transcript(response).await
    }

    async fn fetch(&self, transcript_id: &str) -> Result<Transcript> {
        let response = self
            .client
            .get(self.endpoint(&format!("transcript/{}", transcript_id)))
            .header("authorization", &self.api_key)
            .send()
            .await
            .context("查询转写任务失败")?;

        Self::read_transcript(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 按顺序返回预设状态的假转写服务
    struct ScriptedApi {
        statuses: Mutex<VecDeque<Transcript>>,
        fetches: Mutex<u32>,
    }

    impl ScriptedApi {
        fn new(statuses: Vec<Transcript>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                fetches: Mutex::new(0),
            }
        }

        fn next(&self) -> Transcript {
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| transcript(TranscriptStatus::Processing))
        }
    }

    #[async_trait]
    impl TranscriptionApi for ScriptedApi {
        async fn submit(&self, _audio_path: &Path) -> Result<Transcript> {
            Ok(self.next())
        }

        async fn fetch(&self, _transcript_id: &str) -> Result<Transcript> {
            *self.fetches.lock().unwrap() += 1;
            Ok(self.next())
        }
    }

    fn transcript(status: TranscriptStatus) -> Transcript {
        Transcript {
            id: "tx-1".to_string(),
            status,
            words: None,
            error: None,
        }
    }

    fn fast_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::ZERO,
            max_attempts,
        }
    }

    #[tokio::test]
    async fn error_status_aborts_with_service_message() {
        let mut failed = transcript(TranscriptStatus::Error);
        failed.error = Some("bad audio".to_string());
        let api = ScriptedApi::new(vec![
            transcript(TranscriptStatus::Queued),
            transcript(TranscriptStatus::Processing),
            failed,
        ]);

        let err = transcribe(&api, Path::new("audio.mp3"), fast_policy(10))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Transcription failed: bad audio");
        assert_eq!(*api.fetches.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn completed_transcript_returns_words() {
        let mut done = transcript(TranscriptStatus::Completed);
        done.words = Some(vec![Word::new("hi", 500, 900), Word::new("there", 950, 1200)]);
        let api = ScriptedApi::new(vec![transcript(TranscriptStatus::Queued), done]);

        let words = transcribe(&api, Path::new("audio.mp3"), fast_policy(10))
            .await
            .unwrap();

        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "hi");
    }

    #[tokio::test]
    async fn exhausting_the_poll_budget_is_a_timeout() {
        let api = ScriptedApi::new(vec![transcript(TranscriptStatus::Queued)]);

        let err = transcribe(&api, Path::new("audio.mp3"), fast_policy(3))
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::TranscriptionTimeout { attempts: 3 }));
        assert_eq!(*api.fetches.lock().unwrap(), 3);
    }

    #[test]
    fn deserializes_service_payload() {
        let json = r#"{
            "id": "abc",
            "status": "completed",
            "text": "hi there",
            "words": [
                {"text": "hi", "start": 500, "end": 900, "confidence": 0.98, "speaker": null},
                {"text": "there", "start": 950, "end": 1200, "confidence": 0.91, "speaker": null}
            ],
            "error": null
        }"#;
        let transcript: Transcript = serde_json::from_str(json).unwrap();
        assert_eq!(transcript.status, TranscriptStatus::Completed);
        assert!(transcript.status.is_terminal());
        let words = transcript.words.unwrap();
        assert_eq!(words[1], Word { text: "there".into(), start: 950, end: 1200, confidence: Some(0.91) });
    }

    #[test]
    fn queued_payload_without_words() {
        let transcript: Transcript =
            serde_json::from_str(r#"{"id": "abc", "status": "queued", "words": null}"#).unwrap();
        assert_eq!(transcript.status, TranscriptStatus::Queued);
        assert!(!transcript.status.is_terminal());
        assert!(transcript.words.is_none());
    }
}
