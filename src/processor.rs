use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::captions::build_caption_clips;
use crate::config::AppConfig;
use crate::downloader::{HttpFetcher, VideoFetcher};
use crate::error::JobError;
use crate::gcs_client::{GcsClient, ObjectStore};
use crate::job::{JobOutcome, JobRequest, RawJobRequest};
use crate::media::{FfmpegToolkit, MediaToolkit, VideoHandle};
use crate::renderer::CompositeTimeline;
use crate::scratch::ScratchSpace;
use crate::transcriber::{self, AssemblyAiClient, TranscriptionApi};

/// 一次调用中获取到的资源，未获取的保持为 None
///
/// 释放时只处理实际获取过的资源；Drop 时同样会释放，保证调用被取消时也能清理。
#[derive(Default)]
struct JobResources {
    scratch: Option<ScratchSpace>,
    video: Option<Box<dyn VideoHandle>>,
    timeline: Option<CompositeTimeline>,
}

impl JobResources {
    fn release(&mut self) {
        if let Some(video) = self.video.take() {
            video.close();
        }
        if let Some(timeline) = self.timeline.take() {
            debug!("释放合成时间线: {} 个字幕片段", timeline.clips.len());
        }
        if let Some(scratch) = self.scratch.take() {
            scratch.cleanup();
        }
    }
}

impl Drop for JobResources {
    fn drop(&mut self) {
        self.release();
    }
}

/// 字幕流水线：下载 -> 提取音频 -> 转写 -> 生成字幕 -> 渲染 -> 上传
pub struct CaptionPipeline {
    config: AppConfig,
    fetcher: Arc<dyn VideoFetcher>,
    transcriber: Arc<dyn TranscriptionApi>,
    media: Arc<dyn MediaToolkit>,
    store: Arc<dyn ObjectStore>,
}

impl CaptionPipeline {
    pub fn new(
        config: AppConfig,
        fetcher: Arc<dyn VideoFetcher>,
        transcriber: Arc<dyn TranscriptionApi>,
        media: Arc<dyn MediaToolkit>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            fetcher,
            transcriber,
            media,
            store,
        }
    }

    /// 使用 HTTP 下载、AssemblyAI、FFmpeg 和 Cloud Storage 构建流水线
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let api_key = config
            .transcription
            .api_key
            .clone()
            .context("缺少转写服务 API Key（ASSEMBLYAI_API_KEY 或 [transcription] api_key）")?;

        let fetcher = HttpFetcher::new(config.http_timeout)?;
        let transcriber =
            AssemblyAiClient::new(api_key, &config.transcription.base_url, config.http_timeout)?;
        let store = GcsClient::new(
            &config.storage.endpoint,
            &config.storage.bucket,
            &config.storage.public_base_url,
            config.storage.credentials(),
            config.http_timeout,
        )?;

        Ok(Self::new(
            config,
            Arc::new(fetcher),
            Arc::new(transcriber),
            Arc::new(FfmpegToolkit),
            Arc::new(store),
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 解析请求体并执行任务；请求不合法时不会触碰任何外部资源
    pub async fn handle_body(&self, body: &[u8]) -> JobOutcome {
        self.run_validated(JobRequest::from_body(body)).await
    }

    /// 校验已解析的请求字段后执行任务，命令行模式使用
    pub async fn handle_request(&self, raw: RawJobRequest) -> JobOutcome {
        self.run_validated(JobRequest::try_from(raw)).await
    }

    async fn run_validated(&self, request: Result<JobRequest, JobError>) -> JobOutcome {
        match request {
            Ok(request) => self.run(request).await,
            Err(e) => {
                info!("请求校验失败: {}", e);
                JobOutcome::from(e)
            }
        }
    }

    /// 执行一次字幕任务，所有错误都会被转换为失败结果
    pub async fn run(&self, request: JobRequest) -> JobOutcome {
        let total_start = Instant::now();
        info!(
            "🎬 [字幕任务] 开始处理: video_url={}, output_file={}",
            request.video_url, request.output_file
        );

        let mut resources = JobResources::default();
        let result = self.process(&request, &mut resources).await;

        info!("🧹 [字幕任务] 正在清理资源...");
        resources.release();

        match result {
            Ok(output_url) => {
                info!(
                    "🎉 [字幕任务] 处理完成！总耗时: {:.2}秒，输出: {}",
                    total_start.elapsed().as_secs_f64(),
                    output_url
                );
                JobOutcome::Success { output_url }
            }
            Err(e) => {
                error!(
                    "❌ [字幕任务] 处理失败（耗时 {:.2}秒）: {}",
                    total_start.elapsed().as_secs_f64(),
                    e
                );
                JobOutcome::from(e)
            }
        }
    }

    async fn process(&self, request: &JobRequest, resources: &mut JobResources) -> Result<String, JobError> {
        let scratch = resources
            .scratch
            .insert(ScratchSpace::create(&self.config.scratch_root)?);

        // 1. 下载视频
        let step = Instant::now();
        info!("⏳ [字幕任务] 正在下载视频: {}", request.video_url);
        let video_bytes = self
            .fetcher
            .fetch(&request.video_url)
            .await?;
        let video_path = scratch.file("input.mp4");
        tokio::fs::write(&video_path, &video_bytes)
            .await
            .with_context(|| format!("保存视频失败: {}", video_path.display()))?;
        info!(
            "✅ [字幕任务] 下载完成: {} 字节，耗时: {:.2}秒",
            video_bytes.len(),
            step.elapsed().as_secs_f64()
        );
        drop(video_bytes);

        // 2. 打开视频
        let video = self.media.open(&video_path).context("加载视频失败")?;
        let info = video.info().clone();
        resources.video = Some(video);
        info!(
            "✅ [字幕任务] 视频已加载: 时长 {:.2}秒，分辨率 {}x{}，帧率 {:.2} fps",
            info.duration, info.width, info.height, info.fps
        );

        // 3. 提取音频
        let step = Instant::now();
        let audio_path = scratch.file("extracted_audio.mp3");
        self.media
            .extract_audio(&info, &audio_path, self.config.audio_sample_rate)
            .await
            .context("提取音频失败")?;
        info!(
            "✅ [字幕任务] 音频提取完成，耗时: {:.2}秒",
            step.elapsed().as_secs_f64()
        );

        // 4. 转写
        info!("⏳ [字幕任务] 正在转写音频...");
        let words = transcriber::transcribe(
            self.transcriber.as_ref(),
            &audio_path,
            self.config.transcription.poll,
        )
        .await?;

        // 5. 生成字幕片段
        let clips = build_caption_clips(
            &words,
            info.width,
            info.height,
            info.duration,
            self.config.caption_batch_size,
        );
        info!(
            "✅ [字幕任务] 生成 {} 个字幕片段（共 {} 个单词）",
            clips.len(),
            words.len()
        );
        drop(words);

        // 6. 合成并渲染
        let step = Instant::now();
        let timeline = resources.timeline.insert(CompositeTimeline::new(
            &info,
            self.config.caption_style.clone(),
            clips,
        ));
        let filter_path = scratch.file("filter_complex.txt");
        let output_path = scratch.file("output.mp4");
        info!("⏳ [字幕任务] 正在渲染视频...");
        self.media
            .render(timeline, &output_path, &filter_path, &self.config.render)
            .await
            .context("渲染视频失败")?;
        info!(
            "✅ [字幕任务] 渲染完成，耗时: {:.2}秒",
            step.elapsed().as_secs_f64()
        );

        // 7. 上传
        let step = Instant::now();
        info!("⏳ [字幕任务] 正在上传到: {}", request.output_file);
        self.store
            .upload(&output_path, &request.output_file)
            .await
            .context("上传结果失败")?;
        if self.config.storage.verify_upload {
            let exists = self
                .store
                .exists(&request.output_file)
                .await
                .context("确认上传结果失败")?;
            if !exists {
                return Err(anyhow::anyhow!("上传后未找到对象: {}", request.output_file).into());
            }
        }
        info!(
            "✅ [字幕任务] 上传完成，耗时: {:.2}秒",
            step.elapsed().as_secs_f64()
        );

        Ok(self.store.public_url(&request.output_file))
    }
}
