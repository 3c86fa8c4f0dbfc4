use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

use crate::audio_extractor::AudioExtractor;
use crate::renderer::{CompositeTimeline, RenderProfile};
use crate::video_processor::VideoProcessor;

/// 打开视频后读取到的基本信息
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub path: PathBuf,
    /// 时长（秒）
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub has_audio: bool,
}

/// 已打开的视频，必须在调用结束前显式关闭
pub trait VideoHandle: Send {
    fn info(&self) -> &VideoInfo;

    fn close(self: Box<Self>);
}

/// 视频读写工具
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// 打开视频并读取时长、分辨率、帧率
    fn open(&self, path: &Path) -> Result<Box<dyn VideoHandle>>;

    /// 以固定采样率提取音轨
    async fn extract_audio(&self, video: &VideoInfo, output: &Path, sample_rate: u32) -> Result<()>;

    /// 将合成时间线渲染到输出文件，`filter_script` 用于存放滤镜脚本
    async fn render(
        &self,
        timeline: &CompositeTimeline,
        output: &Path,
        filter_script: &Path,
        profile: &RenderProfile,
    ) -> Result<()>;
}

/// 运行外部命令并收集输出
///
/// 调用被取消（future 被丢弃）时子进程会被杀死，不会在临时目录清理之后继续写文件。
pub(crate) async fn run_command(program: &str, args: &[String]) -> Result<Output> {
    Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("执行 {} 命令失败", program))
}

/// 基于 FFmpeg 的实现：ffmpeg-next 负责读取元信息，ffmpeg 命令行负责转码
#[derive(Debug, Default, Clone)]
pub struct FfmpegToolkit;

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoHandle>> {
        let processor = VideoProcessor::new(path)?;
        Ok(Box::new(processor.open()?))
    }

    async fn extract_audio(&self, video: &VideoInfo, output: &Path, sample_rate: u32) -> Result<()> {
        if !video.has_audio {
            anyhow::bail!("视频中没有音轨: {}", video.path.display());
        }
        AudioExtractor::new(&video.path, sample_rate)
            .extract_to_file(output)
            .await
    }

    async fn render(
        &self,
        timeline: &CompositeTimeline,
        output: &Path,
        filter_script: &Path,
        profile: &RenderProfile,
    ) -> Result<()> {
        timeline.render(output, filter_script, profile).await
    }
}
