use ffmpeg_next as ffmpeg;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::media::{VideoHandle, VideoInfo};

/// 视频处理器，负责打开视频并读取元信息
pub struct VideoProcessor {
    input_path: PathBuf,
}

impl VideoProcessor {
    pub fn new(input_path: impl AsRef<Path>) -> Result<Self> {
        ffmpeg::init().context("初始化 FFmpeg 失败")?;

        // 设置 FFmpeg 日志级别为 ERROR，抑制警告和信息消息
        unsafe {
            ffmpeg::sys::av_log_set_level(ffmpeg::sys::AV_LOG_ERROR as i32);
        }

        Ok(Self {
            input_path: input_path.as_ref().to_path_buf(),
        })
    }

    /// 打开视频，读取时长、分辨率、帧率，并保持输入上下文直到关闭
    pub fn open(&self) -> Result<OpenedVideo> {
        let ictx = ffmpeg::format::input(&self.input_path)
            .with_context(|| format!("无法打开视频文件: {}", self.input_path.display()))?;

        let video_stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .context("未找到视频流")?;

        let decoder_context =
            ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
                .context("无法创建解码器上下文")?;

        let decoder = decoder_context
            .decoder()
            .video()
            .context("无法创建视频解码器")?;

        let fps = video_stream.avg_frame_rate();
        let fps_value = if fps.denominator() > 0 && fps.numerator() > 0 {
            fps.numerator() as f64 / fps.denominator() as f64
        } else {
            30.0 // 默认值
        };

        // 容器时长缺失时退回到视频流时长
        let duration = if ictx.duration() > 0 {
            ictx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
        } else {
            let time_base = video_stream.time_base();
            video_stream.duration() as f64 * time_base.numerator() as f64
                / time_base.denominator().max(1) as f64
        };
        if duration <= 0.0 {
            anyhow::bail!("无法读取视频时长: {}", self.input_path.display());
        }

        let has_audio = ictx.streams().best(ffmpeg::media::Type::Audio).is_some();

        let info = VideoInfo {
            path: self.input_path.clone(),
            duration,
            width: decoder.width(),
            height: decoder.height(),
            fps: fps_value,
            has_audio,
        };
        debug!("已打开视频: {:?}", info);

        Ok(OpenedVideo {
            info,
            input: InputContext(ictx),
        })
    }
}

struct InputContext(ffmpeg::format::context::Input);

// SAFETY: 上下文只由 OpenedVideo 独占持有，不会在线程间共享引用
unsafe impl Send for InputContext {}

/// 已打开的视频文件
pub struct OpenedVideo {
    info: VideoInfo,
    input: InputContext,
}

impl VideoHandle for OpenedVideo {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn close(self: Box<Self>) {
        let OpenedVideo { info, input } = *self;
        drop(input.0);
        debug!("已关闭视频: {}", info.path.display());
    }
}
