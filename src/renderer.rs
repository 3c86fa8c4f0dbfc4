use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::captions::{CaptionClip, CaptionStyle};
use crate::media::{run_command, VideoInfo};

/// 固定的输出编码参数，偏向速度而不是画质
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderProfile {
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    /// 编码线程数
    pub threads: u32,
}

impl Default for RenderProfile {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "ultrafast".to_string(),
            threads: 2,
        }
    }
}

/// 原视频加上所有字幕片段组成的合成时间线，尺寸与原视频一致
#[derive(Debug, Clone)]
pub struct CompositeTimeline {
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub style: CaptionStyle,
    pub clips: Vec<CaptionClip>,
}

impl CompositeTimeline {
    pub fn new(video: &VideoInfo, style: CaptionStyle, clips: Vec<CaptionClip>) -> Self {
        Self {
            source: video.path.clone(),
            width: video.width,
            height: video.height,
            fps: video.fps,
            style,
            clips,
        }
    }

    /// 生成 filter_complex 脚本：缩放到原尺寸后依次叠加每个字幕
    pub fn filter_graph(&self) -> String {
        let mut graph = format!("[0:v]scale={}:{}", self.width, self.height);
        for clip in &self.clips {
            graph.push_str(",drawtext=");
            graph.push_str(&escape_filtergraph(&drawtext_options(clip, &self.style)));
        }
        graph.push_str("[v]");
        graph
    }

    fn command_args(&self, output: &Path, filter_script: &Path, profile: &RenderProfile) -> Vec<String> {
        vec![
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            self.source.to_string_lossy().to_string(),
            "-filter_complex_script".to_string(),
            filter_script.to_string_lossy().to_string(),
            "-map".to_string(),
            "[v]".to_string(),
            "-map".to_string(),
            "0:a?".to_string(),
            "-r".to_string(),
            format!("{}", self.fps),
            "-c:v".to_string(),
            profile.video_codec.clone(),
            "-preset".to_string(),
            profile.preset.clone(),
            "-threads".to_string(),
            profile.threads.to_string(),
            "-c:a".to_string(),
            profile.audio_codec.clone(),
            output.to_string_lossy().to_string(),
        ]
    }

    /// 写出滤镜脚本并调用 ffmpeg 渲染
    pub async fn render(&self, output: &Path, filter_script: &Path, profile: &RenderProfile) -> Result<()> {
        tokio::fs::write(filter_script, self.filter_graph())
            .await
            .with_context(|| format!("写入滤镜脚本失败: {}", filter_script.display()))?;

        let result = run_command("ffmpeg", &self.command_args(output, filter_script, profile)).await?;

        if !result.status.success() {
            anyhow::bail!(
                "视频渲染失败: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }

        Ok(())
    }
}

/// 单个字幕片段的 drawtext 参数（选项层级，尚未做滤镜图转义）
fn drawtext_options(clip: &CaptionClip, style: &CaptionStyle) -> String {
    let font = match &style.font_file {
        Some(file) => format!("fontfile={}", quote_option(file)),
        None => format!("font={}", quote_option(&style.font)),
    };

    [
        font,
        format!("text={}", quote_option(&escape_text_expansion(&clip.text))),
        format!("fontsize={}", style.font_size),
        format!("fontcolor={}", style.font_color),
        "box=1".to_string(),
        format!("boxcolor={}", style.box_color),
        format!("x=({}-text_w)/2", clip.frame_width),
        format!("y={}-text_h-{}", clip.frame_height, style.margin),
        format!("enable=between(t,{:.3},{:.3})", clip.start, clip.end),
    ]
    .join(":")
}

/// drawtext 文本展开层：`\` 和 `%` 需要转义
fn escape_text_expansion(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// 选项值层：整体用单引号包裹，内部的单引号写成 `'\''`
fn quote_option(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// 滤镜图层：转义滤镜图语法中的特殊字符
fn escape_filtergraph(args: &str) -> String {
    let mut escaped = String::with_capacity(args.len());
    for c in args.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video() -> VideoInfo {
        VideoInfo {
            path: PathBuf::from("/tmp/job/input.mp4"),
            duration: 10.0,
            width: 1280,
            height: 720,
            fps: 25.0,
            has_audio: true,
        }
    }

    fn clip(text: &str, start: f64, duration: f64) -> CaptionClip {
        CaptionClip {
            text: text.to_string(),
            start,
            end: start + duration,
            frame_width: 1280,
            frame_height: 720,
        }
    }

    #[test]
    fn empty_timeline_only_scales() {
        let timeline = CompositeTimeline::new(&video(), CaptionStyle::default(), Vec::new());
        assert_eq!(timeline.filter_graph(), "[0:v]scale=1280:720[v]");
    }

    #[test]
    fn each_clip_becomes_a_timed_drawtext() {
        let timeline = CompositeTimeline::new(
            &video(),
            CaptionStyle::default(),
            vec![clip("hi", 0.5, 0.4), clip("there", 1.0, 0.25)],
        );

        let graph = timeline.filter_graph();

        assert!(graph.starts_with("[0:v]scale=1280:720,drawtext="));
        assert!(graph.ends_with("[v]"));
        assert_eq!(graph.matches(",drawtext=").count(), 2);
        assert!(graph.contains(r"text=\'hi\'"));
        assert!(graph.contains(r"enable=between(t\,0.500\,0.900)"));
        assert!(graph.contains(r"enable=between(t\,1.000\,1.250)"));
        assert!(graph.contains("x=(1280-text_w)/2:y=720-text_h-0"));
        assert!(graph.contains("fontsize=50:fontcolor=white:box=1:boxcolor=black"));
    }

    #[test]
    fn text_is_escaped_for_every_parsing_level() {
        assert_eq!(escape_text_expansion(r"50% \o/"), r"50\% \\o/");
        assert_eq!(quote_option("it's"), r"'it'\''s'");
        assert_eq!(escape_filtergraph(r"'a,b'"), r"\'a\,b\'");

        let options = drawtext_options(&clip("it's", 0.0, 1.0), &CaptionStyle::default());
        assert!(options.contains(r"text='it'\''s'"));
    }

    #[test]
    fn font_file_takes_precedence_over_font_name() {
        let style = CaptionStyle {
            font_file: Some("/usr/share/fonts/Arial.ttf".to_string()),
            ..CaptionStyle::default()
        };
        let options = drawtext_options(&clip("hi", 0.0, 1.0), &style);
        assert!(options.starts_with("fontfile='/usr/share/fonts/Arial.ttf'"));
    }

    #[test]
    fn render_uses_profile_and_source_fps() {
        let timeline = CompositeTimeline::new(&video(), CaptionStyle::default(), Vec::new());
        let args = timeline.command_args(
            Path::new("/tmp/job/output.mp4"),
            Path::new("/tmp/job/filter_complex.txt"),
            &RenderProfile::default(),
        );
        let value_of = |flag: &str| {
            let i = args.iter().position(|a| a == flag).unwrap();
            args[i + 1].clone()
        };

        assert_eq!(value_of("-c:v"), "libx264");
        assert_eq!(value_of("-c:a"), "aac");
        assert_eq!(value_of("-preset"), "ultrafast");
        assert_eq!(value_of("-threads"), "2");
        assert_eq!(value_of("-r"), "25");
        assert_eq!(value_of("-filter_complex_script"), "/tmp/job/filter_complex.txt");
        assert_eq!(args.last().unwrap(), "/tmp/job/output.mp4");
    }
}
