use tracing::debug;

use crate::transcriber::Word;

/// 默认每批处理的单词数
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// 字幕文字样式
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    /// fontconfig 字体名（未指定字体文件时使用）
    pub font: String,
    /// 字体文件路径，优先于 `font`
    pub font_file: Option<String>,
    pub font_size: u32,
    pub font_color: String,
    pub box_color: String,
    /// 字幕与画面底边的距离（像素），边距区域透明
    pub margin: u32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font: "Arial".to_string(),
            font_file: None,
            font_size: 50,
            font_color: "white".to_string(),
            box_color: "black".to_string(),
            margin: 0,
        }
    }
}

/// 字幕叠加片段：在 `[start, end)` 时间段内显示在画面底部居中
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionClip {
    pub text: String,
    /// 开始时间（秒）
    pub start: f64,
    /// 结束时间（秒），不晚于视频时长且不早于开始时间
    pub end: f64,
    /// 片段宽度与画面同宽，高度由文字决定
    pub frame_width: u32,
    pub frame_height: u32,
}

impl CaptionClip {
    /// 显示时长（秒）
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// 将单词列表按批次转换为字幕片段
///
/// 批次只用于控制内存峰值，输出顺序与输入一致。开始时间不早于视频时长的单词被跳过，
/// 结束时间截断到视频时长。
pub fn build_caption_clips(
    words: &[Word],
    frame_width: u32,
    frame_height: u32,
    video_duration: f64,
    batch_size: usize,
) -> Vec<CaptionClip> {
    let batch_size = batch_size.max(1);
    let mut clips = Vec::with_capacity(words.len());

    for (batch_index, batch) in words.chunks(batch_size).enumerate() {
        let mut batch_clips = Vec::with_capacity(batch.len());

        for word in batch {
            let start = word.start as f64 / 1000.0;
            let end = word.end as f64 / 1000.0;

            if start >= video_duration {
                continue;
            }

            // 结束时间保存截断值本身，时长由它推导
            let end = end.min(video_duration).max(start);
            if end == start {
                debug!("单词 {:?} 的显示时长为 0 (start={:.3}s)", word.text, start);
            }

            batch_clips.push(CaptionClip {
                text: word.text.clone(),
                start,
                end,
                frame_width,
                frame_height,
            });
        }

        debug!(
            "📦 [字幕] 第 {} 批: {} 个单词 -> {} 个片段",
            batch_index + 1,
            batch.len(),
            batch_clips.len()
        );
        clips.append(&mut batch_clips);
    }

    clips
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(words: &[Word], duration: f64) -> Vec<CaptionClip> {
        build_caption_clips(words, 1280, 720, duration, DEFAULT_BATCH_SIZE)
    }

    #[test]
    fn converts_milliseconds_to_seconds() {
        let clips = build(&[Word::new("hi", 500, 900)], 10.0);

        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].text, "hi");
        assert!((clips[0].start - 0.5).abs() < 1e-9);
        assert!((clips[0].duration() - 0.4).abs() < 1e-9);
        assert_eq!((clips[0].frame_width, clips[0].frame_height), (1280, 720));
    }

    #[test]
    fn skips_words_starting_after_the_video() {
        let clips = build(&[Word::new("late", 15000, 15400)], 10.0);
        assert!(clips.is_empty());

        let clips = build(&[Word::new("edge", 10000, 10300)], 10.0);
        assert!(clips.is_empty());
    }

    #[test]
    fn clamps_end_to_video_duration() {
        let clips = build(&[Word::new("tail", 9800, 10500)], 10.0);

        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].end, 10.0);
        assert!((clips[0].duration() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn keeps_zero_length_clips() {
        let clips = build(&[Word::new("blip", 4000, 4000)], 10.0);
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].duration(), 0.0);

        let clips = build(&[Word::new("backwards", 4000, 3500)], 10.0);
        assert_eq!(clips[0].duration(), 0.0);
    }

    #[test]
    fn batching_preserves_word_order() {
        let words: Vec<Word> = (0..23)
            .map(|i| Word::new(format!("w{}", i), i * 400, i * 400 + 300))
            .collect();

        for batch_size in [1, 2, 5, 7, 23, 100] {
            let clips = build_caption_clips(&words, 640, 360, 60.0, batch_size);
            let texts: Vec<&str> = clips.iter().map(|c| c.text.as_str()).collect();
            let expected: Vec<String> = (0..23).map(|i| format!("w{}", i)).collect();
            assert_eq!(texts, expected, "batch_size={}", batch_size);
        }
    }

    #[test]
    fn every_clip_stays_inside_the_video() {
        let duration = 7.25;
        let words: Vec<Word> = (0..40)
            .map(|i| Word::new(format!("w{}", i), i * 230, i * 230 + 700))
            .collect();

        let clips = build(&words, duration);

        assert!(!clips.is_empty());
        assert!(clips.len() < words.len());
        for clip in &clips {
            assert!(clip.start < duration, "{:?}", clip);
            assert!(clip.end <= duration, "{:?}", clip);
            assert!(clip.end >= clip.start, "{:?}", clip);
        }
    }

    #[test]
    fn clamped_end_never_rounds_past_the_video() {
        let duration = 3.3333333333333335;
        let clips = build(&[Word::new("w", 280, 5000)], duration);

        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].end, duration);
        assert!(clips[0].end >= clips[0].start);
    }

    #[test]
    fn zero_batch_size_is_treated_as_one() {
        let words = vec![Word::new("a", 0, 100), Word::new("b", 100, 200)];
        let clips = build_caption_clips(&words, 640, 360, 1.0, 0);
        assert_eq!(clips.len(), 2);
    }
}
