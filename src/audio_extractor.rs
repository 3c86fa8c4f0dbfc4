use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::media::run_command;

/// 音频提取器，从视频中提取音频
pub struct AudioExtractor {
    input_path: PathBuf,
    sample_rate: u32,
}

impl AudioExtractor {
    pub fn new(input_path: impl AsRef<Path>, sample_rate: u32) -> Self {
        Self {
            input_path: input_path.as_ref().to_path_buf(),
            sample_rate,
        }
    }

    fn command_args(&self, output_path: &Path) -> Vec<String> {
        vec![
            "-loglevel".to_string(),
            "error".to_string(), // 只显示错误信息
            "-i".to_string(),
            self.input_path.to_string_lossy().to_string(),
            "-vn".to_string(), // 不包含视频
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(), // 不论源音频如何，统一重采样
            "-acodec".to_string(),
            "libmp3lame".to_string(),
            "-y".to_string(), // 覆盖输出文件
            output_path.to_string_lossy().to_string(),
        ]
    }

    /// 提取音频到 mp3 文件
    pub async fn extract_to_file(&self, output_path: impl AsRef<Path>) -> Result<()> {
        let output_path = output_path.as_ref();

        let output = run_command("ffmpeg", &self.command_args(output_path)).await?;

        if !output.status.success() {
            anyhow::bail!(
                "音频提取失败: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(())
    }
}
