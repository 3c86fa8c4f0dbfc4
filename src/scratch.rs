use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// 单次调用独占的临时目录，以及需要在退出时删除的文件列表
///
/// 文件按登记顺序删除，同一路径只会登记一次。
#[derive(Debug)]
pub struct ScratchSpace {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl ScratchSpace {
    /// 在 `root/add-captions/<request_id>` 下创建临时目录
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let request_id = format!(
            "{}_{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            uuid::Uuid::new_v4()
        );
        let dir = root.as_ref().join("add-captions").join(request_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("创建临时目录失败: {}", dir.display()))?;
        debug!("创建临时目录: {}", dir.display());

        Ok(Self {
            dir,
            files: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 在临时目录中分配一个文件路径并登记到清理列表
    pub fn file(&mut self, name: &str) -> PathBuf {
        let path = self.dir.join(name);
        if !self.files.contains(&path) {
            self.files.push(path.clone());
        }
        path
    }

    /// 已登记的文件（按登记顺序）
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// 删除所有已登记的文件，然后尝试删除临时目录
    ///
    /// 单个文件删除失败只记录日志，不会中断后续删除。返回删除失败的数量。
    pub fn cleanup(self) -> usize {
        let mut failures = 0;

        for path in &self.files {
            if !path.exists() {
                continue;
            }
            match std::fs::remove_file(path) {
                Ok(()) => debug!("已删除临时文件: {}", path.display()),
                Err(e) => {
                    failures += 1;
                    warn!("⚠️  [清理] 删除临时文件失败 {}: {}", path.display(), e);
                }
            }
        }

        // 目录中可能还有 ffmpeg 留下的其他文件，此时保留目录
        if let Err(e) = std::fs::remove_dir(&self.dir) {
            debug!("未删除临时目录 {}: {}", self.dir.display(), e);
        }

        info!(
            "🧹 [清理] 已处理 {} 个临时文件，失败 {} 个",
            self.files.len(),
            failures
        );
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_are_registered_once_in_order() {
        let root = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::create(root.path()).unwrap();

        let input = scratch.file("input.mp4");
        let audio = scratch.file("extracted_audio.mp3");
        let again = scratch.file("input.mp4");

        assert_eq!(input, again);
        assert_eq!(scratch.files(), &[input, audio]);
        assert!(scratch.dir().starts_with(root.path()));
    }

    #[test]
    fn cleanup_removes_existing_files_and_skips_missing_ones() {
        let root = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::create(root.path()).unwrap();

        let written = scratch.file("input.mp4");
        std::fs::write(&written, b"video").unwrap();
        let never_written = scratch.file("output.mp4");
        let dir = scratch.dir().to_path_buf();

        let failures = scratch.cleanup();

        assert_eq!(failures, 0);
        assert!(!written.exists());
        assert!(!never_written.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn cleanup_keeps_directory_with_unregistered_files() {
        let root = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::create(root.path()).unwrap();
        let registered = scratch.file("input.mp4");
        std::fs::write(&registered, b"video").unwrap();
        let stray = scratch.dir().join("ffmpeg2pass-0.log");
        std::fs::write(&stray, b"log").unwrap();

        assert_eq!(scratch.cleanup(), 0);
        assert!(!registered.exists());
        assert!(stray.exists());
    }
}
