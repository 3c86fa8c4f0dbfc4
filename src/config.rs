use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::captions::{CaptionStyle, DEFAULT_BATCH_SIZE};
use crate::gcs_client::StorageCredentials;
use crate::renderer::RenderProfile;
use crate::transcriber::PollPolicy;

/// 转写服务配置
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    /// AssemblyAI API Key
    pub api_key: Option<String>,
    pub base_url: String,
    pub poll: PollPolicy,
}

/// 结果存储配置
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    /// XML API 地址
    pub endpoint: String,
    /// 公开访问地址前缀
    pub public_base_url: String,
    pub hmac_access_id: Option<String>,
    pub hmac_secret: Option<String>,
    pub access_token: Option<String>,
    /// 上传后是否用 HEAD 请求确认对象存在
    pub verify_upload: bool,
}

impl StorageConfig {
    /// HMAC 密钥优先，其次是静态 token，否则使用元数据服务
    pub fn credentials(&self) -> StorageCredentials {
        match (&self.hmac_access_id, &self.hmac_secret, &self.access_token) {
            (Some(access_id), Some(secret), _) => StorageCredentials::Hmac {
                access_id: access_id.clone(),
                secret: secret.clone(),
            },
            (_, _, Some(token)) => StorageCredentials::AccessToken(token.clone()),
            _ => StorageCredentials::MetadataServer,
        }
    }
}

/// 服务整体配置，构建流水线时显式传入
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub transcription: TranscriptionConfig,
    pub storage: StorageConfig,
    pub render: RenderProfile,
    pub caption_style: CaptionStyle,
    /// 每批构建的字幕片段数
    pub caption_batch_size: usize,
    /// 音频提取采样率（Hz）
    pub audio_sample_rate: u32,
    /// 临时目录根路径
    pub scratch_root: PathBuf,
    pub http_timeout: Duration,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            transcription: TranscriptionConfig {
                api_key: None,
                base_url: "https://api.assemblyai.com".to_string(),
                poll: PollPolicy::default(),
            },
            storage: StorageConfig {
                bucket: "make-video".to_string(),
                endpoint: "https://storage.googleapis.com".to_string(),
                public_base_url: "https://storage.googleapis.com".to_string(),
                hmac_access_id: None,
                hmac_secret: None,
                access_token: None,
                verify_upload: false,
            },
            render: RenderProfile::default(),
            caption_style: CaptionStyle::default(),
            caption_batch_size: DEFAULT_BATCH_SIZE,
            audio_sample_rate: 16000,
            scratch_root: env::temp_dir(),
            http_timeout: Duration::from_secs(300),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.caption_batch_size == 0 {
            anyhow::bail!("caption batch_size 必须大于 0");
        }
        if self.render.threads == 0 {
            anyhow::bail!("render threads 必须大于 0");
        }
        if self.transcription.poll.max_attempts == 0 {
            anyhow::bail!("transcription max_poll_attempts 必须大于 0");
        }
        if self.audio_sample_rate == 0 {
            anyhow::bail!("audio_sample_rate 必须大于 0");
        }
        if self.storage.bucket.trim().is_empty() {
            anyhow::bail!("storage bucket 不能为空");
        }
        Ok(())
    }
}

/// 单个配置来源：环境变量优先，其次是 INI 文件
struct Sources {
    ini: Option<configparser::ini::Ini>,
}

impl Sources {
    fn get(&self, env_key: &str, section: &str, key: &str) -> Option<String> {
        env::var(env_key)
            .ok()
            .or_else(|| {
                self.ini.as_ref().and_then(|ini| {
                    ini.get(section, key)
                        .or_else(|| ini.get("default", key))
                })
            })
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, env_key: &str, section: &str, key: &str) -> Result<Option<T>> {
        match self.get(env_key, section, key) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| anyhow::anyhow!("配置项 {}.{} 的值无效: {}", section, key, raw)),
            None => Ok(None),
        }
    }

    fn flag(&self, env_key: &str, section: &str, key: &str) -> Option<bool> {
        self.get(env_key, section, key)
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
    }
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    ///
    /// 命令行参数由调用方在返回值上覆盖。
    pub fn load(config_file: Option<&Path>) -> Result<AppConfig> {
        let ini = match config_file {
            Some(path) => Some(Self::read_ini(path)?),
            None => Self::default_location().map(|p| Self::read_ini(&p)).transpose()?,
        };
        Self::merge(Sources { ini })
    }

    fn read_ini(config_path: &Path) -> Result<configparser::ini::Ini> {
        if !config_path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", config_path.display()));
        }

        let mut config_parser = configparser::ini::Ini::new();
        config_parser
            .load(config_path)
            .map_err(|e| anyhow::anyhow!("读取配置文件失败: {}: {}", config_path.display(), e))?;
        Ok(config_parser)
    }

    /// 依次查找默认位置的配置文件
    fn default_location() -> Option<PathBuf> {
        let mut candidates = vec![
            PathBuf::from("add-captions.ini"),
            PathBuf::from(".add-captions.ini"),
        ];
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(".add-captions.ini"));
        }
        candidates.push(PathBuf::from("/etc/add-captions.ini"));

        candidates.into_iter().find(|p| p.exists())
    }

    fn merge(src: Sources) -> Result<AppConfig> {
        let mut config = AppConfig::default();

        // 转写
        config.transcription.api_key = src.get("ASSEMBLYAI_API_KEY", "transcription", "api_key");
        if let Some(v) = src.get("ASSEMBLYAI_BASE_URL", "transcription", "base_url") {
            config.transcription.base_url = v;
        }
        if let Some(v) = src.parse::<f64>("TRANSCRIPTION_POLL_INTERVAL", "transcription", "poll_interval")? {
            if !v.is_finite() || v < 0.0 {
                anyhow::bail!("配置项 transcription.poll_interval 的值无效: {}", v);
            }
            config.transcription.poll.interval = Duration::from_secs_f64(v);
        }
        if let Some(v) = src.parse("TRANSCRIPTION_MAX_POLLS", "transcription", "max_poll_attempts")? {
            config.transcription.poll.max_attempts = v;
        }

        // 存储
        if let Some(v) = src.get("STORAGE_BUCKET", "storage", "bucket") {
            config.storage.bucket = v;
        }
        if let Some(v) = src.get("STORAGE_ENDPOINT", "storage", "endpoint") {
            config.storage.endpoint = v;
        }
        if let Some(v) = src.get("STORAGE_PUBLIC_BASE_URL", "storage", "public_base_url") {
            config.storage.public_base_url = v;
        }
        config.storage.hmac_access_id = src.get("GCS_HMAC_ACCESS_ID", "storage", "hmac_access_id");
        config.storage.hmac_secret = src.get("GCS_HMAC_SECRET", "storage", "hmac_secret");
        config.storage.access_token = src.get("GCS_ACCESS_TOKEN", "storage", "access_token");
        if let Some(v) = src.flag("STORAGE_VERIFY_UPLOAD", "storage", "verify_upload") {
            config.storage.verify_upload = v;
        }

        // 渲染
        if let Some(v) = src.get("RENDER_VIDEO_CODEC", "render", "video_codec") {
            config.render.video_codec = v;
        }
        if let Some(v) = src.get("RENDER_AUDIO_CODEC", "render", "audio_codec") {
            config.render.audio_codec = v;
        }
        if let Some(v) = src.get("RENDER_PRESET", "render", "preset") {
            config.render.preset = v;
        }
        if let Some(v) = src.parse("RENDER_THREADS", "render", "threads")? {
            config.render.threads = v;
        }
        if let Some(v) = src.parse("AUDIO_SAMPLE_RATE", "render", "audio_sample_rate")? {
            config.audio_sample_rate = v;
        }

        // 字幕
        if let Some(v) = src.parse("CAPTION_BATCH_SIZE", "captions", "batch_size")? {
            config.caption_batch_size = v;
        }
        if let Some(v) = src.get("CAPTION_FONT", "captions", "font") {
            config.caption_style.font = v;
        }
        config.caption_style.font_file = src.get("CAPTION_FONT_FILE", "captions", "font_file");
        if let Some(v) = src.parse("CAPTION_FONT_SIZE", "captions", "font_size")? {
            config.caption_style.font_size = v;
        }
        if let Some(v) = src.get("CAPTION_FONT_COLOR", "captions", "font_color") {
            config.caption_style.font_color = v;
        }
        if let Some(v) = src.get("CAPTION_BOX_COLOR", "captions", "box_color") {
            config.caption_style.box_color = v;
        }
        if let Some(v) = src.parse("CAPTION_MARGIN", "captions", "margin")? {
            config.caption_style.margin = v;
        }

        // 运行环境
        if let Some(v) = src.get("SCRATCH_ROOT", "runtime", "scratch_root") {
            config.scratch_root = PathBuf::from(v);
        }
        if let Some(v) = src.parse::<u64>("HTTP_TIMEOUT", "runtime", "http_timeout")? {
            config.http_timeout = Duration::from_secs(v);
        }
        if let Some(v) = src.get("LOG_LEVEL", "logging", "level") {
            config.log_level = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// 创建默认配置文件
    pub fn create_default_config(config_path: &Path) -> Result<()> {
        let defaults = AppConfig::default();
        let mut config_parser = configparser::ini::Ini::new();
        let mut set = |section: &str, key: &str, value: String| {
            config_parser.set(section, key, Some(value));
        };

        set("transcription", "api_key", String::new());
        set("transcription", "base_url", defaults.transcription.base_url);
        set(
            "transcription",
            "poll_interval",
            defaults.transcription.poll.interval.as_secs().to_string(),
        );
        set(
            "transcription",
            "max_poll_attempts",
            defaults.transcription.poll.max_attempts.to_string(),
        );
        set("storage", "bucket", defaults.storage.bucket);
        set("storage", "endpoint", defaults.storage.endpoint);
        set("storage", "public_base_url", defaults.storage.public_base_url);
        set("storage", "hmac_access_id", String::new());
        set("storage", "hmac_secret", String::new());
        set("storage", "access_token", String::new());
        set("storage", "verify_upload", "false".to_string());
        set("render", "video_codec", defaults.render.video_codec);
        set("render", "audio_codec", defaults.render.audio_codec);
        set("render", "preset", defaults.render.preset);
        set("render", "threads", defaults.render.threads.to_string());
        set("render", "audio_sample_rate", defaults.audio_sample_rate.to_string());
        set("captions", "batch_size", defaults.caption_batch_size.to_string());
        set("captions", "font", defaults.caption_style.font);
        set("captions", "font_file", String::new());
        set("captions", "font_size", defaults.caption_style.font_size.to_string());
        set("captions", "font_color", defaults.caption_style.font_color);
        set("captions", "box_color", defaults.caption_style.box_color);
        set("captions", "margin", defaults.caption_style.margin.to_string());
        set("runtime", "scratch_root", String::new());
        set("runtime", "http_timeout", defaults.http_timeout.as_secs().to_string());
        set("logging", "level", defaults.log_level);

        config_parser
            .write(config_path)
            .map_err(|e| anyhow::anyhow!("写入配置文件失败: {}: {}", config_path.display(), e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources_from(contents: &str) -> Sources {
        let mut ini = configparser::ini::Ini::new();
        ini.read(contents.to_string()).unwrap();
        Sources { ini: Some(ini) }
    }

    #[test]
    fn defaults_match_the_original_function() {
        let config = AppConfig::default();
        assert_eq!(config.storage.bucket, "make-video");
        assert_eq!(config.storage.public_base_url, "https://storage.googleapis.com");
        assert_eq!(config.render, RenderProfile::default());
        assert_eq!(config.render.preset, "ultrafast");
        assert_eq!(config.caption_batch_size, 5);
        assert_eq!(config.audio_sample_rate, 16000);
        assert_eq!(config.transcription.poll.interval, Duration::from_secs(3));
        assert!(!config.storage.verify_upload);
        config.validate().unwrap();
    }

    #[test]
    fn ini_values_override_defaults() {
        let config = ConfigLoader::merge(sources_from(
            "[storage]\nbucket = captions-out\nverify_upload = true\n\
             [render]\nthreads = 4\n\
             [captions]\nbatch_size = 10\nfont_size = 42\n\
             [transcription]\npoll_interval = 0.5\nmax_poll_attempts = 20\n",
        ))
        .unwrap();

        assert_eq!(config.storage.bucket, "captions-out");
        assert!(config.storage.verify_upload);
        assert_eq!(config.render.threads, 4);
        assert_eq!(config.caption_batch_size, 10);
        assert_eq!(config.caption_style.font_size, 42);
        assert_eq!(config.transcription.poll.interval, Duration::from_millis(500));
        assert_eq!(config.transcription.poll.max_attempts, 20);
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = ConfigLoader::merge(sources_from("[render]\nthreads = many\n")).unwrap_err();
        assert!(err.to_string().contains("render.threads"));

        let err = ConfigLoader::merge(sources_from("[captions]\nbatch_size = 0\n")).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn credentials_prefer_hmac_then_token() {
        let mut storage = AppConfig::default().storage;
        assert!(matches!(storage.credentials(), StorageCredentials::MetadataServer));

        storage.access_token = Some("ya29".into());
        assert!(matches!(storage.credentials(), StorageCredentials::AccessToken(_)));

        storage.hmac_access_id = Some("GOOG".into());
        storage.hmac_secret = Some("secret".into());
        assert!(matches!(storage.credentials(), StorageCredentials::Hmac { .. }));
    }

    #[test]
    fn template_file_round_trips_through_the_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("add-captions.ini");
        ConfigLoader::create_default_config(&path).unwrap();

        let ini = ConfigLoader::read_ini(&path).unwrap();
        let config = ConfigLoader::merge(Sources { ini: Some(ini) }).unwrap();

        assert_eq!(config.storage.bucket, AppConfig::default().storage.bucket);
        assert!(config.caption_style.font_file.is_none());
        assert!(config.transcription.api_key.is_none());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ConfigLoader::load(Some(Path::new("/nonexistent/add-captions.ini"))).unwrap_err();
        assert!(err.to_string().contains("配置文件不存在"));
    }
}
