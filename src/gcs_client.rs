use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as base64_engine;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::Deserialize;
use sha1::Sha1;
use std::path::Path;
use std::time::Duration;

type HmacSha1 = Hmac<Sha1>;

/// 对象键编码时保留路径分隔符和常见安全字符
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// 对象存储接口
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 上传本地文件到固定存储桶下的 `object_key`
    async fn upload(&self, file_path: &Path, object_key: &str) -> Result<()>;

    /// 检查对象是否存在
    async fn exists(&self, object_key: &str) -> Result<bool>;

    /// 对象的公开访问地址
    fn public_url(&self, object_key: &str) -> String;
}

/// Cloud Storage 认证方式
#[derive(Debug, Clone)]
pub enum StorageCredentials {
    /// HMAC 密钥（XML API 的 GOOG1 签名）
    Hmac { access_id: String, secret: String },
    /// 预先获取的 OAuth2 access token
    AccessToken(String),
    /// 从函数运行环境的元数据服务获取服务账号 token
    MetadataServer,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Cloud Storage 客户端，用于上传结果文件
///
/// 手动实现 XML API，只覆盖 PUT / HEAD 两个操作
pub struct GcsClient {
    client: Client,
    /// API 地址，例如 https://storage.googleapis.com
    endpoint: String,
    bucket: String,
    /// 拼接公开地址使用的前缀
    public_base_url: String,
    credentials: StorageCredentials,
}

impl GcsClient {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        public_base_url: impl Into<String>,
        credentials: StorageCredentials,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .context("创建 HTTP 客户端失败")?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn encode_key(object_key: &str) -> String {
        utf8_percent_encode(object_key, KEY_ENCODE_SET).to_string()
    }

    /// 构建对象 URL（path-style）
    fn build_url(&self, object_key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, Self::encode_key(object_key))
    }

    /// 生成 GOOG1 签名
    ///
    /// StringToSign = VERB\nContent-MD5\nContent-Type\nDate\nCanonicalizedExtensionHeaders + CanonicalizedResource
    fn sign_request(&self, secret: &str, method: &str, object_key: &str, headers: &HeaderMap) -> Result<String> {
        let string_to_sign = self.string_to_sign(method, object_key, headers);

        let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).context("创建 HMAC 失败")?;
        mac.update(string_to_sign.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(base64_engine.encode(signature))
    }

    fn string_to_sign(&self, method: &str, object_key: &str, headers: &HeaderMap) -> String {
        let canonicalized_resource = format!("/{}/{}", self.bucket, Self::encode_key(object_key));

        let mut goog_headers: Vec<(String, &str)> = headers
            .iter()
            .filter_map(|(name, value)| {
                let name = name.as_str().to_lowercase();
                name.starts_with("x-goog-")
                    .then(|| (name, value.to_str().unwrap_or("")))
            })
            .collect();
        goog_headers.sort_by(|a, b| a.0.cmp(&b.0));
        let canonicalized_headers: String = goog_headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };

        format!(
            "{}\n{}\n{}\n{}\n{}{}",
            method,
            header("Content-MD5"),
            header("Content-Type"),
            header("Date"),
            canonicalized_headers,
            canonicalized_resource
        )
    }

    /// 从元数据服务获取服务账号 token
    async fn fetch_metadata_token(&self) -> Result<String> {
        let response = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context("请求元数据服务失败")?;

        if !response.status().is_success() {
            anyhow::bail!("获取访问令牌失败: HTTP {}", response.status());
        }

        let token: MetadataToken = response.json().await.context("解析访问令牌失败")?;
        Ok(token.access_token)
    }

    /// 构建带认证信息的请求头
    async fn build_headers(&self, method: &str, object_key: &str, content_type: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        headers.insert(
            "Date",
            HeaderValue::from_str(&date).context("创建 Date header 失败")?,
        );

        if let Some(ct) = content_type {
            headers.insert(
                "Content-Type",
                HeaderValue::from_str(ct).context("创建 Content-Type header 失败")?,
            );
        }

        let authorization = match &self.credentials {
            StorageCredentials::Hmac { access_id, secret } => {
                let signature = self.sign_request(secret, method, object_key, &headers)?;
                format!("GOOG1 {}:{}", access_id, signature)
            }
            StorageCredentials::AccessToken(token) => format!("Bearer {}", token),
            StorageCredentials::MetadataServer => {
                format!("Bearer {}", self.fetch_metadata_token().await?)
            }
        };
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&authorization).context("创建 Authorization header 失败")?,
        );

        Ok(headers)
    }

    /// 上传文件到存储桶
    pub async fn upload_file(&self, object_key: &str, file_path: &Path) -> Result<()> {
        if !file_path.exists() {
            anyhow::bail!("文件不存在: {}", file_path.display());
        }

        tracing::info!(
            "正在上传文件: {} -> bucket={}, key={}",
            file_path.display(),
            self.bucket,
            object_key
        );

        let file_content = tokio::fs::read(file_path)
            .await
            .with_context(|| format!("读取文件失败: {}", file_path.display()))?;

        let content_type = guess_content_type(object_key);
        let headers = self.build_headers("PUT", object_key, Some(content_type)).await?;

        let response = self
            .client
            .put(self.build_url(object_key))
            .headers(headers)
            .body(file_content)
            .send()
            .await
            .context("上传文件失败")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("上传文件失败: HTTP {} - {}", status, error_text);
        }

        tracing::info!("文件已上传: bucket={}, key={}", self.bucket, object_key);

        Ok(())
    }

    /// 检查对象是否存在
    ///
    /// - `Ok(true)`: 对象存在
    /// - `Ok(false)`: 返回 404
    /// - `Err`: 请求失败
    pub async fn head_object(&self, object_key: &str) -> Result<bool> {
        tracing::debug!("检查对象: bucket={}, key={}", self.bucket, object_key);

        let headers = self.build_headers("HEAD", object_key, None).await?;

        let response = self
            .client
            .head(self.build_url(object_key))
            .headers(headers)
            .send()
            .await
            .context("检查对象失败")?;

        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => anyhow::bail!("检查对象失败: HTTP {}", response.status()),
        }
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn upload(&self, file_path: &Path, object_key: &str) -> Result<()> {
        self.upload_file(object_key, file_path).await
    }

    async fn exists(&self, object_key: &str) -> Result<bool> {
        self.head_object(object_key).await
    }

    fn public_url(&self, object_key: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, self.bucket, object_key)
    }
}

/// 根据文件扩展名猜测 Content-Type
fn guess_content_type(object_key: &str) -> &'static str {
    let ext = Path::new(object_key)
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}
