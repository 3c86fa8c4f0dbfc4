use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;

/// 远程视频来源
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    /// 将远程资源完整读入内存
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// 通过 HTTP(S) GET 下载视频
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .context("创建 HTTP 客户端失败")?,
        })
    }
}

#[async_trait]
impl VideoFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("下载视频失败: {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("下载视频失败: HTTP {} - {}", status, url);
        }

        response.bytes().await.context("读取响应数据失败")
    }
}
