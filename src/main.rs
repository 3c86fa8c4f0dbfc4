use add_captions::job::RawJobRequest;
use add_captions::{config::ConfigLoader, handler, AppConfig, CaptionPipeline, JobOutcome};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// 视频字幕工具 - 下载视频、转写语音、叠加逐词字幕并上传到云存储
#[derive(Parser, Debug)]
#[command(name = "add-captions")]
#[command(about = "视频字幕工具：转写语音、叠加逐词字幕、上传结果", long_about = None)]
struct Args {
    /// 配置文件路径（可选，支持 .ini 格式）
    /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 日志级别（trace, debug, info, warn, error），也可通过环境变量 LOG_LEVEL 设置
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Web 服务模式：启动 HTTP 服务器接收字幕任务
    Serve {
        /// 监听地址（默认从环境变量 FC_SERVER_PORT 或 PORT 读取，如果不存在则使用 0.0.0.0:9000）
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// CLI 模式：处理单个视频并输出 JSON 结果
    Process {
        /// 视频 URL
        #[arg(long)]
        video_url: String,

        /// 上传使用的对象键
        #[arg(long)]
        output_file: String,
    },
    /// 生成默认配置文件
    InitConfig {
        /// 配置文件输出路径
        #[arg(default_value = "add-captions.ini")]
        path: PathBuf,
    },
}

fn init_logging(level: &str) {
    let level = level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = ConfigLoader::load(args.config.as_deref()).context("加载配置失败")?;
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match &args.command {
        Commands::InitConfig { path } => {
            ConfigLoader::create_default_config(path).context("生成配置文件失败")?;
            println!("已生成配置文件: {}", path.display());
        }
        Commands::Serve { bind } => {
            let config = load_config(&args)?;
            init_logging(&config.log_level);

            // 优先使用命令行参数，其次使用环境变量 FC_SERVER_PORT / PORT，最后使用默认值 9000
            let bind_addr = bind.clone().unwrap_or_else(|| {
                std::env::var("FC_SERVER_PORT")
                    .or_else(|_| std::env::var("PORT"))
                    .map(|port| format!("0.0.0.0:{}", port))
                    .unwrap_or_else(|_| "0.0.0.0:9000".to_string())
            });
            let pipeline = CaptionPipeline::from_config(config).context("初始化字幕流水线失败")?;
            start_web_server(&bind_addr, Arc::new(pipeline)).await?;
        }
        Commands::Process {
            video_url,
            output_file,
        } => {
            let config = load_config(&args)?;
            init_logging(&config.log_level);

            let pipeline = CaptionPipeline::from_config(config).context("初始化字幕流水线失败")?;
            let outcome = pipeline
                .handle_request(RawJobRequest {
                    video_url: Some(video_url.clone()),
                    output_file: Some(output_file.clone()),
                })
                .await;
            print_outcome(&outcome)?;
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_outcome(outcome: &JobOutcome) -> Result<()> {
    let json = match outcome {
        JobOutcome::Success { output_url } => serde_json::json!({
            "status": "success",
            "output_url": output_url,
        }),
        JobOutcome::Rejected(message) | JobOutcome::Failed(message) => {
            serde_json::json!({ "error": message })
        }
    };
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn start_web_server(bind: &str, pipeline: Arc<CaptionPipeline>) -> Result<()> {
    let app = handler::router(pipeline);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .context(format!("绑定地址失败: {}", bind))?;

    tracing::info!("Web 服务器启动在: http://{}", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("可用端点:");
    tracing::info!("  • 健康检查: GET  http://{}/health", bind);
    tracing::info!("  • 字幕任务: POST http://{}/", bind);
    tracing::info!("  • 字幕任务: POST http://{}/captions", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    axum::serve(listener, app)
        .await
        .context("启动服务器失败")?;

    Ok(())
}
