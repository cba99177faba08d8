//! AiRi - 本地对话智能体内核
//!
//! 入口：加载配置、初始化日志、启动内核，并把标准输入的每一行作为用户消息提交。
//! 命令：`/reload` 重新加载配置，`/status` 查看状态，`/quit` 退出；Ctrl+C 同样触发优雅关闭。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use airi::config::{load_config, ConfigStore};
use airi::llm::{LlmBackend, MockBackend, OpenAiBackend};
use airi::sink::{LogBuffer, LogSink};
use airi::KernelBuilder;
use tokio::io::{AsyncBufReadExt, BufReader};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "airi", about = "AiRi agent kernel (headless)")]
struct Args {
    /// 额外的配置文件，覆盖 config/default.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// 使用离线 Mock 后端
    #[arg(long, env = "AIRI_MOCK", default_value_t = false)]
    mock: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.clone()).context("Failed to load configuration")?;

    let buffer = Arc::new(LogBuffer::new(config.log.max_lines));
    airi::observability::init(Some(buffer.clone() as Arc<dyn LogSink>))
        .context("Failed to initialize logging")?;

    let backend: Arc<dyn LlmBackend> = if args.mock {
        if config.is_first_run() {
            config.llm.api_key = "sk-mock".to_string();
        }
        tracing::info!("Using mock backend");
        Arc::new(MockBackend::new())
    } else {
        Arc::new(OpenAiBackend::new())
    };
    if config.is_first_run() {
        tracing::info!("No API key configured; set AIRI__LLM__API_KEY or edit the config file, then /reload");
    }

    let store = ConfigStore::new(config.clone(), args.config);
    let kernel = KernelBuilder::from_config(backend, buffer.clone(), &config.kernel)
        .start(store.subscribe());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let line = line.trim();
                match line {
                    "" => {}
                    "/quit" | "/exit" => break,
                    "/reload" => {
                        if let Err(e) = store.reload() {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                    "/status" => {
                        println!("state: {}, log lines: {}", kernel.state(), buffer.len());
                    }
                    text => kernel.submit_user_message(text),
                }
            }
        }
    }

    kernel.shutdown().await;
    Ok(())
}
