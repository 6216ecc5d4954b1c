use anyhow::Context;
use splitter_rescue::config::Config;
use splitter_rescue::startup::Application;
use splitter_rescue::utils::logger::init_logger;
use splitter_rescue::{log_error, log_info};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // 初始化日志（全局只需调用一次）
    init_logger();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log_error!("❌ {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run() -> anyhow::Result<u8> {
    log_info!("Starting splitter rescue...");

    // 1. 加载配置
    let config = Config::load().context("Failed to load application configuration")?;

    // 2. 构建应用实例（校验配置、连接节点与中继）
    let application = Application::build(config)
        .await
        .context("Application building failed")?;

    log_info!("Application build complete. Starting rescue loop.");

    // 3. 运行救援循环
    let summary = application
        .run()
        .await
        .context("Rescue loop stopped on a fatal error")?;

    match summary.last_outcome() {
        Some(outcome) => log_info!(
            "Finished after {} attempt(s), last outcome: {}",
            summary.attempts(),
            outcome
        ),
        None => log_info!("Finished after {} attempt(s)", summary.attempts()),
    }
    Ok(summary.exit_code())
}
