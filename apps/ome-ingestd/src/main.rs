//! OME 事件采集守护进程：Kafka → 规范化 → TimescaleDB。

mod ingest;

use ome_config::AppConfig;
use ome_telemetry::{init_tracing, metrics};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing(&config.log_level);

    let mut consumer = ingest::build_consumer(&config).await?;

    // SIGINT / SIGTERM 触发优雅退出：写完当前批次、提交 offset 后释放订阅
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let outcome = consumer.run(cancel).await;
    let snapshot = metrics().snapshot();
    info!(
        target: "ome.pipeline",
        raw_messages = snapshot.raw_messages,
        unroutable_messages = snapshot.unroutable_messages,
        metric_points = snapshot.metric_points,
        alerts = snapshot.alerts,
        health_records = snapshot.health_records,
        batches_flushed = snapshot.batches_flushed,
        batches_failed = snapshot.batches_failed,
        "ingestd_stopped"
    );
    if let Err(err) = outcome {
        error!(target: "ome.pipeline", error = %err, "consumer_loop_failed");
        return Err(err.into());
    }
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "ome.pipeline", error = %err, "ctrl_c_listener_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target: "ome.pipeline", error = %err, "sigterm_listener_failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(target: "ome.pipeline", "shutdown_requested");
    cancel.cancel();
}
