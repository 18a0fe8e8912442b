//! 采集链路装配
//!
//! 按配置组装 Kafka 消息源、路由、TimescaleDB 写入端与采集循环。

use ome_config::AppConfig;
use ome_ingest::{KafkaSource, KafkaSourceConfig};
use ome_normalize::Router;
use ome_pipeline::{ConsumerLoop, PipelineConfig};
use ome_storage::{PgSink, ensure_database};
use std::sync::Arc;
use tracing::{info, warn};

/// 连接数据库、确保表结构并订阅 topic。
pub async fn build_consumer(config: &AppConfig) -> Result<ConsumerLoop, Box<dyn std::error::Error>> {
    if config.create_database {
        // 没有建库权限时照常继续，库确实不存在会在下面连接时报错
        if let Err(err) = ensure_database(&config.maintenance_database_url(), &config.db_name).await {
            warn!(target: "ome.storage", database = %config.db_name, error = %err, "database_bootstrap_failed");
        }
    }
    let sink = PgSink::connect(&config.database_url(), config.db_pool_size).await?;
    let timescale = sink.ensure_schema(config.require_timescale).await?;
    info!(
        target: "ome.storage",
        host = %config.db_host,
        port = config.db_port,
        database = %config.db_name,
        pool_size = config.db_pool_size,
        timescale,
        "storage_ready"
    );

    let source = KafkaSource::connect(&KafkaSourceConfig {
        bootstrap_servers: config.kafka_bootstrap_servers.clone(),
        group_id: config.kafka_group_id.clone(),
        auto_offset_reset: config.kafka_auto_offset_reset.as_str().to_string(),
        session_timeout_ms: config.kafka_session_timeout_ms,
        topics: config.topic_names(),
    })?;

    let router = Router::new(&config.topics);
    Ok(ConsumerLoop::new(
        Box::new(source),
        Arc::new(sink),
        router,
        PipelineConfig::from_app(config),
    ))
}
