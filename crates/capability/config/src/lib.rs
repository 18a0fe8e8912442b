//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 冷启动（无已提交 offset）时的读取起点。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    Earliest,
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

/// 写入重试耗尽后的处理策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustedPolicy {
    /// 记录数据丢失风险后仍提交 offset，继续消费。
    CommitAndContinue,
    /// 不提交 offset，停止采集循环并返回错误。
    Halt,
}

/// topic 声明的事件类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Telemetry,
    Alert,
    Health,
    /// 同一 topic 混合多种事件，需要报文内的类型字段判别。
    Mixed,
}

/// 订阅的 topic 及其类别（None 表示订阅但未映射）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBinding {
    pub topic: String,
    pub kind: Option<TopicKind>,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub kafka_bootstrap_servers: String,
    pub kafka_group_id: String,
    pub kafka_auto_offset_reset: OffsetReset,
    pub kafka_session_timeout_ms: u64,
    pub topics: Vec<TopicBinding>,
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_pool_size: u32,
    pub require_timescale: bool,
    /// 启动时目标库不存在则创建。
    pub create_database: bool,
    pub batch_max_records: usize,
    pub batch_max_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub sink_max_attempts: u32,
    pub sink_backoff_base_ms: u64,
    pub sink_backoff_cap_ms: u64,
    pub sink_attempt_timeout_ms: u64,
    pub sink_exhausted_policy: ExhaustedPolicy,
    pub log_level: String,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let kafka_bootstrap_servers = read_string_with_default("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092");
        let kafka_group_id = read_string_with_default("KAFKA_GROUP_ID", "ome-telemetry-consumer");
        let kafka_auto_offset_reset = read_offset_reset("KAFKA_AUTO_OFFSET_RESET")?;
        let kafka_session_timeout_ms = read_u64_with_default("KAFKA_SESSION_TIMEOUT_MS", 6000)?;
        let topics = parse_topics(&read_string_with_default(
            "KAFKA_TOPICS",
            "ome.telemetry,ome.alerts,ome.health",
        ))?;
        let db_host = read_string_with_default("TIMESCALEDB_HOST", "timescaledb");
        let db_port = read_u16_with_default("TIMESCALEDB_PORT", 5432)?;
        let db_name = read_string_with_default("TIMESCALEDB_DATABASE", "ome_telemetry");
        let db_user = read_string_with_default("TIMESCALEDB_USER", "postgres");
        let db_password = read_string_with_default("TIMESCALEDB_PASSWORD", "postgres");
        let db_pool_size = read_u32_with_default("TIMESCALEDB_POOL_SIZE", 8)?;
        let require_timescale = read_bool_with_default("TIMESCALEDB_REQUIRE_EXTENSION", false);
        let create_database = read_bool_with_default("TIMESCALEDB_CREATE_DATABASE", true);
        let batch_max_records = read_u64_with_default("BATCH_MAX_RECORDS", 500)? as usize;
        let batch_max_interval_ms = read_u64_with_default("BATCH_MAX_INTERVAL_MS", 1000)?;
        let poll_timeout_ms = read_u64_with_default("POLL_TIMEOUT_MS", 1000)?;
        let sink_max_attempts = read_u32_with_default("SINK_MAX_ATTEMPTS", 5)?;
        let sink_backoff_base_ms = read_u64_with_default("SINK_BACKOFF_BASE_MS", 200)?;
        let sink_backoff_cap_ms = read_u64_with_default("SINK_BACKOFF_CAP_MS", 10_000)?;
        let sink_attempt_timeout_ms = read_u64_with_default("SINK_ATTEMPT_TIMEOUT_MS", 30_000)?;
        let sink_exhausted_policy = read_exhausted_policy("SINK_EXHAUSTED_POLICY")?;
        let log_level = read_string_with_default("LOG_LEVEL", "info").to_ascii_lowercase();

        let config = Self {
            kafka_bootstrap_servers,
            kafka_group_id,
            kafka_auto_offset_reset,
            kafka_session_timeout_ms,
            topics,
            db_host,
            db_port,
            db_name,
            db_user,
            db_password,
            db_pool_size,
            require_timescale,
            create_database,
            batch_max_records,
            batch_max_interval_ms,
            poll_timeout_ms,
            sink_max_attempts,
            sink_backoff_base_ms,
            sink_backoff_cap_ms,
            sink_attempt_timeout_ms,
            sink_exhausted_policy,
            log_level,
        };
        Ok(config.sanitized())
    }

    /// Postgres 连接串。
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_user, self.db_password, self.db_host, self.db_port, self.db_name
        )
    }

    /// 维护库（`postgres`）连接串，用于创建目标库。
    pub fn maintenance_database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/postgres",
            self.db_user, self.db_password, self.db_host, self.db_port
        )
    }

    /// 订阅的 topic 名称列表。
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|binding| binding.topic.clone()).collect()
    }

    fn sanitized(mut self) -> Self {
        if self.batch_max_records == 0 {
            self.batch_max_records = 1;
        }
        if self.batch_max_interval_ms == 0 {
            self.batch_max_interval_ms = 1;
        }
        if self.poll_timeout_ms == 0 {
            self.poll_timeout_ms = 1;
        }
        if self.sink_max_attempts == 0 {
            self.sink_max_attempts = 1;
        }
        if self.db_pool_size == 0 {
            self.db_pool_size = 1;
        }
        if self.sink_backoff_cap_ms < self.sink_backoff_base_ms {
            self.sink_backoff_cap_ms = self.sink_backoff_base_ms;
        }
        self
    }
}

/// 解析 `KAFKA_TOPICS`：逗号分隔，条目可写成 `topic=kind`，否则按名称推断类别。
pub fn parse_topics(raw: &str) -> Result<Vec<TopicBinding>, ConfigError> {
    let mut bindings: Vec<TopicBinding> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let binding = match entry.split_once('=') {
            Some((topic, kind)) => {
                let topic = topic.trim();
                if topic.is_empty() {
                    return Err(ConfigError::Invalid("KAFKA_TOPICS".to_string(), entry.to_string()));
                }
                let kind = parse_topic_kind(kind.trim()).ok_or_else(|| {
                    ConfigError::Invalid("KAFKA_TOPICS".to_string(), entry.to_string())
                })?;
                TopicBinding {
                    topic: topic.to_string(),
                    kind: Some(kind),
                }
            }
            None => TopicBinding {
                topic: entry.to_string(),
                kind: infer_topic_kind(entry),
            },
        };
        if bindings.iter().any(|existing| existing.topic == binding.topic) {
            continue;
        }
        bindings.push(binding);
    }
    if bindings.is_empty() {
        return Err(ConfigError::Missing("KAFKA_TOPICS".to_string()));
    }
    Ok(bindings)
}

fn parse_topic_kind(value: &str) -> Option<TopicKind> {
    match value.to_ascii_lowercase().as_str() {
        "telemetry" | "metric" | "metrics" => Some(TopicKind::Telemetry),
        "alert" | "alerts" => Some(TopicKind::Alert),
        "health" => Some(TopicKind::Health),
        "mixed" => Some(TopicKind::Mixed),
        _ => None,
    }
}

fn infer_topic_kind(topic: &str) -> Option<TopicKind> {
    let topic = topic.to_ascii_lowercase();
    if topic.contains("health") {
        Some(TopicKind::Health)
    } else if topic.contains("alert") {
        Some(TopicKind::Alert)
    } else if topic.contains("telemetry") || topic.contains("metric") {
        Some(TopicKind::Telemetry)
    } else {
        None
    }
}

fn read_offset_reset(key: &str) -> Result<OffsetReset, ConfigError> {
    let value = read_string_with_default(key, "earliest");
    match value.to_ascii_lowercase().as_str() {
        "earliest" => Ok(OffsetReset::Earliest),
        "latest" => Ok(OffsetReset::Latest),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_exhausted_policy(key: &str) -> Result<ExhaustedPolicy, ConfigError> {
    let value = read_string_with_default(key, "commit");
    match value.to_ascii_lowercase().as_str() {
        "commit" | "continue" => Ok(ExhaustedPolicy::CommitAndContinue),
        "halt" | "stop" => Ok(ExhaustedPolicy::Halt),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_string_with_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
