//! # PostgreSQL / TimescaleDB 存储实现
//!
//! - [`schema`]：启动时建表、唯一约束与 hypertable 转换
//! - [`sink`]：`PgSink`，自然键 `on conflict` 幂等写入
//!
//! 所有 SQL 使用参数绑定；时间以 epoch 毫秒传入，
//! 由 `to_timestamp($n / 1000.0)` 转为 `timestamptz`。

pub mod schema;
pub mod sink;

pub use schema::*;
pub use sink::*;
