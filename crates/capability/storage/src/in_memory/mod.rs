//! 内存存储实现模块
//!
//! 用于测试与本地联调，语义与 Postgres 实现保持一致（自然键去重、整批原子）。

pub mod sink;

pub use sink::*;
