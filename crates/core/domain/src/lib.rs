pub mod data;
pub mod device;

pub use data::{
    AlertRecord, EventKind, HealthRecord, HealthStatus, MetricPoint, MetricValue, PartitionOffset,
    RawMessage, Severity, TopicPartition,
};
pub use device::{DeviceFragment, DeviceRef};
