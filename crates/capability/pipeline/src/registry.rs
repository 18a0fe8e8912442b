//! 设备注册表
//!
//! 由单个采集循环独占持有（单写者），不需要加锁。
//! 多个循环实例之间的一致性交给存储层的幂等 upsert：
//! 非空覆盖的合并满足交换律，各实例最终收敛到同一条记录。

use domain::{DeviceFragment, DeviceRef};
use ome_telemetry::record_device_observed;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceRef>,
    /// 自上次成功写入后发生变化的设备。
    dirty: BTreeSet<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并片段并返回合并后的记录。
    pub fn observe(&mut self, fragment: &DeviceFragment) -> DeviceRef {
        match self.devices.get_mut(&fragment.device_id) {
            Some(existing) => {
                let before = existing.clone();
                existing.merge(fragment);
                if *existing != before {
                    self.dirty.insert(fragment.device_id.clone());
                }
                existing.clone()
            }
            None => {
                let created = DeviceRef::from_fragment(fragment);
                self.devices
                    .insert(fragment.device_id.clone(), created.clone());
                self.dirty.insert(fragment.device_id.clone());
                record_device_observed();
                created
            }
        }
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceRef> {
        self.devices.get(device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// 待写入的设备快照。
    pub fn dirty_devices(&self) -> Vec<DeviceRef> {
        self.dirty
            .iter()
            .filter_map(|device_id| self.devices.get(device_id).cloned())
            .collect()
    }

    /// 写入成功后清除标记；快照之后又有变化的设备保持待写入。
    pub fn mark_clean(&mut self, written: &[DeviceRef]) {
        for device in written {
            if self.devices.get(&device.device_id) == Some(device) {
                self.dirty.remove(&device.device_id);
            }
        }
    }
}
