use serde::{Deserialize, Serialize};

/// Accelerators available on the host, derived once per provisioning run
/// and read-only thereafter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcceleratorPool {
    /// Free memory per device in MB, indexed by device ordinal.
    pub per_device_memory_mb: Vec<u64>,
}

impl AcceleratorPool {
    pub fn new(per_device_memory_mb: Vec<u64>) -> Self {
        Self {
            per_device_memory_mb,
        }
    }

    pub fn device_count(&self) -> usize {
        self.per_device_memory_mb.len()
    }

    pub fn total_memory_mb(&self) -> u64 {
        self.per_device_memory_mb.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.per_device_memory_mb.is_empty()
    }
}
