//! Модуль для работы с OpenCL
//!
//! Содержит низкоуровневые привязки, выбор устройства и стратегию
//! выгрузки умножения на устройство

pub mod bindings;
pub mod types;
mod device;
mod offload;

pub use device::DeviceHandle;
pub use offload::OffloadStrategy;
