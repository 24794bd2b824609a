//! Распределённое умножение квадратных матриц с выгрузкой на OpenCL

pub mod error;
pub mod config;
pub mod matrix;
pub mod partition;
pub mod engine;
pub mod comm;
pub mod coordinator;
pub mod output;
pub mod launcher;
pub mod utils;
#[cfg(feature = "opencl")]
pub mod opencl;

#[cfg(feature = "opencl")]
#[macro_use]
mod macros {
    /// Вызов OpenCL, возвращающий код ошибки; ненулевой код становится `DeviceError::Call`
    #[macro_export]
    macro_rules! cl_check {
        ($func:ident($($arg:expr),* $(,)?)) => {{
            let code = unsafe { $func($($arg),*) };
            if code != 0 {
                Err($crate::error::DeviceError::Call { call: stringify!($func), code })
            } else {
                Ok(())
            }
        }};
    }

    /// Вызов OpenCL, создающий объект; код ошибки передаётся последним аргументом
    #[macro_export]
    macro_rules! cl_create {
        ($func:ident($($arg:expr),* $(,)?)) => {{
            let mut code: $crate::opencl::types::cl_int = 0;
            let obj = unsafe { $func($($arg,)* &mut code) };
            if obj.is_null() || code != 0 {
                Err($crate::error::DeviceError::Call { call: stringify!($func), code })
            } else {
                Ok(obj)
            }
        }};
    }
}

pub use config::{Cli, DeviceKind, RunConfig, StrategyChoice, Transport, DEFAULT_MAX_SIZE};
pub use coordinator::{DistributionCoordinator, RunOutcome, WorkerReport};
pub use engine::LocalMultiplyEngine;
pub use error::{DeviceError, MatmulError};
pub use matrix::{Matrix, RandomMatrixGenerator, RowBlock};
pub use partition::{plan, RowRange};
