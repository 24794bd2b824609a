//! Локальное умножение внутри одного участника

use crate::config::{RunConfig, StrategyChoice};
use crate::error::{DeviceError, Result};
use crate::matrix::{cpu_matrix_multiply, Matrix, RowBlock};
use crate::partition::RowRange;
use log::{info, warn};

#[cfg(feature = "opencl")]
use crate::matrix::KernelSource;
#[cfg(feature = "opencl")]
use crate::opencl::{DeviceHandle, OffloadStrategy};

/// Умножает блок строк `A` на всю `B`.
///
/// Стратегия выбирается при создании. Для целых чисел обе стратегии дают
/// побитово одинаковый результат.
pub enum LocalMultiplyEngine {
    Sequential,
    #[cfg(feature = "opencl")]
    Offload(OffloadStrategy),
}

impl LocalMultiplyEngine {
    pub fn sequential() -> Self {
        LocalMultiplyEngine::Sequential
    }

    /// Стратегия выгрузки на уже открытое устройство
    #[cfg(feature = "opencl")]
    pub fn offload(handle: DeviceHandle, source: &KernelSource) -> Result<Self, DeviceError> {
        Ok(LocalMultiplyEngine::Offload(OffloadStrategy::new(handle, source)?))
    }

    /// Создаёт движок по конфигурации прогона.
    ///
    /// `Offload` возвращает ошибку подготовки устройства как есть,
    /// `Auto` в этом случае откатывается на последовательную стратегию.
    pub fn from_config(config: &RunConfig) -> Result<Self, DeviceError> {
        match config.strategy {
            StrategyChoice::Sequential => Ok(Self::sequential()),
            StrategyChoice::Offload => Self::open_offload(config),
            StrategyChoice::Auto => match Self::open_offload(config) {
                Ok(engine) => Ok(engine),
                Err(e) => {
                    warn!("Устройство недоступно ({}), используется CPU", e);
                    Ok(Self::sequential())
                }
            },
        }
    }

    #[cfg(feature = "opencl")]
    fn open_offload(config: &RunConfig) -> Result<Self, DeviceError> {
        let handle = DeviceHandle::open(config.device)?;
        let engine = Self::offload(handle, &config.kernel)?;
        info!("Умножение выполняется на устройстве {}", engine.device_name().unwrap_or_default());
        Ok(engine)
    }

    #[cfg(not(feature = "opencl"))]
    fn open_offload(config: &RunConfig) -> Result<Self, DeviceError> {
        info!("Запрошено устройство {:?}, но OpenCL не собран", config.device);
        Err(DeviceError::Unsupported)
    }

    pub fn strategy_name(&self) -> &'static str {
        match self {
            LocalMultiplyEngine::Sequential => "sequential",
            #[cfg(feature = "opencl")]
            LocalMultiplyEngine::Offload(_) => "offload",
        }
    }

    /// Имя устройства для стратегии выгрузки
    pub fn device_name(&self) -> Option<&str> {
        match self {
            LocalMultiplyEngine::Sequential => None,
            #[cfg(feature = "opencl")]
            LocalMultiplyEngine::Offload(strategy) => Some(strategy.device_name()),
        }
    }

    /// Строки `C[i] = Σ_k A[i][k]·B[k]` для всех строк блока `a`
    pub fn multiply(&self, a: &RowBlock, b: &Matrix) -> Result<RowBlock> {
        match self {
            LocalMultiplyEngine::Sequential => cpu_matrix_multiply(a, b),
            #[cfg(feature = "opencl")]
            LocalMultiplyEngine::Offload(strategy) => strategy.multiply(a, b),
        }
    }

    /// То же для диапазона строк полной матрицы `a`
    pub fn multiply_range(&self, a: &Matrix, b: &Matrix, range: RowRange) -> Result<RowBlock> {
        self.multiply(&a.row_block(range), b)
    }
}

impl std::fmt::Debug for LocalMultiplyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMultiplyEngine")
            .field("strategy", &self.strategy_name())
            .field("device", &self.device_name())
            .finish()
    }
}
