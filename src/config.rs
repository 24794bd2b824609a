//! Параметры запуска

use crate::matrix::KernelSource;
use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Наибольший допустимый размер матрицы по умолчанию
pub const DEFAULT_MAX_SIZE: usize = 10;

/// Стратегия локального умножения
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StrategyChoice {
    /// Тройной цикл на CPU
    #[default]
    Sequential,
    /// Ядро OpenCL, без устройства прогон прерывается
    Offload,
    /// Ядро OpenCL, без устройства откат на CPU
    Auto,
}

/// Тип устройства OpenCL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DeviceKind {
    #[default]
    Gpu,
    Cpu,
    Any,
}

/// Как участники связаны между собой
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Transport {
    /// Отдельный процесс на участника, связь по TCP
    #[default]
    Tcp,
    /// Все участники задачами одного процесса
    Memory,
}

/// Распределённое умножение квадратных матриц
#[derive(Debug, Clone, Parser)]
#[command(name = "dist_matmul", version, about)]
pub struct Cli {
    /// Число участников W
    #[arg(long, env = "DMATMUL_WORKERS", default_value_t = 2)]
    pub workers: usize,

    /// Номер этого участника, 0 означает координатора
    #[arg(long, env = "DMATMUL_RANK", default_value_t = 0)]
    pub rank: usize,

    /// Адрес координатора: на нём слушает участник 0, к нему подключаются остальные
    #[arg(long, env = "DMATMUL_COORDINATOR", default_value = "127.0.0.1:0")]
    pub coordinator: String,

    #[arg(long, value_enum, env = "DMATMUL_TRANSPORT", default_value_t = Transport::Tcp)]
    pub transport: Transport,

    /// Не запускать локальных участников: их запускает внешний механизм
    #[arg(long, env = "DMATMUL_NO_SPAWN")]
    pub no_spawn: bool,

    #[arg(long, value_enum, env = "DMATMUL_STRATEGY", default_value_t = StrategyChoice::Sequential)]
    pub strategy: StrategyChoice,

    #[arg(long, value_enum, env = "DMATMUL_DEVICE", default_value_t = DeviceKind::Gpu)]
    pub device: DeviceKind,

    /// Файл с исходным кодом ядра вместо встроенного
    #[arg(long, env = "DMATMUL_KERNEL")]
    pub kernel: Option<PathBuf>,

    #[arg(long, env = "DMATMUL_MAX_SIZE", default_value_t = DEFAULT_MAX_SIZE)]
    pub max_size: usize,

    /// Размер матрицы; без него спрашивается в терминале
    #[arg(long, env = "DMATMUL_SIZE", allow_hyphen_values = true)]
    pub size: Option<String>,

    /// Зерно генератора входных матриц; без него каждый прогон случаен
    #[arg(long, env = "DMATMUL_SEED")]
    pub seed: Option<u64>,

    /// Файл для результата; без него матрица печатается в терминал
    #[arg(long, env = "DMATMUL_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Пересчитать произведение на координаторе и сравнить
    #[arg(long, env = "DMATMUL_VERIFY")]
    pub verify: bool,

    /// Напечатать таблицу по участникам
    #[arg(long, env = "DMATMUL_REPORT")]
    pub report: bool,
}

impl Cli {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("число участников должно быть положительным");
        }
        if self.rank >= self.workers {
            bail!("номер участника {} вне диапазона [0, {})", self.rank, self.workers);
        }
        if self.max_size == 0 {
            bail!("максимальный размер матрицы должен быть положительным");
        }
        Ok(())
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            max_size: self.max_size,
            strategy: self.strategy,
            device: self.device,
            kernel: self.kernel.clone().map(KernelSource::File).unwrap_or_default(),
            verify: self.verify,
            report: self.report,
        }
    }
}

/// Параметры прогона, общие для всех участников
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub max_size: usize,
    pub strategy: StrategyChoice,
    pub device: DeviceKind,
    pub kernel: KernelSource,
    pub verify: bool,
    pub report: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            strategy: StrategyChoice::default(),
            device: DeviceKind::default(),
            kernel: KernelSource::default(),
            verify: false,
            report: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["dist_matmul"]).unwrap();
        assert_eq!(cli.workers, 2);
        assert_eq!(cli.rank, 0);
        assert_eq!(cli.max_size, DEFAULT_MAX_SIZE);
        assert_eq!(cli.transport, Transport::Tcp);
        assert!(cli.validate().is_ok());
        assert_eq!(cli.run_config(), RunConfig::default());
    }

    #[test]
    fn kernel_path_becomes_file_source() {
        let cli = Cli::try_parse_from([
            "dist_matmul", "--strategy", "auto", "--kernel", "kernels/matrix_multiplication.cl",
        ])
        .unwrap();
        let config = cli.run_config();
        assert_eq!(config.strategy, StrategyChoice::Auto);
        assert_eq!(config.kernel, KernelSource::File(PathBuf::from("kernels/matrix_multiplication.cl")));
    }

    #[test]
    fn negative_size_reaches_validation() {
        let cli = Cli::try_parse_from(["dist_matmul", "--size", "-3"]).unwrap();
        assert_eq!(cli.size.as_deref(), Some("-3"));
    }

    #[test]
    fn every_option_has_env_twin() {
        let missing: Vec<_> = Cli::command()
            .get_arguments()
            .filter(|arg| !matches!(arg.get_id().as_str(), "help" | "version"))
            .filter(|arg| arg.get_env().is_none())
            .map(|arg| arg.get_id().to_string())
            .collect();
        assert!(missing.is_empty(), "{missing:?}");
    }

    #[test]
    fn rank_outside_group_rejected() {
        let cli = Cli::try_parse_from(["dist_matmul", "--workers", "3", "--rank", "3"]).unwrap();
        assert!(cli.validate().is_err());
        let cli = Cli::try_parse_from(["dist_matmul", "--workers", "0"]).unwrap();
        assert!(cli.validate().is_err());
    }
}
