//! Ошибки распределённого умножения

use std::path::PathBuf;
use thiserror::Error;

/// Ошибки подготовки и работы вычислительного устройства
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Крейт собран без поддержки OpenCL
    #[error("поддержка OpenCL не включена при сборке (feature \"opencl\")")]
    Unsupported,

    #[error("не найдено ни одной платформы OpenCL")]
    NoPlatform,

    #[error("на платформе нет подходящего устройства")]
    NoDevice,

    /// Не удалось прочитать файл с исходным кодом ядра
    #[error("не удалось прочитать исходный код ядра {path}: {source}")]
    KernelSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Ошибка компиляции ядра, `log` содержит лог сборки
    #[error("ошибка компиляции ядра:\n{log}")]
    KernelBuild { log: String },

    /// Вызов OpenCL при подготовке контекста, очереди или ядра вернул ошибку
    #[error("не удалось подготовить устройство: {call} вернул код {code}")]
    Init { call: &'static str, code: i32 },

    /// Вызов OpenCL во время вычислений вернул ненулевой код
    #[error("{call} вернул код ошибки {code}")]
    Call { call: &'static str, code: i32 },
}

impl DeviceError {
    /// Ошибка возникла при подготовке устройства, а не во время вычислений
    pub fn is_setup(&self) -> bool {
        !matches!(self, DeviceError::Call { .. })
    }

    /// Переводит ошибку вызова в ошибку подготовки
    pub fn into_setup(self) -> Self {
        match self {
            DeviceError::Call { call, code } => DeviceError::Init { call, code },
            other => other,
        }
    }
}

/// Общая ошибка прогона
#[derive(Debug, Error)]
pub enum MatmulError {
    #[error("недопустимый размер матрицы {size}: ожидается от 1 до {max}")]
    InvalidSize { size: i64, max: usize },

    #[error("не удалось разобрать размер матрицы: {input:?}")]
    SizeParse { input: String },

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("ошибка ввода-вывода ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ошибка транспорта: {0}")]
    Transport(String),

    #[error("нарушение протокола: {0}")]
    Protocol(String),

    /// Прогон прерван одним из участников
    #[error("прогон прерван: {reason}")]
    Aborted { reason: String },

    #[error("несовместимые размеры: ожидалось {expected}, получено {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl MatmulError {
    /// Ошибка должна завершить всех участников, а не только локальный процесс
    pub fn is_collective(&self) -> bool {
        match self {
            MatmulError::InvalidSize { .. }
            | MatmulError::SizeParse { .. }
            | MatmulError::Aborted { .. } => true,
            MatmulError::Device(e) => e.is_setup(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for MatmulError {
    fn from(e: std::io::Error) -> Self {
        MatmulError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for MatmulError {
    fn from(e: serde_json::Error) -> Self {
        MatmulError::Protocol(e.to_string())
    }
}

pub type Result<T, E = MatmulError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_size_is_collective() {
        assert!(MatmulError::InvalidSize { size: 0, max: 10 }.is_collective());
        assert!(MatmulError::Device(DeviceError::NoPlatform).is_collective());
        assert!(MatmulError::Device(DeviceError::KernelBuild { log: String::new() }).is_collective());
        let init = DeviceError::Call { call: "clCreateContext", code: -6 }.into_setup();
        assert!(matches!(init, DeviceError::Init { code: -6, .. }));
        assert!(MatmulError::Device(init).is_collective());
    }

    #[test]
    fn io_failure_is_local() {
        let err = MatmulError::Io {
            path: PathBuf::from("output.txt"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!err.is_collective());
        let call = MatmulError::Device(DeviceError::Call { call: "clFinish", code: -5 });
        assert!(!call.is_collective());
    }
}
