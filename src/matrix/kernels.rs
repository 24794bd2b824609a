//! OpenCL ядра для умножения матриц

use crate::error::DeviceError;
use std::fs;
use std::path::PathBuf;

/// Имя точки входа ядра
pub const KERNEL_ENTRY: &str = "matrixMultiplication";

/// Исходный код ядра для умножения блока строк.
///
/// `a` и `c` содержат только строки `[row_start, row_end)`, `b` целиком.
/// Глобальный размер работы: (row_end - row_start) × n.
pub static MATRIX_MULTIPLY_KERNEL: &str = r#"
__kernel void matrixMultiplication(
    __global const int* a,
    __global const int* b,
    __global int* c,
    const int n,
    const int row_start,
    const int row_end
) {
    const int local_row = get_global_id(0);
    const int col = get_global_id(1);

    if (row_start + local_row >= row_end || col >= n) {
        return;
    }

    int sum = 0;
    for (int k = 0; k < n; k++) {
        sum += a[local_row * n + k] * b[k * n + col];
    }
    c[local_row * n + col] = sum;
}
"#;

/// Откуда брать исходный код ядра
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KernelSource {
    /// Встроенный `MATRIX_MULTIPLY_KERNEL`
    #[default]
    Builtin,
    /// Внешний файл с точкой входа `matrixMultiplication`
    File(PathBuf),
}

impl KernelSource {
    pub fn load(&self) -> Result<String, DeviceError> {
        match self {
            KernelSource::Builtin => Ok(MATRIX_MULTIPLY_KERNEL.to_string()),
            KernelSource::File(path) => fs::read_to_string(path)
                .map_err(|source| DeviceError::KernelSource { path: path.clone(), source }),
        }
    }
}
