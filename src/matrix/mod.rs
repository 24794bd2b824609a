//! Модуль для работы с матрицами
//!
//! Предоставляет:
//! - Квадратные матрицы и блоки строк
//! - Генерацию случайных входных данных
//! - Последовательное умножение и сравнение результатов
//! - Исходный код ядра OpenCL

mod types;
mod generator;
pub mod operations;
pub mod kernels;

pub use types::{Matrix, RowBlock};
pub use generator::{RandomMatrixGenerator, VALUE_MAX, VALUE_MIN};
pub use operations::{compare_results, cpu_matrix_multiply, multiply_full, Comparison};
pub use kernels::{KernelSource, KERNEL_ENTRY, MATRIX_MULTIPLY_KERNEL};
