//! Генерация случайных входных матриц

use super::types::Matrix;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Наименьшее значение элемента
pub const VALUE_MIN: i32 = 1;
/// Наибольшее значение элемента (включительно)
pub const VALUE_MAX: i32 = 10;

/// Заполняет матрицы независимыми равномерно распределёнными числами из [1, 10]
pub struct RandomMatrixGenerator<R: Rng = StdRng> {
    rng: R,
    dist: Uniform<i32>,
}

impl RandomMatrixGenerator<StdRng> {
    /// Генератор с недетерминированным зерном, для рабочих прогонов
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Генератор с фиксированным зерном, для тестов
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> RandomMatrixGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng, dist: Uniform::new_inclusive(VALUE_MIN, VALUE_MAX) }
    }

    /// Новая матрица size×size
    pub fn fill(&mut self, size: usize) -> Matrix {
        let dist = self.dist;
        Matrix::from_fn(size, |_, _| self.rng.sample(dist))
    }
}
