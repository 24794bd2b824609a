//! Операции над матрицами

use super::types::{Matrix, RowBlock};
use crate::error::{MatmulError, Result};
use crate::partition::RowRange;
use log::debug;

/// CPU реализация умножения: строки блока `a` на всю матрицу `b`.
///
/// Тройной цикл: строка, столбец, индекс свёртки. Переполнение
/// заворачивается так же, как целочисленная арифметика ядра OpenCL.
pub fn cpu_matrix_multiply(a: &RowBlock, b: &Matrix) -> Result<RowBlock> {
    let size = b.size();
    if a.width() != size {
        return Err(MatmulError::DimensionMismatch { expected: size, actual: a.width() });
    }

    let rows = a.row_count();
    let mut c = Vec::with_capacity(rows * size);
    for i in 0..rows {
        let a_row = a.row(i);
        for j in 0..size {
            let mut sum = 0i32;
            for (k, &a_ik) in a_row.iter().enumerate() {
                sum = sum.wrapping_add(a_ik.wrapping_mul(b.get(k, j)));
            }
            c.push(sum);
        }
    }
    RowBlock::new(a.range().start, size, c)
}

/// Произведение целиком, одним шагом без разбиения
pub fn multiply_full(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    let block = cpu_matrix_multiply(&a.row_block(RowRange::new(0, a.size())), b)?;
    Matrix::from_vec(b.size(), block.as_slice().to_vec())
}

/// Итог сравнения двух матриц
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    /// Количество различающихся элементов
    pub mismatches: usize,
    /// Первый различающийся элемент (строка, столбец)
    pub first_mismatch: Option<(usize, usize)>,
}

impl Comparison {
    pub fn matches(&self) -> bool {
        self.mismatches == 0
    }
}

/// Сравнивает результат распределённого прогона с эталоном
pub fn compare_results(actual: &Matrix, expected: &Matrix) -> Result<Comparison> {
    if actual.size() != expected.size() {
        return Err(MatmulError::DimensionMismatch { expected: expected.size(), actual: actual.size() });
    }

    let size = actual.size();
    let mut mismatches = 0;
    let mut first_mismatch = None;
    for i in 0..size {
        for j in 0..size {
            if actual.get(i, j) != expected.get(i, j) {
                mismatches += 1;
                first_mismatch.get_or_insert((i, j));
            }
        }
    }

    if mismatches > 0 {
        debug!("Обнаружены расхождения: {} элементов, первое в {:?}", mismatches, first_mismatch);
    }
    Ok(Comparison { mismatches, first_mismatch })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::RandomMatrixGenerator;

    fn sample() -> (Matrix, Matrix) {
        (
            Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap(),
            Matrix::from_rows(vec![vec![5, 6], vec![7, 8]]).unwrap(),
        )
    }

    #[test]
    fn two_by_two_product() {
        let (a, b) = sample();
        let c = multiply_full(&a, &b).unwrap();
        assert_eq!(c, Matrix::from_rows(vec![vec![19, 22], vec![43, 50]]).unwrap());
    }

    #[test]
    fn identity_law() {
        let a = RandomMatrixGenerator::seeded(3).fill(7);
        assert_eq!(multiply_full(&a, &Matrix::identity(7)).unwrap(), a);
        assert_eq!(multiply_full(&Matrix::identity(7), &a).unwrap(), a);
    }

    #[test]
    fn zero_law() {
        let a = RandomMatrixGenerator::seeded(4).fill(5);
        assert_eq!(multiply_full(&a, &Matrix::zeros(5)).unwrap(), Matrix::zeros(5));
    }

    #[test]
    fn single_cell() {
        let a = Matrix::from_rows(vec![vec![3]]).unwrap();
        let b = Matrix::from_rows(vec![vec![9]]).unwrap();
        assert_eq!(multiply_full(&a, &b).unwrap().get(0, 0), 27);
    }

    #[test]
    fn row_slice_keeps_offset() {
        let (a, b) = sample();
        let c = cpu_matrix_multiply(&a.row_block(RowRange::new(1, 2)), &b).unwrap();
        assert_eq!(c.range(), RowRange::new(1, 2));
        assert_eq!(c.row(0), &[43, 50]);
    }

    #[test]
    fn empty_slice_yields_empty_block() {
        let (a, b) = sample();
        let c = cpu_matrix_multiply(&a.row_block(RowRange::new(1, 1)), &b).unwrap();
        assert!(c.is_empty());
        assert_eq!(c.range(), RowRange::new(1, 1));
    }

    #[test]
    fn width_mismatch_rejected() {
        let (a, _) = sample();
        let b = Matrix::identity(3);
        assert!(cpu_matrix_multiply(&a.row_block(RowRange::new(0, 2)), &b).is_err());
    }

    #[test]
    fn compare_counts_mismatches() {
        let (a, _) = sample();
        let mut c = a.clone();
        assert!(compare_results(&a, &c).unwrap().matches());
        c.set(1, 0, 99);
        let cmp = compare_results(&c, &a).unwrap();
        assert_eq!(cmp.mismatches, 1);
        assert_eq!(cmp.first_mismatch, Some((1, 0)));
        assert!(compare_results(&a, &Matrix::zeros(3)).is_err());
    }
}
