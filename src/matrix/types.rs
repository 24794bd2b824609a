//! Типы матриц и связанные структуры

use crate::error::{MatmulError, Result};
use crate::partition::RowRange;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Квадратная целочисленная матрица N×N, хранится построчно
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    size: usize,
    data: Vec<i32>,
}

impl Matrix {
    /// Нулевая матрица
    pub fn zeros(size: usize) -> Self {
        Self { size, data: vec![0; size * size] }
    }

    /// Единичная матрица
    pub fn identity(size: usize) -> Self {
        let mut m = Self::zeros(size);
        for i in 0..size {
            m.data[i * size + i] = 1;
        }
        m
    }

    /// Матрица, элемент (i, j) которой равен `f(i, j)`; обход построчный
    pub fn from_fn(size: usize, mut f: impl FnMut(usize, usize) -> i32) -> Self {
        let mut data = Vec::with_capacity(size * size);
        for i in 0..size {
            for j in 0..size {
                data.push(f(i, j));
            }
        }
        Self { size, data }
    }

    pub fn from_vec(size: usize, data: Vec<i32>) -> Result<Self> {
        if data.len() != size * size {
            return Err(MatmulError::DimensionMismatch {
                expected: size * size,
                actual: data.len(),
            });
        }
        Ok(Self { size, data })
    }

    /// Строит матрицу из строк, все строки должны иметь длину, равную их числу
    pub fn from_rows(rows: Vec<Vec<i32>>) -> Result<Self> {
        let size = rows.len();
        let mut data = Vec::with_capacity(size * size);
        for row in rows {
            if row.len() != size {
                return Err(MatmulError::DimensionMismatch { expected: size, actual: row.len() });
            }
            data.extend(row);
        }
        Ok(Self { size, data })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, row: usize, col: usize) -> i32 {
        self.data[row * self.size + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: i32) {
        self.data[row * self.size + col] = value;
    }

    pub fn row(&self, row: usize) -> &[i32] {
        &self.data[row * self.size..(row + 1) * self.size]
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    /// Длина буфера совпадает с N×N; после приёма по сети это не гарантировано
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.size * self.size
    }

    /// Копия строк из диапазона в виде отдельного блока
    pub fn row_block(&self, range: RowRange) -> RowBlock {
        let start = range.start * self.size;
        let end = range.end * self.size;
        RowBlock {
            start: range.start,
            width: self.size,
            data: self.data[start..end].to_vec(),
        }
    }

    /// Кладёт блок строк на его место в матрице
    pub fn place(&mut self, block: &RowBlock) -> Result<()> {
        if block.width != self.size {
            return Err(MatmulError::DimensionMismatch { expected: self.size, actual: block.width });
        }
        let range = block.range();
        if range.end > self.size {
            return Err(MatmulError::DimensionMismatch { expected: self.size, actual: range.end });
        }
        if block.data.len() != range.len() * self.size {
            return Err(MatmulError::DimensionMismatch { expected: range.len() * self.size, actual: block.data.len() });
        }
        self.data[range.start * self.size..range.end * self.size].copy_from_slice(&block.data);
        Ok(())
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.size {
            let line: Vec<String> = self.row(i).iter().map(|v| v.to_string()).collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

/// Непрерывный блок строк матрицы ширины `width`, начиная со строки `start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowBlock {
    start: usize,
    width: usize,
    data: Vec<i32>,
}

impl RowBlock {
    pub fn new(start: usize, width: usize, data: Vec<i32>) -> Result<Self> {
        if (width == 0 && !data.is_empty()) || (width != 0 && data.len() % width != 0) {
            return Err(MatmulError::DimensionMismatch { expected: width, actual: data.len() });
        }
        Ok(Self { start, width, data })
    }

    /// Пустой блок, начинающийся со строки `start`
    pub fn empty(start: usize, width: usize) -> Self {
        Self { start, width, data: Vec::new() }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn row_count(&self) -> usize {
        if self.width == 0 { 0 } else { self.data.len() / self.width }
    }

    pub fn range(&self) -> RowRange {
        RowRange::new(self.start, self.start + self.row_count())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Строка блока по локальному индексу
    pub fn row(&self, local: usize) -> &[i32] {
        &self.data[local * self.width..(local + 1) * self.width]
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }
}
