//! Разбиение строк матрицы между участниками

use crate::error::{MatmulError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Полуоткрытый диапазон строк [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Диапазоны строк для всех участников.
///
/// Участник `w` получает строки `[w·⌊N/W⌋, (w+1)·⌊N/W⌋)`, последний
/// забирает остаток до `N`. При `N < W` все диапазоны, кроме последнего,
/// пусты.
pub fn plan(size: usize, workers: usize) -> Result<Vec<RowRange>> {
    if size == 0 {
        return Err(MatmulError::Protocol("размер матрицы должен быть положительным".into()));
    }
    if workers == 0 {
        return Err(MatmulError::Protocol("число участников должно быть положительным".into()));
    }
    Ok((0..workers).map(|w| range_for(size, workers, w)).collect())
}

/// Диапазон одного участника, совпадает с `plan(size, workers)[worker]`
pub fn range_for(size: usize, workers: usize, worker: usize) -> RowRange {
    let rows_per_worker = size / workers;
    let start = worker * rows_per_worker;
    let end = if worker + 1 == workers { size } else { (worker + 1) * rows_per_worker };
    RowRange::new(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(size: usize, workers: usize) {
        let ranges = plan(size, workers).unwrap();
        assert_eq!(ranges.len(), workers);
        let mut next = 0;
        for r in &ranges {
            assert_eq!(r.start, next, "N={size} W={workers}: {ranges:?}");
            assert!(r.start <= r.end);
            next = r.end;
        }
        assert_eq!(next, size);
    }

    #[test]
    fn ranges_partition_all_rows() {
        for size in 1..=12 {
            for workers in 1..=15 {
                assert_partition(size, workers);
            }
        }
    }

    #[test]
    fn last_worker_takes_remainder() {
        let ranges = plan(10, 3).unwrap();
        assert_eq!(ranges, vec![RowRange::new(0, 3), RowRange::new(3, 6), RowRange::new(6, 10)]);
    }

    #[test]
    fn more_workers_than_rows_gives_empty_ranges() {
        let ranges = plan(2, 4).unwrap();
        assert!(ranges[..3].iter().all(RowRange::is_empty));
        assert_eq!(ranges[3], RowRange::new(0, 2));
    }

    #[test]
    fn zero_size_or_workers_rejected() {
        assert!(matches!(plan(0, 2), Err(MatmulError::Protocol(_))));
        assert!(matches!(plan(3, 0), Err(MatmulError::Protocol(_))));
        let message = plan(0, 2).unwrap_err().to_string();
        assert!(!message.contains(&usize::MAX.to_string()), "{message}");
    }

    #[test]
    fn range_for_matches_plan() {
        let ranges = plan(7, 3).unwrap();
        for (w, r) in ranges.iter().enumerate() {
            assert_eq!(range_for(7, 3, w), *r);
        }
    }
}
