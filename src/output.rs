//! Вывод результата прогона

use crate::coordinator::WorkerReport;
use crate::error::{MatmulError, Result};
use crate::matrix::Matrix;
use prettytable::{row, Table};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Куда выводится матрица результата
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Terminal,
    File(PathBuf),
}

impl From<Option<PathBuf>> for Destination {
    fn from(path: Option<PathBuf>) -> Self {
        path.map(Destination::File).unwrap_or(Destination::Terminal)
    }
}

/// Пишет матрицу: числа через пробел, строка матрицы на строку текста
pub fn write_matrix<W: Write>(mut writer: W, matrix: &Matrix) -> std::io::Result<()> {
    write!(writer, "{}", matrix)?;
    writer.flush()
}

/// Выводит матрицу в терминал или файл.
///
/// Ошибка открытия или записи файла возвращается как `Io` и не влияет на
/// уже посчитанную матрицу.
pub fn emit(matrix: &Matrix, destination: &Destination) -> Result<()> {
    match destination {
        Destination::Terminal => {
            println!("Результирующая матрица:");
            print!("{}", matrix);
            Ok(())
        }
        Destination::File(path) => {
            write_file(path, matrix)?;
            println!("Результат записан в {}", path.display());
            Ok(())
        }
    }
}

fn write_file(path: &Path, matrix: &Matrix) -> Result<()> {
    let io_error = |source| MatmulError::Io { path: path.to_path_buf(), source };
    let file = File::create(path).map_err(io_error)?;
    write_matrix(BufWriter::new(file), matrix).map_err(io_error)
}

/// Строка с временем выполнения в микросекундах
pub fn timing_line(elapsed: Duration) -> String {
    format!("Время выполнения: {} мкс", elapsed.as_micros())
}

/// Таблица по участникам: номер, строки, стратегия, время умножения
pub fn report_table(reports: &[WorkerReport]) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Участник", "Строки", "Стратегия", "Умножение, мкс"]);
    for report in reports {
        table.add_row(row![
            report.rank,
            report.range,
            report.strategy,
            report.compute_micros
        ]);
    }
    table
}
