//! Вспомогательные функции и утилиты

use std::io::Write;
use std::time::Instant;

/// Измеряет время выполнения функции
pub fn measure_time<F, T>(f: F) -> (T, std::time::Duration)
where
    F: FnOnce() -> T
{
    let start = Instant::now();
    let result = f();
    let duration = start.elapsed();
    (result, duration)
}

/// Настраивает `env_logger`; уровень по умолчанию `warn`, меняется через `RUST_LOG`.
/// Строки участника с номером `rank` помечаются этим номером.
pub fn init_logging(rank: Option<usize>) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(rank) = rank {
        builder.format(move |buf, record| {
            writeln!(buf, "[{} участник {}] {}", record.level(), rank, record.args())
        });
    }
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_time_returns_result() {
        let (value, duration) = measure_time(|| 6 * 7);
        assert_eq!(value, 42);
        assert!(duration.as_secs() < 1);
    }
}
