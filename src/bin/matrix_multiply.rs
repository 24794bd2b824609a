//! Сравнение последовательного умножения и выгрузки на OpenCL в одном процессе
use anyhow::{Context, Result};
use clap::Parser;
use dist_matmul::matrix::{compare_results, KernelSource};
use dist_matmul::partition::RowRange;
use dist_matmul::utils::{init_logging, measure_time};
use dist_matmul::{DeviceKind, LocalMultiplyEngine, Matrix, RandomMatrixGenerator, RunConfig, StrategyChoice};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "matrix_multiply", about = "Замер умножения матриц на CPU и на устройстве OpenCL")]
struct Args {
    /// Размер матриц
    #[arg(long, default_value_t = 256)]
    size: usize,

    /// Число повторов каждого замера
    #[arg(long, default_value_t = 5)]
    iterations: u32,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_enum, default_value_t = DeviceKind::Gpu)]
    device: DeviceKind,

    /// Файл с исходным кодом ядра вместо встроенного
    #[arg(long)]
    kernel: Option<PathBuf>,
}

/// Среднее время `iterations` умножений всей матрицы
fn bench(engine: &LocalMultiplyEngine, a: &Matrix, b: &Matrix, iterations: u32) -> Result<(Matrix, Duration)> {
    let range = RowRange::new(0, a.size());
    let mut total = Duration::ZERO;
    let mut last = None;
    for _ in 0..iterations {
        let (rows, elapsed) = measure_time(|| engine.multiply_range(a, b, range));
        total += elapsed;
        last = Some(rows?);
    }
    let rows = last.context("нет ни одного замера")?;
    let mut c = Matrix::zeros(a.size());
    c.place(&rows)?;
    Ok((c, total / iterations))
}

fn main() -> Result<()> {
    init_logging(None);
    let args = Args::parse();
    if args.size == 0 || args.iterations == 0 {
        anyhow::bail!("размер и число повторов должны быть положительными");
    }

    println!("Сравнение производительности умножения матриц");
    println!("Размер матриц: {}x{}, повторов: {}", args.size, args.size, args.iterations);

    let mut generator = match args.seed {
        Some(seed) => RandomMatrixGenerator::seeded(seed),
        None => RandomMatrixGenerator::from_entropy(),
    };
    let a = generator.fill(args.size);
    let b = generator.fill(args.size);

    println!("\nВычисления на CPU...");
    let cpu = LocalMultiplyEngine::sequential();
    let (cpu_result, cpu_avg) = bench(&cpu, &a, &b, args.iterations)?;
    println!("Среднее время CPU: {:.3} мс", cpu_avg.as_secs_f64() * 1000.0);

    let config = RunConfig {
        strategy: StrategyChoice::Offload,
        device: args.device,
        kernel: args.kernel.map(KernelSource::File).unwrap_or_default(),
        ..RunConfig::default()
    };
    let offload = match LocalMultiplyEngine::from_config(&config) {
        Ok(engine) => engine,
        Err(e) => {
            println!("\nУстройство OpenCL недоступно: {}", e);
            return Ok(());
        }
    };

    println!("\nВычисления на устройстве {}...", offload.device_name().unwrap_or("?"));
    // Прогрев: компиляция и первая передача данных не входят в замер
    offload.multiply_range(&a, &b, RowRange::new(0, a.size()))?;
    let (gpu_result, gpu_avg) = bench(&offload, &a, &b, args.iterations)?;
    println!("Среднее время устройства: {:.3} мс", gpu_avg.as_secs_f64() * 1000.0);

    let speedup = cpu_avg.as_secs_f64() / gpu_avg.as_secs_f64().max(f64::EPSILON);
    println!("\nРезультаты сравнения производительности:");
    println!("----------------------------------------");
    println!("Устройство быстрее CPU в {:.2}x раз", speedup);
    println!("Улучшение производительности: {:.1}%", (speedup - 1.0) * 100.0);

    let comparison = compare_results(&gpu_result, &cpu_result)?;
    if comparison.matches() {
        println!("\nРезультаты совпадают");
    } else {
        println!(
            "\nРезультаты различаются: {} элементов, первое расхождение в {:?}",
            comparison.mismatches, comparison.first_mismatch
        );
    }
    Ok(())
}
