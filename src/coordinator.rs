//! Распределённый прогон умножения
//!
//! Порядок для каждого участника:
//! 1. сбор готовности движков (ошибка подготовки устройства прерывает всех);
//! 2. координатор получает N и рассылает его;
//! 3. все строят одинаковое разбиение `plan(N, W)`;
//! 4. координатор создаёт A и B, раздаёт строки A и рассылает B целиком;
//! 5. каждый умножает свои строки;
//! 6. координатор собирает строки результата.
//!
//! Время измеряется координатором для шагов 4–6.

use crate::comm::{Collective, Link};
use crate::config::RunConfig;
use crate::engine::LocalMultiplyEngine;
use crate::error::{DeviceError, MatmulError, Result};
use crate::matrix::{compare_results, multiply_full, Comparison, Matrix, RandomMatrixGenerator, RowBlock};
use crate::partition::{plan, RowRange};
use crate::utils::measure_time;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

/// Откуда координатор берёт размер матрицы
pub trait SizeSource {
    fn read_size(&mut self, max: usize) -> Result<i64>;
}

impl<T: SizeSource + ?Sized> SizeSource for Box<T> {
    fn read_size(&mut self, max: usize) -> Result<i64> {
        (**self).read_size(max)
    }
}

/// Заранее известный размер
#[derive(Debug, Clone, Copy)]
pub struct FixedSize(pub i64);

impl SizeSource for FixedSize {
    fn read_size(&mut self, _max: usize) -> Result<i64> {
        Ok(self.0)
    }
}

/// Размер в виде текста, например из аргумента командной строки
#[derive(Debug, Clone)]
pub struct TextSize(pub String);

impl SizeSource for TextSize {
    fn read_size(&mut self, _max: usize) -> Result<i64> {
        parse_size(&self.0)
    }
}

/// Спрашивает размер в терминале
pub struct Prompt<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl<R: BufRead, W: Write> SizeSource for Prompt<R, W> {
    fn read_size(&mut self, max: usize) -> Result<i64> {
        let io_error = |source| MatmulError::Io { path: "<stdin>".into(), source };
        write!(self.writer, "Введите размер матрицы (до {}): ", max).map_err(io_error)?;
        self.writer.flush().map_err(io_error)?;

        let mut line = String::new();
        self.reader.read_line(&mut line).map_err(io_error)?;
        parse_size(&line)
    }
}

pub fn parse_size(input: &str) -> Result<i64> {
    input
        .trim()
        .parse()
        .map_err(|_| MatmulError::SizeParse { input: input.trim().to_string() })
}

/// Проверяет 1 ≤ N ≤ max
pub fn validate_size(size: i64, max: usize) -> Result<usize> {
    match usize::try_from(size) {
        Ok(n) if (1..=max).contains(&n) => Ok(n),
        _ => Err(MatmulError::InvalidSize { size, max }),
    }
}

/// Откуда координатор берёт входные матрицы A и B размера N
pub trait InputSource {
    fn inputs(&mut self, size: usize) -> Result<(Matrix, Matrix)>;
}

/// Случайные матрицы; без зерна генератор инициализируется из энтропии
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomInputs {
    pub seed: Option<u64>,
}

impl InputSource for RandomInputs {
    fn inputs(&mut self, size: usize) -> Result<(Matrix, Matrix)> {
        let mut generator = match self.seed {
            Some(seed) => RandomMatrixGenerator::seeded(seed),
            None => RandomMatrixGenerator::from_entropy(),
        };
        let a = generator.fill(size);
        let b = generator.fill(size);
        Ok((a, b))
    }
}

/// Заранее заданные матрицы
#[derive(Debug, Clone)]
pub struct FixedInputs {
    pub a: Matrix,
    pub b: Matrix,
}

impl InputSource for FixedInputs {
    fn inputs(&mut self, size: usize) -> Result<(Matrix, Matrix)> {
        if self.a.size() != size || self.b.size() != size {
            return Err(MatmulError::DimensionMismatch { expected: size, actual: self.a.size().max(self.b.size()) });
        }
        Ok((self.a.clone(), self.b.clone()))
    }
}

/// Готовность движка участника перед прогоном
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Readiness {
    Ready,
    Failed { reason: String },
}

/// Что участник сообщает о своей части работы
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub rank: usize,
    pub range: RowRange,
    pub strategy: String,
    pub compute_micros: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WorkerResult {
    report: WorkerReport,
    rows: RowBlock,
}

/// Итог прогона на координаторе
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub a: Matrix,
    pub b: Matrix,
    pub result: Matrix,
    /// Время раздачи, умножения и сбора
    pub elapsed: Duration,
    /// Отчёты участников в порядке номеров
    pub reports: Vec<WorkerReport>,
    /// Сравнение с умножением без разбиения, если запрошено
    pub verification: Option<Comparison>,
}

/// Ведёт прогон целиком с точки зрения одного участника
pub struct DistributionCoordinator<L: Link> {
    collective: Collective<L>,
    engine: Result<LocalMultiplyEngine, DeviceError>,
    config: RunConfig,
    inputs: Box<dyn InputSource + Send>,
}

impl<L: Link> DistributionCoordinator<L> {
    /// Движок создаётся по конфигурации; ошибка подготовки станет
    /// коллективной на первом шаге прогона
    pub fn new(collective: Collective<L>, config: RunConfig) -> Self {
        let engine = LocalMultiplyEngine::from_config(&config);
        Self { collective, engine, config, inputs: Box::new(RandomInputs::default()) }
    }

    pub fn with_engine(collective: Collective<L>, engine: LocalMultiplyEngine, config: RunConfig) -> Self {
        Self { collective, engine: Ok(engine), config, inputs: Box::new(RandomInputs::default()) }
    }

    /// Готовые A и B вместо случайных; учитывается только у координатора
    pub fn with_inputs(self, a: Matrix, b: Matrix) -> Self {
        self.with_input_source(FixedInputs { a, b })
    }

    /// Генератор с фиксированным зерном вместо недетерминированного
    pub fn with_seed(self, seed: u64) -> Self {
        self.with_input_source(RandomInputs { seed: Some(seed) })
    }

    /// Свой источник входных матриц; учитывается только у координатора
    pub fn with_input_source(mut self, source: impl InputSource + Send + 'static) -> Self {
        self.inputs = Box::new(source);
        self
    }

    pub fn rank(&self) -> usize {
        self.collective.rank()
    }

    /// Прогон на координаторе
    pub async fn run_root<S: SizeSource>(self, mut sizes: S) -> Result<RunOutcome> {
        if !self.collective.is_root() {
            return Err(MatmulError::Protocol("run_root вызван не на координаторе".into()));
        }
        self.guarded(Some(&mut sizes))
            .await?
            .ok_or_else(|| MatmulError::Protocol("координатор не получил результат".into()))
    }

    /// Прогон на остальных участниках
    pub async fn run_member(self) -> Result<()> {
        if self.collective.is_root() {
            return Err(MatmulError::Protocol("run_member вызван на координаторе".into()));
        }
        self.guarded::<FixedSize>(None).await.map(|_| ())
    }

    /// Любая ошибка прерывает прогон у всех: координатор рассылает отказ,
    /// участник отправляет его координатору.
    async fn guarded<S: SizeSource>(self, sizes: Option<&mut S>) -> Result<Option<RunOutcome>> {
        let Self { mut collective, engine, config, inputs } = self;
        let rank = collective.rank();
        let run = Run { config: &config, inputs };

        match run.execute(&mut collective, engine, sizes).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                match &e {
                    MatmulError::Aborted { reason } if collective.is_root() => collective.abort(reason).await,
                    MatmulError::Aborted { .. } => {}
                    other => collective.abort(&other.to_string()).await,
                }
                debug!("Участник {} завершился с ошибкой: {}", rank, e);
                Err(e)
            }
        }
    }
}

struct Run<'a> {
    config: &'a RunConfig,
    inputs: Box<dyn InputSource + Send>,
}

impl Run<'_> {
    async fn execute<L: Link, S: SizeSource>(
        mut self,
        collective: &mut Collective<L>,
        engine: Result<LocalMultiplyEngine, DeviceError>,
        sizes: Option<&mut S>,
    ) -> Result<Option<RunOutcome>> {
        let rank = collective.rank();
        let workers = collective.size();
        let is_root = collective.is_root();

        // Подготовка устройства: сбой у любого участника прерывает всех
        let readiness = match &engine {
            Ok(_) => Readiness::Ready,
            Err(e) => Readiness::Failed { reason: e.to_string() },
        };
        let readiness = collective.gather(readiness).await?;
        let engine = engine?;
        if let Some(all) = readiness {
            for (peer, state) in all.into_iter().enumerate() {
                if let Readiness::Failed { reason } = state {
                    return Err(MatmulError::Aborted { reason: format!("участник {peer}: {reason}") });
                }
            }
        }

        // Шаг 1-2: размер
        let size = if is_root {
            let sizes = sizes.ok_or_else(|| MatmulError::Protocol("у координатора нет источника размера".into()))?;
            let requested = sizes.read_size(self.config.max_size)?;
            let size = validate_size(requested, self.config.max_size)?;
            collective.broadcast(Some(size)).await?
        } else {
            collective.broadcast::<usize>(None).await?
        };
        debug!("Участник {}: N = {}", rank, size);

        // Шаг 3: разбиение одинаково у всех
        let ranges = plan(size, workers)?;
        let own_range = ranges[rank];

        // Шаг 4: раздача входных данных; подготовка A и B в замер не входит
        let prepared = if is_root { Some(self.inputs.inputs(size)?) } else { None };
        let started = Instant::now();
        let (inputs, a_rows, b) = if let Some((a, b)) = prepared {
            let parts = ranges.iter().map(|range| a.row_block(*range)).collect();
            let a_rows: RowBlock = collective.scatter(Some(parts)).await?;
            let b = collective.broadcast(Some(b)).await?;
            (Some(a), a_rows, b)
        } else {
            let a_rows: RowBlock = collective.scatter(None).await?;
            let b: Matrix = collective.broadcast(None).await?;
            (None, a_rows, b)
        };
        if a_rows.range() != own_range || a_rows.width() != size {
            return Err(MatmulError::Protocol(format!(
                "участник {rank} получил строки {} вместо {own_range}",
                a_rows.range()
            )));
        }
        if b.size() != size || !b.is_consistent() {
            return Err(MatmulError::DimensionMismatch { expected: size, actual: b.size() });
        }

        // Шаг 5: локальное умножение
        let (rows, compute) = measure_time(|| engine.multiply(&a_rows, &b));
        let rows = rows?;
        debug!("Участник {}: строки {} за {:?}", rank, own_range, compute);

        // Шаг 6: сбор
        let own = WorkerResult {
            report: WorkerReport {
                rank,
                range: own_range,
                strategy: engine.strategy_name().to_string(),
                compute_micros: u64::try_from(compute.as_micros()).unwrap_or(u64::MAX),
            },
            rows,
        };
        let Some(results) = collective.gather(own).await? else {
            return Ok(None);
        };

        let mut result = Matrix::zeros(size);
        let mut reports = Vec::with_capacity(workers);
        for (peer, part) in results.into_iter().enumerate() {
            if part.rows.range() != ranges[peer] {
                return Err(MatmulError::Protocol(format!(
                    "участник {peer} вернул строки {} вместо {}",
                    part.rows.range(),
                    ranges[peer]
                )));
            }
            result.place(&part.rows)?;
            reports.push(part.report);
        }
        let elapsed = started.elapsed();
        info!("Прогон N = {} на {} участниках занял {:?}", size, workers, elapsed);

        let a = inputs.ok_or_else(|| MatmulError::Protocol("координатор потерял матрицу A".into()))?;
        let verification = if self.config.verify {
            Some(compare_results(&result, &multiply_full(&a, &b)?)?)
        } else {
            None
        };

        Ok(Some(RunOutcome { a, b, result, elapsed, reports, verification }))
    }
}
