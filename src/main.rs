//! Распределённое умножение матриц: координатор и участники

use anyhow::{Context, Result};
use clap::Parser;
use dist_matmul::comm::{memory_group, tcp, Collective, Link};
use dist_matmul::coordinator::{Prompt, SizeSource, TextSize};
use dist_matmul::launcher::WorkerProcesses;
use dist_matmul::output::{emit, report_table, timing_line, Destination};
use dist_matmul::utils::init_logging;
use dist_matmul::{Cli, DistributionCoordinator, RunConfig, RunOutcome, Transport};
use log::warn;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(match cli.transport {
        Transport::Tcp => Some(cli.rank),
        Transport::Memory => None,
    });

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Ошибка: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    cli.validate()?;
    let config = cli.run_config();
    match cli.transport {
        Transport::Memory => run_memory(&cli, config).await,
        Transport::Tcp if cli.rank == 0 => run_tcp_root(&cli, config).await,
        Transport::Tcp => run_tcp_member(&cli, config).await,
    }
}

/// Все участники задачами одного процесса
async fn run_memory(cli: &Cli, config: RunConfig) -> Result<ExitCode> {
    let mut group = memory_group(cli.workers);
    let root = group.remove(0);
    let members: Vec<_> = group
        .into_iter()
        .map(|collective| tokio::spawn(DistributionCoordinator::new(collective, config.clone()).run_member()))
        .collect();

    let outcome = coordinator(cli, root, config).run_root(size_source(cli)).await;
    for member in members {
        if let Err(e) = member.await.context("задача участника аварийно завершилась")? {
            warn!("Участник завершился с ошибкой: {}", e);
        }
    }
    finish(cli, outcome?)
}

/// Координатор: слушает адрес, при необходимости запускает участников
async fn run_tcp_root(cli: &Cli, config: RunConfig) -> Result<ExitCode> {
    let (listener, addr) = tcp::bind(&cli.coordinator)
        .await
        .with_context(|| format!("не удалось слушать {}", cli.coordinator))?;

    let workers = if cli.workers == 1 {
        None
    } else if cli.no_spawn {
        println!("Ожидание {} участников на {}", cli.workers - 1, addr);
        None
    } else {
        Some(WorkerProcesses::spawn(cli, addr)?)
    };

    let collective = tcp::accept_group(&listener, cli.workers).await?;
    let outcome = coordinator(cli, collective, config).run_root(size_source(cli)).await;

    if let Some(workers) = workers {
        if !workers.wait().await? {
            warn!("Не все участники завершились успешно");
        }
    }
    finish(cli, outcome?)
}

async fn run_tcp_member(cli: &Cli, config: RunConfig) -> Result<ExitCode> {
    let collective = tcp::connect(&cli.coordinator, cli.rank, cli.workers)
        .await
        .with_context(|| format!("участник {} не подключился к {}", cli.rank, cli.coordinator))?;
    DistributionCoordinator::new(collective, config).run_member().await?;
    Ok(ExitCode::SUCCESS)
}

fn coordinator<L: Link>(
    cli: &Cli,
    collective: Collective<L>,
    config: RunConfig,
) -> DistributionCoordinator<L> {
    let coordinator = DistributionCoordinator::new(collective, config);
    match cli.seed {
        Some(seed) => coordinator.with_seed(seed),
        None => coordinator,
    }
}

fn size_source(cli: &Cli) -> Box<dyn SizeSource> {
    match &cli.size {
        Some(text) => Box::new(TextSize(text.clone())),
        None => Box::new(Prompt::new(std::io::stdin().lock(), std::io::stdout())),
    }
}

/// Вывод на координаторе; сбой записи результата не делает прогон ошибочным
fn finish(cli: &Cli, outcome: RunOutcome) -> Result<ExitCode> {
    println!("{}", timing_line(outcome.elapsed));

    if let Some(comparison) = &outcome.verification {
        if comparison.matches() {
            println!("Результаты распределённого и последовательного умножения совпадают");
        } else {
            println!(
                "Результаты различаются: {} элементов, первое расхождение в {:?}",
                comparison.mismatches, comparison.first_mismatch
            );
        }
    }

    if cli.report {
        report_table(&outcome.reports).printstd();
    }

    match emit(&outcome.result, &Destination::from(cli.output.clone())) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("Не удалось вывести результат: {}", e);
            Ok(ExitCode::from(2))
        }
    }
}
