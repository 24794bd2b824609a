//! Запуск локальных участников отдельными процессами

use crate::config::Cli;
use crate::error::{MatmulError, Result};
use clap::ValueEnum;
use log::{debug, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// Процессы участников 1..W, завершаются вместе с координатором
pub struct WorkerProcesses {
    children: Vec<(usize, Child)>,
}

/// Аргументы командной строки участника `rank`
pub fn worker_args(cli: &Cli, rank: usize, coordinator: SocketAddr) -> Vec<String> {
    let mut args = vec![
        "--rank".to_string(),
        rank.to_string(),
        "--workers".to_string(),
        cli.workers.to_string(),
        "--coordinator".to_string(),
        coordinator.to_string(),
        "--transport".to_string(),
        value_name(cli.transport),
        "--no-spawn".to_string(),
        "--strategy".to_string(),
        value_name(cli.strategy),
        "--device".to_string(),
        value_name(cli.device),
        "--max-size".to_string(),
        cli.max_size.to_string(),
    ];
    if let Some(kernel) = &cli.kernel {
        args.push("--kernel".to_string());
        args.push(kernel.display().to_string());
    }
    args
}

fn value_name<T: ValueEnum>(value: T) -> String {
    value
        .to_possible_value()
        .map(|v| v.get_name().to_string())
        .unwrap_or_default()
}

impl WorkerProcesses {
    /// Запускает участников 1..W из того же исполняемого файла
    pub fn spawn(cli: &Cli, coordinator: SocketAddr) -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|source| MatmulError::Io { path: PathBuf::from("<current_exe>"), source })?;

        let mut children = Vec::with_capacity(cli.workers.saturating_sub(1));
        for rank in 1..cli.workers {
            let child = Command::new(&exe)
                .args(worker_args(cli, rank, coordinator))
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| MatmulError::Io { path: exe.clone(), source })?;
            debug!("Запущен участник {} (pid {:?})", rank, child.id());
            children.push((rank, child));
        }
        Ok(Self { children })
    }

    /// Ждёт завершения всех участников; `true`, если все завершились успешно
    pub async fn wait(mut self) -> Result<bool> {
        let mut all_ok = true;
        for (rank, child) in &mut self.children {
            let status: ExitStatus = child.wait().await?;
            if !status.success() {
                warn!("Участник {} завершился с кодом {:?}", rank, status.code());
                all_ok = false;
            }
        }
        Ok(all_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn worker_args_round_trip_through_cli() {
        let cli = Cli::try_parse_from([
            "dist_matmul", "--workers", "4", "--strategy", "auto", "--max-size", "12", "--kernel", "k.cl",
        ])
        .unwrap();
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();

        let mut argv = vec!["dist_matmul".to_string()];
        argv.extend(worker_args(&cli, 3, addr));
        let worker = Cli::try_parse_from(argv).unwrap();

        assert_eq!(worker.rank, 3);
        assert_eq!(worker.workers, 4);
        assert_eq!(worker.coordinator, "127.0.0.1:4000");
        assert!(worker.no_spawn);
        assert_eq!(worker.strategy, cli.strategy);
        assert_eq!(worker.max_size, 12);
        assert_eq!(worker.kernel, Some(PathBuf::from("k.cl")));
        assert!(worker.validate().is_ok());
    }
}
