//! Полные прогоны с участниками-задачами в одном процессе

use dist_matmul::comm::{memory_group, Collective, MemoryLink};
use dist_matmul::coordinator::{FixedSize, TextSize};
use dist_matmul::matrix::multiply_full;
use dist_matmul::{
    DistributionCoordinator, LocalMultiplyEngine, MatmulError, Matrix, RunConfig, RunOutcome, StrategyChoice,
    DEFAULT_MAX_SIZE,
};
use tokio::task::JoinHandle;

type MemberHandle = JoinHandle<Result<(), MatmulError>>;

/// Корень группы и запущенные задачи остальных участников
fn start(workers: usize, config: &RunConfig) -> (Collective<MemoryLink>, Vec<MemberHandle>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut group = memory_group(workers);
    let root = group.remove(0);
    let members = group
        .into_iter()
        .map(|collective| tokio::spawn(DistributionCoordinator::new(collective, config.clone()).run_member()))
        .collect();
    (root, members)
}

async fn member_results(members: Vec<MemberHandle>) -> Vec<Result<(), MatmulError>> {
    let mut results = Vec::with_capacity(members.len());
    for member in members {
        results.push(member.await.unwrap());
    }
    results
}

async fn run_seeded(size: usize, workers: usize, seed: u64, config: RunConfig) -> RunOutcome {
    let (root, members) = start(workers, &config);
    let outcome = DistributionCoordinator::new(root, config)
        .with_seed(seed)
        .run_root(FixedSize(size as i64))
        .await
        .unwrap();
    for result in member_results(members).await {
        result.unwrap();
    }
    outcome
}

#[tokio::test]
async fn two_by_two_known_product() {
    let a = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap();
    let b = Matrix::from_rows(vec![vec![5, 6], vec![7, 8]]).unwrap();
    let expected = Matrix::from_rows(vec![vec![19, 22], vec![43, 50]]).unwrap();

    for workers in [1, 2] {
        let config = RunConfig::default();
        let (root, members) = start(workers, &config);
        let outcome = DistributionCoordinator::new(root, config)
            .with_inputs(a.clone(), b.clone())
            .run_root(FixedSize(2))
            .await
            .unwrap();
        assert_eq!(outcome.result, expected, "W={workers}");
        assert!(member_results(members).await.iter().all(Result::is_ok));
    }
}

#[tokio::test]
async fn distributed_matches_single_process_product() {
    for size in 1..=DEFAULT_MAX_SIZE {
        for workers in 1..=size {
            let outcome = run_seeded(size, workers, (size * 31 + workers) as u64, RunConfig::default()).await;
            assert_eq!(outcome.result.size(), size);
            assert_eq!(outcome.result, multiply_full(&outcome.a, &outcome.b).unwrap(), "N={size} W={workers}");
        }
    }
}

#[tokio::test]
async fn more_workers_than_rows() {
    let outcome = run_seeded(3, 5, 11, RunConfig::default()).await;
    assert_eq!(outcome.result, multiply_full(&outcome.a, &outcome.b).unwrap());

    let empty: Vec<_> = outcome.reports.iter().filter(|r| r.range.is_empty()).map(|r| r.rank).collect();
    assert_eq!(empty, vec![0, 1, 2, 3]);
    assert_eq!(outcome.reports[4].range.len(), 3);
}

#[tokio::test]
async fn reports_in_rank_order_cover_all_rows() {
    let config = RunConfig { verify: true, report: true, ..RunConfig::default() };
    let outcome = run_seeded(10, 3, 5, config).await;

    let ranks: Vec<_> = outcome.reports.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![0, 1, 2]);
    let rows: usize = outcome.reports.iter().map(|r| r.range.len()).sum();
    assert_eq!(rows, 10);
    assert!(outcome.reports.iter().all(|r| r.strategy == "sequential"));

    let verification = outcome.verification.unwrap();
    assert!(verification.matches());
}

#[tokio::test]
async fn same_seed_same_inputs() {
    let first = run_seeded(6, 2, 42, RunConfig::default()).await;
    let second = run_seeded(6, 3, 42, RunConfig::default()).await;
    assert_eq!(first.a, second.a);
    assert_eq!(first.b, second.b);
    assert_eq!(first.result, second.result);
}

#[tokio::test]
async fn values_stay_within_generator_range() {
    let outcome = run_seeded(DEFAULT_MAX_SIZE, 4, 3, RunConfig::default()).await;
    assert!(outcome.a.as_slice().iter().chain(outcome.b.as_slice()).all(|v| (1..=10).contains(v)));
    assert!(outcome.result.as_slice().iter().all(|v| (10..=1000).contains(v)));
}

#[tokio::test]
async fn invalid_size_aborts_everyone() {
    for size in [0, -4, DEFAULT_MAX_SIZE as i64 + 1] {
        let config = RunConfig::default();
        let (root, members) = start(3, &config);
        let err = DistributionCoordinator::new(root, config).run_root(FixedSize(size)).await.unwrap_err();
        assert!(matches!(err, MatmulError::InvalidSize { size: s, max: DEFAULT_MAX_SIZE } if s == size));
        assert!(err.is_collective());

        for result in member_results(members).await {
            assert!(matches!(result, Err(MatmulError::Aborted { .. })), "N={size}: {result:?}");
        }
    }
}

#[tokio::test]
async fn unparsable_size_aborts_everyone() {
    let config = RunConfig::default();
    let (root, members) = start(2, &config);
    let err = DistributionCoordinator::new(root, config)
        .run_root(TextSize("десять".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, MatmulError::SizeParse { .. }));
    for result in member_results(members).await {
        assert!(matches!(result, Err(MatmulError::Aborted { .. })));
    }
}

#[tokio::test]
async fn larger_limit_accepts_larger_matrices() {
    let config = RunConfig { max_size: 24, ..RunConfig::default() };
    let outcome = run_seeded(24, 4, 8, config).await;
    assert_eq!(outcome.result, multiply_full(&outcome.a, &outcome.b).unwrap());
}

#[tokio::test]
async fn auto_strategy_always_completes() {
    let config = RunConfig { strategy: StrategyChoice::Auto, verify: true, ..RunConfig::default() };
    let outcome = run_seeded(7, 3, 2, config).await;
    assert!(outcome.verification.unwrap().matches());
}

#[cfg(not(feature = "opencl"))]
#[tokio::test]
async fn required_device_missing_stops_all() {
    let config = RunConfig { strategy: StrategyChoice::Offload, ..RunConfig::default() };
    let (root, members) = start(3, &config);
    let err = DistributionCoordinator::new(root, config).run_root(FixedSize(4)).await.unwrap_err();
    assert!(matches!(err, MatmulError::Device(_)));
    assert!(err.is_collective());
    assert!(member_results(members).await.iter().all(Result::is_err));
}

#[cfg(not(feature = "opencl"))]
#[tokio::test]
async fn one_member_without_device_stops_healthy_ones() {
    let config = RunConfig::default();
    let offload = RunConfig { strategy: StrategyChoice::Offload, ..RunConfig::default() };

    let mut group = memory_group(3);
    let healthy = group.pop().unwrap();
    let failing = group.pop().unwrap();
    let root = group.pop().unwrap();

    let failing = tokio::spawn(DistributionCoordinator::new(failing, offload).run_member());
    let healthy = tokio::spawn(
        DistributionCoordinator::with_engine(healthy, LocalMultiplyEngine::sequential(), config.clone()).run_member(),
    );
    let err = DistributionCoordinator::with_engine(root, LocalMultiplyEngine::sequential(), config)
        .run_root(FixedSize(4))
        .await
        .unwrap_err();

    let MatmulError::Aborted { reason } = &err else { panic!("root: {err:?}") };
    assert!(reason.starts_with("участник 1: "), "{reason}");
    assert!(matches!(failing.await.unwrap(), Err(MatmulError::Device(_))));
    match healthy.await.unwrap() {
        Err(MatmulError::Aborted { reason }) => {
            assert!(reason.starts_with("участник 1: "), "{reason}");
            assert_eq!(MatmulError::Aborted { reason }.to_string().matches("прогон прерван").count(), 1);
        }
        other => panic!("healthy member: {other:?}"),
    }
}

#[tokio::test]
async fn wrong_inputs_shape_aborts() {
    let config = RunConfig::default();
    let (root, members) = start(2, &config);
    let err = DistributionCoordinator::new(root, config)
        .with_inputs(Matrix::identity(3), Matrix::identity(3))
        .run_root(FixedSize(4))
        .await
        .unwrap_err();
    assert!(matches!(err, MatmulError::DimensionMismatch { expected: 4, actual: 3 }));
    for result in member_results(members).await {
        assert!(matches!(result, Err(MatmulError::Aborted { .. })));
    }
}
