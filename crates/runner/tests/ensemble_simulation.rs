//! Ensemble Simulation Integration Test
//!
//! Exercises the full harness end to end:
//! - Deterministic particle runs (single and ensemble)
//! - Noisy particle runs seeded per run
//! - Statistics and histograms over the collected histories
//! - Failure, cancellation and progress reporting

use approx::assert_relative_eq;
use rand_distr::{Distribution, Normal};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use subsim_runner::{
    Declarations, Domain, EnsembleConfig, MonteCarloEnsemble, SimError, SubSimulation, Value, ValueKind,
    VariableDecl, init_callback, step_callback,
};

const DT: f64 = 0.1;

fn init_logging() {
    let _ = env_logger::try_init();
}

fn particle_variables() -> Vec<VariableDecl> {
    vec![
        VariableDecl::new("position", 0.0),
        VariableDecl::new("velocity", 1.0),
        VariableDecl::new("time", 0.0),
    ]
}

/// Particle moving at constant velocity
fn particle_ensemble(run_count: usize, step_count: usize) -> MonteCarloEnsemble {
    let mut ensemble =
        MonteCarloEnsemble::new(particle_variables(), run_count, step_count).unwrap();
    ensemble.set_init_callback(|ctx| {
        ctx.set("position", 0.0)?;
        ctx.set("velocity", 1.0)?;
        ctx.set("time", 0.0)
    });
    ensemble.set_step_callback(|ctx, _step| {
        let position: f64 = ctx.get_as("position")?;
        let velocity: f64 = ctx.get_as("velocity")?;
        let time: f64 = ctx.get_as("time")?;
        ctx.set("position", position + velocity * DT)?;
        ctx.set("time", time + DT)
    });
    ensemble
}

/// Particle whose velocity takes a Gaussian kick every step
fn noisy_ensemble(run_count: usize, step_count: usize, seed: u64) -> MonteCarloEnsemble {
    let noise = Normal::new(0.0, 0.5).unwrap();
    let mut ensemble = particle_ensemble(run_count, step_count).with_seed(seed);
    ensemble.set_step_callback(move |ctx, _step| {
        let kick = noise.sample(ctx.rng()?);
        let position: f64 = ctx.get_as("position")?;
        let velocity: f64 = ctx.get_as::<f64>("velocity")? + kick;
        ctx.set("velocity", velocity)?;
        ctx.set("position", position + velocity * DT)
    });
    ensemble
}

#[test]
fn test_single_particle_trajectory() {
    init_logging();
    let mut ensemble = particle_ensemble(1, 10);
    ensemble.run(false).unwrap();

    let run = ensemble.get_subrun(0).unwrap();
    let position = run.history_as::<f64>("position").unwrap();
    let time = run.history_as::<f64>("time").unwrap();

    assert_eq!(position.len(), 10);
    assert_eq!(time.len(), 10);
    for (i, (p, t)) in position.iter().zip(&time).enumerate() {
        let expected = (i + 1) as f64 * DT;
        assert_relative_eq!(*p, expected, epsilon = 1e-9);
        assert_relative_eq!(*t, expected, epsilon = 1e-9);
    }
    assert_eq!(
        run.history_as::<f64>("velocity").unwrap(),
        vec![1.0; 10]
    );
}

#[test]
fn test_single_run_matrix_shape() {
    init_logging();
    let mut ensemble = particle_ensemble(1, 7);
    ensemble.run(false).unwrap();

    let histories = ensemble.get_variable_histories("position").unwrap();
    assert_eq!(histories.len(), 1);
    assert_eq!(histories[0].len(), 7);

    let mean = ensemble.get_variable_mean("position", Domain::Step).unwrap();
    assert_eq!(mean.values, histories[0]);
}

#[test]
fn test_deterministic_ensemble_has_zero_spread() {
    init_logging();
    let mut reference = particle_ensemble(1, 10);
    reference.run(false).unwrap();
    let expected = reference.get_variable_histories("position").unwrap().remove(0);

    let mut ensemble = particle_ensemble(100, 10).with_workers(4);
    ensemble.run(false).unwrap();

    let mean = ensemble.get_variable_mean("position", Domain::Step).unwrap();
    let stddev = ensemble.get_variable_stddev("position", Domain::Step).unwrap();
    let variance = ensemble.get_variable_variance("position", Domain::Step).unwrap();

    assert_eq!(mean.values.len(), 10);
    assert_eq!(mean.values, expected);
    assert_eq!(stddev.values, vec![0.0; 10]);
    assert_eq!(variance.values, vec![0.0; 10]);

    let expected_overall = expected.iter().sum::<f64>() / expected.len() as f64;
    assert_relative_eq!(mean.overall, expected_overall, epsilon = 1e-9);
}

#[test]
fn test_runs_stored_in_index_order() {
    init_logging();
    let mut ensemble = MonteCarloEnsemble::new(vec![VariableDecl::new("id", -1)], 32, 3)
        .unwrap()
        .with_workers(8);
    ensemble.set_init_callback(|ctx| {
        let id = ctx.run_index() as i64;
        ctx.set("id", id)
    });
    ensemble.set_step_callback(|_ctx, _step| Ok(()));
    ensemble.run(false).unwrap();

    for index in 0..32 {
        let run = ensemble.get_subrun(index).unwrap();
        assert_eq!(run.run_index(), index);
        assert_eq!(run.history_as::<i64>("id").unwrap(), vec![index as i64; 3]);
    }
}

#[test]
fn test_seeded_ensemble_reproducible_across_worker_counts() {
    init_logging();
    let mut serial = noisy_ensemble(24, 15, 2024).with_workers(1);
    let mut parallel = noisy_ensemble(24, 15, 2024).with_workers(6);
    serial.run(false).unwrap();
    parallel.run(false).unwrap();

    let a = serial.get_variable_histories("position").unwrap();
    let b = parallel.get_variable_histories("position").unwrap();
    assert_eq!(a, b);

    // Rerunning replaces the results with identical ones
    parallel.run(false).unwrap();
    assert_eq!(parallel.get_variable_histories("position").unwrap(), b);

    // Distinct runs draw distinct noise
    assert_ne!(a[0], a[1]);
}

#[test]
fn test_noisy_statistics_consistent() {
    init_logging();
    let mut ensemble = noisy_ensemble(200, 20, 7);
    ensemble.run(false).unwrap();

    let mean = ensemble.get_variable_mean("position", Domain::Step).unwrap();
    let min = ensemble.get_variable_min("position", Domain::Step).unwrap();
    let max = ensemble.get_variable_max("position", Domain::Step).unwrap();
    let median = ensemble.get_variable_median("position", Domain::Step).unwrap();
    let variance = ensemble.get_variable_variance("position", Domain::Step).unwrap();
    let stddev = ensemble.get_variable_stddev("position", Domain::Step).unwrap();
    let sum = ensemble.get_variable_sum("position", Domain::Step).unwrap();

    for step in 0..20 {
        assert!(min.values[step] <= mean.values[step]);
        assert!(mean.values[step] <= max.values[step]);
        assert!(min.values[step] <= median.values[step]);
        assert!(median.values[step] <= max.values[step]);
        assert_relative_eq!(
            stddev.values[step],
            variance.values[step].sqrt(),
            epsilon = 1e-12
        );
        assert_relative_eq!(sum.values[step], mean.values[step] * 200.0, epsilon = 1e-9);
    }

    // Spread grows as the kicks accumulate
    assert!(variance.values[19] > variance.values[0]);
    // Drift of the deterministic part survives the zero-mean noise
    assert_relative_eq!(mean.values[19], 2.0, epsilon = 1.0);
}

#[test]
fn test_histogram_rows_count_every_run() {
    init_logging();
    let mut ensemble = noisy_ensemble(50, 8, 3);
    ensemble.run(false).unwrap();

    let hist = ensemble.get_variable_histogram("position", 10, false, None).unwrap();
    assert_eq!(hist.counts.len(), 8);
    assert_eq!(hist.bin_edges.len(), 11);
    for row in &hist.counts {
        assert_eq!(row.len(), 10);
        assert_eq!(row.iter().sum::<f64>(), 50.0);
    }

    let density = ensemble.get_variable_histogram("position", 10, true, None).unwrap();
    let width = density.bin_width();
    for row in &density.counts {
        let area: f64 = row.iter().map(|d| d * width).sum();
        assert_relative_eq!(area, 1.0, epsilon = 1e-9);
    }
}

#[test]
fn test_histogram_explicit_range() {
    init_logging();
    let mut ensemble = particle_ensemble(5, 10);
    ensemble.run(false).unwrap();

    // Only steps whose position lies in [0.0, 0.5] are counted
    let hist = ensemble
        .get_variable_histogram("position", 5, false, Some((0.0, 0.5)))
        .unwrap();
    assert_eq!(hist.bin_edges.first(), Some(&0.0));
    assert_eq!(hist.bin_edges.last(), Some(&0.5));
    assert_eq!(hist.counts[0].iter().sum::<f64>(), 5.0);
    assert_eq!(hist.counts[9].iter().sum::<f64>(), 0.0);

    assert!(matches!(
        ensemble.get_variable_histogram("position", 5, false, Some((1.0, 1.0))),
        Err(SimError::InvalidArgument(_))
    ));
}

#[test]
fn test_query_errors() {
    init_logging();
    let mut ensemble = particle_ensemble(3, 4);
    assert_eq!(ensemble.get_subrun(0).unwrap_err(), SimError::NotRun);
    assert_eq!(
        ensemble.get_variable_mean("position", Domain::Step).unwrap_err(),
        SimError::NotRun
    );

    ensemble.run(false).unwrap();

    assert_eq!(
        ensemble.get_subrun(3).unwrap_err(),
        SimError::OutOfRange { index: 3, len: 3 }
    );
    assert!(matches!(
        ensemble.get_variable_histogram("position", 0, false, None),
        Err(SimError::InvalidArgument(_))
    ));
    assert_eq!(
        ensemble.get_variable_max("speed", Domain::Step).unwrap_err(),
        SimError::UnknownVariable("speed".to_string())
    );
    assert_eq!(
        "per_run".parse::<Domain>().unwrap_err(),
        SimError::UnsupportedDomain("per_run".to_string())
    );
}

#[test]
fn test_non_numeric_variable_rejected() {
    init_logging();
    let mut ensemble = MonteCarloEnsemble::new(
        vec![
            VariableDecl::new("state", "idle"),
            VariableDecl::new("active", false),
        ],
        2,
        2,
    )
    .unwrap();
    ensemble.set_init_callback(|ctx| ctx.set("state", "moving"));
    ensemble.set_step_callback(|ctx, step| ctx.set("active", step % 2 == 0));
    ensemble.run(false).unwrap();

    assert_eq!(
        ensemble.get_variable_mean("state", Domain::Step).unwrap_err(),
        SimError::NotNumeric {
            name: "state".to_string(),
            kind: ValueKind::Text,
        }
    );
    assert!(matches!(
        ensemble.get_variable_histogram("active", 2, false, None),
        Err(SimError::NotNumeric { .. })
    ));

    let run = ensemble.get_subrun(1).unwrap();
    assert_eq!(run.history_as::<bool>("active").unwrap(), vec![true, false]);
    assert_eq!(
        run.history("state").unwrap(),
        &[Value::from("moving"), Value::from("moving")]
    );
}

#[test]
fn test_completed_run_context_is_read_only() {
    init_logging();
    let mut ensemble = particle_ensemble(2, 5);
    ensemble.run(false).unwrap();

    let run = ensemble.get_subrun(1).unwrap();
    let mut ctx = run.context();
    assert!(ctx.is_read_only());
    assert_relative_eq!(ctx.get_as::<f64>("position").unwrap(), 0.5, epsilon = 1e-9);
    assert_eq!(ctx.set("position", 9.0).unwrap_err(), SimError::ReadOnly);
    assert!(matches!(ctx.rng(), Err(SimError::ReadOnly)));

    // The final state is also the last logged step
    let last = ctx.past(1).unwrap();
    assert_relative_eq!(last.get_as::<f64>("position").unwrap(), 0.5, epsilon = 1e-9);
    let back = ctx.past(2).unwrap();
    assert_relative_eq!(back.get_as::<f64>("position").unwrap(), 0.4, epsilon = 1e-9);
}

#[test]
fn test_kind_mismatch_fails_run() {
    init_logging();
    let mut ensemble = particle_ensemble(4, 3).with_workers(2);
    ensemble.set_step_callback(|ctx, _step| ctx.set("position", 1_i64));

    let err = ensemble.run(false).unwrap_err();
    assert!(matches!(err, SimError::RunFailed { .. }));
    assert_eq!(
        err.root_cause(),
        &SimError::KindMismatch {
            name: "position".to_string(),
            expected: ValueKind::Float,
            actual: ValueKind::Int,
        }
    );
}

#[test]
fn test_failing_run_aborts_ensemble() {
    init_logging();
    let mut ensemble = particle_ensemble(10, 5).with_workers(1);
    ensemble.set_step_callback(|ctx, step| {
        if ctx.run_index() >= 4 && step == 2 {
            return Err(SimError::callback("particle escaped"));
        }
        Ok(())
    });

    let err = ensemble.run(false).unwrap_err();
    assert!(matches!(err, SimError::RunFailed { run: 4, .. }));
    assert!(!ensemble.has_run());
    assert_eq!(ensemble.get_subrun(0).unwrap_err(), SimError::NotRun);
}

#[test]
fn test_missing_callbacks() {
    init_logging();
    let mut ensemble = MonteCarloEnsemble::new(particle_variables(), 2, 2).unwrap();
    assert!(matches!(
        ensemble.run(false),
        Err(SimError::NotConfigured(_))
    ));
}

#[test]
fn test_invalid_declarations() {
    init_logging();
    let duplicated = vec![VariableDecl::new("x", 0.0), VariableDecl::new("x", 1.0)];
    assert!(matches!(
        MonteCarloEnsemble::new(duplicated, 2, 2),
        Err(SimError::InvalidArgument(_))
    ));
    assert!(matches!(
        MonteCarloEnsemble::new(particle_variables(), 0, 2),
        Err(SimError::InvalidArgument(_))
    ));
}

#[test]
fn test_cancellation_from_another_thread() {
    init_logging();
    let mut ensemble = particle_ensemble(4, 2_000).with_workers(2);
    ensemble.set_step_callback(|_ctx, _step| {
        thread::sleep(Duration::from_millis(1));
        Ok(())
    });

    let handle = ensemble.cancel_handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.cancel();
    });

    assert_eq!(ensemble.run(false).unwrap_err(), SimError::Cancelled);
    canceller.join().unwrap();
    assert!(!ensemble.has_run());
    assert!(ensemble.cancel_handle().is_cancelled());

    // The flag is cleared on the next run
    ensemble.set_step_callback(|_ctx, _step| Ok(()));
    ensemble.run(false).unwrap();
    assert!(ensemble.has_run());
    assert!(!ensemble.cancel_handle().is_cancelled());
}

#[test]
fn test_progress_observer_counts_up() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(AtomicUsize::new(0));

    let mut ensemble = particle_ensemble(20, 5).with_workers(4);
    let (calls_seen, last_seen) = (calls.clone(), last.clone());
    ensemble.set_progress_observer(move |completed: usize, total: usize| {
        assert_eq!(total, 20);
        let previous = last_seen.swap(completed, Ordering::SeqCst);
        assert_eq!(completed, previous + 1);
        calls_seen.fetch_add(1, Ordering::SeqCst);
    });

    ensemble.run(true).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 20);
    assert_eq!(last.load(Ordering::SeqCst), 20);

    // Silent runs skip the observer
    ensemble.run(false).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 20);
}

#[test]
fn test_ensemble_from_json_config() {
    init_logging();
    let config = EnsembleConfig::from_json(
        r#"{
            "run_count": 6,
            "step_count": 4,
            "workers": 3,
            "report_progress": false,
            "seed": 99,
            "variables": [
                {"name": "position", "default": 0.0},
                {"name": "velocity", "default": 1.0},
                {"name": "time", "default": 0.0}
            ]
        }"#,
    )
    .unwrap();

    let mut ensemble = MonteCarloEnsemble::from_config(&config).unwrap();
    ensemble.set_init_callback(|_ctx| Ok(()));
    ensemble.set_step_callback(|ctx, _step| {
        let position: f64 = ctx.get_as("position")?;
        ctx.set("position", position + DT)
    });
    ensemble.run(config.report_progress).unwrap();

    let max = ensemble.get_variable_max("position", Domain::Step).unwrap();
    assert_relative_eq!(max.overall, 0.4, epsilon = 1e-9);
}

#[test]
fn test_standalone_subsimulation_chunks() {
    init_logging();
    let declarations = Arc::new(Declarations::new(particle_variables()).unwrap());
    let mut run = SubSimulation::new(
        declarations,
        init_callback(|_ctx| Ok(())),
        step_callback(|ctx, _step| {
            // Velocity decays to half of what it was two steps back
            let velocity = match ctx.past(2) {
                Ok(past) => past.get_as::<f64>("velocity")? / 2.0,
                Err(_) => 1.0,
            };
            ctx.set("velocity", velocity)
        }),
    );

    run.run_steps(2).unwrap();
    run.run_steps(3).unwrap();
    run.finish();

    assert_eq!(
        run.history_as::<f64>("velocity").unwrap(),
        vec![1.0, 1.0, 0.5, 0.5, 0.25]
    );
    assert!(matches!(run.run_steps(1), Err(SimError::InvalidArgument(_))));
}
