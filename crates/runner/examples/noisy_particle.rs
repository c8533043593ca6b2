//! Noisy particle ensemble
//!
//! Many runs of a particle whose velocity takes a Gaussian kick every step.
//! Prints per-step statistics and a density histogram of the final positions.
//!
//! Run with: `RUST_LOG=info cargo run -p subsim-runner --example noisy_particle`

use rand_distr::{Distribution, Normal};
use subsim_runner::{Domain, EnsembleConfig, MonteCarloEnsemble, SimError, VariableDecl};

const DT: f64 = 0.1;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = EnsembleConfig::new(1_000, 50)
        .with_seed(42)
        .with_variables(vec![
            VariableDecl::new("position", 0.0),
            VariableDecl::new("velocity", 1.0),
        ]);

    let noise = Normal::new(0.0, 0.3).map_err(|e| SimError::InvalidArgument(e.to_string()))?;

    let mut ensemble = MonteCarloEnsemble::from_config(&config)?;
    ensemble.set_init_callback(|ctx| {
        ctx.set("position", 0.0)?;
        ctx.set("velocity", 1.0)
    });
    ensemble.set_step_callback(move |ctx, _step| {
        let kick = noise.sample(ctx.rng()?);
        let position: f64 = ctx.get_as("position")?;
        let velocity = ctx.get_as::<f64>("velocity")? + kick;
        ctx.set("velocity", velocity)?;
        ctx.set("position", position + velocity * DT)
    });

    ensemble.run(config.report_progress)?;

    let mean = ensemble.get_variable_mean("position", Domain::Step)?;
    let stddev = ensemble.get_variable_stddev("position", Domain::Step)?;
    let median = ensemble.get_variable_median("position", Domain::Step)?;

    println!("{:>5} {:>10} {:>10} {:>10}", "step", "mean", "stddev", "median");
    for step in (0..config.step_count).step_by(5) {
        println!(
            "{:>5} {:>10.4} {:>10.4} {:>10.4}",
            step, mean.values[step], stddev.values[step], median.values[step]
        );
    }

    let hist = ensemble.get_variable_histogram("position", 20, true, None)?;
    let last = config.step_count - 1;
    let peak = hist.counts[last].iter().cloned().fold(0.0, f64::max);

    println!("\nfinal position density ({} runs)", config.run_count);
    for (bin, density) in hist.counts[last].iter().enumerate() {
        let bar = if peak > 0.0 {
            "#".repeat((density / peak * 40.0).round() as usize)
        } else {
            String::new()
        };
        println!("{:>8.3} {:>8.4} {}", hist.bin_edges[bin], density, bar);
    }

    Ok(())
}
