//! Deterministic particle
//!
//! A single run of a particle moving at constant velocity.
//!
//! Run with: `RUST_LOG=info cargo run -p subsim-runner --example particle`

use subsim_runner::{Domain, MonteCarloEnsemble, SimResult, VariableDecl};

const DT: f64 = 0.1;
const STEPS: usize = 10;

fn main() -> SimResult<()> {
    env_logger::init();

    let mut ensemble = MonteCarloEnsemble::new(
        vec![
            VariableDecl::new("position", 0.0),
            VariableDecl::new("velocity", 1.0),
            VariableDecl::new("time", 0.0),
        ],
        1,
        STEPS,
    )?;
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

    ensemble.run(true)?;

    let run = ensemble.get_subrun(0)?;
    let time = run.history_as::<f64>("time")?;
    let position = run.history_as::<f64>("position")?;

    println!("{:>6} {:>10}", "time", "position");
    for (t, x) in time.iter().zip(&position) {
        println!("{:>6.2} {:>10.4}", t, x);
    }

    let mean = ensemble.get_variable_mean("position", Domain::Step)?;
    println!("\nmean position over all steps: {:.4}", mean.overall);

    Ok(())
}
