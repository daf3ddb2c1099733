//! A small demo: infer the mean of a normal with known variance, print the
//! diagnostics, and plot the cold-rung trace.

use std::error::Error;

use mc3::config::{Config, Param};
use mc3::model::NormalMean;
use mc3::sampler::Sampler;
use mc3::stats;
use plotters::prelude::*;
use rand::{thread_rng, Rng};
use rand_distr::StandardNormal;

fn main() -> Result<(), Box<dyn Error>> {
    // Synthetic data: 100 draws from N(3, 1).
    let mut rng = thread_rng();
    let data: Vec<f64> = (0..100)
        .map(|_| 3.0 + rng.sample::<f64, _>(StandardNormal))
        .collect();

    let mut config = Config::new(data, vec![Param::new("mu", -10.0, 10.0, 0.0)]);
    config.samples = 10_000;
    config.rungs = 4;
    config.gti_pow = 2.0;
    config.seed = Some(rng.gen());

    let mut sampler = Sampler::new(config, NormalMean { sd: 1.0 })?;
    let output = sampler.run_progress();

    let draws = output.posterior(0);
    let mean = draws.iter().sum::<f64>() / draws.len() as f64;
    println!("Posterior mean of mu: {mean:.3}");
    println!("ESS: {:.0}", output.diagnostics.ess[0]);
    for pair in &output.diagnostics.swap_sampling {
        println!(
            "Swap {} <-> {}: acceptance {:.3}",
            pair.lower,
            pair.upper,
            pair.rate()
        );
    }
    let rho = stats::autocorrelation(&draws, 10);
    println!("Lag-1 autocorrelation: {:.3}", rho[1]);

    // Trace plot of the cold rung.
    let root = BitMapBackend::new("trace.png", (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let (lo, hi) = draws
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    let mut chart = ChartBuilder::on(&root)
        .caption("Cold-rung trace of mu", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0..draws.len(), lo..hi)?;
    chart.configure_mesh().draw()?;
    chart.draw_series(LineSeries::new(
        draws.iter().copied().enumerate(),
        BLUE.mix(0.7),
    ))?;
    root.present()?;
    println!("Saved trace plot to trace.png");

    #[cfg(feature = "csv")]
    {
        mc3::io::save_csv(&output, "trace.csv")?;
        println!("Saved trace to trace.csv");
    }

    Ok(())
}
