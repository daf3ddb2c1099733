//! Saving traces to disk. Enabled via the `csv` feature (on by default).
//!
//! The CSV layout is one row per recorded rung per iteration:
//! `chain, phase, iteration, rung, <param names...>, logprior, loglikelihood`.

use std::error::Error;
use std::path::Path;

use crate::trace::{Output, Phase};

/// Writes the full trace of `output` to `path` as CSV.
///
/// ```rust
/// use mc3::config::{Config, Param};
/// use mc3::model::NormalMean;
/// use mc3::sampler::Sampler;
/// use mc3::io::save_csv;
///
/// let mut config = Config::new(vec![0.1, -0.2], vec![Param::unbounded("mu", 0.0)]);
/// config.samples = 10;
/// config.seed = Some(7);
/// let output = Sampler::new(config, NormalMean { sd: 1.0 }).unwrap().run();
/// save_csv(&output, "/tmp/mc3_doc_trace.csv")?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn save_csv<P: AsRef<Path>>(output: &Output, path: P) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["chain".to_string(), "phase".into(), "iteration".into(), "rung".into()];
    header.extend(output.trace.names().iter().cloned());
    header.push("logprior".into());
    header.push("loglikelihood".into());
    writer.write_record(&header)?;

    let chain = output.config.chain.to_string();
    for r in output.trace.records() {
        let phase = match r.phase {
            Phase::Burnin => "burnin",
            Phase::Sampling => "sampling",
        };
        let mut row = vec![
            chain.clone(),
            phase.to_string(),
            r.iteration.to_string(),
            r.rung.to_string(),
        ];
        row.extend(r.theta.iter().map(|t| t.to_string()));
        row.push(r.logprior.to_string());
        row.push(r.loglikelihood.to_string());
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Param};
    use crate::model::NormalMean;
    use crate::sampler::Sampler;

    #[test]
    fn csv_roundtrip_shape() -> Result<(), Box<dyn Error>> {
        let mut config = Config::new(
            vec![0.3, -0.1],
            vec![Param::unbounded("mu", 0.0)],
        );
        config.burnin = crate::config::default_burnin(20);
        config.samples = 5;
        config.seed = Some(11);
        let output = Sampler::new(config, NormalMean { sd: 1.0 })?.run();

        let dir = std::env::temp_dir().join("mc3_io_test");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("trace.csv");
        save_csv(&output, &path)?;

        let mut reader = csv::Reader::from_path(&path)?;
        let headers = reader.headers()?.clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["chain", "phase", "iteration", "rung", "mu", "logprior", "loglikelihood"]
        );
        let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
        assert_eq!(rows.len(), output.trace.len());
        assert_eq!(&rows[0][1], "burnin");
        assert_eq!(&rows[rows.len() - 1][1], "sampling");
        Ok(())
    }
}
