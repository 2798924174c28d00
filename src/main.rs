use std::env;

use anyhow::Context;
use comms::mesh;
use log::info;

use least_squares::{
    DatasetSource, Report, Worker,
    config::{Format, Mode, RunConfig, USAGE},
    fit_local,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match RunConfig::parse(env::args().skip(1), |key| env::var(key).ok()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let source = DatasetSource::File(config.dataset.clone());

    let report = match &config.mode {
        Mode::Local { workers } => {
            info!(workers = workers.get(); "starting a local run");
            Some(
                fit_local(source, *workers, config.residuals)
                    .await
                    .with_context(|| format!("regression over {}", config.dataset.display()))?,
            )
        }
        Mode::Node { rank, peers } => {
            let endpoint = mesh::connect(*rank, peers)
                .await
                .with_context(|| format!("worker {rank} could not join the mesh"))?;

            let source = (*rank == 0).then_some(source);
            Worker::new(endpoint, source)
                .with_residuals(config.residuals)
                .run()
                .await
                .with_context(|| format!("worker {rank} failed"))?
        }
    };

    if let Some(report) = report {
        print(&report, config.format)?;
    }

    Ok(())
}

fn print(report: &Report, format: Format) -> anyhow::Result<()> {
    match format {
        Format::Text => print!("\n{report}"),
        Format::Json => println!("{}", report.to_json().context("encoding the report")?),
    }

    Ok(())
}
