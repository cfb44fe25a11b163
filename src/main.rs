use std::fs::File;

use anyhow::{Context, Result};
use clap::Parser;

use cottoncandy::sim::cli::Cli;
use cottoncandy::sim::{driver, report};

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    cli.validate()?;

    let tracker = driver::run(&cli);

    let file = File::create(&cli.file_name)
        .with_context(|| format!("creating topology file {}", cli.file_name))?;
    report::write_topology(&tracker, file)
        .with_context(|| format!("writing topology file {}", cli.file_name))?;
    report::write_summary(&tracker, std::io::stdout()).context("writing summary to stdout")?;

    Ok(())
}
