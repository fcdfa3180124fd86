use anyhow::Result;
use clap::Parser;
use repeatgt::cli::Cli;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let sample_name = cli.sample_name()?;

    if let Some(reference) = &cli.reference {
        repeatgt::validate_reference(reference)?;
    }

    repeatgt::run(
        &cli.alignment,
        cli.reference.as_deref(),
        &cli.catalog,
        &sample_name,
        cli.female,
        cli.threads,
    )
}
