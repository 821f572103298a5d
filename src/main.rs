use clap::Parser;
use plasmosim::args::Args;
use plasmosim::runner::Runner;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut runner = Runner::new(args)?;
    runner.start().inspect_err(|err| log::error!("Simulation failed: {err:#}"))
}
