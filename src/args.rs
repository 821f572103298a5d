use clap::Parser;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    long_about = None,
    name = "plasmosim",
)]
pub struct Args {
    /// Number of time steps to simulate.
    #[clap(short, long, default_value_t = 730)]
    pub steps: usize,

    /// Path to settings (yaml file).
    #[clap(long)]
    pub settings: String,

    /// Path to an event schedule (csv file) replacing the one in the settings.
    #[clap(long)]
    pub schedule: Option<String>,

    /// Number of hosts in the population.
    #[clap(short = 'n', long, default_value_t = 1000)]
    pub population_size: usize,

    /// Seed of the random streams.
    #[clap(long, default_value_t = 0)]
    pub seed: u64,

    /// Output directory for event and survey tables.
    #[clap(long, short)]
    pub outdir: String,

    /// Path to log file.
    #[clap(long, default_value = "plasmosim.log")]
    pub log_file: String,

    /// Increase logging verbosity.
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Upper bounds of the survey age groups in years.
    #[clap(long, value_delimiter = ',', default_values_t = [1.0, 5.0, 15.0, 45.0])]
    pub age_groups: Vec<f64>,

    /// Write a checkpoint of the population at the end of the run.
    #[clap(long)]
    pub checkpoint: Option<String>,

    /// Resume from a checkpoint instead of creating a new population.
    #[clap(long)]
    pub resume: Option<String>,

    /// Number of threads used for updating hosts.
    #[clap(long)]
    pub threads: Option<usize>,

    /// Disable progress bar.
    #[clap(long, default_value_t = false)]
    pub disable_progress_bar: bool,
}
