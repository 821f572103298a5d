use anyhow::{Context, Result};

use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io;
use std::path::Path;

use crate::args::Args;
use crate::config::{Schedule, Settings};
use crate::population::Population;
use crate::reporting::{CsvReporter, SurveyCollector};
use crate::scenario::Scenario;
use crate::transmission::NonVectorTransmission;

pub struct Runner {
    args: Args,
    scenario: Scenario,
    transmission: NonVectorTransmission,
    schedule: Schedule,
    population: Population,
    surveys: SurveyCollector,
}

impl Runner {
    pub fn new(args: Args) -> Result<Runner> {
        Self::setup_logger(&args);
        #[cfg(feature = "parallel")]
        Self::setup_rayon(&args);

        let settings = Self::load_settings(&args.settings)?;
        let schedule = match &args.schedule {
            Some(path) => {
                log::info!("Reading schedule from {path}...");
                Schedule::read(path).with_context(|| format!("invalid schedule {path}"))?
            }
            None => settings.schedule.clone(),
        };
        if schedule.is_empty() {
            log::warn!("The schedule is empty, no surveys will be written.");
        }

        let base_dir = Path::new(&args.settings)
            .parent()
            .unwrap_or_else(|| Path::new("./"));
        let scenario = Scenario::from_settings(&settings, base_dir)?;
        let transmission = NonVectorTransmission::new(&settings.transmission, scenario.clock)?;
        log::info!(
            "Forced transmission with annual EIR {:.2}.",
            transmission.annual_eir()
        );

        let population = match &args.resume {
            Some(checkpoint) => {
                log::info!("Resuming from checkpoint {checkpoint}...");
                Population::read_checkpoint_file(checkpoint)?
            }
            None => {
                println!("Creating {} hosts...", args.population_size);
                Population::new(args.population_size, args.seed, &scenario)?
            }
        };
        let surveys = SurveyCollector::new(args.age_groups.clone());

        Ok(Self {
            args,
            scenario,
            transmission,
            schedule,
            population,
            surveys,
        })
    }

    pub fn start(&mut self) -> Result<()> {
        fs::create_dir_all(&self.args.outdir)
            .with_context(|| format!("unable to create output directory {}", self.args.outdir))?;
        self.run()?;
        self.finish()
    }

    fn finish(&self) -> Result<()> {
        log::info!("Storing surveys...");
        let survey_path = Path::new(self.args.outdir.as_str()).join("surveys.csv");
        let survey_file = io::BufWriter::new(fs::File::create(&survey_path)?);
        self.surveys.write_csv(survey_file)?;
        log::info!(
            "Stored {} survey rows in {}.",
            self.surveys.rows().len(),
            survey_path.display()
        );

        if let Some(checkpoint) = &self.args.checkpoint {
            log::info!("Storing checkpoint...");
            self.population.write_checkpoint_file(checkpoint)?;
        }
        Ok(())
    }

    /// Setup logging level and file
    fn setup_logger(args: &Args) {
        let log_level = match args.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        simple_logging::log_to_file(args.log_file.as_str(), log_level).unwrap_or_else(|_| {
            eprintln!("Unable to open log file.");
            std::process::exit(1);
        });
    }

    /// Setup rayon thread pool
    #[cfg(feature = "parallel")]
    fn setup_rayon(args: &Args) {
        if let Some(n_threads) = args.threads {
            println!("Setting number of threads to {}.", n_threads);
            rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build_global()
                .unwrap_or_else(|_| {
                    eprintln!("Unable to set number of threads.");
                    std::process::exit(1);
                });
        }
    }

    /// Load settings from file
    fn load_settings(path: &str) -> Result<Settings> {
        let settings: Settings =
            Settings::read_from_file(path).with_context(|| format!("invalid settings {path}"))?;
        log::info!("Loaded settings\n{}", settings);
        Ok(settings)
    }

    fn progress_bar(&self) -> Result<Option<ProgressBar>> {
        if self.args.disable_progress_bar {
            return Ok(None);
        }
        let bar = ProgressBar::new(self.args.steps as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "[{bar:40}] {pos:>7}/{len:7} [{elapsed_precise} / {duration_precise}] {msg}",
                )?
                .progress_chars("=> "),
        );
        Ok(Some(bar))
    }

    fn run(&mut self) -> Result<()> {
        let bar = self.progress_bar()?;

        let event_path = Path::new(self.args.outdir.as_str()).join("events.csv");
        let (mut events, writer) =
            CsvReporter::new(io::BufWriter::new(fs::File::create(&event_path)?)).spawn();

        for step in 0..self.args.steps {
            let summary = self.population.step(
                &self.scenario,
                &mut self.transmission,
                &self.schedule,
                &mut (&mut self.surveys, &mut events),
            )?;
            if summary.survey {
                log::info!("Closing survey at step {}...", summary.step);
                self.surveys.close_survey(summary.step);
            }

            log::debug!(
                r###"
        step={}
        kappa={:.5}
        deaths={}"###,
                summary.step,
                summary.kappa,
                summary.deaths
            );

            if let Some(bar) = bar.as_ref() {
                bar.set_position(step as u64 + 1);
                bar.set_message(format!("kappa={:.4}", summary.kappa));
            }
        }
        drop(events);
        writer
            .join()
            .map_err(|_| anyhow::anyhow!("event writer thread panicked"))??;

        if let Some(bar) = bar {
            bar.finish_with_message("Done.");
        }
        log::info!("Finished simulation at step {}.", self.population.now());
        Ok(())
    }
}
