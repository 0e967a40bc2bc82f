//! heatflux - command-line entry point
//!
//! `fetch` saves a raw ASOS record from the Iowa Environmental Mesonet;
//! `run` turns a record (downloaded or local) into the energy table
//! described by a site file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use heatflux_service::config::{self, SiteConfig};
use heatflux_service::energy;
use heatflux_service::ingest::elevation::OpenTopoData;
use heatflux_service::ingest::iem::{self, IEM_BASE_URL};
use heatflux_service::logging::{self, DataSource, LogLevel};
use heatflux_service::pipeline;
use heatflux_service::solar::IneichenClearSky;

/// Command-line arguments for heatflux
#[derive(Parser, Debug)]
#[command(name = "heatflux")]
#[command(about = "Water-surface heat flux from ASOS station observations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the raw ASOS record for a station and period
    Fetch {
        /// Station identifier, e.g. OGA
        #[arg(long)]
        station: String,
        /// First day, YYYYMMDD
        #[arg(long)]
        start: String,
        /// Last day, YYYYMMDD
        #[arg(long)]
        end: String,
        /// Where to save the record
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        #[arg(long, env = config::ENV_IEM_URL, default_value = IEM_BASE_URL)]
        iem_url: String,
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
    /// Compute the energy table for the site described by a config file
    Run {
        /// Site file (TOML)
        #[arg(short, long, value_name = "FILE", env = "HEATFLUX_CONFIG")]
        config: PathBuf,
        /// Use a saved ASOS record instead of downloading one
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
        /// Write the table here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Emit JSON instead of CSV
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Fetch { station, start, end, output, iem_url, timeout_secs } => {
            logging::init_logger(LogLevel::Info, None, false);
            fetch(&station, &start, &end, &output, &iem_url, timeout_secs)
        }
        Command::Run { config, input, output, json } => run(&config, input, output, json),
    }
}

fn fetch(station: &str, start: &str, end: &str, output: &Path, iem_url: &str, timeout_secs: u64) -> Result<()> {
    let start = iem::parse_request_date(start)?;
    let end = iem::parse_request_date(end)?;
    let client = iem::build_client(timeout_secs)?;

    logging::info(DataSource::Iem, Some(station), &format!("Downloading {} to {}", start, end));
    let text = iem::fetch_asos_csv(&client, iem_url, station, start, end)
        .inspect_err(|e| logging::log_service_failure(DataSource::Iem, Some(station), "ASOS download", e))?;

    std::fs::write(output, text).with_context(|| format!("Failed to write {}", output.display()))?;
    logging::info(DataSource::Iem, Some(station), &format!("Saved record to {}", output.display()));
    Ok(())
}

fn run(config_path: &Path, input: Option<PathBuf>, output: Option<PathBuf>, json: bool) -> Result<()> {
    let mut site_config = config::load_config(config_path)
        .with_context(|| format!("Failed to load site file {}", config_path.display()))?;
    site_config.apply_env_overrides();

    logging::init_logger(
        site_config.log_level()?,
        site_config.logging.file.as_deref(),
        site_config.logging.timestamps,
    );

    let client = iem::build_client(site_config.services.timeout_secs)?;
    let raw_text = match input {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => download(&client, &site_config)?,
    };

    let batch = iem::parse_asos_csv(&raw_text).context("Failed to parse ASOS record")?;
    let station = site_config.station.as_deref();
    for rejected in &batch.rejected {
        logging::warn(
            DataSource::Iem,
            station,
            &format!("line {} skipped: {}", rejected.line, rejected.reason),
        );
    }
    if batch.malformed_values > 0 {
        logging::warn(
            DataSource::Iem,
            station,
            &format!("{} unparseable value(s) treated as missing", batch.malformed_values),
        );
    }

    let elevation = OpenTopoData::new(client, &site_config.services.elevation_base_url);
    let clear_sky = IneichenClearSky::new(site_config.solar.linke_turbidity);

    let result = pipeline::run(
        &batch.observations,
        &site_config.site_request(),
        &site_config.flux_parameters(),
        &elevation,
        &clear_sky,
    )?;

    let mut out: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };
    if json {
        writeln!(out, "{}", energy::to_json(&result.energy)?)?;
        out.flush()?;
    } else {
        energy::write_csv(&result.energy, &mut out)?;
    }

    let summary = energy::summarize(&result.energy);
    logging::info(
        DataSource::Engine,
        station,
        &format!(
            "{} rows ({} dropped); mean net flux {:.1} W/m² (SW {:.1}, LW↓ {:.1}, LW↑ {:.1}, H {:.1}, LE {:.1})",
            summary.rows,
            summary.dropped,
            summary.mean_net_flux,
            summary.mean_downwelling_sw,
            summary.mean_downwelling_lw,
            summary.mean_upwelling_lw,
            summary.mean_sensible_heat,
            summary.mean_latent_heat
        ),
    );
    Ok(())
}

fn download(client: &reqwest::blocking::Client, site_config: &SiteConfig) -> Result<String> {
    let (Some(station), Some(start), Some(end)) = (
        site_config.station.as_deref(),
        site_config.start.as_deref(),
        site_config.end.as_deref(),
    ) else {
        bail!("site file needs station, start and end when no --input is given");
    };

    let start = iem::parse_request_date(start)?;
    let end = iem::parse_request_date(end)?;
    logging::info(DataSource::Iem, Some(station), "Downloading ASOS record");

    let text = iem::fetch_asos_csv(client, &site_config.services.iem_base_url, station, start, end)
        .inspect_err(|e| logging::log_service_failure(DataSource::Iem, Some(station), "ASOS download", e))?;
    Ok(text)
}
