use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

mod cancel;
mod clock;
mod config;
mod error;
mod http;
mod lastfm;
mod ledger;
mod play;
mod radio;
mod range;
mod scrobbler;
mod station;
mod times;

use crate::cancel::CancelToken;
use crate::clock::{Clock, SystemClock};
use crate::config::{config_path, default_app_dir, load_config, save_config};
use crate::http::HttpFetcher;
use crate::lastfm::{LastFmClient, fetch_mobile_session};
use crate::ledger::Ledger;
use crate::radio::RadioClient;
use crate::scrobbler::{Completion, Mode, Scrobbler};
use crate::station::Station;

#[derive(Parser)]
#[command(
    name = "npoleon",
    version,
    about = "Scrobble NPO radio plays to Last.fm"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Defaults to ~/.npoleon")]
    data_dir: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Log debug output")]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the Last.fm API key and secret.
    SetKeys {
        #[arg(long, help = "API key")]
        api_key: String,
        #[arg(long, help = "API secret")]
        api_secret: String,
    },
    /// Authenticate with Last.fm and store the session key.
    Login {
        #[arg(long, help = "Last.fm username")]
        username: String,
        #[arg(long, help = "Last.fm password, prompted when omitted")]
        password: Option<String>,
    },
    /// List the supported stations.
    Stations,
    /// Scrobble the plays of a station.
    Scrobble(ScrobbleArgs),
}

#[derive(Parser)]
#[command(after_help = "Examples:
  npoleon scrobble radio2
  npoleon scrobble 3fm --once
  npoleon scrobble radio1 --from 08:00 --until 12:00
  npoleon scrobble radio2 --from \"2024-01-31 20:00\" --until 2024-01-31")]
struct ScrobbleArgs {
    #[arg(help = "Station name, see `npoleon stations`")]
    station: String,
    #[arg(short, long, help = "Scrobble what is on air now, then exit")]
    once: bool,
    #[arg(short, long, value_name = "TIME", help = "Scrobble plays from this moment")]
    from: Option<String>,
    #[arg(short, long, value_name = "TIME", help = "Scrobble plays until this moment")]
    until: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(cli) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let app_dir = cli.data_dir.unwrap_or_else(default_app_dir);
    match cli.command {
        Commands::SetKeys {
            api_key,
            api_secret,
        } => {
            let path = config_path(&app_dir);
            let mut config = load_config(&path)?;
            config.api_key = api_key;
            config.api_secret = api_secret;
            save_config(&config, &path)?;
            println!("Saved API keys in {}", path.display());
        }
        Commands::Login { username, password } => handle_login(&app_dir, &username, password)?,
        Commands::Stations => {
            for station in Station::ALL {
                println!(
                    "{}\t{}\t{}",
                    station.id(),
                    station.display_name(),
                    station.aliases().join(", ")
                );
            }
        }
        Commands::Scrobble(args) => handle_scrobble(&app_dir, args)?,
    }
    Ok(())
}

fn handle_login(app_dir: &Path, username: &str, password: Option<String>) -> Result<()> {
    let path = config_path(app_dir);
    let mut config = load_config(&path)?;
    let keys = config.clone().with_env_overrides();
    keys.require_keys()?;

    let password = match password {
        Some(value) => value,
        None => rpassword::prompt_password("Password: ")?,
    };
    let session_key = fetch_mobile_session(&keys.api_key, &keys.api_secret, username, &password)?;

    config.session_key = Some(session_key);
    save_config(&config, &path)?;
    println!("Logged in as {username}, session saved in {}", path.display());
    Ok(())
}

fn handle_scrobble(app_dir: &Path, args: ScrobbleArgs) -> Result<()> {
    let station = Station::parse(&args.station)?;
    let credentials = load_config(&config_path(app_dir))?
        .with_env_overrides()
        .credentials()?;

    let clock = SystemClock;
    let now = clock.now();
    let from = args
        .from
        .as_deref()
        .map(|text| times::parse_from(text, now))
        .transpose()?;
    let until = args
        .until
        .as_deref()
        .map(|text| times::parse_until(text, now))
        .transpose()?;
    let mode = Mode::select(args.once, from, until)?;

    let cancel = CancelToken::new();
    cancel
        .cancel_on_signal()
        .context("Failed installing the stop signal handler")?;

    let service = LastFmClient::new(
        &credentials.api_key,
        &credentials.api_secret,
        &credentials.session_key,
    )?;
    let radio = RadioClient::new(HttpFetcher::new()?, station)
        .with_context(|| format!("Failed connecting to {}", station.display_name()))?;
    let scrobbler = Scrobbler::new(radio, service, Ledger::new(app_dir), clock, cancel);

    if scrobbler.run(mode)? == Completion::Cancelled {
        info!("Stopped");
    }
    Ok(())
}
