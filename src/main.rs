use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use anyhow::anyhow;
use clap::Parser;
use skycast_core::{AppError, Config, LocationSourceKind};
use skycast_weather::{
    view, Command, Coordinate, FixedSource, IpLocator, LocationMonitor, PositionSource,
    WatchOptions, WeatherProvider, WeatherScreen,
};
use tokio::sync::mpsc;

/// SkyCast - current weather for where you are
#[derive(Parser, Debug)]
#[command(name = "skycast", version, about)]
struct Args {
    /// Config file (default: <config dir>/skycast/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Weather endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Location source: fixed or ip
    #[arg(long)]
    source: Option<LocationSourceKind>,

    /// Latitude for the fixed source
    #[arg(long, allow_negative_numbers = true)]
    lat: Option<f64>,

    /// Longitude for the fixed source
    #[arg(long, allow_negative_numbers = true)]
    lon: Option<f64>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(endpoint) = &self.endpoint {
            config.weather.endpoint = endpoint.clone();
        }
        if let Some(lat) = self.lat {
            config.location.latitude = lat;
        }
        if let Some(lon) = self.lon {
            config.location.longitude = lon;
        }
        match self.source {
            Some(source) => config.location.source = source,
            None if self.lat.is_some() || self.lon.is_some() => {
                config.location.source = LocationSourceKind::Fixed;
            }
            None => {}
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = skycast_core::init() {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    args.apply(&mut config);
    let (config, _) = config.into_validated()?;

    let source = build_source(&config)?;
    let options = WatchOptions {
        min_interval: config.location.min_interval(),
        min_distance_meters: config.location.min_distance_meters,
        ..WatchOptions::default()
    };
    let monitor = LocationMonitor::new(source)
        .with_options(options)
        .with_threshold(config.location.significance_degrees);

    let provider = build_provider(&config)?;

    let screen = WeatherScreen::new(monitor, provider);
    let mut view_rx = screen.subscribe();
    let (cmd_tx, cmd_rx) = mpsc::channel(8);

    tracing::info!("SkyCast started (endpoint {})", config.weather.endpoint);
    println!("[r] refresh  [enter/p] pull to refresh  [q] quit");

    let icon_template = config.weather.icon_url_template.clone();
    let renderer = tokio::spawn(async move {
        while view_rx.changed().await.is_ok() {
            let frame = view::render(&view_rx.borrow_and_update(), &icon_template);
            println!("\n{}", frame);
        }
    });

    let session = tokio::spawn(screen.run(cmd_rx));

    // Never joined: a read blocked on an open stdin must not hold up exit.
    spawn_command_reader(std::io::BufReader::new(std::io::stdin()), cmd_tx.clone())?;

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            let _ = cmd_tx.send(Command::Quit).await;
        }
        // The SIGINT handler stays installed, so a second Ctrl-C has to exit here.
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let final_state = session
        .await
        .map_err(|e| anyhow!("Weather screen task failed: {}", e))?;
    interrupt.abort();
    let _ = renderer.await;

    tracing::info!(
        "Session ended after {} weather request(s)",
        final_state.fetch_count
    );
    Ok(())
}

fn build_source(config: &Config) -> Result<Arc<dyn PositionSource>, AppError> {
    let location = &config.location;
    match location.source {
        LocationSourceKind::Fixed => Ok(Arc::new(FixedSource::new(Coordinate::new(
            location.latitude,
            location.longitude,
        )))),
        LocationSourceKind::Ip => {
            let locator = IpLocator::new(location.ip_lookup_url.clone())
                .map_err(|e| anyhow!("Failed to create IP locator: {}", e))?;
            Ok(Arc::new(locator))
        }
    }
}

fn build_provider(config: &Config) -> Result<WeatherProvider, AppError> {
    let provider = WeatherProvider::new(config.weather.endpoint.clone(), config.weather.timeout())
        .map_err(|e| anyhow!("Failed to create weather client: {}", e))?;
    Ok(provider)
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "r" | "refresh" => Some(Command::Refresh),
        "" | "p" | "pull" => Some(Command::PullToRefresh),
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

/// Forward lines from `reader` as commands until quit or EOF.
///
/// Runs on its own OS thread because reads on stdin cannot be cancelled.
fn spawn_command_reader<R>(
    reader: R,
    tx: mpsc::Sender<Command>,
) -> Result<thread::JoinHandle<()>, AppError>
where
    R: BufRead + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("skycast-stdin".into())
        .spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!("Failed to read stdin: {}", e);
                        break;
                    }
                };

                match parse_command(&line) {
                    Some(command) => {
                        if tx.blocking_send(command).is_err() || command == Command::Quit {
                            return;
                        }
                    }
                    None => eprintln!("Unknown command '{}'", line.trim()),
                }
            }

            tx.blocking_send(Command::Quit).ok();
        })?;

    Ok(handle)
}
