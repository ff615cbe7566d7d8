use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use nimbus_core::{AppError, Config, NetworkError};
use nimbus_weather::{
    Coordinate, LocationResolver, LocationSearch, SettingsStore, SharedConnectivity,
    SqliteStore, StaticSensor, ViewState, WeatherCache, WeatherFetcher, WeatherOrchestrator,
};

const FIRST_VIEW_TIMEOUT: Duration = Duration::from_secs(30);

/// Show current conditions and the forecast for where you are.
#[derive(Debug, Parser)]
#[command(name = "nimbus", version)]
struct Args {
    /// Skip the network and show cached weather only
    #[arg(long)]
    offline: bool,

    /// Look up a place by name and make it the selected location
    #[arg(long, value_name = "QUERY")]
    search: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    nimbus_core::init()?;

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), AppError> {
    let (config, _) = Config::load_validated()?;
    std::fs::create_dir_all(&config.config_dir)?;

    let store = SqliteStore::new(config.cache_path())?;
    let cache = WeatherCache::new(Arc::new(store));

    let sensor = match config.location.fixed_position {
        Some([lat, lon]) => StaticSensor::fixed(Coordinate::new(lat, lon)),
        None => StaticSensor::unavailable(),
    };
    let resolver = Arc::new(
        LocationResolver::new(Arc::new(sensor), cache.clone())
            .with_default_position(Coordinate::new(
                config.location.default_latitude,
                config.location.default_longitude,
            ))
            .with_sensor_timeout(Duration::from_secs(config.location.sensor_timeout_secs)),
    );

    if let Some(query) = &args.search {
        let search = LocationSearch::new(&config.provider)?;
        match search.search(query).await?.first() {
            Some(found) => {
                let selected = found.to_selected_location();
                tracing::info!("Selected {:?}", selected.city);
                resolver.set_selected_location(selected)?;
            }
            None => println!("No places found for {query:?}"),
        }
    }

    let settings = Arc::new(SettingsStore::load(cache.clone()));
    let connectivity = Arc::new(SharedConnectivity::new(!args.offline));
    let fetcher = WeatherFetcher::new(&config.provider, cache.clone())?;

    let orchestrator = Arc::new(
        WeatherOrchestrator::new(resolver, settings, connectivity, fetcher, cache)
            .with_debounce(Duration::from_millis(config.refresh.debounce_ms)),
    );

    let mut views = orchestrator.subscribe();
    let handle = orchestrator.start();

    let first_view = tokio::time::timeout(FIRST_VIEW_TIMEOUT, async {
        loop {
            views.changed().await.map_err(anyhow::Error::new)?;
            let view = views.borrow_and_update().clone();
            if !view.is_loading {
                return Ok::<_, AppError>(view);
            }
        }
    })
    .await
    .map_err(|_| NetworkError::Timeout)??;

    handle.shutdown().await;
    print_view(&first_view);
    Ok(())
}

fn print_view(view: &ViewState) {
    let symbol = view.temperature_unit.symbol();

    if let Some(position) = view.position {
        println!(
            "Location: {:.4}, {:.4} ({:?})",
            position.coords.latitude, position.coords.longitude, position.source
        );
    }
    println!("Online: {}", view.is_online);
    if let Some(message) = &view.error_message {
        println!("Note: {message}");
    }

    if let Some(current) = &view.current_weather {
        let name = current["name"].as_str().unwrap_or("Unknown");
        let condition = current["weather"][0]["description"].as_str().unwrap_or("");
        match current["main"]["temp"].as_f64() {
            Some(temp) => println!("\n{name}: {temp:.1}{symbol} {condition}"),
            None => println!("\n{name}: {condition}"),
        }
    }

    if !view.hourly.is_empty() {
        println!("\nToday:");
        for entry in &view.hourly {
            println!(
                "  {:02}:00  {:>6.1}{}  {}",
                entry.hour_of_day.unwrap_or_default(),
                entry.temperature,
                symbol,
                entry.condition
            );
        }
    }

    if !view.daily.is_empty() {
        println!("\nNext days:");
        for entry in &view.daily {
            let day = chrono::DateTime::from_timestamp(entry.timestamp, 0)
                .map(|t| t.with_timezone(&chrono::Local).format("%a %d %b").to_string())
                .unwrap_or_default();
            println!(
                "  {:<10}  {:>6.1}{}  {}",
                day, entry.temperature, symbol, entry.condition
            );
        }
    }
}
