use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use inquire::{Select, Text, list_option::ListOption};

use meteo_core::{
    Config, Coordinates, LocationSource, PlaceCandidate, ScreenDeps, WeatherScreen, ensemble_request,
};

use crate::render::{self, Tab};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "meteo", version, about = "Weather lookup for your location or any place")]
pub struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search places by name.
    Search {
        /// Free-text place name, e.g. "Paris".
        query: String,
    },

    /// Show the weather tabs once.
    Show {
        #[arg(long, value_enum, default_value_t = TabArg::All)]
        tab: TabArg,

        #[command(flatten)]
        at: LocationArgs,
    },

    /// Keep showing the weather, following location changes until Ctrl-C.
    Watch {
        #[arg(long, value_enum, default_value_t = TabArg::Currently)]
        tab: TabArg,

        #[command(flatten)]
        at: LocationArgs,
    },

    /// Print the detected position and its address.
    Locate {
        #[command(flatten)]
        at: LocationArgs,
    },

    /// Show an ensemble forecast summary.
    Ensemble {
        /// Ensemble model, e.g. "icon_seamless" or "gfs_seamless".
        #[arg(long)]
        model: Option<String>,

        #[command(flatten)]
        at: LocationArgs,
    },

    /// Interactively choose the location source and default place.
    Configure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TabArg {
    Currently,
    Today,
    Weekly,
    All,
}

impl TabArg {
    fn tabs(self) -> &'static [Tab] {
        match self {
            TabArg::Currently => &[Tab::Currently],
            TabArg::Today => &[Tab::Today],
            TabArg::Weekly => &[Tab::Weekly],
            TabArg::All => Tab::all(),
        }
    }
}

/// Where to look instead of the device position.
#[derive(Debug, Clone, Args)]
pub struct LocationArgs {
    /// Place name; the best search result is used.
    #[arg(long, conflicts_with_all = ["lat", "lon"])]
    pub place: Option<String>,

    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,
}

impl LocationArgs {
    /// Apply `--lat/--lon` to the in-memory config.
    fn apply(&self, config: &mut Config) {
        if let (Some(lat), Some(lon)) = (self.lat, self.lon) {
            config.pin_location(Coordinates::new(lat, lon));
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut config = Config::load()?;

        match self.command {
            Command::Search { query } => search(&config, &query).await,
            Command::Show { tab, at } => {
                at.apply(&mut config);
                let mut deps = ScreenDeps::from_config(&config)?;
                deps.track = false;

                let screen = open_screen(deps, at.place.as_deref()).await?;
                println!("{}", render::render_tabs(tab.tabs(), &screen.state()));
                screen.unmount().await;
                Ok(())
            }
            Command::Watch { tab, at } => {
                at.apply(&mut config);
                let deps = ScreenDeps::from_config(&config)?;
                watch(deps, at.place.as_deref(), tab).await
            }
            Command::Locate { at } => {
                at.apply(&mut config);
                locate(&config).await
            }
            Command::Ensemble { model, at } => {
                at.apply(&mut config);
                ensemble(&config, model.as_deref(), at.place.as_deref()).await
            }
            Command::Configure => configure(config).await,
        }
    }
}

async fn search(config: &Config, query: &str) -> Result<()> {
    let deps = ScreenDeps::from_config(config)?;
    let places = deps.geocoder.search(query).await?;

    if places.is_empty() {
        println!("No places found for \"{query}\".");
    }
    for place in &places {
        println!("{}", render::place_line(place));
    }
    Ok(())
}

async fn best_match(deps: &ScreenDeps, query: &str) -> Result<PlaceCandidate> {
    deps.geocoder
        .search(query)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No places found for \"{query}\"."))
}

async fn open_screen(deps: ScreenDeps, place: Option<&str>) -> Result<WeatherScreen> {
    match place {
        Some(query) => {
            let place = best_match(&deps, query).await?;
            Ok(WeatherScreen::mount_at(deps, &place).await)
        }
        None => Ok(WeatherScreen::mount(deps).await),
    }
}

async fn watch(deps: ScreenDeps, place: Option<&str>, tab: TabArg) -> Result<()> {
    let screen = open_screen(deps, place).await?;
    let mut updates = screen.watch();
    println!("{}", render::render_tabs(tab.tabs(), &screen.state()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                if !state.loading {
                    println!("{}", render::render_tabs(tab.tabs(), &state));
                }
            }
        }
    }

    screen.unmount().await;
    Ok(())
}

async fn locate(config: &Config) -> Result<()> {
    let deps = ScreenDeps::from_config(config)?;

    match deps.tracker.acquire_once().await {
        Ok(Some(coords)) => {
            let address = deps.reverse_geocoder().describe(coords).await;
            println!("{coords}");
            println!("{}", address.unwrap_or_else(|| "(no address found)".to_string()));
        }
        Ok(None) => println!("No device position available; fallback is {}.", deps.fallback),
        Err(e) => println!("Could not read the device position: {e}. Fallback is {}.", deps.fallback),
    }
    Ok(())
}

async fn ensemble(config: &Config, model: Option<&str>, place: Option<&str>) -> Result<()> {
    let deps = ScreenDeps::from_config(config)?;

    let (coords, label) = match place {
        Some(query) => {
            let place = best_match(&deps, query).await?;
            (place.coordinates(), place.label())
        }
        None => match deps.tracker.acquire_once().await {
            Ok(Some(coords)) => (coords, coords.to_string()),
            Ok(None) => (deps.fallback, deps.fallback.to_string()),
            Err(e) => {
                tracing::warn!("could not read device position: {e}");
                (deps.fallback, deps.fallback.to_string())
            }
        },
    };

    let request = ensemble_request(config, coords, model);
    let snapshot = deps
        .weather
        .ensemble(&request)
        .await
        .with_context(|| format!("Ensemble forecast for {label} failed"))?;

    println!("{label} ({})", request.models);
    println!("{}", render::render_ensemble(&snapshot, &request.hourly, &request.daily));
    Ok(())
}

async fn configure(mut config: Config) -> Result<()> {
    let sources: Vec<LocationSource> = LocationSource::all().to_vec();
    let source = Select::new("Where should your position come from?", sources)
        .prompt()
        .context("Location source selection cancelled")?;
    config.set_location_source(source);

    if source == LocationSource::Fixed {
        let deps = ScreenDeps::from_config(&config)?;
        let query = Text::new("Place to pin:").prompt().context("Place prompt cancelled")?;
        let places = deps.geocoder.search(&query).await?;
        if places.is_empty() {
            return Err(anyhow!("No places found for \"{query}\"."));
        }

        let labels: Vec<String> = places.iter().map(render::place_line).collect();
        let chosen = Select::new("Pick a place:", labels)
            .raw_prompt()
            .context("Place selection cancelled")?;
        let place = chosen_place(&places, &chosen).ok_or_else(|| anyhow!("Selected place is no longer listed"))?;
        config.pin_location(place.coordinates());
    }

    let language = Text::new("Search language:")
        .with_default(&config.search.language)
        .prompt()
        .context("Language prompt cancelled")?;
    config.search.language = language;

    let path = config.save()?;
    println!("Saved configuration to {}", path.display());
    Ok(())
}

/// The candidate behind a prompt answer, by position so equal labels stay distinct.
fn chosen_place<'a>(places: &'a [PlaceCandidate], chosen: &ListOption<String>) -> Option<&'a PlaceCandidate> {
    places.get(chosen.index)
}
