use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

use anifetch::assets::prepare_source;
use anifetch::cache::CacheStore;
use anifetch::config::{Config, LoopCount, RefreshInterval, SoundSpec, DEFAULT_RENDER_ARGS};
use anifetch::engine::prepare;
use anifetch::errors::{find_app_error, AppError};
use anifetch::layout::LayoutPlan;
use anifetch::logging;
use anifetch::scheduler::{PlaybackOptions, Player, SystemClock};
use anifetch::terminal::TerminalScreen;
use anifetch::tools::Toolbox;

const DATA_DIR_NAME: &str = "anifetch";

#[derive(Debug, Parser)]
#[command(name = "anifetch")]
#[command(about = "Play a text-art video loop next to your system info")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ANIFETCH_GIT_HASH"), ")"))]
struct Cli {
    /// Video or GIF to play. Looked up in the assets directory when not found.
    filename: Option<PathBuf>,

    /// Animation width in columns.
    #[arg(short = 'w', long, default_value_t = anifetch::config::DEFAULT_WIDTH)]
    width: u32,

    /// Animation height in rows. Inferred from the video aspect ratio when omitted.
    #[arg(short = 'H', long)]
    height: Option<u32>,

    /// Blank rows above the drawing.
    #[arg(short = 't', long, default_value_t = anifetch::config::DEFAULT_TOP)]
    top: u16,

    #[arg(short = 'v', long)]
    verbose: bool,

    /// Frames per second extracted from the video.
    #[arg(short = 'r', long, default_value_t = anifetch::config::DEFAULT_FRAMERATE)]
    framerate: u32,

    /// Frames per second during playback. Ignored while sound plays.
    #[arg(long, default_value_t = anifetch::config::DEFAULT_PLAYBACK_RATE)]
    playback_rate: f64,

    /// Play sound: a file, or the video's own audio when no file is given.
    #[arg(short = 's', long, value_name = "FILE", num_args = 0..=1)]
    sound: Option<Option<PathBuf>>,

    /// Ignore any cached frames and render again.
    #[arg(long)]
    force_render: bool,

    /// Vertically center the shorter of the animation and the info panel.
    #[arg(short = 'C', long)]
    center: bool,

    /// Argument passed to chafa. Repeat for several.
    #[arg(long = "chafa-arg", value_name = "ARG", allow_hyphen_values = true)]
    chafa_args: Vec<String>,

    /// Clear the screen on exit.
    #[arg(long)]
    cleanup: bool,

    /// Run neofetch even when it is only a fastfetch wrapper.
    #[arg(long)]
    force: bool,

    /// Number of times to play the animation; -1 loops forever.
    #[arg(short = 'l', long = "loop", default_value_t = -1, allow_negative_numbers = true)]
    loop_count: i64,

    /// ffmpeg extraction quality: 2-5 high, 6-10 lower.
    #[arg(short = 'q', long, default_value_t = anifetch::config::DEFAULT_QUALITY)]
    quality: u8,

    /// Use neofetch instead of fastfetch.
    #[arg(long)]
    neofetch: bool,

    /// Chroma key as 0xRRGGBB:similarity:blend, e.g. 0xc82044:0.1:0.1.
    #[arg(long)]
    chroma: Option<String>,

    /// Seconds between info refreshes; -1 never refreshes.
    #[arg(short = 'i', long, default_value_t = -1.0, allow_negative_numbers = true)]
    interval: f64,

    /// Keep playing when a key is pressed. Ctrl-C still exits.
    #[arg(long)]
    no_key_exit: bool,

    /// List cached configurations.
    #[arg(long)]
    cache_list: bool,

    /// Delete cached configurations by their --cache-list number.
    #[arg(long, value_name = "N", num_args = 1..)]
    delete: Vec<usize>,

    /// Delete every cached configuration.
    #[arg(long)]
    clear: bool,

    /// Prepare frames, print the elapsed seconds and exit without playing.
    #[arg(short = 'b', long)]
    benchmark: bool,

    /// Where caches and assets are stored.
    #[arg(long, env = "ANIFETCH_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

impl Cli {
    fn to_config(&self) -> Result<Config> {
        let render_args = if self.chafa_args.is_empty() {
            DEFAULT_RENDER_ARGS.iter().map(|arg| (*arg).to_owned()).collect()
        } else {
            self.chafa_args.clone()
        };
        let loop_count = LoopCount::try_from(self.loop_count)
            .map_err(|message| AppError::config("E_LOOP", message))?;
        let sound = match &self.sound {
            None => SoundSpec::Off,
            Some(None) => SoundSpec::FromSource,
            Some(Some(file)) => SoundSpec::File(file.clone()),
        };
        Ok(Config {
            source: None,
            width: self.width,
            height: self.height,
            top: self.top,
            framerate: self.framerate,
            playback_rate: self.playback_rate,
            quality: self.quality,
            render_args,
            center: self.center,
            loop_count,
            interval: RefreshInterval::from(self.interval),
            chroma: self.chroma.clone(),
            sound,
            neofetch: self.neofetch,
            force_neofetch: self.force,
            cleanup: self.cleanup,
            no_key_exit: self.no_key_exit,
            verbose: self.verbose,
            benchmark: self.benchmark,
            force_render: self.force_render,
        })
    }

    fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join(DATA_DIR_NAME))
            .context("could not determine the user data directory; pass --data-dir")
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(&cli) {
        Ok(()) => Ok(()),
        Err(error) => match find_app_error(&error) {
            Some(coded) if coded.kind.is_user_facing() => {
                debug!(code = coded.code, "exiting on user-facing error");
                eprintln!("[ERROR] {}", coded.message);
                std::process::exit(1);
            }
            _ => Err(error),
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    let started = Instant::now();
    let quiet = cli.benchmark;
    let store = CacheStore::open(cli.data_dir()?)?;

    if cli.cache_list {
        return list_caches(&store, quiet);
    }
    if !cli.delete.is_empty() {
        return delete_caches(&store, &cli.delete, quiet);
    }
    if cli.clear {
        let removed = store.clear()?;
        say(quiet, &format!("All cache entries have been cleared ({removed} removed)."));
        return Ok(());
    }

    let config = cli.to_config()?;
    config.validate()?;
    let Some(filename) = cli.filename.as_deref() else {
        return Err(AppError::missing_input(
            "Missing input: give a video file, or use --cache-list, --delete or --clear.",
        )
        .into());
    };
    let config = config.with_source(prepare_source(filename, &store.assets_dir())?);

    let tools = Toolbox::system(&config)?;
    let info_lines = tools.info.info_lines()?;
    let mut prepared = prepare(&config, &store, &tools, &mut |line: &str| say(quiet, line))?;

    if config.benchmark {
        println!("{}", started.elapsed().as_secs_f64());
        return Ok(());
    }

    let plan = LayoutPlan::new(prepared.width, prepared.height, config.center);
    let options = PlaybackOptions {
        fps: config.playback_fps(prepared.sound.is_some()),
        loop_count: config.loop_count,
        top: usize::from(config.top),
        key_exit: !config.no_key_exit,
        refresh: config.interval,
        sound: prepared.sound.clone(),
        cleanup: config.cleanup,
    };
    let screen = TerminalScreen::new()?;
    let mut player = Player::new(screen, SystemClock::new(), plan, options);
    let outcome = player.run(&mut prepared.frames, &info_lines, &tools)?;
    debug!(?outcome, frames = player.frames_shown(), "playback finished");
    Ok(())
}

fn say(quiet: bool, line: &str) {
    if !quiet {
        println!("{line}");
    }
}

fn list_caches(store: &CacheStore, quiet: bool) -> Result<()> {
    let registry = store.load_registry()?;
    if registry.is_empty() {
        say(quiet, "No cached configurations found.");
        return Ok(());
    }
    say(quiet, "Available caches:");
    for (position, entry) in registry.entries().iter().enumerate() {
        say(quiet, &format!("[{}] {}", position + 1, entry.summary()));
    }
    Ok(())
}

fn delete_caches(store: &CacheStore, numbers: &[usize], quiet: bool) -> Result<()> {
    let indices = numbers
        .iter()
        .map(|number| number.checked_sub(1).unwrap_or(usize::MAX))
        .collect::<Vec<_>>();
    let report = store.delete(&indices)?;
    for index in &report.out_of_range {
        let number = index.checked_add(1).map_or_else(|| "0".to_owned(), |n| n.to_string());
        eprintln!("[ERROR] No cache found with number {number}");
    }
    for dir in &report.missing_dirs {
        say(quiet, &format!("[WARNING] Cache directory {} already missing.", dir.display()));
    }
    for entry in &report.removed {
        say(quiet, &format!("Deleted cache: {}", entry.summary()));
    }
    Ok(())
}
