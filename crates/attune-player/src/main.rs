//! Attune Player - terminal binaural session player
//!
//! This is the main entry point for the command line application. It:
//! 1. Loads the session configuration from the Attune library
//! 2. Builds the mixing engine on the backend the flags select
//! 3. Runs one listening session and renders or plays the result
//!
//! ## Command line flags
//!
//! - `--list`: Print the built-in presets and ambient sounds, then exit
//! - `--preset <id>`: Override the configured preset
//! - `--ambient <id>`: Layer an ambient bed under the binaural tone
//! - `--minutes <n>`: Session length in minutes (0 = until stopped)
//! - `--seconds <n>`: Session length in seconds (overrides `--minutes`)
//! - `--out <path>`: Output WAV path for render mode
//! - `--dry-run`: Drive the simulated backend and print its op log
//! - `--live`: Play through the system audio device (needs the `live-audio` feature)
//!
//! Without `--dry-run` or `--live` the session is rendered offline to a WAV
//! file named `attune-session-<timestamp>.wav`.

mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam::channel::Receiver;

use attune_core::audio::{AudioBackend, RenderBackend, SimBackend};
use attune_core::engine::{AudioMixer, MixerEvent};
use attune_core::presets::PresetCatalog;

use config::SessionConfig;

/// Render length when neither the flags nor the config give one
const DEFAULT_RENDER_SECS: u64 = 30;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("attune-player starting up");

    let cli = match CliArgs::parse(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    if cli.help {
        print_usage();
        return Ok(());
    }

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                        Attune Player                         ║");
    println!("║                binaural + ambient sessions                   ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    if cli.list {
        print_catalog();
        return Ok(());
    }

    let config_path = config::config_path();
    let config: SessionConfig = attune_core::config::load_config(&config_path);

    // Single thread is plenty: the session loop spends its time sleeping
    // and the engine itself is synchronous apart from resume settling
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to build tokio runtime")?;

    if cli.dry_run {
        rt.block_on(run_dry_run(&cli, &config))
    } else if cli.live {
        rt.block_on(run_live(&cli, &config))
    } else {
        rt.block_on(run_render(&cli, &config))
    }
}

// ─── Session flow ────────────────────────────────────────────────────────────

/// Bring the mixer from cold to playing: volumes, preset, tone, ambient bed
///
/// An unknown preset or ambient id is a hard error (almost certainly a typo);
/// an ambient bed that fails to start is only a warning and the session
/// continues without it.
async fn start_session<B: AudioBackend>(
    mixer: &mut AudioMixer<B>,
    cli: &CliArgs,
    config: &SessionConfig,
) -> Result<()> {
    mixer.set_binaural_volume(config.binaural_volume);
    mixer.set_ambient_volume(config.ambient_volume);

    let preset_id = cli.preset.as_deref().unwrap_or(&config.default_preset);
    let preset = mixer
        .catalog()
        .preset(preset_id)
        .cloned()
        .with_context(|| format!("Unknown preset '{}' (try --list)", preset_id))?;
    mixer.set_preset(&preset)?;

    mixer.toggle_binaural()?;
    mixer.settle().await?;
    log::info!(
        "Binaural tone running: {} ({:.2} Hz beat)",
        preset.name,
        mixer.state().active_preset.frequency
    );

    if let Some(ambient_id) = &cli.ambient {
        let sound = mixer
            .catalog()
            .ambient(ambient_id)
            .cloned()
            .with_context(|| format!("Unknown ambient sound '{}' (try --list)", ambient_id))?;
        if let Err(e) = mixer.set_active_ambient(Some(&sound)) {
            log::warn!("Ambient bed unavailable, continuing without it: {}", e);
        }
    }

    Ok(())
}

/// Render the session offline and write it to a WAV file
async fn run_render(cli: &CliArgs, config: &SessionConfig) -> Result<()> {
    let duration = render_duration(cli, config);
    let out_path = cli
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_session_filename()));

    let mut mixer = AudioMixer::new(RenderBackend::new(config.sounds_dir.clone()));
    let events = mixer.subscribe();

    start_session(&mut mixer, cli, config).await?;

    log::info!(
        "Rendering {:.0} second session to {:?}",
        duration.as_secs_f64(),
        out_path
    );
    mixer.backend_mut().render_to_wav(duration, &out_path)?;

    mixer.on_session_expire();
    drain_events(&events);
    mixer.shutdown();

    println!("Session written to {}", out_path.display());
    Ok(())
}

/// Run the whole flow against the simulated backend and print what it saw
async fn run_dry_run(cli: &CliArgs, config: &SessionConfig) -> Result<()> {
    let mut mixer = AudioMixer::new(SimBackend::new());
    let events = mixer.subscribe();

    start_session(&mut mixer, cli, config).await?;

    mixer.on_session_expire();
    drain_events(&events);
    mixer.shutdown();

    println!("Simulated backend op log:");
    for (i, op) in mixer.backend().ops().iter().enumerate() {
        println!("  {:3}  {:?}", i, op);
    }
    Ok(())
}

/// Play through the system audio device for the session length
#[cfg(feature = "live-audio")]
async fn run_live(cli: &CliArgs, config: &SessionConfig) -> Result<()> {
    use attune_core::audio::CpalBackend;

    let duration = session_duration(cli, config);
    let mut mixer = AudioMixer::new(CpalBackend::new(config.sounds_dir.clone()));
    let events = mixer.subscribe();

    start_session(&mut mixer, cli, config).await?;

    match duration {
        Some(d) => {
            log::info!("Playing for {:.0} seconds", d.as_secs_f64());
            tokio::time::sleep(d).await;
        }
        None => {
            println!("Playing until interrupted (Ctrl-C to stop)...");
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    }

    mixer.on_session_expire();
    drain_events(&events);
    mixer.shutdown();

    println!("Attune Player stopped.");
    Ok(())
}

#[cfg(not(feature = "live-audio"))]
async fn run_live(_cli: &CliArgs, _config: &SessionConfig) -> Result<()> {
    eprintln!("This build has no live audio support.");
    eprintln!("Rebuild with: cargo build -p attune-player --features live-audio");
    bail!("live playback requires the 'live-audio' feature")
}

/// Drain any queued mixer events into the log
fn drain_events(events: &Receiver<MixerEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            MixerEvent::StateChanged(state) => log::debug!(
                "State: binaural={} preset={} ambient={:?}",
                state.binaural_active,
                state.active_preset.id,
                state.active_ambient.as_ref().map(|s| s.id.as_str())
            ),
            MixerEvent::SessionExpired => log::info!("Session expired"),
            MixerEvent::Failure(reason) => log::warn!("Mixer failure: {}", reason),
        }
    }
}

// ─── Session length ──────────────────────────────────────────────────────────

/// Session length from flags, then config; `None` means play until stopped
fn session_duration(cli: &CliArgs, config: &SessionConfig) -> Option<Duration> {
    if let Some(secs) = cli.seconds {
        return (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(mins) = cli.minutes {
        return (mins > 0).then(|| Duration::from_secs(mins * 60));
    }
    (config.session_minutes > 0)
        .then(|| Duration::from_secs(u64::from(config.session_minutes) * 60))
}

/// Render mode needs a finite length; fall back to a short default
fn render_duration(cli: &CliArgs, config: &SessionConfig) -> Duration {
    session_duration(cli, config).unwrap_or_else(|| {
        log::info!(
            "No session length given, rendering {} seconds (use --minutes/--seconds)",
            DEFAULT_RENDER_SECS
        );
        Duration::from_secs(DEFAULT_RENDER_SECS)
    })
}

fn default_session_filename() -> String {
    format!(
        "attune-session-{}.wav",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    )
}

// ─── Command line ────────────────────────────────────────────────────────────

/// Parsed command line flags
#[derive(Debug, Default)]
struct CliArgs {
    help: bool,
    list: bool,
    dry_run: bool,
    live: bool,
    preset: Option<String>,
    ambient: Option<String>,
    minutes: Option<u64>,
    seconds: Option<u64>,
    out: Option<PathBuf>,
}

impl CliArgs {
    /// Manual flag scan; the surface is small enough not to pull in a parser
    fn parse(args: &[String]) -> Result<Self> {
        let mut cli = Self::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--help" | "-h" => cli.help = true,
                "--list" => cli.list = true,
                "--dry-run" => cli.dry_run = true,
                "--live" => cli.live = true,
                "--preset" => cli.preset = Some(take_value(args, &mut i, "--preset")?),
                "--ambient" => cli.ambient = Some(take_value(args, &mut i, "--ambient")?),
                "--minutes" => cli.minutes = Some(take_number(args, &mut i, "--minutes")?),
                "--seconds" => cli.seconds = Some(take_number(args, &mut i, "--seconds")?),
                "--out" => cli.out = Some(PathBuf::from(take_value(args, &mut i, "--out")?)),
                other => bail!("Unknown flag: {}", other),
            }
            i += 1;
        }
        if cli.dry_run && cli.live {
            bail!("--dry-run and --live are mutually exclusive");
        }
        Ok(cli)
    }
}

fn take_value(args: &[String], i: &mut usize, flag: &str) -> Result<String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .with_context(|| format!("{} needs a value", flag))
}

fn take_number(args: &[String], i: &mut usize, flag: &str) -> Result<u64> {
    let raw = take_value(args, i, flag)?;
    raw.parse()
        .with_context(|| format!("{} needs a number, got '{}'", flag, raw))
}

fn print_usage() {
    println!("Usage: attune-player [flags]");
    println!();
    println!("  --list            Print presets and ambient sounds, then exit");
    println!("  --preset <id>     Preset to play (default from config, then 'sleep')");
    println!("  --ambient <id>    Ambient bed to layer under the tone");
    println!("  --minutes <n>     Session length in minutes (0 = until stopped)");
    println!("  --seconds <n>     Session length in seconds (overrides --minutes)");
    println!("  --out <path>      Output WAV path (render mode)");
    println!("  --dry-run         Drive the simulated backend and print its op log");
    println!("  --live            Play through the system audio device");
    println!("  --help            Show this help");
}

/// Print the built-in catalog in a terminal friendly table
fn print_catalog() {
    let catalog = PresetCatalog::new();

    println!("Binaural presets:");
    for preset in catalog.presets() {
        println!(
            "  {:<10} {:<12} {:>6.2} Hz  {}",
            preset.id, preset.name, preset.frequency, preset.description
        );
    }
    println!();
    println!("Ambient sounds:");
    for sound in catalog.sounds() {
        println!(
            "  {:<10} {:<12} ({})",
            sound.id, sound.name, sound.loop_source_ref
        );
    }
    println!();
    println!("The 'custom' preset plays the configured custom frequency.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("attune-player")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_flags_and_values() {
        let cli = CliArgs::parse(&argv(&[
            "--preset", "focus", "--ambient", "rain", "--seconds", "90", "--dry-run",
        ]))
        .unwrap();
        assert_eq!(cli.preset.as_deref(), Some("focus"));
        assert_eq!(cli.ambient.as_deref(), Some("rain"));
        assert_eq!(cli.seconds, Some(90));
        assert!(cli.dry_run);
        assert!(!cli.live);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(CliArgs::parse(&argv(&["--preset"])).is_err());
        assert!(CliArgs::parse(&argv(&["--minutes", "soon"])).is_err());
        assert!(CliArgs::parse(&argv(&["--frobnicate"])).is_err());
        assert!(CliArgs::parse(&argv(&["--dry-run", "--live"])).is_err());
    }

    #[test]
    fn test_session_duration_precedence() {
        let config = SessionConfig {
            session_minutes: 20,
            ..SessionConfig::default()
        };

        let cli = CliArgs::parse(&argv(&["--seconds", "90", "--minutes", "5"])).unwrap();
        assert_eq!(session_duration(&cli, &config), Some(Duration::from_secs(90)));

        let cli = CliArgs::parse(&argv(&["--minutes", "5"])).unwrap();
        assert_eq!(session_duration(&cli, &config), Some(Duration::from_secs(300)));

        let cli = CliArgs::parse(&argv(&[])).unwrap();
        assert_eq!(
            session_duration(&cli, &config),
            Some(Duration::from_secs(1200))
        );

        // Explicit zero means "until stopped" even when the config has a length
        let cli = CliArgs::parse(&argv(&["--minutes", "0"])).unwrap();
        assert_eq!(session_duration(&cli, &config), None);

        let continuous = SessionConfig::default();
        let cli = CliArgs::parse(&argv(&[])).unwrap();
        assert_eq!(session_duration(&cli, &continuous), None);
    }

    #[test]
    fn test_default_session_filename_shape() {
        let name = default_session_filename();
        assert!(name.starts_with("attune-session-"));
        assert!(name.ends_with(".wav"));
    }
}
