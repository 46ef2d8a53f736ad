use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use aryan_core::voice::{
    self, AudioBackend, CpalBackend, OutputBus, PLAYBACK_SAMPLE_RATE, PlaybackScheduler,
    SAMPLE_RATE,
};
use aryan_core::{Config, HostEvent, LogSource, SessionController, SessionState};

/// Aryan - Realtime voice assistant session client
#[derive(Parser)]
#[command(name = "aryan", version, about)]
struct Cli {
    /// Reply language; overrides config and `ARYAN_LANGUAGE`
    #[arg(short, long)]
    language: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a voice session (the default)
    Run,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Save the captured audio as a WAV file
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
    /// Print the tool declarations sent with each session
    Tools,
    /// List audio devices
    Devices,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,aryan_core=info",
        1 => "info,aryan_core=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Run => run_session(cli.language).await,
            Command::TestMic { duration, output } => test_mic(duration, output.as_deref()).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Tools => print_tools(),
            Command::Devices => list_devices(),
        };
    }

    run_session(cli.language).await
}

/// Connect and relay stdin lines as text messages until Ctrl-C or EOF
async fn run_session(language: Option<String>) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(language) = language {
        config.session.language = language;
    }
    tracing::debug!(?config, "loaded configuration");

    let notes_path = config.host.notes_path.clone();
    let controller = SessionController::from_config(&config);

    controller.on_log(|entry| match entry.source {
        LogSource::User => println!("you> {}", entry.message),
        LogSource::Ai => println!("aryan> {}", entry.message),
        LogSource::System => println!("  [{}]", entry.message),
        LogSource::Error => eprintln!("  [error] {}", entry.message),
    });
    controller.on_state_change(|state| tracing::info!(%state, "session"));

    let events = controller.subscribe();
    tokio::spawn(forward_host_events(events, notes_path));

    tracing::info!(language = %config.session.language, "starting aryan session");
    controller.connect().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(line) => {
                    let line = line.trim();
                    match line {
                        "" => {}
                        "/connect" => {
                            if controller.state() == SessionState::Connected {
                                println!("  [already connected]");
                            } else {
                                controller.connect().await;
                            }
                        }
                        "/disconnect" => controller.disconnect(),
                        "/quit" => break,
                        text => controller.send_text(text).await,
                    }
                }
                None => break,
            },
        }
    }

    controller.disconnect();
    tracing::info!("aryan session closed");
    Ok(())
}

/// Print host notifications and persist workspace notes
async fn forward_host_events(
    mut events: tokio::sync::broadcast::Receiver<HostEvent>,
    notes_path: Option<std::path::PathBuf>,
) {
    loop {
        match events.recv().await {
            Ok(HostEvent::NoteUpdated { content }) => {
                let Some(path) = notes_path.as_deref() else {
                    continue;
                };
                if let Err(e) = write_note(path, &content).await {
                    tracing::warn!(error = %e, path = %path.display(), "failed to save notebook");
                }
            }
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => println!("  [host] {json}"),
                Err(e) => tracing::debug!(error = %e, "unprintable host event"),
            },
            Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "host events lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn write_note(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

/// Test microphone input
async fn test_mic(duration: u64, output: Option<&Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let captured: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    let backend = CpalBackend::default();
    let stream = backend.open_input(Box::new(move |frame: &[f32]| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(frame);
    }))?;

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    let mut recording = Vec::new();
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = std::mem::take(&mut *captured.lock().unwrap_or_else(PoisonError::into_inner));
        let energy = voice::rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        if output.is_some() {
            recording.extend(samples);
        }
    }

    drop(stream);

    if let Some(path) = output {
        let wav = voice::samples_to_wav(&recording, SAMPLE_RATE)?;
        tokio::fs::write(path, wav).await?;
        println!("\nSaved {} samples to {}", recording.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: aryan devices (to list devices)");
    println!("  3. Set ARYAN_INPUT_DEVICE to pick another one");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let bus = OutputBus::new(PLAYBACK_SAMPLE_RATE);
    let backend = CpalBackend::default();
    let stream = backend.open_output(bus.clone())?;
    let mut scheduler = PlaybackScheduler::new(bus);

    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let rate = PLAYBACK_SAMPLE_RATE as f32;
    let num_samples = PLAYBACK_SAMPLE_RATE as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / rate;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), PLAYBACK_SAMPLE_RATE);

    if let Some(item) = scheduler.schedule(samples) {
        let limit = item.duration() + Duration::from_secs(3);
        if !scheduler.bus().wait_finished(item.id, limit).await {
            println!("Playback did not finish; the output stream may have stalled.");
        }
    }
    drop(stream);

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: aryan devices (to list devices)");
    println!("  2. Set ARYAN_OUTPUT_DEVICE to pick another one");

    Ok(())
}

/// Print tool declarations as JSON
fn print_tools() -> anyhow::Result<()> {
    let declarations = aryan_core::tools::declarations();
    println!("{}", serde_json::to_string_pretty(&declarations)?);
    Ok(())
}

/// List input and output devices
fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in voice::input_device_names()? {
        println!("  {name}");
    }
    println!("Output devices:");
    for name in voice::output_device_names()? {
        println!("  {name}");
    }
    Ok(())
}
