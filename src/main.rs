use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use planty::audio::{AudioCapture, AudioPlayback, PLAYBACK_SAMPLE_RATE, peak, rms};
use planty::daemon::{build_sensor_source, build_synthesizer};
use planty::sensors::SensorSampler;
use planty::state::SharedState;
use planty::{Config, Daemon};

/// Planty - a talking plant companion
#[derive(Parser)]
#[command(name = "planty", version, about)]
struct Cli {
    /// Status server port (overrides config)
    #[arg(long, env = "PLANTY_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice features (for running without audio hardware)
    #[arg(long, env = "PLANTY_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "안녕하세요! 저는 플랜티예요.")]
        text: String,
    },
    /// Sample the sensors once and print the state snapshot
    State,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,planty=info",
        1 => "info,planty=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    // Handle subcommands
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
            Command::State => print_state().await,
        };
    }

    // Load configuration
    let mut config = Config::load_with_options(cli.disable_voice)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    if config.voice.enabled {
        let wake_word = config.device.wake_words.first().cloned().unwrap_or_default();
        tracing::info!("planty ready - say \"{wake_word}\"");
    } else {
        tracing::info!("planty ready (status-only mode, voice disabled)");
    }

    // Run until interrupted
    Daemon::new(config).run().await?;

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let config = Config::load()?;
    let mut capture = AudioCapture::new(config.audio.sample_rate)?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!(
        "Silence threshold: {} (peak below this counts as silence)",
        config.audio.silence_threshold
    );
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.drain_buffer();
        let energy = rms(&samples);
        let loudest = peak(&samples);
        let speech = if loudest >= config.audio.silence_threshold {
            "speech"
        } else {
            "silent"
        };

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:5} | {} | [{}]",
            i + 1,
            energy,
            loudest,
            speech,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");
    println!("  3. Try: alsamixer (to check capture levels)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = AudioPlayback::new()?;

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!(
        "Playing {} samples at {} Hz...",
        samples.len(),
        PLAYBACK_SAMPLE_RATE
    );

    playback.play(samples).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: aplay -l (to list devices)");
    println!("  2. Try: alsamixer (to check output levels)");

    Ok(())
}

/// Test TTS output with the configured provider
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let synthesizer = build_synthesizer(&config)?;

    println!("Synthesizing speech...");
    let mp3_data = synthesizer.synthesize(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    // Check MP3 header
    if let Some(header) = mp3_data.get(..4) {
        println!(
            "First 4 bytes: {:02x} {:02x} {:02x} {:02x}",
            header[0], header[1], header[2], header[3]
        );
    }

    println!("Playing audio...");
    let mut playback = AudioPlayback::new()?;
    playback.play_mp3(&mp3_data).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Take one sensor sample and print the snapshot the dashboard would see
async fn print_state() -> anyhow::Result<()> {
    let config = Config::load_with_options(true)?;
    let state = SharedState::new();

    let mut sampler = SensorSampler::new(
        build_sensor_source(&config),
        state.clone(),
        config.sensors.interval,
    );
    if !sampler.sample_once().await {
        anyhow::bail!("sensor read failed");
    }

    println!("{}", serde_json::to_string_pretty(&state.snapshot())?);
    Ok(())
}
