use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use swara_core::config::{
    resolve_api_key, resolve_optional_string, resolve_string_with_default, AppConfig, ConfigError,
    PlaybackConfig, StdEnv, TtsBackendConfig, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_VOICE_ID,
    ENV_API_KEY, ENV_GEMINI_API_KEY, ENV_SWARA_BASE_URL, ENV_SWARA_MODEL,
    ENV_SWARA_OUTPUT_DEVICE, GENERATION_FAILED_MESSAGE,
};
use swara_core::playback::{AudioContext, AudioContextCell, PlaybackStatus, RodioAudioContext};
use swara_core::settings::Pitch;
use swara_core::transport::{
    format_time, GenerationOutcome, GenerationTicket, TransportController, TransportView,
};
use swara_core::tts::{GeminiTtsClient, ToneTtsClient, TtsAudio, TtsClient, TtsError};
use swara_core::voice::{catalog, find_voice};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const PROGRESS_BAR_WIDTH: usize = 30;

#[derive(Parser, Debug)]
#[command(name = "swara")]
#[command(about = "Bilingual (ID/EN) text-to-speech with live playback controls")]
struct Args {
    /// Speak this text once and exit. Without it an interactive prompt starts.
    #[arg(long)]
    text: Option<String>,

    #[arg(long, default_value = DEFAULT_VOICE_ID)]
    voice: String,

    /// 1.0 to 2.0, snapped to 0.1.
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    #[arg(long, default_value = "normal")]
    pitch: Pitch,

    /// 0.0 to 1.0.
    #[arg(long, default_value_t = 1.0)]
    volume: f32,

    #[arg(long)]
    api_key: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    output_device: Option<String>,

    /// Use the built-in tone voice instead of the speech backend.
    #[arg(long)]
    offline: bool,

    /// Directory the WAV export is written to.
    #[arg(long)]
    save: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

type GenerationResult = (GenerationTicket, Result<TtsAudio, TtsError>);

enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let cfg = build_config(&args, &env)?;

    tracing::info!(
        voice = %cfg.voice_id,
        model = %cfg.tts.model,
        offline = cfg.offline,
        output_device = %cfg.playback.output_device.as_deref().unwrap_or("<default>"),
        "config loaded"
    );

    let tts = build_tts(&cfg);
    let mut transport = TransportController::with_audio_contexts(build_audio_contexts(&cfg));
    transport.select_voice(&cfg.voice_id)?;
    transport.set_speed(args.speed);
    transport.set_pitch(args.pitch);
    transport.set_volume(args.volume);

    match args.text {
        Some(text) => {
            transport.set_text(text);
            run_once(transport, tts.as_ref(), cfg.export_dir).await
        }
        None => {
            let export_dir = cfg.export_dir.unwrap_or_else(|| PathBuf::from("."));
            run_interactive(transport, tts, export_dir).await
        }
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: &Args, env: &impl swara_core::config::Env) -> anyhow::Result<AppConfig> {
    let voice = find_voice(&args.voice)?;
    let api_key = resolve_api_key(
        args.api_key.clone(),
        &[ENV_GEMINI_API_KEY, ENV_API_KEY],
        env,
    )?;

    Ok(AppConfig {
        tts: TtsBackendConfig {
            api_key,
            model: resolve_string_with_default(args.model.clone(), ENV_SWARA_MODEL, env, DEFAULT_MODEL),
            base_url: resolve_string_with_default(
                args.base_url.clone(),
                ENV_SWARA_BASE_URL,
                env,
                DEFAULT_BASE_URL,
            ),
        },
        playback: PlaybackConfig {
            output_device: resolve_optional_string(
                args.output_device.clone(),
                ENV_SWARA_OUTPUT_DEVICE,
                env,
            ),
        },
        voice_id: voice.id.to_owned(),
        export_dir: args.save.clone(),
        offline: args.offline,
    })
}

fn build_tts(cfg: &AppConfig) -> Arc<dyn TtsClient> {
    match (&cfg.tts.api_key, cfg.offline) {
        (Some(key), false) => Arc::new(
            GeminiTtsClient::new(key.clone())
                .with_model(cfg.tts.model.clone())
                .with_base_url(cfg.tts.base_url.clone()),
        ),
        (None, false) => {
            tracing::warn!(
                "no {ENV_GEMINI_API_KEY} or {ENV_API_KEY} set; using the offline tone voice"
            );
            Arc::new(ToneTtsClient::new())
        }
        (_, true) => Arc::new(ToneTtsClient::new()),
    }
}

fn build_audio_contexts(cfg: &AppConfig) -> Arc<AudioContextCell> {
    let output_device = cfg.playback.output_device.clone();
    Arc::new(AudioContextCell::new(move || {
        let context = match &output_device {
            Some(name) => RodioAudioContext::new().with_output_device_name(name.clone()),
            None => RodioAudioContext::new(),
        };
        Ok(Arc::new(context) as Arc<dyn AudioContext>)
    }))
}

async fn run_once(
    mut transport: TransportController,
    tts: &dyn TtsClient,
    export_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    if transport.generate(tts).await? != GenerationOutcome::Ready {
        anyhow::bail!(transport
            .error()
            .unwrap_or(GENERATION_FAILED_MESSAGE)
            .to_owned());
    }

    if let Some(dir) = export_dir {
        if let Some(path) = transport.download(&dir)? {
            println!("saved {}", path.display());
        }
    }
    if let Some(err) = transport.error() {
        anyhow::bail!("{err}");
    }

    while transport.status() == PlaybackStatus::Playing {
        transport.next_frame().await;
        draw_progress(&transport.view());
    }
    println!();
    Ok(())
}

async fn run_interactive(
    mut transport: TransportController,
    tts: Arc<dyn TtsClient>,
    export_dir: PathBuf,
) -> anyhow::Result<()> {
    let (done_tx, mut done_rx) = mpsc::channel::<GenerationResult>(1);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_help();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match handle_command(&mut transport, &line, &tts, &done_tx, &export_dir) {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => println!("error: {e}"),
                }
            }
            Some((ticket, result)) = done_rx.recv() => {
                match transport.complete_generation(ticket, result) {
                    GenerationOutcome::Ready => println!(
                        "ready ({})",
                        format_time(transport.view().duration)
                    ),
                    GenerationOutcome::Failed => println!(
                        "error: {}",
                        transport.error().unwrap_or(GENERATION_FAILED_MESSAGE)
                    ),
                    GenerationOutcome::Stale => {}
                }
            }
            Some(_) = transport.next_frame() => {
                let view = transport.view();
                draw_progress(&view);
                if view.status == PlaybackStatus::Finished {
                    println!();
                }
            }
        }
    }

    transport.stop();
    Ok(())
}

fn handle_command(
    transport: &mut TransportController,
    line: &str,
    tts: &Arc<dyn TtsClient>,
    done_tx: &mpsc::Sender<GenerationResult>,
    export_dir: &Path,
) -> anyhow::Result<Flow> {
    let line = line.trim();
    let (command, rest) = line
        .split_once(char::is_whitespace)
        .map(|(c, r)| (c, r.trim()))
        .unwrap_or((line, ""));

    match command {
        "" => {}
        "text" => {
            transport.set_text(rest);
            let view = transport.view();
            println!("{} / {} characters", view.char_count, view.max_chars);
        }
        "voices" => {
            for voice in catalog() {
                let marker = if voice.id == transport.voice().id { '*' } else { ' ' };
                println!("{marker} {voice}");
            }
        }
        "voice" => {
            transport.select_voice(rest)?;
            println!("voice: {}", transport.voice());
        }
        "speed" => {
            transport.set_speed(parse_number("speed", rest)?);
            println!("speed: {:.1}x", transport.settings().speed);
        }
        "pitch" => {
            transport.set_pitch(rest.parse()?);
            println!("pitch: {}", transport.settings().pitch);
        }
        "volume" => {
            transport.set_volume(parse_number("volume", rest)?);
            println!("volume: {:.2}", transport.settings().volume);
        }
        "generate" => {
            let ticket = transport.begin_generation()?;
            let request = ticket.request().clone();
            let tts = Arc::clone(tts);
            let done_tx = done_tx.clone();
            println!("generating...");
            tokio::spawn(async move {
                let result = tts.synthesize(request).await;
                if done_tx.send((ticket, result)).await.is_err() {
                    tracing::debug!("generation finished after the prompt closed");
                }
            });
        }
        "play" => transport.toggle_play_pause()?,
        "stop" => transport.stop(),
        "download" => {
            let dir = if rest.is_empty() {
                export_dir.to_path_buf()
            } else {
                PathBuf::from(rest)
            };
            match transport.download(&dir)? {
                Some(path) => println!("saved {}", path.display()),
                None => println!("nothing to download yet"),
            }
        }
        "reset" => transport.reset(),
        "status" => print_status(&transport.view()),
        "help" => print_help(),
        "quit" | "exit" => return Ok(Flow::Quit),
        other => println!("unknown command {other:?}; type `help`"),
    }
    Ok(Flow::Continue)
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::NotANumber {
        name,
        value: value.to_owned(),
    })
}

fn draw_progress(view: &TransportView) {
    let filled = (view.progress * PROGRESS_BAR_WIDTH as f64).round() as usize;
    let mut stdout = std::io::stdout().lock();
    // Progress output is best effort.
    let _ = write!(
        stdout,
        "\r[{}{}] {}",
        "#".repeat(filled.min(PROGRESS_BAR_WIDTH)),
        ".".repeat(PROGRESS_BAR_WIDTH.saturating_sub(filled)),
        view.time_label()
    );
    let _ = stdout.flush();
}

fn print_status(view: &TransportView) {
    println!(
        "voice {} | speed {:.1}x | pitch {} | volume {:.2}",
        view.voice_id, view.settings.speed, view.settings.pitch, view.settings.volume
    );
    println!(
        "text {}/{}{} | {:?} | {}{}",
        view.char_count,
        view.max_chars,
        if view.over_limit { " (over limit)" } else { "" },
        view.status,
        view.time_label(),
        if view.busy { " | generating" } else { "" }
    );
    if let Some(err) = &view.error {
        println!("error: {err}");
    }
}

fn print_help() {
    println!(
        "commands:
  text <words>     replace the text to speak
  voices           list voices
  voice <id>       select a voice
  speed <1.0-2.0>  playback speed
  pitch <p>        low | normal | high
  volume <0-1>     output volume
  generate         synthesize the current text
  play             play / pause
  stop             stop and rewind
  download [dir]   save the clip as WAV
  reset            clear everything
  status           show current state
  quit"
    );
}
