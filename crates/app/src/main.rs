use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use synth_session_core::audio::offline::OfflineContext;
use synth_session_core::{
    BackendKind, BackendVoiceParams, JsonFileSettings, NodeId, OfflineAudioPlatform, ParamChange,
    ParameterStore, SessionConfig, SynthBackend, SynthSession,
};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> synth_session_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.user_agent.as_deref())?;

    match cli.command {
        Commands::Demo {
            spread,
            stack_size,
            frequency,
            volume,
        } => run_demo(config, &cli.settings, spread, stack_size, frequency, volume).await,
        Commands::Polyphony { set } => run_polyphony(&config, &cli.settings, set),
        Commands::Config => {
            println!("{}", config.to_json_string()?);
            Ok(())
        }
    }
}

fn load_config(
    path: Option<&Path>,
    user_agent: Option<&str>,
) -> synth_session_core::Result<SessionConfig> {
    match (path, user_agent) {
        (Some(path), _) => SessionConfig::from_json_file(path),
        (None, Some(agent)) => Ok(SessionConfig::for_user_agent(agent)),
        (None, None) => Ok(SessionConfig::default()),
    }
}

async fn run_demo(
    config: SessionConfig,
    settings: &Path,
    spread: f32,
    stack_size: usize,
    frequency: f32,
    volume: Option<f32>,
) -> synth_session_core::Result<()> {
    tracing::info!(?settings, "starting demo session");

    let platform = OfflineAudioPlatform::new();
    let settings = JsonFileSettings::open(settings)?;
    let mut session = SynthSession::new(
        platform.clone(),
        construct_logging_backend,
        config,
        settings,
    );

    session.initialize().await?;
    if let Some(volume) = volume {
        session.set_main_volume(volume);
    }
    session.set_unison_spread(spread);
    session.set_unison_stack_size(stack_size);
    session.note_on(BackendKind::Oscillator, frequency)?;

    println!("graph:");
    for (from, to) in platform.connections() {
        println!(
            "  {from} ({:?}) -> {to} ({:?})",
            platform.node_kind(from),
            platform.node_kind(to)
        );
    }
    println!("parameters: {:#?}", session.params());

    session.note_off(BackendKind::Oscillator, frequency)?;
    session.teardown().await
}

fn run_polyphony(
    config: &SessionConfig,
    settings: &Path,
    set: Option<usize>,
) -> synth_session_core::Result<()> {
    let mut store = ParameterStore::load(config, JsonFileSettings::open(settings)?);
    if let Some(voices) = set {
        store.apply(ParamChange::MaxPolyphony(voices));
        tracing::info!(voices, ?settings, "max polyphony saved");
    }

    println!("max polyphony: {}", store.values().max_polyphony);
    Ok(())
}

fn construct_logging_backend(
    kind: BackendKind,
    _context: &mut OfflineContext,
    input: NodeId,
) -> synth_session_core::Result<Box<dyn SynthBackend>> {
    tracing::debug!(%kind, %input, "constructing backend");
    Ok(Box::new(LoggingBackend { kind, params: None }))
}

/// Stand-in engine that reports what it is asked to do.
struct LoggingBackend {
    kind: BackendKind,
    params: Option<BackendVoiceParams>,
}

impl SynthBackend for LoggingBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn set_voice_params(&mut self, params: BackendVoiceParams) {
        let base = params.base();
        tracing::info!(
            kind = %self.kind,
            attack = base.attack_time,
            release = base.release_time,
            "voice params"
        );
        tracing::debug!(?params, "full voice params");
        self.params = Some(params);
    }

    fn set_max_polyphony(&mut self, voices: usize) {
        tracing::info!(kind = %self.kind, voices, "max polyphony");
    }

    fn set_polyphony(&mut self, voices: usize) {
        tracing::info!(kind = %self.kind, voices, "polyphony");
    }

    fn note_on(&mut self, frequency: f32) -> synth_session_core::Result<()> {
        if let Some(BackendVoiceParams::Buffer(params)) = &self.params {
            let buffer = params.create_buffer(frequency)?;
            tracing::info!(samples = buffer.samples.len(), "buffer voice ready");
        }
        tracing::info!(kind = %self.kind, frequency, "note on");
        Ok(())
    }

    fn note_off(&mut self, frequency: f32) {
        tracing::info!(kind = %self.kind, frequency, "note off");
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Synth session coordinator", long_about = None)]
struct Cli {
    /// JSON session configuration. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// JSON file holding persisted user settings.
    #[arg(short, long, global = true, default_value = "synth-settings.json")]
    settings: PathBuf,
    /// Host user agent used to pick the scheduling delay.
    #[arg(long, global = true)]
    user_agent: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a session on the offline platform and print its wiring.
    Demo {
        /// Unison detune range in cents.
        #[arg(long, default_value_t = 7.0)]
        spread: f32,
        /// Oscillators per voice.
        #[arg(long, default_value_t = 3)]
        stack_size: usize,
        /// Frequency of the triggered voice in Hz.
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,
        /// Main output volume in [0, 1].
        #[arg(long)]
        volume: Option<f32>,
    },
    /// Show or change the persisted voice budget.
    Polyphony {
        /// New maximum number of simultaneous voices.
        #[arg(long)]
        set: Option<usize>,
    },
    /// Print the effective configuration as JSON.
    Config,
}
