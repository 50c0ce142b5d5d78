use airoom::model::parse_key_val;
use airoom::{
    ContextParams, Conversation, DEFAULT_SYSTEM_PROMPT, GenerationError, GpuChecker,
    LlamaDeviceProbe, ModelLoader, ModelParams, SamplingParameters, repl,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// GPU-accelerated chat with a local GGUF model.
#[derive(Parser, Debug)]
#[command(name = "airoom", version, about)]
struct Args {
    /// Path to the GGUF model file
    #[arg(required_unless_present = "gpu_info")]
    model_path: Option<PathBuf>,

    /// Number of GPU layers to use (-1 for all, 0 for CPU only)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    gpu_layers: i32,

    /// GPU to use as the main device
    #[arg(long)]
    main_gpu: Option<usize>,

    /// Context window size
    #[arg(long, default_value_t = 2048)]
    context_size: u32,

    /// Maximum tokens submitted to the model in one batch
    #[arg(long, default_value_t = 512)]
    batch_size: u32,

    /// Threads used during generation (default: all available)
    #[arg(long)]
    threads: Option<usize>,

    /// Threads used during prompt processing (default: --threads)
    #[arg(long)]
    threads_batch: Option<usize>,

    /// Maximum tokens in response
    #[arg(long, default_value_t = 100)]
    max_tokens: usize,

    /// Response randomness (0.0 = deterministic, 1.0 = random)
    #[arg(long, default_value_t = 0.3)]
    temperature: f32,

    /// Nucleus sampling cutoff
    #[arg(long, default_value_t = 0.9)]
    top_p: f32,

    /// Top-k sampling (0 disables)
    #[arg(long, default_value_t = 40)]
    top_k: u32,

    /// Penalty for repetition
    #[arg(long, default_value_t = 1.1)]
    repeat_penalty: f32,

    /// Stop generating when this text appears (repeatable, replaces the defaults)
    #[arg(long = "stop")]
    stop_sequences: Vec<String>,

    /// RNG seed
    #[arg(long, default_value_t = 1234)]
    seed: u32,

    /// override some parameters of the model (KEY=value)
    #[arg(short = 'o', value_parser = parse_override)]
    key_value_overrides: Vec<(String, String)>,

    /// System prompt for the AI assistant
    #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
    system_prompt: String,

    /// Run in interactive chat mode
    #[arg(long)]
    interactive: bool,

    /// Print the conversation as JSON after the test prompt
    #[arg(long, conflicts_with = "interactive")]
    json: bool,

    /// Print GPU information and exit
    #[arg(long)]
    gpu_info: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_override(s: &str) -> std::result::Result<(String, String), String> {
    parse_key_val(s).map_err(|e| e.to_string())
}

impl Args {
    fn sampling(&self) -> SamplingParameters {
        let params = SamplingParameters::default()
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_top_p(self.top_p)
            .with_top_k(self.top_k)
            .with_repeat_penalty(self.repeat_penalty)
            .with_seed(self.seed);
        if self.stop_sequences.is_empty() {
            params
        } else {
            params.with_stop_sequences(self.stop_sequences.iter().cloned())
        }
    }

    fn context_params(&self) -> ContextParams {
        ContextParams {
            ctx_size: self.context_size,
            batch_size: self.batch_size,
            threads: self.threads,
            threads_batch: self.threads_batch,
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .event_format(
            tracing_subscriber::fmt::format::format()
                .compact()
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(
                    "%H:%M:%S.%3f".to_owned(),
                )),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    println!("Checking GPU availability...");
    let mut gpus = GpuChecker::new(LlamaDeviceProbe);
    match gpus.summary() {
        Ok(summary) => print!("{}", summary),
        Err(e) => warn!("Unable to query GPU devices: {}", e),
    }
    if args.gpu_info {
        return Ok(());
    }

    let mut model_params = ModelParams {
        model_path: args.model_path.clone().unwrap_or_default(),
        gpu_layers: args.gpu_layers,
        key_value_overrides: args.key_value_overrides.clone(),
        ..Default::default()
    };
    if let Some(index) = args.main_gpu {
        gpus.set_device(index)
            .with_context(|| format!("cannot use GPU {}", index))?;
        model_params.main_gpu = Some(index as i32);
    }

    let mut loader = ModelLoader::new(model_params, args.context_params());

    println!("\nLoading model: {}", loader.params().model_path.display());
    let model = match loader.load() {
        Ok(model) => model,
        Err(e) => {
            error!("Failed to load model: {}", e);
            std::process::exit(1);
        }
    };

    let mut chat =
        Conversation::with_system(model, &args.system_prompt).with_sampling(args.sampling());

    if args.interactive {
        let stdin = std::io::stdin();
        repl::run(&mut chat, stdin.lock(), &mut std::io::stdout())?;
    } else {
        println!("\nTesting model with a simple prompt...");
        match chat.send("Hello! How are you today?") {
            Ok(reply) => println!("Response: {}", reply.content()),
            Err(GenerationError::EmptyCompletion) => println!("Failed to get response"),
            Err(e) => println!("Failed to get response: {}", e),
        }
        if args.json {
            println!("{}", serde_json::to_string_pretty(&chat.history())?);
        }
    }

    drop(chat);
    loader.unload();

    Ok(())
}
