use airoom::{
    ContextParams, Conversation, DEFAULT_SYSTEM_PROMPT, GpuChecker, LlamaDeviceProbe,
    ModelLoader, ModelParams, repl,
};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let verbose = args.iter().any(|arg| arg == "--verbose" || arg == "-v");
    let env_filter = EnvFilter::builder()
        .with_default_directive(if verbose { Level::DEBUG } else { Level::ERROR }.into())
        .from_env_lossy();
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let Some(model_path) = args.get(1).filter(|arg| !arg.starts_with('-')) else {
        eprintln!("Usage: {} <model_path> [--verbose]", args[0]);
        return Ok(());
    };

    print!("{}", GpuChecker::new(LlamaDeviceProbe).summary()?);

    let mut loader = ModelLoader::new(
        ModelParams::new(PathBuf::from(model_path)),
        ContextParams {
            ctx_size: 4096,
            ..Default::default()
        },
    );
    println!("Loading model from {}...", model_path);
    let model = loader.load()?;
    println!("Model loaded successfully!");

    let mut chat = Conversation::with_system(model, DEFAULT_SYSTEM_PROMPT);
    let stdin = std::io::stdin();
    repl::run(&mut chat, stdin.lock(), &mut std::io::stdout())?;

    Ok(())
}
