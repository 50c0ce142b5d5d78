use airoom::{
    ContextParams, Conversation, GenerationError, ModelLoader, ModelParams, Result,
    SamplingParameters,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let model_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "models/model.gguf".to_string());

    let mut loader = ModelLoader::new(ModelParams::new(model_path), ContextParams::default());
    let model = loader.load()?;

    let mut chat = Conversation::with_system(model, "You are terse.")
        .with_sampling(SamplingParameters::default().with_max_tokens(64));

    for question in [
        "What is Rust?",
        "Name one thing it is good at.",
        "Summarize our conversation in one sentence.",
    ] {
        println!("User: {}", question);
        match chat.send(question) {
            Ok(reply) => println!("Assistant: {}\n", reply.content()),
            Err(GenerationError::EmptyCompletion) => println!("Assistant: (no answer)\n"),
            Err(e) => println!("{}\n", e),
        }
    }

    // Start over with a different persona, keeping the model loaded
    chat.set_system_prompt("You answer like a pirate.");
    chat.reset();
    if let Ok(reply) = chat.send("How are you today?") {
        println!("Assistant: {}", reply.content());
    }

    drop(chat);
    loader.unload();
    Ok(())
}
