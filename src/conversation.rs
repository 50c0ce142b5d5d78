use tracing::info;

use crate::chat::{Session, Turn};
use crate::error::GenerationError;
use crate::gateway::{CompletionEngine, Gateway};
use crate::sampling::SamplingParameters;

/// System prompt used when none is given
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Keep your responses concise and relevant.";

/// A chat with one model: the session, the gateway in front of the model and
/// the sampling parameters used for every reply.
pub struct Conversation<E> {
    session: Session,
    gateway: Gateway<E>,
    sampling: SamplingParameters,
}

impl<E: CompletionEngine> Conversation<E> {
    /// Start a conversation with the default system prompt
    pub fn new(engine: E) -> Self {
        Self::with_system(engine, DEFAULT_SYSTEM_PROMPT)
    }

    pub fn with_system(engine: E, system_prompt: &str) -> Self {
        Self {
            session: Session::with_system(system_prompt),
            gateway: Gateway::new(engine),
            sampling: SamplingParameters::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParameters) -> Self {
        self.sampling = sampling;
        self
    }

    /// Send a user message and record the reply.
    ///
    /// On failure the user message is taken back out, so the history is the
    /// same as before the call and the message can simply be sent again.
    pub fn send(&mut self, message: &str) -> Result<Turn, GenerationError> {
        let mark = self.session.len();
        self.session.add_user_message(message);

        match self.gateway.reply_to(&self.session, &self.sampling) {
            Ok(reply) => {
                self.session.append(reply.role(), reply.content());
                Ok(reply)
            }
            Err(e) => {
                self.session.truncate(mark);
                Err(e)
            }
        }
    }

    /// Reset the conversation history
    pub fn reset(&mut self) {
        self.session.reset();
        info!("Conversation history reset");
    }

    /// Copy of the conversation history, system turn included
    pub fn history(&self) -> Vec<Turn> {
        self.session.snapshot()
    }

    /// Update the system prompt
    pub fn set_system_prompt(&mut self, prompt: &str) {
        self.session.replace_system(prompt);
        info!("System prompt updated");
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sampling(&self) -> &SamplingParameters {
        &self.sampling
    }

    pub fn sampling_mut(&mut self) -> &mut SamplingParameters {
        &mut self.sampling
    }

    pub fn engine(&self) -> &E {
        self.gateway.engine()
    }
}
