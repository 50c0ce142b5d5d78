use tracing::{debug, warn};

use crate::chat::{Session, Turn};
use crate::error::{GenerationError, Result};
use crate::sampling::SamplingParameters;

/// Something that can turn a list of chat turns into generated text.
///
/// Implemented by [`crate::Model`] for llama.cpp models; tests plug in stubs.
pub trait CompletionEngine {
    /// Produce the raw completion for `turns`
    fn complete(&self, turns: &[Turn], params: &SamplingParameters) -> Result<String>;
}

impl<E: CompletionEngine + ?Sized> CompletionEngine for &E {
    fn complete(&self, turns: &[Turn], params: &SamplingParameters) -> Result<String> {
        (**self).complete(turns, params)
    }
}

impl<E: CompletionEngine + ?Sized> CompletionEngine for Box<E> {
    fn complete(&self, turns: &[Turn], params: &SamplingParameters) -> Result<String> {
        (**self).complete(turns, params)
    }
}

/// Adapter between a [`Session`] and a [`CompletionEngine`].
///
/// Each call is independent. The gateway never writes to a session; committing
/// the reply is up to the caller.
#[derive(Debug, Clone)]
pub struct Gateway<E> {
    engine: E,
}

impl<E: CompletionEngine> Gateway<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Ask the engine for one assistant reply to `snapshot`
    pub fn generate(
        &self,
        snapshot: &[Turn],
        params: &SamplingParameters,
    ) -> std::result::Result<Turn, GenerationError> {
        debug!("Generating reply for {} turn(s)", snapshot.len());

        let text = self.engine.complete(snapshot, params).map_err(|e| {
            warn!("Error generating response: {}", e);
            GenerationError::from(e)
        })?;

        let text = text.trim();
        if text.is_empty() {
            warn!("Empty response from model");
            return Err(GenerationError::EmptyCompletion);
        }

        Ok(Turn::assistant(text))
    }

    /// Shorthand for generating against the current state of `session`
    pub fn reply_to(
        &self,
        session: &Session,
        params: &SamplingParameters,
    ) -> std::result::Result<Turn, GenerationError> {
        self.generate(session.turns(), params)
    }
}
