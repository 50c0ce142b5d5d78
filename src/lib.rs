//! A small chat front end for local GGUF models, powered by llama-cpp-2.
//!
//! The pieces fit together like this: a [`Session`] holds the turns of one
//! conversation, a [`Gateway`] asks a [`CompletionEngine`] (normally a loaded
//! [`Model`]) for the next assistant turn, and [`Conversation`] ties the two
//! together for the command line.
#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

pub mod chat;
pub mod conversation;
mod detokenize;
mod engine;
pub mod error;
pub mod gateway;
pub mod gpu;
pub mod model;
pub mod repl;
pub mod sampling;
pub mod template;

pub use chat::{Role, Session, Turn};
pub use conversation::{Conversation, DEFAULT_SYSTEM_PROMPT};
pub use error::{Error, GenerationError, Result};
pub use gateway::{CompletionEngine, Gateway};
pub use gpu::{DeviceInfo, DeviceProbe, GpuChecker, LlamaDeviceProbe};
pub use model::{ContextParams, Model, ModelLoader, ModelParams};
pub use sampling::{SamplerStage, SamplingParameters};
pub use template::ChatTemplateFormat;
