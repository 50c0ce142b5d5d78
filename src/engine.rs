use crate::chat::Turn;
use crate::detokenize::Detokenizer;
use crate::error::{Error, Result};
use crate::gateway::CompletionEngine;
use crate::model::{Model, backend};
use crate::sampling::{SamplerStage, SamplingParameters};
use crate::template::{ChatTemplateFormat, render_custom, render_default};
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::{AddBos, LlamaChatMessage, Special};
use llama_cpp_2::sampling::LlamaSampler;
use std::num::NonZeroU32;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

impl CompletionEngine for Model {
    fn complete(&self, turns: &[Turn], params: &SamplingParameters) -> Result<String> {
        let prompt = self.render_prompt(turns)?;
        debug!("Chat prompt: {}", prompt);

        let mut ctx = self.new_context()?;

        let tokens_list = self
            .model
            .str_to_token(&prompt, AddBos::Always)
            .map_err(|e| Error::TokenizationError(format!("failed to tokenize prompt: {}", e)))?;

        let n_prompt = tokens_list.len();
        let n_ctx = ctx.n_ctx() as usize;
        if n_prompt >= n_ctx {
            return Err(Error::ContextOverflow(format!(
                "the prompt has {} tokens but the context only holds {}",
                n_prompt, n_ctx
            )));
        }

        let max_tokens = params.max_tokens.min(n_ctx - n_prompt);
        if max_tokens < params.max_tokens {
            warn!(
                "only room for {} of {} requested tokens, increase the context size",
                max_tokens, params.max_tokens
            );
        }

        info!(
            "num_tokens_to_generate = {}, n_prompt = {}, n_ctx = {}",
            max_tokens, n_prompt, n_ctx
        );

        // Feed the prompt in chunks no larger than the logical batch size
        let n_batch = (self.context_params.batch_size as usize).max(1);
        let mut batch = LlamaBatch::new(n_batch, 1);
        let last_index = n_prompt.saturating_sub(1);
        for (chunk_index, chunk) in tokens_list.chunks(n_batch).enumerate() {
            batch.clear();
            for (offset, token) in chunk.iter().enumerate() {
                let pos = chunk_index * n_batch + offset;
                batch
                    .add(*token, pos as i32, &[0], pos == last_index)
                    .map_err(|e| {
                        Error::BatchError(format!("Failed to add prompt token to batch: {}", e))
                    })?;
            }
            ctx.decode(&mut batch)
                .map_err(|e| Error::DecodingError(format!("llama_decode() failed: {}", e)))?;
        }

        let mut sampler = build_sampler(params);
        let mut detokenizer = Detokenizer::new(params);
        let mut n_cur = n_prompt as i32;
        let mut n_decode = 0;

        let sampling_start = Instant::now();

        while n_decode < max_tokens {
            let token = sampler.sample(&ctx, batch.n_tokens() - 1);

            if self.model.is_eog_token(token) {
                trace!("End of generation token detected: {token}");
                break;
            }

            let output_bytes = self
                .model
                .token_to_bytes(token, Special::Tokenize)
                .map_err(|e| {
                    Error::TokenizationError(format!("Failed to convert token to bytes: {}", e))
                })?;
            n_decode += 1;

            if detokenizer.push(&output_bytes)? {
                debug!("Stop sequence reached after {} tokens", n_decode);
                break;
            }

            batch.clear();
            batch.add(token, n_cur, &[0], true).map_err(|e| {
                Error::BatchError(format!(
                    "Failed to create batch from generated token: {}",
                    e
                ))
            })?;
            n_cur += 1;

            ctx.decode(&mut batch)
                .map_err(|e| Error::DecodingError(format!("llama_decode() failed: {}", e)))?;
        }

        let duration = sampling_start.elapsed();
        let output = detokenizer.finish()?;

        info!(
            "decoded {} tokens in {:.2} s, speed {:.2} t/s",
            n_decode,
            duration.as_secs_f32(),
            n_decode as f32 / duration.as_secs_f32()
        );

        debug!("Timings: {}", ctx.timings());

        Ok(output)
    }
}

impl Model {
    /// Format the chat turns into a single prompt string
    fn render_prompt(&self, turns: &[Turn]) -> Result<String> {
        match &self.template_format {
            ChatTemplateFormat::ModelDefault => match self.model.chat_template(None) {
                Ok(template) => {
                    let chat = turns
                        .iter()
                        .map(|turn| {
                            LlamaChatMessage::new(
                                turn.role().as_str().to_string(),
                                turn.content().to_string(),
                            )
                            .map_err(|e| Error::ChatTemplateError(e.to_string()))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    self.model
                        .apply_chat_template(&template, &chat, true)
                        .map_err(|e| Error::ChatTemplateError(e.to_string()))
                }
                Err(e) => {
                    debug!("Model has no usable chat template ({}), using default", e);
                    Ok(render_default(turns))
                }
            },
            ChatTemplateFormat::Default => Ok(render_default(turns)),
            ChatTemplateFormat::Custom(template) => Ok(render_custom(template, turns)),
        }
    }

    /// Fresh context per completion, so calls do not share KV state
    fn new_context(&self) -> Result<LlamaContext<'_>> {
        let params = &self.context_params;
        let mut ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(params.ctx_size))
            .with_n_batch(params.batch_size);

        if let Some(threads) = params.threads {
            ctx_params = ctx_params.with_n_threads(threads as i32);
        }
        if let Some(threads_batch) = params.threads_batch.or(params.threads) {
            ctx_params = ctx_params.with_n_threads_batch(threads_batch as i32);
        }

        self.model.new_context(backend()?, ctx_params).map_err(|e| {
            Error::ContextCreationError(format!("unable to create the llama_context: {}", e))
        })
    }
}

/// Build the llama sampler chain from the stages the parameters call for
fn build_sampler(params: &SamplingParameters) -> LlamaSampler {
    let chain = params.sampler_stages().into_iter().map(|stage| match stage {
        SamplerStage::Penalties { last_n, repeat } => {
            LlamaSampler::penalties(last_n, repeat, 0.0, 0.0)
        }
        SamplerStage::Greedy => LlamaSampler::greedy(),
        SamplerStage::TopK(k) => LlamaSampler::top_k(k as i32),
        SamplerStage::TopP(p) => LlamaSampler::top_p(p, 1),
        SamplerStage::Temperature(t) => LlamaSampler::temp(t),
        SamplerStage::Distribution { seed } => LlamaSampler::dist(seed),
    });

    LlamaSampler::chain_simple(chain)
}
