use serde::{Deserialize, Serialize};

/// Stop sequences used when the caller does not supply any
pub const DEFAULT_STOP_SEQUENCES: [&str; 3] = ["\nHuman:", "Human:", "Assistant:"];

/// One stage of the sampler chain, applied in order
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerStage {
    Penalties { last_n: i32, repeat: f32 },
    Greedy,
    TopK(u32),
    TopP(f32),
    Temperature(f32),
    Distribution { seed: u32 },
}

/// Tunables controlling length, randomness and stopping of a completion.
///
/// Values are handed to the engine as they are; nothing is validated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParameters {
    /// Upper bound on generated tokens
    pub max_tokens: usize,
    /// 0.0 = greedy
    pub temperature: f32,
    /// Nucleus cutoff
    pub top_p: f32,
    /// 0 disables top-k
    pub top_k: u32,
    /// Values above 1.0 discourage repetition
    pub repeat_penalty: f32,
    /// How many recent tokens the repeat penalty looks at
    pub repeat_last_n: i32,
    /// Generation halts as soon as one of these is produced
    pub stop_sequences: Vec<String>,
    /// RNG seed (default: 1234)
    pub seed: u32,
}

impl Default for SamplingParameters {
    fn default() -> Self {
        Self {
            max_tokens: 100,
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
            stop_sequences: DEFAULT_STOP_SEQUENCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            seed: 1234,
        }
    }
}

impl SamplingParameters {
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_repeat_penalty(mut self, repeat_penalty: f32) -> Self {
        self.repeat_penalty = repeat_penalty;
        self
    }

    pub fn with_stop_sequences<I, S>(mut self, stop_sequences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_sequences = stop_sequences.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    /// Whether sampling collapses to always picking the most likely token
    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0
    }

    /// Sampler chain for these parameters: repetition penalty, then either
    /// greedy or top-k / top-p / temperature followed by a seeded draw
    pub fn sampler_stages(&self) -> Vec<SamplerStage> {
        let mut stages = vec![SamplerStage::Penalties {
            last_n: self.repeat_last_n,
            repeat: self.repeat_penalty,
        }];

        if self.is_greedy() {
            stages.push(SamplerStage::Greedy);
            return stages;
        }

        if self.top_k > 0 {
            stages.push(SamplerStage::TopK(self.top_k));
        }
        stages.push(SamplerStage::TopP(self.top_p));
        stages.push(SamplerStage::Temperature(self.temperature));
        stages.push(SamplerStage::Distribution { seed: self.seed });
        stages
    }

    /// Find the earliest stop sequence in `text`, returning its byte offset
    pub fn find_stop(&self, text: &str) -> Option<usize> {
        self.stop_sequences
            .iter()
            .filter(|stop| !stop.is_empty())
            .filter_map(|stop| text.find(stop.as_str()))
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cli_defaults() {
        let params = SamplingParameters::default();
        assert_eq!(params.max_tokens, 100);
        assert_eq!(params.top_k, 40);
        assert_eq!(params.stop_sequences, ["\nHuman:", "Human:", "Assistant:"]);
        assert!(!params.is_greedy());
    }

    #[test]
    fn zero_temperature_is_greedy() {
        assert!(SamplingParameters::default().with_temperature(0.0).is_greedy());
    }

    #[test]
    fn default_chain() {
        assert_eq!(
            SamplingParameters::default().sampler_stages(),
            vec![
                SamplerStage::Penalties {
                    last_n: 64,
                    repeat: 1.1
                },
                SamplerStage::TopK(40),
                SamplerStage::TopP(0.9),
                SamplerStage::Temperature(0.3),
                SamplerStage::Distribution { seed: 1234 },
            ]
        );
    }

    #[test]
    fn greedy_chain_skips_random_stages() {
        let stages = SamplingParameters::default()
            .with_temperature(0.0)
            .sampler_stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[1], SamplerStage::Greedy);
    }

    #[test]
    fn zero_top_k_drops_top_k_stage() {
        let stages = SamplingParameters::default().with_top_k(0).sampler_stages();
        assert!(!stages.iter().any(|s| matches!(s, SamplerStage::TopK(_))));
        assert_eq!(stages.last(), Some(&SamplerStage::Distribution { seed: 1234 }));
    }

    #[test]
    fn find_stop_picks_earliest_match() {
        let params = SamplingParameters::default().with_stop_sequences(["END", "Human:"]);
        assert_eq!(params.find_stop("fine. Human: next END"), Some(6));
        assert_eq!(params.find_stop("nothing here"), None);
    }

    #[test]
    fn empty_stop_sequences_never_match() {
        let params = SamplingParameters::default().with_stop_sequences([""]);
        assert_eq!(params.find_stop("abc"), None);
    }
}
