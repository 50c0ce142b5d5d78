use encoding_rs::{CoderResult, Decoder};
use tracing::trace;

use crate::error::{Error, Result};
use crate::sampling::SamplingParameters;

/// Turns generated token bytes into text and watches for stop sequences.
///
/// Token boundaries do not line up with UTF-8 boundaries, so bytes of a
/// split character are held by the decoder until the rest arrives.
pub(crate) struct Detokenizer<'a> {
    decoder: Decoder,
    output: String,
    params: &'a SamplingParameters,
    stopped: bool,
}

impl<'a> Detokenizer<'a> {
    pub(crate) fn new(params: &'a SamplingParameters) -> Self {
        Self {
            decoder: encoding_rs::UTF_8.new_decoder(),
            output: String::new(),
            params,
            stopped: false,
        }
    }

    /// Append one token's bytes. Returns true once a stop sequence was hit;
    /// the stop text and anything after it are cut from the output.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Result<bool> {
        if self.stopped {
            return Ok(true);
        }
        let start = self.output.len();
        self.decode(bytes, false)?;
        trace!(name: "token-gen", "Generated token: {}", &self.output[start..]);
        Ok(self.check_stop())
    }

    /// Flush any incomplete trailing character and return the text
    pub(crate) fn finish(mut self) -> Result<String> {
        if !self.stopped {
            self.decode(&[], true)?;
            self.check_stop();
        }
        Ok(self.output)
    }

    fn decode(&mut self, bytes: &[u8], last: bool) -> Result<()> {
        let needed = self
            .decoder
            .max_utf8_buffer_length(bytes.len())
            .unwrap_or(bytes.len() * 3 + 4);
        self.output.reserve(needed);

        let (result, read, _) = self.decoder.decode_to_string(bytes, &mut self.output, last);
        match result {
            CoderResult::InputEmpty => Ok(()),
            CoderResult::OutputFull => Err(Error::DecodingError(format!(
                "token text truncated after {} of {} bytes",
                read,
                bytes.len()
            ))),
        }
    }

    fn check_stop(&mut self) -> bool {
        if let Some(stop_at) = self.params.find_stop(&self.output) {
            self.output.truncate(stop_at);
            self.stopped = true;
        }
        self.stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(stops: &[&str]) -> SamplingParameters {
        SamplingParameters::default().with_stop_sequences(stops.iter().copied())
    }

    #[test]
    fn long_tokens_are_kept_whole() {
        let params = params(&[]);
        let mut detok = Detokenizer::new(&params);
        let token = "-".repeat(64);
        assert!(!detok.push(token.as_bytes()).unwrap());
        assert!(!detok.push(" ".repeat(200).as_bytes()).unwrap());
        let text = detok.finish().unwrap();
        assert_eq!(text.len(), 264);
        assert!(text.starts_with(&token));
    }

    #[test]
    fn character_split_across_tokens() {
        let params = params(&[]);
        let mut detok = Detokenizer::new(&params);
        let bytes = "héllo".as_bytes();
        // 'é' is two bytes; split it between tokens
        detok.push(&bytes[..2]).unwrap();
        detok.push(&bytes[2..]).unwrap();
        assert_eq!(detok.finish().unwrap(), "héllo");
    }

    #[test]
    fn incomplete_trailing_character_is_flushed() {
        let params = params(&[]);
        let mut detok = Detokenizer::new(&params);
        detok.push(b"ok\xC3").unwrap();
        assert_eq!(detok.finish().unwrap(), "ok\u{FFFD}");
    }

    #[test]
    fn stop_sequence_split_across_tokens() {
        let params = params(&["Human:"]);
        let mut detok = Detokenizer::new(&params);
        assert!(!detok.push(b"Sure thing.\nHu").unwrap());
        assert!(detok.push(b"man: next").unwrap());
        assert_eq!(detok.finish().unwrap(), "Sure thing.\n");
    }

    #[test]
    fn earliest_stop_wins() {
        let params = params(&["END", "Assistant:"]);
        let mut detok = Detokenizer::new(&params);
        assert!(detok.push(b"a Assistant: b END").unwrap());
        assert_eq!(detok.finish().unwrap(), "a ");
    }

    #[test]
    fn pushes_after_stop_are_ignored() {
        let params = params(&["STOP"]);
        let mut detok = Detokenizer::new(&params);
        assert!(detok.push(b"done STOP").unwrap());
        assert!(detok.push(b"more").unwrap());
        assert_eq!(detok.finish().unwrap(), "done ");
    }
}
