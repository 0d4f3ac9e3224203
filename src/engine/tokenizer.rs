use std::path::Path;

use tokenizers::Tokenizer;

use crate::{
    engine::{Encoding, SpecialTokens},
    error::ServiceError,
};

const EOS_CANDIDATES: &[&str] = &["<|im_end|>", "<|endoftext|>", "<|eot_id|>", "</s>"];
const PAD_CANDIDATES: &[&str] = &["<|endoftext|>", "<pad>", "[PAD]"];

/// Hugging Face tokenizer with the chat service's encode/decode conventions.
pub struct ChatTokenizer {
    inner: Tokenizer,
}

impl ChatTokenizer {
    pub fn from_file(path: &Path) -> Result<Self, ServiceError> {
        let inner = Tokenizer::from_file(path).map_err(|e| ServiceError::Tokenizer(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn encode(
        &self,
        text: &str,
        max_length: usize,
        truncation: bool,
    ) -> Result<Encoding, ServiceError> {
        let encoded = self
            .inner
            .encode(text, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;
        let mut encoding = Encoding::new(
            encoded.get_ids().to_vec(),
            encoded.get_attention_mask().to_vec(),
        );
        if truncation {
            encoding.truncate(max_length);
        }
        if encoding.is_empty() {
            return Err(ServiceError::Tokenizer("prompt produced no tokens".into()));
        }
        Ok(encoding)
    }

    /// Decodes without special tokens.
    pub fn decode(&self, tokens: &[u32]) -> Result<String, ServiceError> {
        self.inner
            .decode(tokens, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))
    }

    pub fn special_tokens(&self) -> SpecialTokens {
        let lookup = |candidates: &[&str]| {
            candidates
                .iter()
                .find_map(|token| self.inner.token_to_id(token))
        };
        SpecialTokens {
            eos: lookup(EOS_CANDIDATES),
            pad: lookup(PAD_CANDIDATES),
        }
    }
}
