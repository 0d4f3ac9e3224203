use serde::Serialize;

/// Sampling and stopping parameters handed verbatim to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParameters {
    pub max_new_tokens: usize,
    pub do_sample: bool,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f64,
    pub pad_token_id: Option<u32>,
    pub eos_token_id: Option<u32>,
    pub seed: Option<u64>,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            do_sample: true,
            temperature: 0.7,
            top_p: 0.95,
            repetition_penalty: 1.2,
            pad_token_id: None,
            eos_token_id: None,
            seed: None,
        }
    }
}

impl GenerationParameters {
    /// Fills the special token ids the deployment did not pin explicitly.
    pub fn with_special_tokens(mut self, tokens: SpecialTokens) -> Self {
        if self.eos_token_id.is_none() {
            self.eos_token_id = tokens.eos;
        }
        if self.pad_token_id.is_none() {
            self.pad_token_id = tokens.pad.or(self.eos_token_id);
        }
        self
    }

    pub fn is_greedy(&self) -> bool {
        !self.do_sample || self.temperature <= 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecialTokens {
    pub eos: Option<u32>,
    pub pad: Option<u32>,
}

/// Tokenized prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoding {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

impl Encoding {
    pub fn new(input_ids: Vec<u32>, attention_mask: Vec<u32>) -> Self {
        Self {
            input_ids,
            attention_mask,
        }
    }

    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Keeps the leading `max_length` positions, like right-side truncation.
    pub fn truncate(&mut self, max_length: usize) {
        self.input_ids.truncate(max_length);
        self.attention_mask.truncate(max_length);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Eos,
    MaxTokens,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationReport {
    pub generated_tokens: usize,
    pub stop_reason: StopReason,
}
