use crate::error::ServiceError;

/// Turns a growing token sequence into printable text deltas.
///
/// Byte-level tokenizers can split a character across tokens; while the
/// decoded tail is a replacement character the delta is held back.
#[derive(Debug, Default)]
pub struct IncrementalDecoder {
    tokens: Vec<u32>,
    emitted: String,
}

impl IncrementalDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    pub fn push<F>(&mut self, token: u32, decode: F) -> Result<Option<String>, ServiceError>
    where
        F: Fn(&[u32]) -> Result<String, ServiceError>,
    {
        self.tokens.push(token);
        let text = decode(&self.tokens)?;
        if text.ends_with('\u{FFFD}') {
            return Ok(None);
        }
        Ok(self.advance(text))
    }

    /// Flushes text still held back when generation stops, incomplete tail included.
    pub fn finish<F>(&mut self, decode: F) -> Result<Option<String>, ServiceError>
    where
        F: Fn(&[u32]) -> Result<String, ServiceError>,
    {
        if self.tokens.is_empty() {
            return Ok(None);
        }
        let text = decode(&self.tokens)?;
        Ok(self.advance(text))
    }

    fn advance(&mut self, text: String) -> Option<String> {
        let delta = match text.strip_prefix(self.emitted.as_str()) {
            Some(rest) => rest.to_string(),
            // Decoder cleanup rewrote earlier text; emit from the first divergence.
            None => {
                let common = common_prefix_len(&self.emitted, &text);
                text[common..].to_string()
            }
        };
        self.emitted = text;

        if delta.is_empty() { None } else { Some(delta) }
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, ca), cb)| ca != cb)
        .map(|((idx, _), _)| idx)
        .unwrap_or_else(|| a.len().min(b.len()))
}
