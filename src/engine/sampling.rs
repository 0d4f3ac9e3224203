use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::{engine::GenerationParameters, error::ServiceError};

/// Next-token selection over a single logits row.
pub struct Sampler {
    rng: Pcg64Mcg,
    do_sample: bool,
    temperature: f32,
    top_p: f32,
    repetition_penalty: f32,
}

impl Sampler {
    pub fn new(params: &GenerationParameters) -> Self {
        let seed = params.seed.unwrap_or_else(rand::random);
        Self {
            rng: Pcg64Mcg::seed_from_u64(seed),
            do_sample: !params.is_greedy(),
            temperature: params.temperature as f32,
            top_p: params.top_p as f32,
            repetition_penalty: params.repetition_penalty as f32,
        }
    }

    pub fn sample(&mut self, logits: &mut [f32], context: &[u32]) -> Result<u32, ServiceError> {
        if logits.is_empty() {
            return Err(ServiceError::Inference("empty logits row".into()));
        }

        apply_repetition_penalty(logits, context, self.repetition_penalty);

        if !self.do_sample {
            return Ok(argmax(logits));
        }

        for logit in logits.iter_mut() {
            *logit /= self.temperature;
        }

        let candidates = nucleus(logits, self.top_p);
        let total: f32 = candidates.iter().map(|(_, p)| p).sum();
        if total.is_nan() || total <= 0.0 {
            return Ok(argmax(logits));
        }

        let mut target = self.rng.r#gen::<f32>() * total;
        for &(token, prob) in &candidates {
            target -= prob;
            if target <= 0.0 {
                return Ok(token);
            }
        }
        Ok(candidates[candidates.len() - 1].0)
    }
}

/// Each distinct context token is penalised once.
fn apply_repetition_penalty(logits: &mut [f32], context: &[u32], penalty: f32) {
    if penalty == 1.0 || context.is_empty() {
        return;
    }
    let mut seen = std::collections::HashSet::with_capacity(context.len());
    for &token in context {
        if !seen.insert(token) {
            continue;
        }
        if let Some(logit) = logits.get_mut(token as usize) {
            if *logit > 0.0 {
                *logit /= penalty;
            } else {
                *logit *= penalty;
            }
        }
    }
}

fn argmax(logits: &[f32]) -> u32 {
    let mut best = 0usize;
    for (idx, &value) in logits.iter().enumerate() {
        if value > logits[best] {
            best = idx;
        }
    }
    best as u32
}

/// Smallest prefix of the probability-sorted vocabulary whose mass reaches `top_p`.
fn nucleus(logits: &[f32], top_p: f32) -> Vec<(u32, f32)> {
    let max = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let mut probs: Vec<(u32, f32)> = logits
        .iter()
        .enumerate()
        .map(|(idx, &logit)| (idx as u32, (logit - max).exp()))
        .collect();
    let sum: f32 = probs.iter().map(|(_, p)| p).sum();
    for entry in &mut probs {
        entry.1 /= sum;
    }

    probs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut cumulative = 0.0f32;
    let mut cutoff = probs.len();
    for (idx, &(_, prob)) in probs.iter().enumerate() {
        cumulative += prob;
        if cumulative >= top_p {
            cutoff = idx + 1;
            break;
        }
    }
    probs.truncate(cutoff.max(1));
    probs
}
