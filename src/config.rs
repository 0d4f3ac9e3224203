use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    str::FromStr,
};

#[cfg(feature = "tch-backend")]
use tch::Device;

use crate::{
    engine::GenerationParameters,
    stream::{ChannelCapacity, FaultPolicy, StreamOptions},
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub model_dir: PathBuf,
    pub module_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub module_takes_attention_mask: bool,
    pub max_input_tokens: usize,
    pub generation: GenerationParameters,
    pub channel_capacity: ChannelCapacity,
    pub fault_policy: FaultPolicy,
    #[cfg(feature = "tch-backend")]
    pub device: Device,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = parse_var(&lookup, "SERVER_ADDR")
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000));

        let local_dir = PathBuf::from(lookup("LOCAL_MODEL_DIR").unwrap_or_else(|| "model".into()));
        let fallback_dir = PathBuf::from(
            lookup("FALLBACK_MODEL_DIR").unwrap_or_else(|| "models/default".into()),
        );
        let model_dir = resolve_model_dir(
            lookup("MODEL_PATH").map(PathBuf::from),
            &local_dir,
            &fallback_dir,
        );

        let module_path =
            model_dir.join(lookup("MODULE_FILE").unwrap_or_else(|| "model.ts".into()));
        let tokenizer_path = lookup("TOKENIZER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| model_dir.join("tokenizer.json"));
        let module_takes_attention_mask =
            parsed_bool(lookup("MODULE_TAKES_ATTENTION_MASK")).unwrap_or(false);

        let max_input_tokens = parse_var(&lookup, "MAX_INPUT_TOKENS").unwrap_or(512);

        let defaults = GenerationParameters::default();
        let generation = GenerationParameters {
            max_new_tokens: parse_var(&lookup, "MAX_NEW_TOKENS").unwrap_or(defaults.max_new_tokens),
            do_sample: parsed_bool(lookup("DO_SAMPLE")).unwrap_or(defaults.do_sample),
            temperature: parse_var(&lookup, "TEMPERATURE").unwrap_or(defaults.temperature),
            top_p: parse_var(&lookup, "TOP_P").unwrap_or(defaults.top_p),
            repetition_penalty: parse_var(&lookup, "REPETITION_PENALTY")
                .unwrap_or(defaults.repetition_penalty),
            pad_token_id: parse_var(&lookup, "PAD_TOKEN_ID"),
            eos_token_id: parse_var(&lookup, "EOS_TOKEN_ID"),
            seed: parse_var(&lookup, "SEED"),
        };

        let channel_capacity = match parse_var::<usize, _>(&lookup, "STREAM_CHANNEL_CAPACITY") {
            Some(0) => ChannelCapacity::Unbounded,
            Some(n) => ChannelCapacity::Bounded(n),
            None => ChannelCapacity::default(),
        };
        let fault_policy = lookup("STREAM_FAULT_POLICY")
            .and_then(|v| FaultPolicy::from_str(&v).ok())
            .unwrap_or_default();

        #[cfg(feature = "tch-backend")]
        let device = {
            let raw = lookup("DEVICE").unwrap_or_else(|| "cpu".into());
            parse_device(&raw)
        };

        Ok(Self {
            listen_addr,
            model_dir,
            module_path,
            tokenizer_path,
            module_takes_attention_mask,
            max_input_tokens,
            generation,
            channel_capacity,
            fault_policy,
            #[cfg(feature = "tch-backend")]
            device,
        })
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            capacity: self.channel_capacity,
            fault_policy: self.fault_policy,
        }
    }
}

/// Explicit path, else the local directory when present, else the fallback.
pub fn resolve_model_dir(explicit: Option<PathBuf>, local: &Path, fallback: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if local.is_dir() {
        local.to_path_buf()
    } else {
        fallback.to_path_buf()
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn parsed_bool(raw: Option<String>) -> Option<bool> {
    match raw?.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(feature = "tch-backend")]
fn parse_device(raw: &str) -> Device {
    let lower = raw.to_lowercase();
    if lower == "cpu" {
        Device::Cpu
    } else if lower.starts_with("cuda") {
        let idx = lower
            .split(':')
            .nth(1)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        if tch::Cuda::is_available() {
            Device::Cuda(idx)
        } else {
            Device::Cpu
        }
    } else {
        Device::Cpu
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn defaults_match_streaming_deployment() {
        let config = config_from(&[("LOCAL_MODEL_DIR", "/nonexistent/model")]);

        assert_eq!(config.listen_addr.port(), 8000);
        assert_eq!(config.max_input_tokens, 512);
        assert_eq!(config.generation.max_new_tokens, 256);
        assert!(config.generation.do_sample);
        assert_eq!(config.generation.temperature, 0.7);
        assert_eq!(config.generation.top_p, 0.95);
        assert_eq!(config.generation.repetition_penalty, 1.2);
        assert_eq!(config.channel_capacity, ChannelCapacity::Bounded(128));
        assert_eq!(config.fault_policy, FaultPolicy::Graceful);
        assert_eq!(config.model_dir, PathBuf::from("models/default"));
        assert_eq!(
            config.tokenizer_path,
            PathBuf::from("models/default/tokenizer.json")
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("SERVER_ADDR", "127.0.0.1:9000"),
            ("MODEL_PATH", "/srv/chat-model"),
            ("MAX_NEW_TOKENS", "512"),
            ("DO_SAMPLE", "false"),
            ("EOS_TOKEN_ID", "151645"),
            ("STREAM_CHANNEL_CAPACITY", "0"),
            ("STREAM_FAULT_POLICY", "propagate"),
        ]);

        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.module_path, PathBuf::from("/srv/chat-model/model.ts"));
        assert_eq!(config.generation.max_new_tokens, 512);
        assert!(!config.generation.do_sample);
        assert_eq!(config.generation.eos_token_id, Some(151645));
        assert_eq!(config.channel_capacity, ChannelCapacity::Unbounded);
        assert_eq!(config.fault_policy, FaultPolicy::Propagate);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = config_from(&[
            ("SERVER_ADDR", "not-an-addr"),
            ("TEMPERATURE", "hot"),
            ("STREAM_FAULT_POLICY", "explode"),
        ]);
        assert_eq!(config.listen_addr.port(), 8000);
        assert_eq!(config.generation.temperature, 0.7);
        assert_eq!(config.fault_policy, FaultPolicy::Graceful);
    }

    #[test]
    fn local_model_dir_preferred_when_present() {
        let local = env::temp_dir();
        let resolved = resolve_model_dir(None, &local, Path::new("fallback"));
        assert_eq!(resolved, local);

        let explicit = resolve_model_dir(Some("/x".into()), &local, Path::new("fallback"));
        assert_eq!(explicit, PathBuf::from("/x"));
    }
}
