/// Worker-pool sizing (§4.8). `workers` defaults to available parallelism
/// when unset, both in config and via `STT_WORKERS`.
///
/// `model`/`model_path`/`device`/`precision` are recognized because §6 of
/// the contract enumerates them, but `DummySttEngine` is the only engine
/// this core ships, so they are carried through unused.
#[derive(Debug, Clone, Default)]
pub struct SttConfig {
    pub workers: Option<usize>,
    pub model: Option<String>,
    pub model_path: Option<String>,
    pub device: Option<String>,
    pub precision: Option<String>,
}

impl SttConfig {
    pub fn from_env() -> Self {
        Self {
            workers: std::env::var("STT_WORKERS").ok().and_then(|v| v.parse().ok()),
            model: std::env::var("STT_MODEL").ok(),
            model_path: std::env::var("STT_MODEL_PATH").ok(),
            device: std::env::var("STT_DEVICE").ok(),
            precision: std::env::var("STT_PRECISION").ok(),
        }
    }
}
