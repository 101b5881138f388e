use crate::cli::{ConfigSource, DecoderArg};
use linmu_rs::{Decoder, LinmuError, PipelineConfig};
use std::path::PathBuf;

/// Per-user configuration file, `<config dir>/linmu/config.json`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("linmu").join("config.json"))
}

/// The configuration file to read: the explicit path (flag or `$LINMU_CONFIG`),
/// else the per-user file when it exists
pub fn config_path(source: &ConfigSource) -> Option<PathBuf> {
    source
        .config
        .clone()
        .or_else(|| user_config_path().filter(|path| path.is_file()))
}

/// Load and validate the effective configuration
pub fn load_config(source: &ConfigSource) -> Result<PipelineConfig, LinmuError> {
    let config = match config_path(source) {
        Some(path) => {
            log::info!("Using configuration {}", path.display());
            PipelineConfig::from_json_file(&path)?
        }
        None => {
            log::info!("No configuration file; using built-in defaults");
            PipelineConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}

pub fn apply_decoder(config: &mut PipelineConfig, decoder: Option<DecoderArg>) {
    if let Some(decoder) = decoder {
        config.linearization.decoder = Decoder::from_use_hmm(decoder == DecoderArg::Hmm);
    }
}
