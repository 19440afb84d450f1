use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use candle_core::{Device, Tensor};
use safetensors::SafeTensors;

use crate::fold::models::core::config::CheckpointCfg;

/// Header metadata entry holding the JSON configuration.
pub const CFG_METADATA_KEY: &str = "cfg";

/// In-memory checkpoint: the configuration and the flat parameter name →
/// tensor mapping.
#[derive(Debug)]
pub struct Checkpoint {
    pub cfg: CheckpointCfg,
    pub state: HashMap<String, Tensor>,
}

pub fn read_checkpoint(path: &Path, device: &Device) -> Result<Checkpoint> {
    let buffer =
        fs::read(path).with_context(|| format!("Unable to read checkpoint file: {:?}", path))?;

    let (_, metadata) = SafeTensors::read_metadata(&buffer)
        .with_context(|| format!("Malformed checkpoint header: {:?}", path))?;
    let cfg_json = metadata
        .metadata()
        .as_ref()
        .and_then(|entries| entries.get(CFG_METADATA_KEY))
        .ok_or_else(|| anyhow!("Checkpoint {:?} carries no '{}' metadata entry.", path, CFG_METADATA_KEY))?;
    let cfg: CheckpointCfg = serde_json::from_str(cfg_json)
        .with_context(|| format!("Malformed '{}' metadata in checkpoint: {:?}", CFG_METADATA_KEY, path))?;

    let state = candle_core::safetensors::load_buffer(&buffer, device)?;

    Ok(Checkpoint { cfg, state })
}

pub fn write_checkpoint(
    path: &Path,
    cfg: &CheckpointCfg,
    state: &HashMap<String, Tensor>,
) -> Result<()> {
    let mut metadata = HashMap::new();
    metadata.insert(CFG_METADATA_KEY.to_string(), serde_json::to_string(cfg)?);

    let entries = state.iter().map(|(name, tensor)| (name.as_str(), tensor));
    safetensors::serialize_to_file(entries, &Some(metadata), path)
        .with_context(|| format!("Unable to write checkpoint file: {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fold::models::core::config::EsmFoldConfig;
    use candle_core::DType;

    #[test]
    fn round_trip_preserves_cfg_and_tensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("esmfold_3B_v1.safetensors");
        let device = Device::Cpu;

        let cfg = CheckpointCfg {
            model: EsmFoldConfig::default(),
        };
        let mut state = HashMap::new();
        state.insert(
            "embedding.weight".to_string(),
            Tensor::zeros((23, 16), DType::F32, &device).unwrap(),
        );
        state.insert(
            "esm_s_combine".to_string(),
            Tensor::zeros(37, DType::F32, &device).unwrap(),
        );

        write_checkpoint(&path, &cfg, &state).unwrap();
        let checkpoint = read_checkpoint(&path, &device).unwrap();

        assert_eq!(checkpoint.cfg, cfg);
        assert_eq!(checkpoint.state.len(), 2);
        assert_eq!(
            checkpoint.state.get("embedding.weight").unwrap().dims(),
            &[23, 16]
        );
    }

    #[test]
    fn checkpoint_without_cfg_metadata_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights_only.safetensors");
        let device = Device::Cpu;

        let mut state = HashMap::new();
        state.insert(
            "embedding.weight".to_string(),
            Tensor::zeros((4, 4), DType::F32, &device).unwrap(),
        );
        let entries = state.iter().map(|(name, tensor)| (name.as_str(), tensor));
        safetensors::serialize_to_file(entries, &None, &path).unwrap();

        let err = read_checkpoint(&path, &device).unwrap_err();
        assert!(err.to_string().contains("cfg"));
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = read_checkpoint(Path::new("/nonexistent/esmfold_3B_v1.pt"), &Device::Cpu)
            .unwrap_err();
        assert!(format!("{:#}", err).contains("esmfold_3B_v1.pt"));
    }
}
