use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, Result};
use log::{info, warn};

use crate::fold::errors::CheckpointError;
use crate::fold::traits::state_dict::StateDict;

use super::core::config::ModelVariant;
use super::esmfold::EsmFold;
use super::utils::checkpoint::read_checkpoint;
use super::utils::loader::checkpoint_device;

/// Weights under this namespace belong to the embedded ESM-2 language
/// model and may be shipped separately from the folding weights.
pub const LM_WEIGHT_PREFIX: &str = "esm.";

/// Load a model from a checkpoint. The checkpoint carries both the model
/// configuration and the trained weights; every expected parameter outside
/// the `esm.` namespace must be present.
pub fn load_model(path: &Path) -> Result<EsmFold> {
    let device = checkpoint_device();
    let checkpoint = read_checkpoint(path, &device)?;
    let mut model = EsmFold::try_from(checkpoint.cfg.model)?;

    let expected_keys = model.param_names();
    let found_keys: BTreeSet<String> = checkpoint.state.keys().cloned().collect();

    let missing_essential_keys: Vec<String> = expected_keys
        .difference(&found_keys)
        .filter(|key| !key.starts_with(LM_WEIGHT_PREFIX))
        .cloned()
        .collect();

    if !missing_essential_keys.is_empty() {
        return Err(anyhow!(CheckpointError::MissingEssentialKeys(
            missing_essential_keys
        )));
    }

    model.load_state_dict(checkpoint.state, false)?;

    info!(
        "Loaded {} of {} parameters from {:?}",
        model.num_loaded(),
        model.num_params(),
        path
    );
    Ok(model)
}

/// ESMFold v0 with 3B ESM-2 and 48 folding blocks. The model used for the
/// paper (Lin et al, 2022), trained on PDB chains until 2020-05 to ensure
/// temporal holdout with CASP14 and the CAMEO validation and test sets.
pub fn esmfold_v0(path: &Path) -> Result<Option<EsmFold>> {
    if ModelVariant::EsmfoldV0.matches(path) {
        Ok(Some(load_model(path)?))
    } else {
        Ok(None)
    }
}

/// ESMFold v1 with 3B ESM-2 and 48 folding blocks. The release model for
/// fast atomic level structure prediction from a single sequence.
pub fn esmfold_v1(path: &Path) -> Result<Option<EsmFold>> {
    if ModelVariant::EsmfoldV1.matches(path) {
        Ok(Some(load_model(path)?))
    } else {
        Ok(None)
    }
}

/// Dispatch over every released variant by checkpoint filename.
pub fn load_pretrained(path: &Path) -> Result<EsmFold> {
    let variant = ModelVariant::try_from(path)?;
    info!("Loading {:?} from {:?}", variant, path);
    let model = load_model(path)?;
    if model.config().esm_type != variant.esm_type() {
        warn!(
            "Checkpoint {:?} declares language model {:?}, {:?} ships with {:?}.",
            path,
            model.config().esm_type,
            variant,
            variant.esm_type()
        );
    }
    Ok(model)
}
