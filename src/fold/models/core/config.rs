use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Top level of the checkpoint configuration. The model configuration sits
/// under the `model` field, matching the layout the training runs produced.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CheckpointCfg {
    pub model: EsmFoldConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EsmFoldConfig {
    pub esm_type: String,
    pub fp16_esm: bool,
    pub use_esm_attn_map: bool,
    pub trunk: FoldingTrunkConfig,
    pub lddt_head_hid_dim: usize,
}

impl Default for EsmFoldConfig {
    fn default() -> Self {
        Self {
            esm_type: "esm2_3B".to_string(),
            fp16_esm: true,
            use_esm_attn_map: false,
            trunk: FoldingTrunkConfig::default(),
            lddt_head_hid_dim: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FoldingTrunkConfig {
    pub num_blocks: usize,
    pub sequence_state_dim: usize,
    pub pairwise_state_dim: usize,
    pub sequence_head_width: usize,
    pub pairwise_head_width: usize,
    pub position_bins: usize,
    pub max_recycles: usize,
    pub chunk_size: Option<usize>,
    pub structure_module: StructureModuleConfig,
}

impl Default for FoldingTrunkConfig {
    fn default() -> Self {
        Self {
            num_blocks: 48,
            sequence_state_dim: 1024,
            pairwise_state_dim: 128,
            sequence_head_width: 32,
            pairwise_head_width: 32,
            position_bins: 32,
            max_recycles: 4,
            chunk_size: None,
            structure_module: StructureModuleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StructureModuleConfig {
    pub c_s: usize,
    pub c_z: usize,
    pub c_ipa: usize,
    pub c_resnet: usize,
    pub no_heads_ipa: usize,
    pub no_qk_points: usize,
    pub no_v_points: usize,
    pub no_blocks: usize,
    pub no_transition_layers: usize,
    pub no_resnet_blocks: usize,
    pub no_angles: usize,
    pub trans_scale_factor: usize,
}

impl Default for StructureModuleConfig {
    fn default() -> Self {
        Self {
            c_s: 384,
            c_z: 128,
            c_ipa: 16,
            c_resnet: 128,
            no_heads_ipa: 12,
            no_qk_points: 4,
            no_v_points: 8,
            no_blocks: 8,
            no_transition_layers: 1,
            no_resnet_blocks: 2,
            no_angles: 7,
            trans_scale_factor: 10,
        }
    }
}

/// Dimensions of the ESM-2 language model named by `esm_type`. The folding
/// head consumes per-layer representations, so the expected parameter set
/// depends on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageModelSpec {
    pub layers: usize,
    pub embed_dim: usize,
    pub attention_heads: usize,
}

impl EsmFoldConfig {
    pub fn language_model(&self) -> Result<LanguageModelSpec> {
        let (layers, embed_dim, attention_heads) = match self.esm_type.as_str() {
            "esm2_8M" => (6, 320, 20),
            "esm2_35M" => (12, 480, 20),
            "esm2_150M" => (30, 640, 20),
            "esm2_650M" => (33, 1280, 20),
            "esm2_3B" => (36, 2560, 40),
            "esm2_15B" => (48, 5120, 40),
            other => return Err(anyhow::anyhow!("Unknown language model type: {:?}", other)),
        };
        Ok(LanguageModelSpec {
            layers,
            embed_dim,
            attention_heads,
        })
    }
}

/// Released ESMFold models, keyed by the tag carried in their checkpoint
/// filenames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    /// Paper model (Lin et al, 2022), trained on PDB chains until 2020-05
    /// for temporal holdout with CASP14 and CAMEO.
    EsmfoldV0,
    /// Release model. 3B ESM-2, 48 folding blocks.
    EsmfoldV1,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 2] = [ModelVariant::EsmfoldV0, ModelVariant::EsmfoldV1];

    pub fn checkpoint_tag(&self) -> &'static str {
        match self {
            ModelVariant::EsmfoldV0 => "esmfold_3B_v0",
            ModelVariant::EsmfoldV1 => "esmfold_3B_v1",
        }
    }

    pub fn esm_type(&self) -> &'static str {
        match self {
            ModelVariant::EsmfoldV0 | ModelVariant::EsmfoldV1 => "esm2_3B",
        }
    }

    /// Matching is scoped to the final path component.
    pub fn matches(&self, path: &Path) -> bool {
        match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => name.contains(self.checkpoint_tag()),
            None => false,
        }
    }
}

impl TryFrom<&Path> for ModelVariant {
    type Error = anyhow::Error;

    fn try_from(path: &Path) -> Result<Self> {
        ModelVariant::ALL
            .into_iter()
            .find(|variant| variant.matches(path))
            .ok_or_else(|| anyhow::anyhow!("No known model variant matches checkpoint: {:?}", path))
    }
}
