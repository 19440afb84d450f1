use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{anyhow, Result};
use candle_core::Tensor;

use crate::fold::errors::CheckpointError;
use crate::fold::traits::state_dict::StateDict;

use super::core::config::{EsmFoldConfig, FoldingTrunkConfig, LanguageModelSpec, StructureModuleConfig};

const N_TOKENS_EMBED: usize = 23;
const ESM_VOCAB_SIZE: usize = 33;
const DISTOGRAM_BINS: usize = 64;
const LDDT_BINS: usize = 50;
const ATOMS_PER_RESIDUE: usize = 37;

/// Declared parameter slot. The shape comes from the configuration, the
/// tensor is attached by `load_state_dict`.
#[derive(Debug)]
struct Param {
    shape: Vec<usize>,
    tensor: Option<Tensor>,
}

/// ESMFold model instance: the full parameter table derived from a
/// checkpoint configuration. Language model parameters live under the
/// `esm.` namespace and may be filled in by a separate load.
#[derive(Debug)]
pub struct EsmFold {
    config: EsmFoldConfig,
    params: BTreeMap<String, Param>,
}

impl TryFrom<EsmFoldConfig> for EsmFold {
    type Error = anyhow::Error;

    fn try_from(config: EsmFoldConfig) -> Result<Self> {
        let params = build_param_table(&config)?;
        Ok(Self { config, params })
    }
}

impl EsmFold {
    pub fn config(&self) -> &EsmFoldConfig {
        &self.config
    }

    /// Declared (name, shape) pairs, in name order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.params
            .iter()
            .map(|(name, param)| (name.as_str(), param.shape.as_slice()))
    }

    pub fn param_shape(&self, name: &str) -> Option<&[usize]> {
        self.params.get(name).map(|param| param.shape.as_slice())
    }

    pub fn tensor(&self, name: &str) -> Option<&Tensor> {
        self.params.get(name).and_then(|param| param.tensor.as_ref())
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn num_loaded(&self) -> usize {
        self.params
            .values()
            .filter(|param| param.tensor.is_some())
            .count()
    }
}

impl StateDict for EsmFold {
    fn param_names(&self) -> BTreeSet<String> {
        self.params.keys().cloned().collect()
    }

    fn load_state_dict(&mut self, state: HashMap<String, Tensor>, strict: bool) -> Result<()> {
        if strict {
            let unexpected: Vec<&String> = state
                .keys()
                .filter(|name| !self.params.contains_key(*name))
                .collect();
            if !unexpected.is_empty() {
                return Err(anyhow!("Unexpected keys in state dict: {:?}", unexpected));
            }
            let missing: Vec<&String> = self
                .params
                .keys()
                .filter(|name| !state.contains_key(*name))
                .collect();
            if !missing.is_empty() {
                return Err(anyhow!("Missing keys in state dict: {:?}", missing));
            }
        }

        for (name, tensor) in state {
            let Some(param) = self.params.get_mut(&name) else {
                continue;
            };
            let found = tensor.dims().to_vec();
            if found != param.shape {
                return Err(anyhow!(CheckpointError::ShapeMismatch {
                    name,
                    expected: param.shape.clone(),
                    found,
                }));
            }
            param.tensor = Some(tensor);
        }
        Ok(())
    }
}

#[derive(Default)]
struct ParamTable {
    params: BTreeMap<String, Param>,
}

impl ParamTable {
    fn tensor(&mut self, name: String, shape: Vec<usize>) {
        self.params.insert(name, Param { shape, tensor: None });
    }

    fn linear(&mut self, prefix: &str, in_dim: usize, out_dim: usize) {
        self.tensor(format!("{prefix}.weight"), vec![out_dim, in_dim]);
        self.tensor(format!("{prefix}.bias"), vec![out_dim]);
    }

    fn linear_no_bias(&mut self, prefix: &str, in_dim: usize, out_dim: usize) {
        self.tensor(format!("{prefix}.weight"), vec![out_dim, in_dim]);
    }

    fn layer_norm(&mut self, prefix: &str, dim: usize) {
        self.tensor(format!("{prefix}.weight"), vec![dim]);
        self.tensor(format!("{prefix}.bias"), vec![dim]);
    }

    fn embedding(&mut self, prefix: &str, entries: usize, dim: usize) {
        self.tensor(format!("{prefix}.weight"), vec![entries, dim]);
    }
}

fn build_param_table(config: &EsmFoldConfig) -> Result<BTreeMap<String, Param>> {
    let lm = config.language_model()?;
    let trunk = &config.trunk;
    let sm = &trunk.structure_module;
    let c_s = trunk.sequence_state_dim;
    let c_z = trunk.pairwise_state_dim;

    let mut t = ParamTable::default();

    language_model_params(&mut t, &lm);

    // per-layer language model representations are mixed into a single
    // sequence state
    t.tensor("esm_s_combine".to_string(), vec![lm.layers + 1]);
    t.layer_norm("esm_s_mlp.0", lm.embed_dim);
    t.linear("esm_s_mlp.1", lm.embed_dim, c_s);
    t.linear("esm_s_mlp.3", c_s, c_s);

    t.embedding("embedding", N_TOKENS_EMBED, c_s);
    t.embedding(
        "trunk.pairwise_positional_embedding.embedding",
        2 * trunk.position_bins + 2,
        c_z,
    );

    for i in 0..trunk.num_blocks {
        block_params(&mut t, &format!("trunk.blocks.{i}"), trunk);
    }

    structure_module_params(&mut t, "trunk.structure_module", sm);
    t.linear("trunk.trunk2sm_s", c_s, sm.c_s);
    t.linear("trunk.trunk2sm_z", c_z, sm.c_z);

    t.linear("distogram_head", c_z, DISTOGRAM_BINS);
    t.linear("ptm_head", c_z, DISTOGRAM_BINS);
    t.linear("lm_head", c_s, N_TOKENS_EMBED);
    t.layer_norm("lddt_head.0", sm.c_s);
    t.linear("lddt_head.1", sm.c_s, config.lddt_head_hid_dim);
    t.linear("lddt_head.2", config.lddt_head_hid_dim, config.lddt_head_hid_dim);
    t.linear("lddt_head.3", config.lddt_head_hid_dim, ATOMS_PER_RESIDUE * LDDT_BINS);

    Ok(t.params)
}

fn language_model_params(t: &mut ParamTable, lm: &LanguageModelSpec) {
    let dim = lm.embed_dim;

    t.embedding("esm.embed_tokens", ESM_VOCAB_SIZE, dim);
    for i in 0..lm.layers {
        let p = format!("esm.layers.{i}");
        for proj in ["k_proj", "v_proj", "q_proj", "out_proj"] {
            t.linear(&format!("{p}.self_attn.{proj}"), dim, dim);
        }
        t.layer_norm(&format!("{p}.self_attn_layer_norm"), dim);
        t.linear(&format!("{p}.fc1"), dim, 4 * dim);
        t.linear(&format!("{p}.fc2"), 4 * dim, dim);
        t.layer_norm(&format!("{p}.final_layer_norm"), dim);
    }
    t.layer_norm("esm.emb_layer_norm_after", dim);

    t.linear("esm.lm_head.dense", dim, dim);
    t.layer_norm("esm.lm_head.layer_norm", dim);
    t.tensor("esm.lm_head.weight".to_string(), vec![ESM_VOCAB_SIZE, dim]);
    t.tensor("esm.lm_head.bias".to_string(), vec![ESM_VOCAB_SIZE]);
    t.linear(
        "esm.contact_head.regression",
        lm.layers * lm.attention_heads,
        1,
    );
}

fn block_params(t: &mut ParamTable, prefix: &str, trunk: &FoldingTrunkConfig) {
    let c_s = trunk.sequence_state_dim;
    let c_z = trunk.pairwise_state_dim;
    let seq_heads = c_s / trunk.sequence_head_width;
    let pair_heads = c_z / trunk.pairwise_head_width;

    t.layer_norm(&format!("{prefix}.layernorm_1"), c_s);

    t.layer_norm(&format!("{prefix}.sequence_to_pair.layernorm"), c_s);
    t.linear(&format!("{prefix}.sequence_to_pair.proj"), c_s, c_z);
    t.linear(&format!("{prefix}.sequence_to_pair.o_proj"), c_z, c_z);

    t.layer_norm(&format!("{prefix}.pair_to_sequence.layernorm"), c_z);
    t.linear_no_bias(&format!("{prefix}.pair_to_sequence.linear"), c_z, seq_heads);

    // gated sequence attention
    t.linear_no_bias(&format!("{prefix}.seq_attention.proj"), c_s, 3 * c_s);
    t.linear(&format!("{prefix}.seq_attention.o_proj"), c_s, c_s);
    t.linear(&format!("{prefix}.seq_attention.g_proj"), c_s, c_s);

    for update in ["tri_mul_out", "tri_mul_in"] {
        let p = format!("{prefix}.{update}");
        t.layer_norm(&format!("{p}.layer_norm_in"), c_z);
        t.layer_norm(&format!("{p}.layer_norm_out"), c_z);
        for gate in ["linear_a_p", "linear_a_g", "linear_b_p", "linear_b_g", "linear_g", "linear_z"] {
            t.linear(&format!("{p}.{gate}"), c_z, c_z);
        }
    }

    for node in ["tri_att_start", "tri_att_end"] {
        let p = format!("{prefix}.{node}");
        t.layer_norm(&format!("{p}.layer_norm"), c_z);
        t.linear_no_bias(&format!("{p}.linear"), c_z, pair_heads);
        for proj in ["linear_q", "linear_k", "linear_v"] {
            t.linear_no_bias(
                &format!("{p}.mha.{proj}"),
                c_z,
                pair_heads * trunk.pairwise_head_width,
            );
        }
        t.linear(&format!("{p}.mha.linear_o"), pair_heads * trunk.pairwise_head_width, c_z);
        t.linear(&format!("{p}.mha.linear_g"), c_z, pair_heads * trunk.pairwise_head_width);
    }

    t.layer_norm(&format!("{prefix}.mlp_seq.mlp.0"), c_s);
    t.linear(&format!("{prefix}.mlp_seq.mlp.1"), c_s, 4 * c_s);
    t.linear(&format!("{prefix}.mlp_seq.mlp.3"), 4 * c_s, c_s);

    t.layer_norm(&format!("{prefix}.mlp_pair.mlp.0"), c_z);
    t.linear(&format!("{prefix}.mlp_pair.mlp.1"), c_z, 4 * c_z);
    t.linear(&format!("{prefix}.mlp_pair.mlp.3"), 4 * c_z, c_z);
}

fn structure_module_params(t: &mut ParamTable, prefix: &str, sm: &StructureModuleConfig) {
    t.layer_norm(&format!("{prefix}.layer_norm_s"), sm.c_s);
    t.layer_norm(&format!("{prefix}.layer_norm_z"), sm.c_z);
    t.linear(&format!("{prefix}.linear_in"), sm.c_s, sm.c_s);

    // invariant point attention
    let hc = sm.c_ipa * sm.no_heads_ipa;
    let p = format!("{prefix}.ipa");
    t.linear(&format!("{p}.linear_q"), sm.c_s, hc);
    t.linear(&format!("{p}.linear_kv"), sm.c_s, 2 * hc);
    t.linear(&format!("{p}.linear_q_points"), sm.c_s, sm.no_heads_ipa * sm.no_qk_points * 3);
    t.linear(
        &format!("{p}.linear_kv_points"),
        sm.c_s,
        sm.no_heads_ipa * (sm.no_qk_points + sm.no_v_points) * 3,
    );
    t.linear_no_bias(&format!("{p}.linear_b"), sm.c_z, sm.no_heads_ipa);
    t.tensor(format!("{p}.head_weights"), vec![sm.no_heads_ipa]);
    let concat_dim = sm.no_heads_ipa * (sm.c_z + sm.c_ipa + sm.no_v_points * 4);
    t.linear(&format!("{p}.linear_out"), concat_dim, sm.c_s);

    t.layer_norm(&format!("{prefix}.layer_norm_ipa"), sm.c_s);

    for i in 0..sm.no_transition_layers {
        let p = format!("{prefix}.transition.layers.{i}");
        t.linear(&format!("{p}.linear_1"), sm.c_s, sm.c_s);
        t.linear(&format!("{p}.linear_2"), sm.c_s, sm.c_s);
        t.linear(&format!("{p}.linear_3"), sm.c_s, sm.c_s);
    }
    t.layer_norm(&format!("{prefix}.transition.layer_norm"), sm.c_s);

    t.linear(&format!("{prefix}.bb_update.linear"), sm.c_s, 6);

    t.linear(&format!("{prefix}.angle_resnet.linear_in"), sm.c_s, sm.c_resnet);
    t.linear(&format!("{prefix}.angle_resnet.linear_initial"), sm.c_s, sm.c_resnet);
    for i in 0..sm.no_resnet_blocks {
        let p = format!("{prefix}.angle_resnet.layers.{i}");
        t.linear(&format!("{p}.linear_1"), sm.c_resnet, sm.c_resnet);
        t.linear(&format!("{p}.linear_2"), sm.c_resnet, sm.c_resnet);
    }
    t.linear(&format!("{prefix}.angle_resnet.linear_out"), sm.c_resnet, sm.no_angles * 2);
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn tiny_config(num_blocks: usize) -> EsmFoldConfig {
        EsmFoldConfig {
            esm_type: "esm2_8M".to_string(),
            fp16_esm: false,
            use_esm_attn_map: false,
            trunk: FoldingTrunkConfig {
                num_blocks,
                sequence_state_dim: 8,
                pairwise_state_dim: 8,
                sequence_head_width: 4,
                pairwise_head_width: 4,
                position_bins: 2,
                max_recycles: 1,
                chunk_size: None,
                structure_module: StructureModuleConfig {
                    c_s: 8,
                    c_z: 4,
                    c_ipa: 4,
                    c_resnet: 4,
                    no_heads_ipa: 2,
                    no_qk_points: 2,
                    no_v_points: 2,
                    no_blocks: 1,
                    no_transition_layers: 1,
                    no_resnet_blocks: 1,
                    no_angles: 7,
                    trans_scale_factor: 10,
                },
            },
            lddt_head_hid_dim: 4,
        }
    }

    #[test]
    fn param_table_covers_every_component() {
        let model = EsmFold::try_from(tiny_config(1)).unwrap();

        assert_eq!(model.param_shape("embedding.weight"), Some(&[23, 8][..]));
        assert_eq!(model.param_shape("esm_s_combine"), Some(&[7][..]));
        assert_eq!(model.param_shape("esm_s_mlp.1.weight"), Some(&[8, 320][..]));
        assert_eq!(model.param_shape("esm.embed_tokens.weight"), Some(&[33, 320][..]));
        assert_eq!(
            model.param_shape("trunk.blocks.0.seq_attention.proj.weight"),
            Some(&[24, 8][..])
        );
        assert_eq!(
            model.param_shape("trunk.structure_module.bb_update.linear.weight"),
            Some(&[6, 8][..])
        );
        assert_eq!(model.param_shape("distogram_head.weight"), Some(&[64, 8][..]));
        assert_eq!(model.param_shape("lddt_head.3.weight"), Some(&[37 * 50, 4][..]));
    }

    #[test]
    fn param_table_follows_the_configuration() {
        let one = EsmFold::try_from(tiny_config(1)).unwrap();
        let two = EsmFold::try_from(tiny_config(2)).unwrap();

        assert!(one.param_shape("trunk.blocks.0.layernorm_1.weight").is_some());
        assert!(one.param_shape("trunk.blocks.1.layernorm_1.weight").is_none());
        assert!(two.param_shape("trunk.blocks.1.layernorm_1.weight").is_some());
        assert!(two.num_params() > one.num_params());
    }

    #[test]
    fn unknown_language_model_is_rejected() {
        let mut config = tiny_config(1);
        config.esm_type = "esm1v".to_string();
        assert!(EsmFold::try_from(config).is_err());
    }

    #[test]
    fn permissive_load_ignores_unknown_keys() {
        let mut model = EsmFold::try_from(tiny_config(1)).unwrap();
        let device = Device::Cpu;
        let mut state = HashMap::new();
        state.insert(
            "embedding.weight".to_string(),
            Tensor::zeros((23, 8), DType::F32, &device).unwrap(),
        );
        state.insert(
            "something.else".to_string(),
            Tensor::zeros(4, DType::F32, &device).unwrap(),
        );

        model.load_state_dict(state, false).unwrap();
        assert_eq!(model.num_loaded(), 1);
        assert!(model.tensor("embedding.weight").is_some());
    }

    #[test]
    fn strict_load_rejects_unknown_keys() {
        let mut model = EsmFold::try_from(tiny_config(1)).unwrap();
        let mut state = HashMap::new();
        state.insert(
            "something.else".to_string(),
            Tensor::zeros(4, DType::F32, &Device::Cpu).unwrap(),
        );
        let err = model.load_state_dict(state, true).unwrap_err();
        assert!(err.to_string().contains("Unexpected keys"));
    }

    #[test]
    fn shape_mismatch_is_fatal() {
        let mut model = EsmFold::try_from(tiny_config(1)).unwrap();
        let mut state = HashMap::new();
        state.insert(
            "embedding.weight".to_string(),
            Tensor::zeros((23, 4), DType::F32, &Device::Cpu).unwrap(),
        );
        let err = model.load_state_dict(state, false).unwrap_err();
        assert!(err.to_string().contains("embedding.weight"));
        assert!(err.to_string().contains("Shape mismatch"));
    }
}
