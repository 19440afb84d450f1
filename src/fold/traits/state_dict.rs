use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use candle_core::Tensor;

/// Models that expose their parameter set as a flat name → tensor mapping.
pub trait StateDict {
    fn param_names(&self) -> BTreeSet<String>;
    fn load_state_dict(&mut self, state: HashMap<String, Tensor>, strict: bool) -> Result<()>;
}
