pub mod config;
pub mod fold;
pub mod logging;

pub use fold::errors::CheckpointError;
pub use fold::models::core::config::{CheckpointCfg, EsmFoldConfig, ModelVariant};
pub use fold::models::esmfold::EsmFold;
pub use fold::models::pretrained::{esmfold_v0, esmfold_v1, load_model, load_pretrained};
pub use fold::traits::state_dict::StateDict;
