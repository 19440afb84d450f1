use std::env;
use once_cell::sync::Lazy;

pub static CHECKPOINT_DIR: Lazy<String> = Lazy::new(|| env::var("ESMFOLD_CHECKPOINT_DIR").unwrap_or("./resources".to_string()));
