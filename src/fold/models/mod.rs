pub mod core;
pub mod esmfold;
pub mod pretrained;
pub mod utils;
