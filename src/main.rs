use std::env;
use std::path::PathBuf;
use std::process::exit;

use dotenv::dotenv;
use log::{error, info};

use esmfold_loader::config::CHECKPOINT_DIR;
use esmfold_loader::fold::models::pretrained::load_pretrained;
use esmfold_loader::logging::logger::init_logging;

fn main() {
    let _ = dotenv();
    let _ = init_logging();

    let Some(argument) = env::args().nth(1) else {
        error!("Usage: esmfold_loader <checkpoint_path>");
        exit(2);
    };

    // bare checkpoint names are resolved against the checkpoint directory
    let mut path = PathBuf::from(&argument);
    if !path.exists() {
        path = PathBuf::from(CHECKPOINT_DIR.as_str()).join(&argument);
    }

    match load_pretrained(&path) {
        Ok(model) => {
            let pending = model.num_params() - model.num_loaded();
            if pending > 0 {
                info!("{} language model parameters await a separate load.", pending);
            }
        }
        Err(e) => {
            error!("Unable to load checkpoint: {:#}", e);
            exit(1);
        }
    }
}
