use crate::reports;
use clap::Args;
use prefixforge::oracle::Oracle;
use std::process;
use std::sync::Arc;
use tracing::error;

#[derive(Args, Debug, Clone)]
pub struct ClassifyArgs {
    /// Text to classify as-is, no template applied.
    pub text: String,
}

pub fn run(args: ClassifyArgs, oracle: Arc<Oracle>) {
    match oracle.classify(&args.text) {
        Ok(verdict) => {
            reports::print_verdict("Classification", &verdict, oracle.benign_label());
        }
        Err(e) => {
            error!("❌ Classification failed: {}", e);
            process::exit(1);
        }
    }
}
