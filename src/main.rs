// ===== prefixforge/src/main.rs =====
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use prefixforge::config::Config;
use prefixforge::oracle::{LinearProbe, Oracle};
use prefixforge::tokenizer::VocabTokenizer;
use prefixforge::wordbank::{InMemoryWordBank, WordBank};
use std::process;
use std::sync::Arc;
use tracing::{error, info};

mod cmd;
mod reports;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(global = true, short, long, default_value = "data/model.json")]
    model: String,

    /// CSV word-performance store; omitted = in-memory defaults only.
    #[arg(global = true, short, long)]
    words: Option<String>,

    /// JSON parameter file; explicit CLI flags still win.
    #[arg(global = true, long)]
    params: Option<String>,

    #[arg(global = true, long, default_value = "benign")]
    benign_label: String,

    #[arg(global = true, long, default_value = "malicious")]
    malicious_label: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Attack(cmd::attack::AttackArgs),
    Classify(cmd::classify::ClassifyArgs),
}

fn main() {
    tracing_subscriber::fmt::init();

    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    info!("🚀 Initializing PrefixForge...");

    info!("📂 Loading Model: {}", cli.model);
    let probe = LinearProbe::load_from_file(&cli.model).unwrap_or_else(|e| {
        error!("❌ FATAL ERROR LOADING MODEL:\n   {}", e);
        process::exit(1);
    });

    let tokenizer = Arc::new(VocabTokenizer::new(&probe.vocab));
    let oracle = Arc::new(Oracle::new(
        Arc::new(probe),
        tokenizer.clone(),
        &cli.benign_label,
        &cli.malicious_label,
    ));

    let bank: Arc<dyn WordBank> = match &cli.words {
        Some(path) => {
            info!("⚖️  Loading word bank from: {}", path);
            match InMemoryWordBank::load_csv(path, tokenizer.as_ref()) {
                Ok(b) => Arc::new(b),
                Err(e) => {
                    error!("❌ FATAL ERROR LOADING WORD BANK:\n   {}", e);
                    process::exit(1);
                }
            }
        }
        None => Arc::new(InMemoryWordBank::with_defaults(tokenizer.as_ref())),
    };

    match cli.command {
        Commands::Attack(mut args) => {
            // Resolve the parameter file first, then overlay explicit CLI
            // flags. The subcommand's matches carry the flag provenance.
            if let Some(path) = &cli.params {
                info!("⚖️  Loading parameters from: {}", path);
                let sub_matches = matches
                    .subcommand_matches("attack")
                    .expect("attack subcommand matched");
                let mut file_config = Config::load_from_file(path).unwrap_or_else(|e| {
                    error!("❌ FATAL ERROR LOADING PARAMETERS:\n   {}", e);
                    process::exit(1);
                });
                file_config.merge_from_cli(&args.config, sub_matches);
                args.config = file_config;
            }

            if let Err(e) = args.config.validate() {
                error!("❌ INVALID CONFIGURATION:\n   {}", e);
                process::exit(1);
            }

            cmd::attack::run(args, oracle, tokenizer, bank);
        }
        Commands::Classify(args) => cmd::classify::run(args, oracle),
    }
}
