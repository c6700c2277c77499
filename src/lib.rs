use std::io;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use mdbook::preprocess::{CmdPreprocessor, Preprocessor};

pub use attributes::{parse_image_attributes, ImageAttributes};
pub use compiler::{CompileError, D2Cli, DiagramCompiler};
pub use config::{ConfigError, D2Config};
pub use image::DiagramImage;
pub use paths::DocumentPaths;
pub use preprocessor::*;
pub use queue::{CompileFailure, CompileHandle, CompileJob, CompileQueue, CompileReport};
pub use transform::{Transformed, Transformer};

pub mod attributes;
pub mod compiler;
pub mod config;
pub mod image;
pub mod paths;
mod preprocessor;
pub mod queue;
pub mod transform;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a renderer is supported by this preprocessor
    Supports { renderer: String },
}

pub fn run_preprocessor<P: Preprocessor>(preprocessor: &P) {
    env_logger::init_from_env(Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"));

    let cli = Cli::parse();

    match cli.command {
        None => {
            if let Err(e) = handle_preprocessing(preprocessor) {
                log::error!("{e:#}");
                process::exit(1);
            }
        }
        Some(Commands::Supports { renderer }) => {
            // Signal whether the renderer is supported by exiting with 1 or 0.
            if preprocessor.supports_renderer(&renderer) {
                process::exit(0);
            } else {
                process::exit(1);
            }
        }
    }
}

fn handle_preprocessing<P: Preprocessor>(pre: &P) -> Result<()> {
    let (ctx, book) = CmdPreprocessor::parse_input(io::stdin())?;

    if ctx.mdbook_version != mdbook::MDBOOK_VERSION {
        log::warn!(
            "The {} plugin was built against version {} of mdbook, \
             but we're being called from version {}",
            pre.name(),
            mdbook::MDBOOK_VERSION,
            ctx.mdbook_version
        );
    }

    let processed_book = pre.run(&ctx, book)?;
    serde_json::to_writer(io::stdout(), &processed_book)?;

    Ok(())
}
