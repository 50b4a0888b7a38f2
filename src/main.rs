//! xyml CLI
//!
//! Usage:
//!   xyml [OPTIONS] <FILE>
//!
//! Options:
//!   -o, --output <FILE>    Write resolved YAML to a file instead of stdout
//!   -i, --include <DIR>    Additional include directory (repeatable)
//!   -p, --param <KEY=VAL>  Parameter reachable as {{xyml.param.KEY}} (repeatable)
//!   --soft                 Leave unresolved references in place
//!   -h, --help             Print help

use std::path::PathBuf;

use clap::Parser;

use xyml::{ResolveConfig, XymlDocument};

#[derive(Parser)]
#[command(name = "xyml")]
#[command(about = "Resolve extended YAML documents to plain YAML")]
struct Cli {
    /// Input file (extension may be omitted; .yaml/.yml/.xyml are probed)
    input: PathBuf,

    /// Output file (writes to stdout if not provided)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Additional include directory, searched after the document's own
    #[arg(short, long = "include")]
    include: Vec<PathBuf>,

    /// Parameter as KEY=VALUE, reachable as {{xyml.param.KEY}}
    #[arg(short, long = "param")]
    param: Vec<String>,

    /// Leave unresolved references in place instead of failing
    #[arg(long)]
    soft: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = ResolveConfig::new();
    for dir in cli.include {
        config = config.with_include_dir(dir);
    }
    for param in cli.param {
        match param.split_once('=') {
            Some((key, value)) => {
                config = config.with_param(key, value);
            }
            None => {
                eprintln!("Error: parameter '{}' is not of the form KEY=VALUE", param);
                std::process::exit(1);
            }
        }
    }
    if cli.soft {
        config = config.soft();
    }

    let document = match XymlDocument::load(&cli.input, &config) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match cli.output {
        Some(path) => {
            if let Err(e) = document.save(&path) {
                eprintln!("Error writing '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        }
        None => match document.to_yaml() {
            Ok(yaml) => print!("{}", yaml),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
    }
}
