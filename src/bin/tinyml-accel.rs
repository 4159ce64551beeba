use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use tinyml_accel::config::Config;
use tinyml_accel::error::AccelError;
use tinyml_accel::graph::builder::JsonModel;
use tinyml_accel::memory_image::MemoryImage;
use tinyml_accel::simulator::Simulator;
use tinyml_accel::Compiler;

#[derive(Parser)]
#[command(name = "tinyml-accel")]
#[command(about = "Compiler and golden model for a tiny quantized matrix-vector accelerator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a JSON graph description into a memory image.
    Build {
        /// Path to the JSON model description.
        #[arg(long)]
        model: PathBuf,
        /// Path to write the ASCII-hex memory image to.
        #[arg(long)]
        out: PathBuf,
        /// Optional Config override (JSON); defaults to `Config::reference`.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run a compiled memory image against an input activation.
    Run {
        /// Path to a previously built hex memory image.
        #[arg(long)]
        image: PathBuf,
        /// Path to the raw quantized int8 input bytes.
        #[arg(long)]
        input: PathBuf,
        /// Optional Config override (JSON); defaults to `Config::reference`.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<AccelError>() {
        Some(AccelError::InvalidGraph(_) | AccelError::UnsupportedGraph(_)) => 2,
        Some(AccelError::UnknownOpcode(_)) => 3,
        Some(AccelError::ImageOverflow { .. } | AccelError::PaddingViolation { .. }) => 4,
        _ => 1,
    }
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config from {}", path.display()))?;
            let config: Config = serde_json::from_str(&text)
                .with_context(|| format!("parsing config from {}", path.display()))?;
            config.validate()?;
            Ok(config)
        }
        None => Ok(Config::reference()),
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build { model, out, config } => build(&model, &out, &config),
        Command::Run { image, input, config } => execute(&image, &input, &config),
    }
}

fn build(model_path: &PathBuf, out_path: &PathBuf, config_path: &Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let text = std::fs::read_to_string(model_path)
        .with_context(|| format!("reading model from {}", model_path.display()))?;
    let json: JsonModel = serde_json::from_str(&text)
        .with_context(|| format!("parsing model from {}", model_path.display()))?;
    let graph = json.into_graph()?;

    let compiled = Compiler::compile(&graph, &config)?;
    compiled.image.write_hex_file(out_path)?;
    info!(out = %out_path.display(), instructions = compiled.schedule.instructions.len(), "wrote memory image");
    Ok(())
}

fn execute(image_path: &PathBuf, input_path: &PathBuf, config_path: &Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let hex = std::fs::read_to_string(image_path)
        .with_context(|| format!("reading image from {}", image_path.display()))?;
    let mut image = MemoryImage::from_hex_str(config, &hex)?;

    let raw = std::fs::read(input_path)
        .with_context(|| format!("reading input from {}", input_path.display()))?;
    let input: Vec<i8> = raw.iter().map(|&b| b as i8).collect();
    image.write_input(&input)?;

    let mut sim = Simulator::new(config);
    let output = sim.run(&image)?;

    let decimal: Vec<String> = output.iter().map(i8::to_string).collect();
    let hex: Vec<String> = output.iter().map(|&b| format!("{:02X}", b as u8)).collect();
    println!("{}", decimal.join(" "));
    println!("{}", hex.join(" "));
    Ok(())
}
