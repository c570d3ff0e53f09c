//! Write a freshly initialized model artifact
//!
//! Produces `model.json` + `weights.mpk` with random weights so a deployment
//! can be smoke-tested before a trained model is exported.
//!
//! Usage:
//!   cargo run --release --bin init-model -- --output-dir model \
//!     --labels apple_scab,apple_healthy

use std::path::PathBuf;

use clap::Parser;

use plantvillage_serve::model::{
    ModelArtifact, OutputHead, PlantClassifierConfig, PreprocessingConfig, ResizePolicy,
};

#[derive(Parser, Debug)]
#[command(name = "init-model")]
#[command(about = "Write a randomly initialized PlantVillage model artifact")]
struct Args {
    /// Directory to write the artifact into
    #[arg(short, long, default_value = "model")]
    output_dir: PathBuf,

    /// Model name reported by the API
    #[arg(short, long, default_value = "plantvillage-apple")]
    name: String,

    /// Comma-separated class labels, in output order
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_value = "apple_black_rot,apple_cedar_rust,apple_healthy,apple_scab"
    )]
    labels: Vec<String>,

    /// Square input size of the network
    #[arg(long, default_value = "224")]
    input_size: usize,

    /// Shorter image side after resizing, before the center crop
    #[arg(long, default_value = "256")]
    resize: u32,

    /// Number of convolutional blocks
    #[arg(long, default_value = "4")]
    depth: usize,

    /// Use independent sigmoid scores instead of softmax
    #[arg(long, default_value = "false")]
    sigmoid: bool,

    /// Stretch uploads to the input size instead of resizing and center-cropping
    #[arg(long, default_value = "false")]
    stretch: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let architecture = PlantClassifierConfig::new()
        .with_num_classes(args.labels.len())
        .with_input_size(args.input_size)
        .with_depth(args.depth);
    let head = if args.sigmoid {
        OutputHead::Sigmoid
    } else {
        OutputHead::Softmax
    };

    let mut preprocessing = PreprocessingConfig::imagenet(args.resize);
    if args.stretch {
        preprocessing.policy = ResizePolicy::Stretch;
    }

    let manifest_path = ModelArtifact::new(args.name, architecture, args.labels, preprocessing)
    .with_head(head)
    .create(&args.output_dir)?;

    println!("Model artifact written to {:?}", manifest_path);
    println!("Start the server with: plantvillage-serve --model-path {}", manifest_path.display());

    Ok(())
}
