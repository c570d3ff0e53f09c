//! CNN Model Architecture for Plant Disease Classification
//!
//! A stack of convolutional blocks followed by global average pooling and a
//! two-layer classifier head. The number of blocks, filter widths and output
//! classes come from the artifact manifest, so one definition serves every
//! exported model.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{activation, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

/// Configuration for the PlantClassifier CNN model
#[derive(Config, Debug, PartialEq)]
pub struct PlantClassifierConfig {
    /// Number of output classes
    #[config(default = "38")]
    pub num_classes: usize,

    /// Input image size (square)
    #[config(default = "224")]
    pub input_size: usize,

    /// Dropout rate for the classifier head (inactive at inference)
    #[config(default = "0.3")]
    pub dropout_rate: f64,

    /// Number of input channels (3 for RGB, 1 for grayscale)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters of the first block; doubled by each following block
    #[config(default = "32")]
    pub base_filters: usize,

    /// Number of conv blocks, each halving the spatial size
    #[config(default = "4")]
    pub depth: usize,

    /// Width of the hidden fully connected layer
    #[config(default = "256")]
    pub hidden_units: usize,
}

impl PlantClassifierConfig {
    /// Channels produced by the last conv block
    pub fn feature_channels(&self) -> usize {
        self.base_filters << self.depth.saturating_sub(1)
    }

    /// Initialize a model with fresh weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> PlantClassifier<B> {
        PlantClassifier::new(self, device)
    }
}

/// How raw logits are turned into scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputHead {
    /// Mutually exclusive classes, scores sum to 1
    #[default]
    Softmax,
    /// Independent labels, each score in [0, 1]
    Sigmoid,
}

impl OutputHead {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputHead::Softmax => "softmax",
            OutputHead::Sigmoid => "sigmoid",
        }
    }
}

/// A CNN block with Conv2d, BatchNorm, ReLU, and optional MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: Option<MaxPool2d>,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new convolutional block
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        with_pool: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);

        let pool = if with_pool {
            Some(MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init())
        } else {
            None
        };

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    /// Forward pass through the block
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);

        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }
}

/// Plant Disease Classifier CNN
///
/// Architecture:
/// - `depth` convolutional blocks, filters doubling per block
/// - BatchNorm, ReLU and 2x2 MaxPool in each block
/// - Global Average Pooling
/// - Fully connected classifier with dropout
#[derive(Module, Debug)]
pub struct PlantClassifier<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> PlantClassifier<B> {
    /// Create a new PlantClassifier from configuration
    pub fn new(config: &PlantClassifierConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(config.depth);
        let mut in_channels = config.in_channels;
        let mut out_channels = config.base_filters;

        for _ in 0..config.depth {
            blocks.push(ConvBlock::new(in_channels, out_channels, 3, true, device));
            in_channels = out_channels;
            out_channels *= 2;
        }

        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc1 = LinearConfig::new(config.feature_channels(), config.hidden_units).init(device);
        let dropout = DropoutConfig::new(config.dropout_rate).init();
        let fc2 = LinearConfig::new(config.hidden_units, config.num_classes).init(device);

        Self {
            blocks,
            global_pool,
            fc1,
            dropout,
            fc2,
            num_classes: config.num_classes,
        }
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, channels, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        for block in &self.blocks {
            x = block.forward(x);
        }

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Forward pass followed by the configured output activation
    pub fn forward_scores(&self, x: Tensor<B, 4>, head: OutputHead) -> Tensor<B, 2> {
        let logits = self.forward(x);
        match head {
            OutputHead::Softmax => activation::softmax(logits, 1),
            OutputHead::Sigmoid => activation::sigmoid(logits),
        }
    }

    /// Get the number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
