//! Deeper CNN with batch normalization
//!
//! Architecture:
//! - 4 convolutional blocks with increasing filter sizes
//! - BatchNorm and ReLU after each convolution
//! - MaxPooling after each block
//! - Global Average Pooling
//! - Two-layer classifier with dropout

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::model::ImageClassifier;

const BASE_FILTERS: usize = 32;
const HIDDEN: usize = 256;
const DROPOUT: f64 = 0.3;

/// A CNN block with Conv2d, BatchNorm, ReLU and MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
    pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct ConvNet<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    global_pool: AdaptiveAvgPool2d,
    fc1: Linear<B>,
    relu: Relu,
    dropout: Dropout,
    fc2: Linear<B>,
}

impl<B: Backend> ConvNet<B> {
    pub fn new(in_channels: usize, num_classes: usize, device: &B::Device) -> Self {
        // in -> 32 -> 64 -> 128 -> 256, halving the spatial size each block
        let widths = [
            in_channels,
            BASE_FILTERS,
            BASE_FILTERS * 2,
            BASE_FILTERS * 4,
            BASE_FILTERS * 8,
        ];
        let blocks = widths
            .windows(2)
            .map(|w| ConvBlock::new(w[0], w[1], device))
            .collect();

        Self {
            blocks,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(BASE_FILTERS * 8, HIDDEN).init(device),
            relu: Relu::new(),
            dropout: DropoutConfig::new(DROPOUT).init(),
            fc2: LinearConfig::new(HIDDEN, num_classes).init(device),
        }
    }
}

impl<B: Backend> ImageClassifier<B> for ConvNet<B> {
    fn build(in_channels: usize, num_classes: usize, device: &B::Device) -> Self {
        Self::new(in_channels, num_classes, device)
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));

        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.relu.forward(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = ConvNet::<TestBackend>::new(3, 4, &device);
        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [2, 4]);
    }

    #[test]
    fn test_has_four_blocks() {
        let device = Default::default();
        let model = ConvNet::<TestBackend>::build(1, 10, &device);
        assert_eq!(model.blocks.len(), 4);
    }
}
