//! Baseline CNN
//!
//! Three unpadded convolutions (7x7, 3x3, 3x3) with max pooling, dropout,
//! global average pooling and a single linear head.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::model::ImageClassifier;

#[derive(Module, Debug)]
pub struct BaseModel<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    pool: MaxPool2d,
    relu: Relu,
    dropout: Dropout,
    global_pool: AdaptiveAvgPool2d,
    fc: Linear<B>,
}

impl<B: Backend> BaseModel<B> {
    pub fn new(in_channels: usize, num_classes: usize, device: &B::Device) -> Self {
        Self {
            conv1: Conv2dConfig::new([in_channels, 32], [7, 7]).init(device),
            conv2: Conv2dConfig::new([32, 64], [3, 3]).init(device),
            conv3: Conv2dConfig::new([64, 128], [3, 3]).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            relu: Relu::new(),
            dropout: DropoutConfig::new(0.25).init(),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(128, num_classes).init(device),
        }
    }
}

impl<B: Backend> ImageClassifier<B> for BaseModel<B> {
    fn build(in_channels: usize, num_classes: usize, device: &B::Device) -> Self {
        Self::new(in_channels, num_classes, device)
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.conv1.forward(x));

        let x = self.relu.forward(self.conv2.forward(x));
        let x = self.pool.forward(x);

        let x = self.relu.forward(self.conv3.forward(x));
        let x = self.pool.forward(x);
        let x = self.dropout.forward(x);

        // [B, C, H, W] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.fc.forward(x)
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
        let model = BaseModel::<TestBackend>::new(3, 5, &device);
        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 28, 28], &device);
        assert_eq!(model.forward(input).dims(), [2, 5]);
    }

    #[test]
    fn test_single_channel_input() {
        let device = Default::default();
        let model = BaseModel::<TestBackend>::build(1, 10, &device);
        let input = Tensor::<TestBackend, 4>::zeros([1, 1, 16, 16], &device);
        assert_eq!(model.forward(input).dims(), [1, 10]);
    }
}
