use crate::mnist::{HEIGHT, WIDTH};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::*;
use burn::train::ClassificationOutput;

pub trait ModelConfigExt<B: Backend>: Config {
    type Model: Module<B>;
    fn init(&self, device: &B::Device) -> Self::Model;
}

/// LeNet-style digit classifier: two same-padded convolutions with 2x2 max
/// pooling in between, a wide dense layer with dropout, and a logits head.
///
/// With the default configuration the checkpoint stores ~3.2M parameters and
/// reaches ~99% test accuracy after the full step budget.
#[derive(Config, Debug)]
pub struct LeNetConfig {
    /// The output is a 10-bins classification, one per digit.
    #[config(default = 10)]
    pub num_classes: usize,

    #[config(default = 32)]
    pub conv1_filters: usize,
    #[config(default = 64)]
    pub conv2_filters: usize,

    /// Square kernel side for both convolutions, applied with same padding.
    #[config(default = 5)]
    pub kernel_size: usize,

    #[config(default = 1024)]
    pub hidden_size: usize,

    /// Fraction of dense activations dropped while training.
    #[config(default = 0.4)]
    pub dropout: f64,
}

#[derive(Module, Debug)]
pub struct LeNet<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub pool: MaxPool2d,
    pub dense1: Linear<B>,
    pub dense2: Linear<B>,
    pub dropout: Dropout,
    pub activation: Relu,
}

impl<B: Backend> ModelConfigExt<B> for LeNetConfig {
    type Model = LeNet<B>;

    /// Returns the initialized model.
    fn init(&self, device: &B::Device) -> Self::Model {
        let kernel = [self.kernel_size, self.kernel_size];
        let conv1 = Conv2dConfig::new([1, self.conv1_filters], kernel)
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let conv2 = Conv2dConfig::new([self.conv1_filters, self.conv2_filters], kernel)
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        // both poolings halve the spatial dims; same padding keeps them otherwise
        let flat_size = self.conv2_filters * (HEIGHT / 4) * (WIDTH / 4);
        let dense1 = LinearConfig::new(flat_size, self.hidden_size).init(device);
        let dense2 = LinearConfig::new(self.hidden_size, self.num_classes).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();

        LeNet {
            conv1,
            conv2,
            pool,
            dense1,
            dense2,
            dropout,
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> LeNet<B> {
    /// # Shapes
    ///   - Input [batch_size, 1, HEIGHT, WIDTH]
    ///   - Output [batch_size, num_classes] (logits)
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, channels, height, width] = images.dims();
        assert_eq!([channels, height, width], [1, HEIGHT, WIDTH]);

        let x = self.activation.forward(self.conv1.forward(images));
        let x = self.pool.forward(x);
        let x = self.activation.forward(self.conv2.forward(x));
        let x = self.pool.forward(x);

        let [_batch_size, filters, height, width] = x.dims();
        assert_eq!([height, width], [HEIGHT / 4, WIDTH / 4]);
        let x = x.reshape([batch_size, filters * height * width]);

        let x = self.activation.forward(self.dense1.forward(x));
        let x = self.dropout.forward(x);
        self.dense2.forward(x)
    }

    /// Forward pass plus the softmax cross-entropy loss against the targets.
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let [batch_size, _channels, _height, _width] = images.dims();
        assert_eq!([batch_size], targets.dims());

        let logits = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), targets.clone());

        ClassificationOutput::new(loss, logits, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn default_config() {
        let config = LeNetConfig::new();
        assert_eq!(config.num_classes, 10);
        assert_eq!(config.conv1_filters, 32);
        assert_eq!(config.conv2_filters, 64);
        assert_eq!(config.kernel_size, 5);
        assert_eq!(config.hidden_size, 1024);
        assert_eq!(config.dropout, 0.4);
    }

    #[test]
    fn logits_shape() {
        let device = Default::default();
        let model: LeNet<TestBackend> = LeNetConfig::new().init(&device);

        let images = Tensor::<TestBackend, 4>::zeros([2, 1, HEIGHT, WIDTH], &device);
        let logits = model.forward(images);

        assert_eq!([2, 10], logits.dims());
    }

    #[test]
    fn classification_output_shapes() {
        let device = Default::default();
        let model: LeNet<TestBackend> = LeNetConfig::new().init(&device);

        let images = Tensor::<TestBackend, 4>::zeros([2, 1, HEIGHT, WIDTH], &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_data([3, 7], &device);
        let output = model.forward_classification(images, targets);

        assert_eq!([2, 10], output.output.dims());
        assert_eq!([2], output.targets.dims());
        assert_eq!([1], output.loss.dims());
    }

    #[test]
    fn smaller_networks_keep_the_logit_count() {
        let device = Default::default();
        let config = LeNetConfig::new()
            .with_conv1_filters(4)
            .with_conv2_filters(8)
            .with_hidden_size(16);
        let model: LeNet<TestBackend> = config.init(&device);

        let images = Tensor::<TestBackend, 4>::zeros([1, 1, HEIGHT, WIDTH], &device);
        assert_eq!([1, 10], model.forward(images).dims());
    }
}
