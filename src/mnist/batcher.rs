use super::dataset::{HEIGHT, MnistItem, WIDTH};
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

#[derive(Clone, Default)]
pub struct MnistBatcher {}

/// A batch of digit images laid out for the convolutional network.
#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    /// The input feature is the brightness, z-score normalized (mean=0.0, stddev=1.0).
    /// The original dataset had mean=0.1307, stddev=0.3081.
    ///
    /// The mappings are:
    ///
    /// * `z = (value / 255 - mean) / stddev`,
    /// * `value = (z * stddev + mean) * 255`.
    ///
    /// # Shape
    /// [batch_size, 1, HEIGHT, WIDTH]
    pub images: Tensor<B, 4>,
    /// # Shape
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, MnistItem, MnistBatch<B>> for MnistBatcher {
    fn batch(&self, items: Vec<MnistItem>, device: &B::Device) -> MnistBatch<B> {
        let (items_image, items_label): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|item| (item.image, item.label))
            .unzip();
        let images = items_image
            .into_iter()
            .map(|image| TensorData::new(image, [1, HEIGHT * WIDTH]).convert::<B::FloatElem>())
            .map(|data| Tensor::<B, 2>::from_data(data, device))
            // single-channel images, NCHW
            .map(|tensor: Tensor<B, 2>| tensor.reshape([1, 1, HEIGHT, WIDTH]))
            // Normalize: scale between [0,1] and make the mean=0 and std=1
            // values mean=0.1307,std=0.3081 are from the PyTorch MNIST example
            // https://github.com/pytorch/examples/blob/54f4572509891883a947411fd7239237dd2a39c3/mnist/main.py#L122
            .map(|tensor| ((tensor / 255) - 0.1307) / 0.3081)
            .collect();

        let targets = items_label
            .into_iter()
            .map(|label: u8| {
                Tensor::<B, 1, Int>::from_data([(label as i64).elem::<B::IntElem>()], device)
            })
            .collect();

        let images = Tensor::cat(images, 0);
        let targets = Tensor::cat(targets, 0);

        MnistBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn item(first_brightness: f32, label: u8) -> MnistItem {
        let mut image = vec![0.0; HEIGHT * WIDTH];
        image[0] = first_brightness;
        MnistItem { image, label }
    }

    #[test]
    fn batch_shapes() {
        let device = Default::default();
        let batch: MnistBatch<TestBackend> =
            MnistBatcher::default().batch(vec![item(0.0, 3), item(255.0, 7)], &device);

        assert_eq!([2, 1, HEIGHT, WIDTH], batch.images.dims());
        assert_eq!([2], batch.targets.dims());
        assert_eq!(
            batch.targets.into_data().to_vec::<i64>().unwrap(),
            vec![3, 7]
        );
    }

    #[test]
    fn batch_normalization_mapping() {
        let device = Default::default();
        let batch: MnistBatch<TestBackend> =
            MnistBatcher::default().batch(vec![item(0.0, 0), item(255.0, 9)], &device);

        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        // z = (value / 255 - 0.1307) / 0.3081
        let zero = (0.0 - 0.1307) / 0.3081;
        let full = (1.0 - 0.1307) / 0.3081;
        assert!((values[0] - zero).abs() < 1e-4);
        assert!((values[HEIGHT * WIDTH] - full).abs() < 1e-4);
    }
}
