use crate::backend::Element;
use crate::{
    cli::AppArgs,
    mnist::{MnistBatch, MnistBatcher, MnistDataset},
    model::{LeNet, LeNetConfig},
};
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn_dataset::Dataset;

/// Classify a handful of held-out digits with the trained model.
///
/// Prints the predicted digit and its softmax probability next to the
/// expected label.
pub fn infer<B: Backend>(
    model_config: LeNetConfig,
    num_samples: usize,
    device: B::Device,
    app_args: &AppArgs,
) {
    let model: LeNet<B> = app_args
        .load_model(&model_config, &device)
        .expect("Trained model should exist in the artifacts directory; run --training first");

    let dataset = MnistDataset::test();
    let items: Vec<_> = dataset.iter().take(num_samples).collect();
    let expected: Vec<u8> = items.iter().map(|item| item.label).collect();

    let batcher = MnistBatcher::default();
    // Put all items in one batch
    let batch: MnistBatch<B> = batcher.batch(items, &device);

    let logits = model.forward(batch.images);
    assert_eq!([expected.len(), model_config.num_classes], logits.dims());

    let probabilities = softmax(logits, 1);
    let (confidences, classes) = probabilities.max_dim_with_indices(1);
    assert_eq!([expected.len(), 1], confidences.dims());

    // Display the predicted vs expected labels
    println!("predicted (confidence) / expected:");
    for (i, expected) in expected.iter().enumerate() {
        let predicted = classes
            .clone()
            .narrow(0, i, 1)
            .float()
            .into_data()
            .to_vec::<Element>()
            .unwrap()[0];
        let confidence = confidences
            .clone()
            .narrow(0, i, 1)
            .into_data()
            .to_vec::<Element>()
            .unwrap()[0];
        println!(
            "- {:.0} ({:05.2}%) / {expected}",
            f32::from(predicted),
            100.0 * f32::from(confidence),
        );
    }
}
