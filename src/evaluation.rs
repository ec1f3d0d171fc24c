use crate::{
    cli::AppArgs,
    mnist::{MnistBatcher, MnistDataset},
    model::{LeNet, LeNetConfig},
    training::{self, TrainState, TrainingConfig},
};
use burn::data::dataloader::DataLoaderBuilder;
use burn::prelude::*;

/// Full pass over the held-out split with the trained model.
///
/// Prints the evaluation report: trained step count, averaged loss, and
/// averaged accuracy.
pub fn evaluate<B: Backend>(
    training_config: TrainingConfig,
    model_config: LeNetConfig,
    device: B::Device,
    app_args: &AppArgs,
) {
    let model: LeNet<B> = app_args
        .load_model(&model_config, &device)
        .expect("Trained model should exist in the artifacts directory; run --training first");
    let train_state = app_args.load_train_state().unwrap_or_else(TrainState::new);

    let dataloader_valid = DataLoaderBuilder::new(MnistBatcher::default())
        .batch_size(training_config.batch_size)
        .num_workers(training_config.num_workers)
        .build(MnistDataset::test());

    println!(
        "evaluating over {} held-out images...",
        dataloader_valid.num_items()
    );
    let (loss, acc) = training::validate::<B>(dataloader_valid, model, &training_config, 1, None);

    println!(
        "Evaluation after {} steps: Avg Loss {loss:.4}, Avg Acc: {acc}",
        train_state.step,
    );
}
