use crate::{
    cli::AppArgs,
    mnist::{MnistBatch, MnistBatcher, MnistDataset},
    model::{LeNet, LeNetConfig},
};
use burn::prelude::*;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder, Progress},
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer, SgdConfig},
    tensor::backend::AutodiffBackend,
    train::metric::{Adaptor, Metric, MetricMetadata, Numeric},
};

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub optimizer: SgdConfig,
    /// Total number of optimization steps, counted across resumed runs.
    #[config(default = 20_000)]
    pub num_steps: usize,
    #[config(default = 100)]
    pub batch_size: usize,
    #[config(default = 2)]
    pub num_workers: usize,
    #[config(default = 1e-3)]
    pub lr: f64,
    #[config(default = 0)]
    pub seed: u64,
    /// Steps between checkpoints (and the short mid-training validations).
    #[config(default = 100)]
    pub checkpoint_interval: usize,
}

/// Training progress that survives restarts.
///
/// Persisted next to the configs so an interrupted run resumes at the
/// recorded step and evaluation can report how far the model was trained.
#[derive(Config, Debug)]
pub struct TrainState {
    #[config(default = 0)]
    pub step: usize,
}

pub type Dataloader<B> = std::sync::Arc<dyn DataLoader<B, MnistBatch<B>> + 'static>;

pub fn train<AutoB: AutodiffBackend>(
    training_config: TrainingConfig,
    model_config: LeNetConfig,
    training_device: AutoB::Device,
    app_args: &AppArgs,
) {
    AutoB::seed(&training_device, training_config.seed);

    // load (or init and save) model, optim, and progress
    let mut model: LeNet<AutoB> = app_args.load_or_save_model(&model_config, &training_device);
    let mut optim = app_args.load_or_save_optim(&training_config.optimizer, &training_device);
    let mut train_state = app_args.load_train_state().unwrap_or_else(|| {
        let state = TrainState::new();
        app_args.save_train_state(&state);
        state
    });

    if train_state.step >= training_config.num_steps {
        println!(
            "model already trained for {} steps (budget: {})",
            train_state.step, training_config.num_steps
        );
        return;
    }

    // Create the batcher
    let batcher = MnistBatcher::default();

    // Create the dataloaders
    let dataloader_train = DataLoaderBuilder::new(batcher.clone())
        .batch_size(training_config.batch_size)
        .shuffle(training_config.seed)
        .num_workers(training_config.num_workers)
        .build(MnistDataset::train());
    let dataloader_valid = DataLoaderBuilder::new(batcher)
        .batch_size(training_config.batch_size)
        .num_workers(training_config.num_workers)
        .build(MnistDataset::test());

    let training_num_items = dataloader_train.num_items();
    let batches_per_epoch = training_num_items / training_config.batch_size + 1;

    let mut metric_meta = MetricMetadata {
        progress: Progress::new(0, training_num_items),
        epoch: train_state.step / batches_per_epoch + 1,
        epoch_total: training_config.num_steps / batches_per_epoch + 1,
        iteration: train_state.step,
        lr: Some(training_config.lr),
    };

    println!("running small initial validation...");
    validate::<AutoB::InnerBackend>(
        std::sync::Arc::clone(&dataloader_valid),
        model.valid(),
        &training_config,
        metric_meta.epoch,
        Some(10),
    );

    println!("Starting training...");
    let mut loss_metric = burn::train::metric::LossMetric::<AutoB>::new();
    let mut acc_metric = burn::train::metric::AccuracyMetric::<AutoB>::new();

    // Iterate until the step budget is exhausted, re-reading the training
    // split as many times as that takes
    'training: loop {
        for batch in dataloader_train.iter() {
            let [batch_size, _channels, _height, _width] = batch.images.dims();
            let targets = batch.targets;

            train_state.step += 1;
            metric_meta.iteration = train_state.step;
            metric_meta.progress.items_processed += batch_size;

            let pre_metrics = model.forward_classification(batch.images, targets);
            acc_metric.update(&pre_metrics.adapt(), &metric_meta);
            loss_metric.update(&pre_metrics.adapt(), &metric_meta);

            let loss = pre_metrics.loss.clone();
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(training_config.lr, model, grads);

            println!(
                "Epoch {}/{}, Step {:0>5}/{}, Loss {:.4}, Acc {:0>6.2}",
                metric_meta.epoch,
                metric_meta.epoch_total,
                train_state.step,
                training_config.num_steps,
                loss_metric.value().current(),
                acc_metric.value().current(),
            );

            if train_state.step % training_config.checkpoint_interval == 0 {
                // save assets
                app_args.save_model(&model);
                app_args.save_optim(&optim);
                app_args.save_train_state(&train_state);

                println!("running validation (batch iteration limit: 10)");
                validate::<AutoB::InnerBackend>(
                    std::sync::Arc::clone(&dataloader_valid),
                    model.valid(),
                    &training_config,
                    metric_meta.epoch,
                    Some(10),
                );
            }

            if train_state.step >= training_config.num_steps {
                break 'training;
            }
        }
        metric_meta.epoch += 1;
        metric_meta.progress.items_processed = 0;
    }

    // save assets
    app_args.save_model(&model);
    app_args.save_optim(&optim);
    app_args.save_train_state(&train_state);

    // Display the averaged training metrics
    println!(
        "Step {}/{}, Avg Loss {:.4}, Avg Acc: {}",
        train_state.step,
        training_config.num_steps,
        loss_metric.running_value().current(),
        acc_metric.running_value().current(),
    );

    println!("running full validation...");
    validate::<AutoB::InnerBackend>(
        std::sync::Arc::clone(&dataloader_valid),
        model.valid(),
        &training_config,
        metric_meta.epoch,
        None,
    );
    println!("Training finished.");
}

/// Metric pass over the validation split, up to `batch_limit` batches.
///
/// Returns the averaged (loss, accuracy).
pub fn validate<B: Backend>(
    dataloader_valid: Dataloader<B>,
    valid_model: LeNet<B>,
    training_config: &TrainingConfig,
    epoch: usize,
    batch_limit: Option<usize>,
) -> (f64, f64) {
    let batch_limit = batch_limit.unwrap_or(usize::MAX);
    let valid_num_items = dataloader_valid.num_items();
    let mut metric_meta = MetricMetadata {
        progress: Progress::new(0, valid_num_items),
        epoch,
        epoch_total: epoch,
        iteration: 0,
        lr: Some(training_config.lr),
    };

    let mut loss_metric = burn::train::metric::LossMetric::<B>::new();
    let mut acc_metric = burn::train::metric::AccuracyMetric::<B>::new();

    // validation loop
    for batch in dataloader_valid.iter().take(batch_limit) {
        let [batch_size, _channels, _height, _width] = batch.images.dims();

        metric_meta.iteration += 1;
        metric_meta.progress.items_processed += batch_size;

        let pre_metrics = valid_model.forward_classification(batch.images, batch.targets);
        acc_metric.update(&pre_metrics.adapt(), &metric_meta);
        loss_metric.update(&pre_metrics.adapt(), &metric_meta);
    }

    let loss = loss_metric.running_value().current();
    let acc = acc_metric.running_value().current();

    // Display the averaged validation metrics
    println!("Avg Valid Loss {loss:.4}, Avg Valid Acc: {acc}");

    (loss, acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TrainingConfig::new(SgdConfig::new());
        assert_eq!(config.num_steps, 20_000);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.lr, 1e-3);
        assert_eq!(config.seed, 0);
        assert_eq!(config.checkpoint_interval, 100);
    }

    #[test]
    fn train_state_round_trip() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("train_state.json");

        let state = TrainState::new().with_step(1234);
        state.save(&path).unwrap();

        let loaded = TrainState::load(&path).unwrap();
        assert_eq!(loaded.step, 1234);
    }
}
