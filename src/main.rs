use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn_lenet::{
    backend::{MainAutoBackend, MainBackend, MainDevice},
    cli::{AppArgs, HELP},
    evaluation, inference,
    model::LeNetConfig,
    optim,
    training::{self, TrainingConfig},
};

pub fn launch<B, AutoB>(app_args: &AppArgs)
where
    B: Backend + MainDevice,
    AutoB: AutodiffBackend + MainDevice,
{
    app_args.create_artifact_dir();

    // setup training and model configs
    let training_config = app_args
        .load_training_config()
        .unwrap_or_else(|| TrainingConfig::new(optim::optimizer_config()));
    let model_config = app_args.load_model_config().unwrap_or_else(LeNetConfig::new);
    // save configs
    app_args.save_training_config(&training_config);
    app_args.save_model_config(&model_config);

    if app_args.training {
        let training_device = AutoB::main_device();
        training::train::<AutoB>(
            training_config.clone(),
            model_config.clone(),
            training_device,
            app_args,
        );
    }

    if app_args.evaluation {
        let eval_device = B::main_device();
        evaluation::evaluate::<B>(
            training_config.clone(),
            model_config.clone(),
            eval_device,
            app_args,
        );
    }

    if app_args.inference {
        let infer_device = B::main_device();
        let num_samples = 10;
        inference::infer::<B>(model_config, num_samples, infer_device, app_args);
    }

    if !app_args.training && !app_args.evaluation && !app_args.inference {
        println!("none of training, evaluation, or inference were enabled");
        println!("{}", HELP);
    }
}

fn main() {
    let app_args = AppArgs::parse().unwrap();
    launch::<MainBackend, MainAutoBackend>(&app_args);
}
