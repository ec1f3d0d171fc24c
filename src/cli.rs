use crate::backend::RecorderTy;
use crate::model::ModelConfigExt;
use crate::optim::OptimConfigExt;
use crate::training::TrainState;
use burn::module::AutodiffModule;
use burn::record::{FileRecorder, Recorder};
use burn::{optim::Optimizer, prelude::*, tensor::backend::AutodiffBackend};
use std::path::PathBuf;

pub const HELP: &str = "\
Burn LeNet

A command-line tool for training, evaluating, and running inference with a
convolutional handwritten-digit classifier. Models, optimizers, training
progress, and configurations are persisted in an artifacts directory.

USAGE:
    burn-lenet [OPTIONS]

When no --training, --evaluation, or --inference flag is provided, the program
exits after handling configuration logic.

BEHAVIOR OVERVIEW
- The program manages two configurations: training config and model config.
- If --training-config or --model-config is given, the corresponding config is loaded from the specified file and saved to the artifacts directory (overwriting any existing file).
- If no explicit config file is provided for a component, the program attempts to load it from the artifacts directory; if absent, a default configuration is created and saved.
- The artifacts directory (--artifacts-path) is used to read/write model weights, optimizer state, training progress, and configurations. If not specified, a new temporary directory is created and its path is printed.
- With --remove-artifacts, any existing model, optimizer, and progress files in the artifacts directory are deleted before training (if --training is active).
- Model and optimizer weights are loaded from the artifacts directory if present; otherwise new ones are created and saved. Training always resumes from the persisted step counter.
- Flags compose: training executes first, then evaluation, then inference, each using the latest persisted model.

FLAGS:
    -h, --help                  Show this help message and exit

OPTIONS:
    -t, --training              Run training for the configured step budget (creates or updates model / optimizer / progress)
    -e, --evaluation            Evaluate the trained model over the held-out split, reporting step count, loss, and accuracy
    -i, --inference             Classify a few held-out digits with the trained model
    -r, --remove-artifacts      Delete existing model, optimizer, and progress files from the artifacts directory before training
                                (has no effect if --training is not used)
    -c, --training-config <PATH>
                                Load training configuration from this file (overrides any config in artifacts directory)
    -m, --model-config <PATH>   Load model configuration from this file (overrides any config in artifacts directory)
    -a, --artifacts-path <PATH>
                                Directory where configurations, model weights, optimizer state, and training progress are saved and loaded.
                                If the directory does not exist, it will be created.
                                Defaults to a newly created temporary directory (path will be printed).
";

pub const TRAINING_CONFIG_NAME: &'static str = "training_config";
pub const MODEL_CONFIG_NAME: &'static str = "model_config";
pub const TRAIN_STATE_NAME: &'static str = "train_state";
pub const MODEL_NAME: &'static str = "model";
pub const OPTIM_NAME: &'static str = "optim";

#[derive(Debug)]
pub struct AppArgs {
    pub training: bool,
    pub evaluation: bool,
    pub inference: bool,
    pub remove_artifacts: bool,
    pub training_config: Option<PathBuf>,
    pub model_config: Option<PathBuf>,
    pub artifacts_path: PathBuf,
}

impl AppArgs {
    pub fn parse() -> Result<Self, pico_args::Error> {
        let mut pargs = pico_args::Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            println!("{}", HELP);
            std::process::exit(0);
        }

        let args = AppArgs {
            training_config: pargs.opt_value_from_os_str(["-c", "--training-config"], parse_path)?,
            model_config: pargs.opt_value_from_os_str(["-m", "--model-config"], parse_path)?,
            artifacts_path: pargs
                .opt_value_from_os_str(["-a", "--artifacts-path"], parse_path)?
                .unwrap_or_else(|| {
                    // e.g. /tmp/burn-lenet-abcd-0
                    let name = format!("{}-", std::env!("CARGO_PKG_NAME"));
                    let tmp = temp_dir::TempDir::with_prefix(name)
                        .expect("Failed to create the temporary directory")
                        .dont_delete_on_drop();
                    let path = tmp.path();
                    println!("new artifacts directory: {path:?}");
                    path.into()
                }),
            // must parse flags after values
            training: pargs.contains(["-t", "--training"]),
            evaluation: pargs.contains(["-e", "--evaluation"]),
            inference: pargs.contains(["-i", "--inference"]),
            remove_artifacts: pargs.contains(["-r", "--remove-artifacts"]),
        };

        // It's up to the caller what to do with the remaining arguments.
        let remaining = pargs.finish();
        if !remaining.is_empty() {
            panic!("unused arguments: {remaining:?}");
        }

        Ok(args)
    }

    /// Create the directory to save the artifacts into, removing stale
    /// model/optim/progress files first when requested.
    pub fn create_artifact_dir(&self) {
        if self.remove_artifacts && self.training {
            // enforce that the removal should not have errors,
            // including for when files didn't exist
            println!(
                "removing {:?}/{{{MODEL_NAME},{OPTIM_NAME},{TRAIN_STATE_NAME}}}",
                self.artifacts_path
            );
            std::fs::remove_file(self.record_path::<crate::backend::MainBackend>(MODEL_NAME))
                .expect("failed to remove the model");
            std::fs::remove_file(self.record_path::<crate::backend::MainBackend>(OPTIM_NAME))
                .expect("failed to remove the optim");
            std::fs::remove_file(self.config_path(TRAIN_STATE_NAME))
                .expect("failed to remove the train state");
        }
        std::fs::create_dir_all(&self.artifacts_path).ok();
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.artifacts_path.join(name).with_added_extension("json")
    }

    fn record_path<B: Backend>(&self, name: &str) -> PathBuf {
        let file_ext = <RecorderTy as FileRecorder<B>>::file_extension();
        self.artifacts_path.join(name).with_added_extension(file_ext)
    }

    pub fn save_training_config(&self, training_config: &impl Config) {
        let path = self.config_path(TRAINING_CONFIG_NAME);
        println!("Saving training config into {path:?}");
        training_config
            .save(path)
            .expect("Failed to save the training config");
    }

    pub fn load_training_config<TrainingConfig: Config>(&self) -> Option<TrainingConfig> {
        self.training_config
            .as_ref()
            .map(|path| {
                load_config(path).expect("Failed to find the training config file {path:?}")
            })
            .or_else(|| load_config(&self.config_path(TRAINING_CONFIG_NAME)))
    }

    pub fn save_model_config(&self, model_config: &impl Config) {
        let path = self.config_path(MODEL_CONFIG_NAME);
        println!("Saving model config into {path:?}");
        model_config
            .save(path)
            .expect("Failed to save the model config");
    }

    pub fn load_model_config<ModelConfig: Config>(&self) -> Option<ModelConfig> {
        self.model_config
            .as_ref()
            .map(|path| load_config(path).expect("Failed to find the model config file {path:?}"))
            .or_else(|| load_config(&self.config_path(MODEL_CONFIG_NAME)))
    }

    pub fn save_train_state(&self, train_state: &TrainState) {
        let path = self.config_path(TRAIN_STATE_NAME);
        train_state
            .save(path)
            .expect("Failed to save the train state");
    }

    pub fn load_train_state(&self) -> Option<TrainState> {
        load_config(&self.config_path(TRAIN_STATE_NAME))
    }

    pub fn save_model<B: Backend>(&self, model: &impl Module<B>) {
        let path = self.artifacts_path.join(MODEL_NAME);
        println!("Saving model to {:?}", self.record_path::<B>(MODEL_NAME));
        model
            .clone()
            .save_file(path, &RecorderTy::new()) // ext added automatically
            .expect("Failed to save the model");
    }

    pub fn load_model<B: Backend, ModelConfig: ModelConfigExt<B>>(
        &self,
        model_config: &ModelConfig,
        device: &B::Device,
    ) -> Option<ModelConfig::Model> {
        let path = self.artifacts_path.join(MODEL_NAME);
        let path_ext = self.record_path::<B>(MODEL_NAME);
        let exists = std::fs::exists(&path_ext).expect("failed to check {path_ext:?}");
        if exists {
            println!("Loading model from {path_ext:?}");
            let model_init = model_config.init(device);
            let model = model_init
                .load_file(path, &RecorderTy::new(), device) // ext added automatically
                .expect("Failed to load the initial model");
            Some(model)
        } else {
            None
        }
    }

    pub fn load_or_save_model<B: Backend, ModelConfig: ModelConfigExt<B>>(
        &self,
        model_config: &ModelConfig,
        device: &B::Device,
    ) -> ModelConfig::Model {
        self.load_model(model_config, device).unwrap_or_else(|| {
            println!("Initializing new model");
            let model_init = model_config.init(device);
            self.save_model(&model_init);
            model_init
        })
    }

    pub fn save_optim<AutoB, AutoM>(&self, optim: &impl Optimizer<AutoM, AutoB>)
    where
        AutoB: AutodiffBackend,
        AutoM: AutodiffModule<AutoB>,
    {
        let path = self.artifacts_path.join(OPTIM_NAME);
        println!("Saving optim to {:?}", self.record_path::<AutoB>(OPTIM_NAME));
        let record = optim.to_record();
        RecorderTy::new()
            .record(record, path) // ext added automatically
            .expect("Failed to save the optim");
    }

    pub fn load_optim<AutoB, AutoM, OptimConfig>(
        &self,
        optim_config: &OptimConfig,
        device: &AutoB::Device,
    ) -> Option<OptimConfig::Adaptor>
    where
        AutoB: AutodiffBackend,
        AutoM: AutodiffModule<AutoB>,
        OptimConfig: OptimConfigExt<AutoB, AutoM>,
    {
        let path = self.artifacts_path.join(OPTIM_NAME);
        let path_ext = self.record_path::<AutoB>(OPTIM_NAME);
        let exists = std::fs::exists(&path_ext).expect("failed to check {path_ext:?}");
        if exists {
            println!("Loading initial optim from {path_ext:?}");
            let optim_init = optim_config.init();
            let record = RecorderTy::new()
                .load(path, device) // ext added automatically
                .expect("Failed to load the initial optim");
            let optim = optim_init.load_record(record);
            Some(optim)
        } else {
            None
        }
    }

    pub fn load_or_save_optim<AutoB, AutoM, OptimConfig>(
        &self,
        optim_config: &OptimConfig,
        device: &AutoB::Device,
    ) -> OptimConfig::Adaptor
    where
        AutoB: AutodiffBackend,
        AutoM: AutodiffModule<AutoB>,
        OptimConfig: OptimConfigExt<AutoB, AutoM>,
    {
        self.load_optim(optim_config, device).unwrap_or_else(|| {
            println!("Initializing new optim");
            let optim_init = optim_config.init();
            self.save_optim(&optim_init);
            optim_init
        })
    }
}

fn parse_path(s: &std::ffi::OsStr) -> Result<PathBuf, &'static str> {
    Ok(s.into())
}

fn load_config<C: Config>(path: &std::path::Path) -> Option<C> {
    let exists = std::fs::exists(path).expect("failed to check {path:?}");
    if exists {
        println!("Loading config from {path:?}");
        let config = C::load(path).expect("Failed to load the config");
        Some(config)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LeNetConfig;

    fn args_in(dir: &std::path::Path) -> AppArgs {
        AppArgs {
            training: false,
            evaluation: false,
            inference: false,
            remove_artifacts: false,
            training_config: None,
            model_config: None,
            artifacts_path: dir.to_path_buf(),
        }
    }

    #[test]
    fn configs_are_absent_in_a_fresh_artifacts_dir() {
        let dir = temp_dir::TempDir::new().unwrap();
        let args = args_in(dir.path());

        assert!(args.load_model_config::<LeNetConfig>().is_none());
        assert!(args.load_train_state().is_none());
    }

    #[test]
    fn model_config_round_trip() {
        let dir = temp_dir::TempDir::new().unwrap();
        let args = args_in(dir.path());

        args.save_model_config(&LeNetConfig::new().with_conv1_filters(8));
        let loaded: LeNetConfig = args.load_model_config().unwrap();

        assert_eq!(loaded.conv1_filters, 8);
        assert_eq!(loaded.num_classes, 10);
    }

    #[test]
    fn train_state_round_trip_through_the_artifact_store() {
        let dir = temp_dir::TempDir::new().unwrap();
        let args = args_in(dir.path());

        args.save_train_state(&TrainState::new().with_step(42));
        assert_eq!(args.load_train_state().unwrap().step, 42);
    }
}
