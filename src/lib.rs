pub mod backend;
pub mod cli;
pub mod evaluation;
pub mod inference;
pub mod mnist;
pub mod model;
pub mod optim;
pub mod training;

pub mod prelude {
    pub use crate::mnist::{HEIGHT, MnistBatch, MnistBatcher, MnistDataset, MnistItem, WIDTH};
    pub use crate::model::{LeNet, LeNetConfig, ModelConfigExt};
    pub use crate::training::{TrainState, TrainingConfig};
}
