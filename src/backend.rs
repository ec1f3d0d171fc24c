use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

#[cfg(feature = "f16")]
pub type Element = burn::tensor::f16;
#[cfg(not(feature = "f16"))]
pub type Element = f32;

/// Recorder used for the model and optimizer checkpoints.
pub type RecorderTy = burn::record::CompactRecorder;

#[cfg(feature = "ndarray")]
pub type MainBackend = burn::backend::NdArray<Element, i32>;
#[cfg(any(feature = "tch-cpu", feature = "tch-gpu"))]
pub type MainBackend = burn::backend::libtorch::LibTorch<Element, i32>;
#[cfg(any(feature = "wgpu", feature = "metal", feature = "vulkan"))]
pub type MainBackend = burn::backend::wgpu::Wgpu<Element, i32>;
#[cfg(feature = "cuda")]
pub type MainBackend = burn::backend::Cuda<Element, i32>;
#[cfg(feature = "rocm")]
pub type MainBackend = burn::backend::Rocm<Element, i32>;

pub trait MainDevice: Backend {
    fn main_device() -> <Self as Backend>::Device {
        Default::default()
    }
}

#[cfg(any(
    feature = "ndarray",
    feature = "tch-cpu",
    feature = "wgpu",
    feature = "metal",
    feature = "vulkan",
    feature = "cuda",
    feature = "rocm"
))]
impl MainDevice for MainBackend {}
#[cfg(all(feature = "tch-gpu", not(target_os = "macos")))]
impl MainDevice for MainBackend {
    fn main_device() -> <Self as Backend>::Device {
        burn::backend::libtorch::LibTorchDevice::Cuda(0)
    }
}
#[cfg(all(feature = "tch-gpu", target_os = "macos"))]
impl MainDevice for MainBackend {
    fn main_device() -> <Self as Backend>::Device {
        burn::backend::libtorch::LibTorchDevice::Mps
    }
}

pub type MainAutoBackend = burn::backend::Autodiff<MainBackend>;
impl MainDevice for MainAutoBackend {
    fn main_device() -> <Self as Backend>::Device {
        <<Self as AutodiffBackend>::InnerBackend as MainDevice>::main_device()
    }
}

#[cfg(not(feature = "_has-backend"))]
mod err {
    use super::*;
    std::compile_error!("No backend selected. Please check burn-lenet/Cargo.toml for more info.");

    // pretend to fallback to ndarray (to avoid too many other unrelated errors)
    pub type MainBackend = burn::backend::NdArray<Element, i32>;
    impl MainDevice for MainBackend {}
}
#[cfg(not(feature = "_has-backend"))]
pub use err::*;
