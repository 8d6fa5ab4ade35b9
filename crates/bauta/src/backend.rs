//! Compile-time backend for the `bauta` binary.
//!
//! Exactly one of `cuda`, `wgpu` or `ndarray` is used; when several features
//! are enabled the first in that list wins.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        use burn::backend::cuda::{Cuda, CudaDevice};

        pub type SelectedBackend = Cuda;
        pub type SelectedDevice = CudaDevice;

        /// CUDA device number `gpu`.
        pub fn create_device(gpu: usize) -> SelectedDevice {
            CudaDevice::new(gpu)
        }

        pub const fn get_backend_name() -> &'static str {
            "CUDA (NVIDIA GPU)"
        }
    } else if #[cfg(feature = "wgpu")] {
        use burn::backend::wgpu::{Wgpu, WgpuDevice};

        pub type SelectedBackend = Wgpu;
        pub type SelectedDevice = WgpuDevice;

        /// The `gpu`-th discrete adapter reported by wgpu.
        pub fn create_device(gpu: usize) -> SelectedDevice {
            WgpuDevice::DiscreteGpu(gpu)
        }

        pub const fn get_backend_name() -> &'static str {
            "WGPU (GPU)"
        }
    } else {
        use burn::backend::ndarray::{NdArray, NdArrayDevice};

        pub type SelectedBackend = NdArray;
        pub type SelectedDevice = NdArrayDevice;

        /// The CPU; `gpu` is unused.
        pub fn create_device(_gpu: usize) -> SelectedDevice {
            NdArrayDevice::default()
        }

        pub const fn get_backend_name() -> &'static str {
            "NdArray (CPU)"
        }
    }
}
