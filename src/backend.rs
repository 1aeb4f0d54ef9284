//! Backend selection
//!
//! Cargo features pick the Burn backend: NdArray on the CPU by default,
//! wgpu on the GPU, or wgpu with half-precision floats.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

// --------------------------------------------------------------------------------
// BACKEND SELECTION: wgpu (f16 or f32) or NdArray (fallback)
// --------------------------------------------------------------------------------

#[cfg(feature = "wgpu-f16")]
pub type DefaultBackend = burn::backend::Wgpu<burn::tensor::f16, i32>;

#[cfg(all(feature = "wgpu", not(feature = "wgpu-f16")))]
pub type DefaultBackend = burn::backend::Wgpu;

#[cfg(all(not(feature = "wgpu"), feature = "ndarray"))]
pub type DefaultBackend = burn::backend::NdArray;

#[cfg(all(not(feature = "wgpu"), not(feature = "ndarray")))]
compile_error!("At least one backend (ndarray, wgpu or wgpu-f16) must be enabled!");

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device
pub fn default_device() -> <DefaultBackend as Backend>::Device {
    <DefaultBackend as Backend>::Device::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "wgpu-f16")]
    {
        "wgpu f16 (GPU)"
    }

    #[cfg(all(feature = "wgpu", not(feature = "wgpu-f16")))]
    {
        "wgpu (GPU)"
    }

    #[cfg(all(not(feature = "wgpu"), feature = "ndarray"))]
    {
        "NdArray (CPU)"
    }
}
