//! Backend selection for inference
//!
//! The server only runs forward passes, so no autodiff wrapper is used.
//! CPU (NdArray) is the default; the `cuda` feature switches to the CUDA backend.

use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type InferenceBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type InferenceBackend = burn_ndarray::NdArray;

/// Device type of the inference backend
pub type InferenceDevice = <InferenceBackend as Backend>::Device;

/// Get the default device for the current backend
pub fn default_device() -> InferenceDevice {
    InferenceDevice::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}
