use candle_core::Device;
use log::error;

/// Checkpoints are materialized on the first CUDA device.
pub const CUDA_DEVICE_INDEX: usize = 0;

pub fn load_device(gpu_id: Option<usize>) -> Device {
    if let Some(id) = gpu_id {
        match Device::new_cuda(id) {
            Ok(cuda) => cuda,
            Err(e) => {
                error!("Error initializing CUDA device. Switching to CPU. Error: {:#?}", e);
                Device::Cpu
            }
        }
    } else {
        Device::Cpu
    }
}

pub fn checkpoint_device() -> Device {
    load_device(Some(CUDA_DEVICE_INDEX))
}
