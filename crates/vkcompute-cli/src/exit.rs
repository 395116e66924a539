use vkcompute::{ErrorKind, VkComputeError};

// Exit codes for scripted callers
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_GENERIC_FAIL: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_NO_DEVICE: i32 = 3;

/// Map a failed command to its exit code by the first engine error in the
/// chain.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    let engine = err.chain().find_map(|e| e.downcast_ref::<VkComputeError>());
    match engine.map(VkComputeError::kind) {
        Some(ErrorKind::Capability) => EXIT_NO_DEVICE,
        Some(ErrorKind::Usage) => EXIT_USAGE,
        _ => EXIT_GENERIC_FAIL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn capability_maps_to_no_device() {
        let err = anyhow::Error::new(VkComputeError::NoDeviceFound);
        assert_eq!(exit_code_for(&err), EXIT_NO_DEVICE);
    }

    #[test]
    fn wrapped_usage_error_is_found() {
        let result: Result<(), VkComputeError> =
            Err(VkComputeError::IndivisibleDispatch { work_items: 33, x: 8 });
        let err = result.context("building pipeline").unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_USAGE);
    }

    #[test]
    fn other_errors_are_generic() {
        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), EXIT_GENERIC_FAIL);
        let err = anyhow::Error::new(VkComputeError::SubmitFailed(vkcompute::vk::Result::ERROR_DEVICE_LOST));
        assert_eq!(exit_code_for(&err), EXIT_GENERIC_FAIL);
        assert_ne!(EXIT_SUCCESS, EXIT_GENERIC_FAIL);
    }
}
