//! Workgroup shape and group-count arithmetic.

use ash::vk;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, VkComputeError};

/// Local workgroup size, fed to the kernel as specialization constants 0, 1
/// and 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchShape {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl DispatchShape {
    /// Every dimension must be at least 1.
    pub fn new(x: u32, y: u32, z: u32) -> Result<Self> {
        let shape = Self { x, y, z };
        shape.validate()?;
        Ok(shape)
    }

    /// `(x, 1, 1)`.
    pub fn linear(x: u32) -> Result<Self> {
        Self::new(x, 1, 1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.x == 0 || self.y == 0 || self.z == 0 {
            return Err(VkComputeError::InvalidDispatchShape { x: self.x, y: self.y, z: self.z });
        }
        Ok(())
    }

    /// Invocations per workgroup.
    pub fn invocations(&self) -> u64 {
        u64::from(self.x) * u64::from(self.y) * u64::from(self.z)
    }

    /// The three consecutive `u32` values handed to the pipeline as
    /// specialization data.
    pub fn specialization_data(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }

    /// Compare against the device's compute workgroup limits.
    pub fn check_limits(&self, limits: &vk::PhysicalDeviceLimits) -> Result<()> {
        let max = limits.max_compute_work_group_size;
        for (axis, (value, limit)) in ["x", "y", "z"].iter().zip(self.specialization_data().iter().zip(max)) {
            if *value > limit {
                return Err(VkComputeError::ShapeExceedsLimits(format!(
                    "{axis} = {value} exceeds maxComputeWorkGroupSize {limit}"
                )));
            }
        }
        let max_invocations = u64::from(limits.max_compute_work_group_invocations);
        if self.invocations() > max_invocations {
            return Err(VkComputeError::ShapeExceedsLimits(format!(
                "{} invocations exceed maxComputeWorkGroupInvocations {max_invocations}",
                self.invocations()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for DispatchShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

/// What to do when the number of work items is not a multiple of the
/// workgroup width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivisibilityPolicy {
    /// Refuse to build.
    #[default]
    Reject,
    /// Dispatch `work_items / x` groups; the tail is never processed.
    Truncate,
    /// Dispatch `ceil(work_items / x)` groups; the kernel must bounds-check.
    RoundUp,
}

/// Number of workgroups along x covering `work_items` under `policy`.
///
/// May return 0 under `Truncate` when `work_items < shape.x`; the command
/// recorder rejects that.
pub fn group_count(work_items: u32, shape: &DispatchShape, policy: DivisibilityPolicy) -> Result<u32> {
    shape.validate()?;
    let x = shape.x;
    let tail = work_items % x;
    if tail == 0 {
        return Ok(work_items / x);
    }
    match policy {
        DivisibilityPolicy::Reject => Err(VkComputeError::IndivisibleDispatch { work_items, x }),
        DivisibilityPolicy::Truncate => {
            warn!(work_items, workgroup = x, dropped = tail, "truncating dispatch; tail elements are not processed");
            Ok(work_items / x)
        }
        DivisibilityPolicy::RoundUp => Ok(work_items.div_ceil(x)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_dimension_is_rejected() {
        for (x, y, z) in [(0, 1, 1), (1, 0, 1), (1, 1, 0)] {
            let err = DispatchShape::new(x, y, z).unwrap_err();
            assert!(err.is_usage_error());
        }
    }

    #[test]
    fn specialization_data_order() {
        let shape = DispatchShape::new(8, 2, 1).unwrap();
        assert_eq!(shape.specialization_data(), [8, 2, 1]);
        assert_eq!(shape.to_string(), "8x2x1");
    }

    #[test]
    fn sum_example_is_one_group() {
        let shape = DispatchShape::linear(8).unwrap();
        assert_eq!(group_count(8, &shape, DivisibilityPolicy::Reject).unwrap(), 1);
    }

    #[test]
    fn softmax_example_policies() {
        let shape = DispatchShape::linear(8).unwrap();
        assert!(matches!(
            group_count(33, &shape, DivisibilityPolicy::Reject),
            Err(VkComputeError::IndivisibleDispatch { work_items: 33, x: 8 })
        ));
        assert_eq!(group_count(33, &shape, DivisibilityPolicy::Truncate).unwrap(), 4);
        assert_eq!(group_count(33, &shape, DivisibilityPolicy::RoundUp).unwrap(), 5);
    }

    #[test]
    fn truncate_can_produce_zero_groups() {
        let shape = DispatchShape::linear(64).unwrap();
        assert_eq!(group_count(10, &shape, DivisibilityPolicy::Truncate).unwrap(), 0);
    }

    #[test]
    fn limits_are_enforced() {
        let limits = vk::PhysicalDeviceLimits {
            max_compute_work_group_size: [256, 256, 64],
            max_compute_work_group_invocations: 256,
            ..Default::default()
        };
        DispatchShape::new(256, 1, 1).unwrap().check_limits(&limits).unwrap();
        assert!(DispatchShape::new(512, 1, 1).unwrap().check_limits(&limits).is_err());
        assert!(DispatchShape::new(1, 1, 65).unwrap().check_limits(&limits).is_err());
        let err = DispatchShape::new(16, 32, 1).unwrap().check_limits(&limits).unwrap_err();
        assert!(matches!(err, VkComputeError::ShapeExceedsLimits(_)));
    }

    #[test]
    fn policy_default_is_reject() {
        assert_eq!(DivisibilityPolicy::default(), DivisibilityPolicy::Reject);
    }

    proptest! {
        #[test]
        fn divisible_counts_agree_across_policies(groups in 0u32..10_000, x in 1u32..1024) {
            let shape = DispatchShape::linear(x).unwrap();
            let work_items = groups * x;
            for policy in [DivisibilityPolicy::Reject, DivisibilityPolicy::Truncate, DivisibilityPolicy::RoundUp] {
                prop_assert_eq!(group_count(work_items, &shape, policy).unwrap(), groups);
            }
        }

        #[test]
        fn indivisible_counts_bracket_the_work(work_items in 1u32..1_000_000, x in 2u32..1024) {
            prop_assume!(work_items % x != 0);
            let shape = DispatchShape::linear(x).unwrap();
            prop_assert!(group_count(work_items, &shape, DivisibilityPolicy::Reject).is_err());
            let down = group_count(work_items, &shape, DivisibilityPolicy::Truncate).unwrap();
            let up = group_count(work_items, &shape, DivisibilityPolicy::RoundUp).unwrap();
            prop_assert_eq!(up, down + 1);
            prop_assert!(u64::from(down) * u64::from(x) < u64::from(work_items));
            prop_assert!(u64::from(up) * u64::from(x) > u64::from(work_items));
        }
    }
}
