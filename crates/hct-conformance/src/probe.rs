#![forbid(unsafe_code)]

use hct_runtime::{Aspect, BundleState, ComputeRuntime, DeviceId, KernelId, UsmKind};
use hct_types::AddressSpace;
use std::fmt;

/// Optional runtime feature a check depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scenario {
    /// Online compilation from an input-state bundle holding `kernels`
    /// (every kernel when empty).
    InputBundle { kernels: Vec<KernelId> },
    Aspect(Aspect),
    AddressSpace(AddressSpace),
    UsmAllocation(UsmKind),
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputBundle { kernels } if kernels.is_empty() => {
                f.write_str("input-state kernel bundle")
            }
            Self::InputBundle { kernels } => {
                let ids = kernels
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "input-state kernel bundle with [{ids}]")
            }
            Self::Aspect(aspect) => write!(f, "aspect::{}", aspect.as_str()),
            Self::AddressSpace(space) => write!(f, "{space}"),
            Self::UsmAllocation(kind) => write!(f, "USM {} allocations", kind.as_str()),
        }
    }
}

pub trait CapabilityProbe {
    fn supports(&self, target: DeviceId, scenario: &Scenario) -> bool;
}

/// Answers probes through the runtime's own query operations.
pub struct RuntimeProbe<'a> {
    runtime: &'a dyn ComputeRuntime,
}

impl<'a> RuntimeProbe<'a> {
    #[must_use]
    pub fn new(runtime: &'a dyn ComputeRuntime) -> Self {
        Self { runtime }
    }
}

impl CapabilityProbe for RuntimeProbe<'_> {
    fn supports(&self, target: DeviceId, scenario: &Scenario) -> bool {
        match scenario {
            Scenario::InputBundle { kernels } => self.runtime.has_kernel_bundle(
                self.runtime.default_context(),
                &[target],
                kernels,
                BundleState::Input,
            ),
            Scenario::Aspect(aspect) => self.runtime.has_aspect(target, *aspect),
            Scenario::AddressSpace(space) => self
                .runtime
                .device_info(target)
                .is_ok_and(|info| info.address_spaces.contains(space)),
            Scenario::UsmAllocation(kind) => kind
                .required_aspect()
                .is_some_and(|aspect| self.runtime.has_aspect(target, aspect)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CapabilityProbe, RuntimeProbe, Scenario};
    use crate::{HarnessConfig, load_runtime};
    use hct_runtime::{Aspect, ComputeRuntime, DeviceId, KernelId, UsmKind};
    use hct_types::AddressSpace;

    #[test]
    fn probe_follows_device_profile() {
        let runtime = load_runtime(&HarnessConfig::default_paths()).expect("fixture profile");
        let probe = RuntimeProbe::new(&runtime);
        let gpu = runtime.default_device();

        assert!(probe.supports(gpu, &Scenario::Aspect(Aspect::Gpu)));
        assert!(probe.supports(gpu, &Scenario::InputBundle { kernels: vec![] }));
        assert!(probe.supports(gpu, &Scenario::AddressSpace(AddressSpace::Global)));
        assert!(probe.supports(gpu, &Scenario::UsmAllocation(UsmKind::Device)));
        assert!(!probe.supports(gpu, &Scenario::UsmAllocation(UsmKind::Unknown)));
        assert!(!probe.supports(
            gpu,
            &Scenario::InputBundle {
                kernels: vec![KernelId(999)]
            }
        ));
        assert!(!probe.supports(DeviceId(99), &Scenario::Aspect(Aspect::Gpu)));
    }

    #[test]
    fn scenarios_describe_themselves() {
        assert_eq!(
            Scenario::InputBundle {
                kernels: vec![KernelId(2)]
            }
            .to_string(),
            "input-state kernel bundle with [kernel#2]"
        );
        assert_eq!(
            Scenario::AddressSpace(AddressSpace::Generic).to_string(),
            "access::address_space::generic_space"
        );
    }
}
