#![forbid(unsafe_code)]

use crate::outcome::{CaseContext, CaseResult};
use hct_runtime::{Aspect, ComputeRuntime, DeviceId};
use hct_types::AddressSpace;
use std::collections::BTreeSet;

/// What a device must offer for a scenario to be expected to work on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Restriction {
    aspects: BTreeSet<Aspect>,
    address_spaces: BTreeSet<AddressSpace>,
    sub_group_size: Option<u32>,
}

impl Restriction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn require_aspect(mut self, aspect: Aspect) -> Self {
        self.aspects.insert(aspect);
        self
    }

    #[must_use]
    pub fn require_address_space(mut self, space: AddressSpace) -> Self {
        self.address_spaces.insert(space);
        self
    }

    #[must_use]
    pub fn require_sub_group_size(mut self, size: u32) -> Self {
        self.sub_group_size = Some(size);
        self
    }

    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.aspects.is_empty() && self.address_spaces.is_empty() && self.sub_group_size.is_none()
    }

    /// Expected-behavior oracle for `target`.
    #[must_use]
    pub fn is_compatible(&self, runtime: &dyn ComputeRuntime, target: DeviceId) -> bool {
        if !self
            .aspects
            .iter()
            .all(|&aspect| runtime.has_aspect(target, aspect))
        {
            return false;
        }
        if self.address_spaces.is_empty() && self.sub_group_size.is_none() {
            return true;
        }
        let Ok(info) = runtime.device_info(target) else {
            return false;
        };
        self.address_spaces
            .iter()
            .all(|space| info.address_spaces.contains(space))
            && self
                .sub_group_size
                .is_none_or(|size| info.sub_group_sizes.contains(&size))
    }

    #[must_use]
    pub fn describe(&self) -> String {
        if self.is_unrestricted() {
            return "no restrictions".to_string();
        }
        let mut parts = self
            .aspects
            .iter()
            .map(|aspect| format!("aspect::{}", aspect.as_str()))
            .collect::<Vec<_>>();
        parts.extend(self.address_spaces.iter().map(ToString::to_string));
        if let Some(size) = self.sub_group_size {
            parts.push(format!("reqd_sub_group_size({size})"));
        }
        parts.join(" + ")
    }
}

/// Compares an observed presence with the oracle's expectation.
#[track_caller]
pub fn expect_presence(
    ctx: &mut CaseContext<'_>,
    subject: &str,
    expected: bool,
    actual: bool,
) -> CaseResult {
    match (expected, actual) {
        (true, false) => Err(ctx.fail(format!("{subject}: expected but absent"))),
        (false, true) => Err(ctx.fail(format!("{subject}: unexpected but present"))),
        _ => ctx.ensure(true, subject),
    }
}

#[cfg(test)]
mod tests {
    use super::Restriction;
    use crate::{HarnessConfig, load_runtime};
    use hct_runtime::{Aspect, ComputeRuntime, DeviceId};
    use hct_types::AddressSpace;

    #[test]
    fn unrestricted_is_compatible_everywhere() {
        let runtime = load_runtime(&HarnessConfig::default_paths()).expect("fixture profile");
        let restriction = Restriction::new();
        assert!(restriction.is_unrestricted());
        for device in runtime.devices() {
            assert!(restriction.is_compatible(&runtime, device));
        }
        assert_eq!(restriction.describe(), "no restrictions");
    }

    #[test]
    fn aspects_and_sub_groups_narrow_compatibility() {
        let runtime = load_runtime(&HarnessConfig::default_paths()).expect("fixture profile");
        let fp16 = Restriction::new().require_aspect(Aspect::Fp16);
        assert!(fp16.is_compatible(&runtime, DeviceId(0)));
        assert!(!fp16.is_compatible(&runtime, DeviceId(1)));

        let sub_group = Restriction::new().require_sub_group_size(32);
        assert!(sub_group.is_compatible(&runtime, DeviceId(0)));
        assert!(!sub_group.is_compatible(&runtime, DeviceId(1)));

        let generic = Restriction::new().require_address_space(AddressSpace::Generic);
        assert!(generic.is_compatible(&runtime, DeviceId(0)));
        assert!(!generic.is_compatible(&runtime, DeviceId(1)));
        assert!(!generic.is_compatible(&runtime, DeviceId(42)));
    }

    #[test]
    fn description_lists_requirements() {
        let restriction = Restriction::new()
            .require_aspect(Aspect::Fp64)
            .require_sub_group_size(16);
        assert_eq!(
            restriction.describe(),
            "aspect::fp64 + reqd_sub_group_size(16)"
        );
    }
}
