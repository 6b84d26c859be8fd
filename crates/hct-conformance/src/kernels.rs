#![forbid(unsafe_code)]

use crate::restrictions::Restriction;
use hct_runtime::{Aspect, KernelDef, KernelId};

/// A kernel the suites compile, with the device features it relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelDescriptor {
    pub name: &'static str,
    pub id: KernelId,
    pub uses_aspects: &'static [Aspect],
    pub reqd_sub_group_size: Option<u32>,
}

impl KernelDescriptor {
    #[must_use]
    pub fn restriction(&self) -> Restriction {
        let restriction = self
            .uses_aspects
            .iter()
            .fold(Restriction::new(), |acc, &aspect| acc.require_aspect(aspect));
        match self.reqd_sub_group_size {
            Some(size) => restriction.require_sub_group_size(size),
            None => restriction,
        }
    }

    #[must_use]
    pub fn to_kernel_def(&self) -> KernelDef {
        KernelDef {
            id: self.id,
            name: self.name.to_string(),
            uses_aspects: self.uses_aspects.to_vec(),
            reqd_sub_group_size: self.reqd_sub_group_size,
        }
    }
}

const CATALOG: [KernelDescriptor; 5] = [
    KernelDescriptor {
        name: "simple_kernel",
        id: KernelId(0),
        uses_aspects: &[],
        reqd_sub_group_size: None,
    },
    KernelDescriptor {
        name: "kernel_fp16",
        id: KernelId(1),
        uses_aspects: &[Aspect::Fp16],
        reqd_sub_group_size: None,
    },
    KernelDescriptor {
        name: "kernel_fp64",
        id: KernelId(2),
        uses_aspects: &[Aspect::Fp64],
        reqd_sub_group_size: None,
    },
    KernelDescriptor {
        name: "kernel_atomic64",
        id: KernelId(3),
        uses_aspects: &[Aspect::Atomic64],
        reqd_sub_group_size: None,
    },
    KernelDescriptor {
        name: "kernel_sub_group_16",
        id: KernelId(4),
        uses_aspects: &[],
        reqd_sub_group_size: Some(16),
    },
];

#[must_use]
pub fn catalog() -> &'static [KernelDescriptor] {
    &CATALOG
}

/// Kernel definitions a runtime must know for the bundle suites to run.
#[must_use]
pub fn runtime_kernel_defs() -> Vec<KernelDef> {
    CATALOG.iter().map(KernelDescriptor::to_kernel_def).collect()
}

#[cfg(test)]
mod tests {
    use super::{catalog, runtime_kernel_defs};
    use std::collections::BTreeSet;

    #[test]
    fn catalog_ids_and_names_are_unique() {
        let ids = catalog().iter().map(|k| k.id).collect::<BTreeSet<_>>();
        let names = catalog().iter().map(|k| k.name).collect::<BTreeSet<_>>();
        assert_eq!(ids.len(), catalog().len());
        assert_eq!(names.len(), catalog().len());
        assert_eq!(runtime_kernel_defs().len(), catalog().len());
    }

    #[test]
    fn simple_kernel_is_unrestricted() {
        let simple = catalog()
            .iter()
            .find(|k| k.name == "simple_kernel")
            .expect("simple kernel in catalog");
        assert!(simple.restriction().is_unrestricted());
        let sub_group = catalog()
            .iter()
            .find(|k| k.reqd_sub_group_size.is_some())
            .expect("sub-group kernel in catalog");
        assert_eq!(sub_group.restriction().describe(), "reqd_sub_group_size(16)");
    }
}
