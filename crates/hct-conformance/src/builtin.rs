#![forbid(unsafe_code)]

use crate::error::ConfigError;
use crate::kernel_bundle::{CompileOverload, check_associated_devices, check_bundle_kernels};
use crate::multi_ptr::{check_legacy_aliases, check_types};
use crate::registry::{Registry, TestCase};
use crate::usm_alloc::{USM_KINDS, UsmForm, check_allocations, operation_name, usm_types};
use hct_types::{composite_types, core_types};

pub const KERNEL_BUNDLE_SUITE: &str = "kernel_bundle";
pub const USM_SUITE: &str = "usm";
pub const MULTI_PTR_SUITE: &str = "multi_ptr";

/// Registers every built-in case. Type matrices are built here, so a bad
/// matrix fails startup instead of a case.
pub fn register_builtin_cases(registry: &mut Registry) -> Result<(), ConfigError> {
    let level = registry.coverage();

    for overload in CompileOverload::ALL {
        let prefix = format!("kernel_bundle_compile_{}", overload.as_str());
        registry.register(
            TestCase::new(format!("{prefix}_kernels"), move |ctx| {
                check_bundle_kernels(ctx, overload)
            })
            .in_suite(KERNEL_BUNDLE_SUITE),
        )?;
        registry.register(
            TestCase::new(format!("{prefix}_associated_devices"), move |ctx| {
                check_associated_devices(ctx, overload)
            })
            .in_suite(KERNEL_BUNDLE_SUITE),
        )?;
    }

    for form in UsmForm::ALL {
        for kind in USM_KINDS {
            let types = usm_types(level)?;
            registry.register(
                TestCase::new(format!("usm_{}", operation_name(form, kind)), move |ctx| {
                    check_allocations(ctx, form, kind, &types)
                })
                .in_suite(USM_SUITE),
            )?;
        }
    }

    let core = core_types(level);
    registry.register(
        TestCase::new("multi_ptr_core_types", move |ctx| check_types(ctx, &core))
            .in_suite(MULTI_PTR_SUITE),
    )?;
    let composite = composite_types(level);
    registry.register(
        TestCase::new("multi_ptr_composite_types", move |ctx| {
            check_types(ctx, &composite)
        })
        .in_suite(MULTI_PTR_SUITE),
    )?;
    registry.register(
        TestCase::new("multi_ptr_legacy_aliases", check_legacy_aliases).in_suite(MULTI_PTR_SUITE),
    )?;

    tracing::debug!(
        cases = registry.len(),
        coverage = level.as_str(),
        "built-in cases registered"
    );
    Ok(())
}
