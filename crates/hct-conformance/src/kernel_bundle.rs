//! Online compilation of input-state kernel bundles.
//!
//! Each check runs once per compile overload. A target without online
//! compilation skips the check instead of failing it.

#![forbid(unsafe_code)]

use crate::kernels::catalog;
use crate::outcome::{CaseContext, CaseResult};
use crate::probe::Scenario;
use crate::restrictions::expect_presence;
use hct_runtime::{BundleState, ComputeRuntime, DeviceId, KernelBundle, RuntimeError};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOverload {
    /// Explicit target devices.
    BundleAndDevices,
    /// Targets the input bundle's own devices.
    BundleOnly,
}

impl CompileOverload {
    pub const ALL: [Self; 2] = [Self::BundleAndDevices, Self::BundleOnly];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BundleAndDevices => "bundle_and_devs",
            Self::BundleOnly => "bundle_only",
        }
    }
}

fn compile_bundle(
    runtime: &dyn ComputeRuntime,
    overload: CompileOverload,
    input: &KernelBundle,
    devices: &[DeviceId],
) -> Result<KernelBundle, RuntimeError> {
    match overload {
        CompileOverload::BundleAndDevices => runtime.compile(input, Some(devices)),
        CompileOverload::BundleOnly => runtime.compile(input, None),
    }
}

/// Every catalog kernel ends up in the object bundle exactly when the
/// device can run it.
pub fn check_bundle_kernels(ctx: &mut CaseContext<'_>, overload: CompileOverload) -> CaseResult {
    let runtime = ctx.runtime();
    let context = runtime.default_context();
    let device = runtime.default_device();

    for kernel in catalog() {
        let scenario = Scenario::InputBundle {
            kernels: vec![kernel.id],
        };
        if !ctx.require(device, &scenario, kernel.name) {
            continue;
        }

        let input = runtime.get_kernel_bundle(context, &[device], &[kernel.id], BundleState::Input)?;
        let input_ids = input.kernel_ids();
        let object = compile_bundle(runtime, overload, &input, &[device])?;
        let restriction = kernel.restriction();
        tracing::debug!(
            kernel = kernel.name,
            restriction = %restriction.describe(),
            overload = overload.as_str(),
            "compiled input bundle"
        );

        expect_presence(
            ctx,
            &format!("kernel {} in compiled bundle for {device}", kernel.name),
            restriction.is_compatible(runtime, device),
            object.has_kernel(kernel.id),
        )?;

        let lost = input_ids.iter().find(|&&id| {
            let compatible = catalog()
                .iter()
                .find(|k| k.id == id)
                .is_none_or(|k| k.restriction().is_compatible(runtime, device));
            compatible && !object.has_kernel(id)
        });
        if lost.is_some() {
            return Err(ctx.fail(format!(
                "Result bundle does not contain all kernels from input bundle (kernel: {})",
                kernel.name
            )));
        }
        ctx.ensure(
            input.context() == object.context(),
            format!(
                "Input bundle and result bundle have different contexts (kernel: {})",
                kernel.name
            ),
        )?;
        ctx.ensure(
            object.state() == BundleState::Object,
            format!(
                "compile returned a bundle in {} state (kernel: {})",
                object.state(),
                kernel.name
            ),
        )?;
    }
    Ok(())
}

/// Repeated target devices are collapsed, keeping the order they were
/// passed in.
pub fn check_associated_devices(
    ctx: &mut CaseContext<'_>,
    overload: CompileOverload,
) -> CaseResult {
    let runtime = ctx.runtime();
    let context = runtime.default_context();
    let device = runtime.default_device();
    let devices = [device, device];

    let scenario = Scenario::InputBundle {
        kernels: Vec::new(),
    };
    if !ctx.require(device, &scenario, "associated devices") {
        return Ok(());
    }

    let input = runtime.get_kernel_bundle(context, &devices, &[], BundleState::Input)?;
    let object = compile_bundle(runtime, overload, &input, &devices)?;
    let compiled = object.devices();

    let mut seen = BTreeSet::new();
    let distinct = devices
        .iter()
        .copied()
        .filter(|dev| seen.insert(*dev))
        .collect::<Vec<_>>();
    let unique = compiled.iter().collect::<BTreeSet<_>>();
    ctx.ensure(
        unique.len() == compiled.len(),
        "Set of associated to obj_kb devices has duplicates.",
    )?;
    ctx.ensure(
        compiled == distinct.as_slice(),
        "Set of associated to obj_kb devices is not equal to list of devices passed.",
    )
}
