use hct_conformance::logging::init_test_logging;
use hct_conformance::{CaseStatus, HarnessConfig, RunSelection, build_registry, load_runtime};
use hct_runtime::{
    Aspect, BundleState, ComputeRuntime, ContextId, DeviceId, DeviceInfo, KernelBundle, KernelId,
    PointerRequest, PointerView, RuntimeError, SimulatedRuntime, UsmKind, UsmPtr, UsmRequest,
};
use hct_types::CoverageLevel;
use std::cell::Cell;

/// Reference runtime whose devices advertise no address space at all.
struct NoAddressSpaces {
    inner: SimulatedRuntime,
    pointer_calls: Cell<usize>,
}

impl ComputeRuntime for NoAddressSpaces {
    fn platform_name(&self) -> &str {
        self.inner.platform_name()
    }

    fn devices(&self) -> Vec<DeviceId> {
        self.inner.devices()
    }

    fn default_device(&self) -> DeviceId {
        self.inner.default_device()
    }

    fn default_context(&self) -> ContextId {
        self.inner.default_context()
    }

    fn has_aspect(&self, device: DeviceId, aspect: Aspect) -> bool {
        self.inner.has_aspect(device, aspect)
    }

    fn device_info(&self, device: DeviceId) -> Result<DeviceInfo, RuntimeError> {
        let mut info = self.inner.device_info(device)?;
        info.address_spaces.clear();
        Ok(info)
    }

    fn kernel_ids(&self) -> Vec<KernelId> {
        self.inner.kernel_ids()
    }

    fn has_kernel_bundle(
        &self,
        context: ContextId,
        devices: &[DeviceId],
        kernels: &[KernelId],
        state: BundleState,
    ) -> bool {
        self.inner.has_kernel_bundle(context, devices, kernels, state)
    }

    fn get_kernel_bundle(
        &self,
        context: ContextId,
        devices: &[DeviceId],
        kernels: &[KernelId],
        state: BundleState,
    ) -> Result<KernelBundle, RuntimeError> {
        self.inner.get_kernel_bundle(context, devices, kernels, state)
    }

    fn compile(
        &self,
        bundle: &KernelBundle,
        devices: Option<&[DeviceId]>,
    ) -> Result<KernelBundle, RuntimeError> {
        self.inner.compile(bundle, devices)
    }

    fn usm_alloc(
        &self,
        context: ContextId,
        request: &UsmRequest,
    ) -> Result<Option<UsmPtr>, RuntimeError> {
        self.inner.usm_alloc(context, request)
    }

    fn usm_pointer_kind(&self, context: ContextId, address: usize) -> UsmKind {
        self.inner.usm_pointer_kind(context, address)
    }

    fn usm_pointer_device(&self, context: ContextId, address: usize) -> Option<DeviceId> {
        self.inner.usm_pointer_device(context, address)
    }

    fn usm_free(&self, context: ContextId, ptr: UsmPtr) -> Result<(), RuntimeError> {
        self.inner.usm_free(context, ptr)
    }

    fn multi_ptr(
        &self,
        device: DeviceId,
        request: &PointerRequest,
    ) -> Result<PointerView, RuntimeError> {
        self.pointer_calls.set(self.pointer_calls.get() + 1);
        self.inner.multi_ptr(device, request)
    }

    fn to_void(&self, view: &PointerView) -> Result<PointerView, RuntimeError> {
        self.inner.to_void(view)
    }
}

#[test]
fn pointer_cases_without_any_address_space_are_skipped() {
    init_test_logging();
    let runtime = NoAddressSpaces {
        inner: load_runtime(&HarnessConfig::default_paths()).expect("fixture profile"),
        pointer_calls: Cell::new(0),
    };
    let registry = build_registry(CoverageLevel::Full).expect("built-ins register");
    let selection = RunSelection::NameFilter(vec!["multi_ptr".to_string()]);
    let report = registry.run_filtered(&runtime, &selection);

    assert_eq!(report.cases().len(), 3);
    for case in report.cases() {
        assert_eq!(case.status(), CaseStatus::Skipped, "{}", case.name());
        assert_eq!(case.assertions(), 0, "{}", case.name());
    }
    assert_eq!(runtime.pointer_calls.get(), 0);
    assert_eq!(report.skip_count(), 3);
    assert_eq!(report.exit_code(), 0);
}
