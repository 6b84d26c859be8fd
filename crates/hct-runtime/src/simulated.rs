#![forbid(unsafe_code)]

//! In-process runtime described by a JSON device profile.
//!
//! Behaves like a conforming runtime unless the profile lists `defects`,
//! each of which breaks one documented behavior so that the conformance
//! checks can be shown to catch it.

use crate::{
    Aspect, BundleState, CallLedger, ComputeRuntime, ContextId, DeviceId, DeviceInfo,
    KernelBundle, KernelId, PointerRequest, PointerView, RuntimeError, UsmKind, UsmPtr,
    UsmRequest,
};
use hct_types::AddressSpace;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

const USM_BASE_ADDRESS: usize = 0x1000_0000;
const USM_DEFAULT_ALIGNMENT: usize = 16;
const SIMULATED_CONTEXT: ContextId = ContextId(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Defect {
    /// `compile` keeps kernels no target device can run.
    KeepIncompatibleKernels,
    /// `compile` returns an object bundle without any kernel.
    DropCompatibleKernels,
    /// `compile` does not collapse repeated devices.
    DuplicateDevices,
    /// `compile` attaches the result to a different context.
    ForeignContext,
    /// USM allocations ignore the requested alignment.
    MisalignedAllocations,
    /// `compile` panics.
    PanicOnCompile,
    /// Pointer views drop the `const` qualifier.
    LoseConstness,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub name: String,
    #[serde(default)]
    pub aspects: BTreeSet<Aspect>,
    #[serde(default)]
    pub sub_group_sizes: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub platform: String,
    #[serde(default)]
    pub default_device: u32,
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub defects: BTreeSet<Defect>,
}

impl DeviceProfile {
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|err| format!("failed reading {}: {err}", path.display()))?;
        serde_json::from_str(&raw).map_err(|err| format!("invalid JSON {}: {err}", path.display()))
    }

    #[must_use]
    pub fn with_defect(mut self, defect: Defect) -> Self {
        self.defects.insert(defect);
        self
    }
}

/// A kernel as the runtime's device compiler sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelDef {
    pub id: KernelId,
    pub name: String,
    pub uses_aspects: Vec<Aspect>,
    pub reqd_sub_group_size: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
struct Allocation {
    kind: UsmKind,
    device: Option<DeviceId>,
    bytes: usize,
}

#[derive(Debug)]
struct UsmState {
    next_address: usize,
    live: BTreeMap<usize, Allocation>,
}

#[derive(Debug)]
pub struct SimulatedRuntime {
    platform: String,
    default_device: DeviceId,
    devices: Vec<DeviceSpec>,
    kernels: Vec<KernelDef>,
    defects: BTreeSet<Defect>,
    usm: Mutex<UsmState>,
    ledger: Mutex<CallLedger>,
}

impl SimulatedRuntime {
    pub fn from_profile(
        profile: DeviceProfile,
        kernels: Vec<KernelDef>,
    ) -> Result<Self, RuntimeError> {
        if profile.devices.is_empty() {
            return Err(RuntimeError::Profile(format!(
                "platform {} declares no devices",
                profile.platform
            )));
        }
        let device_count = profile.devices.len();
        if usize::try_from(profile.default_device).map_or(true, |idx| idx >= device_count) {
            return Err(RuntimeError::Profile(format!(
                "default_device {} out of range for {device_count} devices",
                profile.default_device
            )));
        }
        let mut seen = BTreeSet::new();
        for kernel in &kernels {
            if !seen.insert(kernel.id) {
                return Err(RuntimeError::Profile(format!(
                    "kernel {} defined twice",
                    kernel.id
                )));
            }
        }

        tracing::debug!(
            platform = %profile.platform,
            devices = device_count,
            kernels = kernels.len(),
            defects = ?profile.defects,
            "simulated runtime created"
        );

        Ok(Self {
            platform: profile.platform,
            default_device: DeviceId(profile.default_device),
            devices: profile.devices,
            kernels,
            defects: profile.defects,
            usm: Mutex::new(UsmState {
                next_address: USM_BASE_ADDRESS,
                live: BTreeMap::new(),
            }),
            ledger: Mutex::new(CallLedger::new()),
        })
    }

    /// Snapshot of every call served so far.
    #[must_use]
    pub fn ledger(&self) -> CallLedger {
        self.ledger
            .lock()
            .map(|ledger| ledger.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has_defect(&self, defect: Defect) -> bool {
        self.defects.contains(&defect)
    }

    fn record(&self, op: &'static str, note: impl Into<String>) {
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.record(op, note);
        }
    }

    fn spec(&self, device: DeviceId) -> Result<&DeviceSpec, RuntimeError> {
        usize::try_from(device.0)
            .ok()
            .and_then(|idx| self.devices.get(idx))
            .ok_or(RuntimeError::UnknownDevice(device))
    }

    fn check_context(&self, context: ContextId) -> Result<(), RuntimeError> {
        if context == SIMULATED_CONTEXT {
            Ok(())
        } else {
            Err(RuntimeError::UnknownContext(context))
        }
    }

    fn kernel(&self, id: KernelId) -> Result<&KernelDef, RuntimeError> {
        self.kernels
            .iter()
            .find(|kernel| kernel.id == id)
            .ok_or(RuntimeError::UnknownKernel(id))
    }

    fn kernel_runs_on(kernel: &KernelDef, spec: &DeviceSpec) -> bool {
        kernel
            .uses_aspects
            .iter()
            .all(|aspect| spec.aspects.contains(aspect))
            && kernel
                .reqd_sub_group_size
                .is_none_or(|size| spec.sub_group_sizes.contains(&size))
    }

    fn supported_spaces(spec: &DeviceSpec) -> Vec<AddressSpace> {
        let mut spaces = vec![
            AddressSpace::Global,
            AddressSpace::Local,
            AddressSpace::Private,
        ];
        if spec.aspects.contains(&Aspect::GenericAddressSpace) {
            spaces.push(AddressSpace::Generic);
        }
        spaces.push(AddressSpace::Constant);
        spaces
    }

    /// Resolves the device list of a request, keeping first occurrences.
    fn resolve_devices(&self, devices: &[DeviceId]) -> Result<Vec<DeviceId>, RuntimeError> {
        if devices.is_empty() {
            return Ok(self.devices());
        }
        let mut seen = BTreeSet::new();
        let mut resolved = Vec::with_capacity(devices.len());
        for &device in devices {
            self.spec(device)?;
            if seen.insert(device) {
                resolved.push(device);
            }
        }
        Ok(resolved)
    }

    fn resolve_kernels(&self, kernels: &[KernelId]) -> Result<BTreeSet<KernelId>, RuntimeError> {
        if kernels.is_empty() {
            return Ok(self.kernel_ids().into_iter().collect());
        }
        kernels
            .iter()
            .map(|&id| self.kernel(id).map(|kernel| kernel.id))
            .collect()
    }

    fn state_available(&self, devices: &[DeviceId], state: BundleState) -> bool {
        match state {
            BundleState::Input => devices
                .iter()
                .all(|&device| self.has_aspect(device, Aspect::OnlineCompiler)),
            BundleState::Object | BundleState::Executable => true,
        }
    }

    fn compatible_kernels(
        &self,
        kernels: &BTreeSet<KernelId>,
        devices: &[DeviceId],
    ) -> Result<BTreeSet<KernelId>, RuntimeError> {
        let specs = devices
            .iter()
            .map(|&device| self.spec(device))
            .collect::<Result<Vec<_>, _>>()?;
        let mut kept = BTreeSet::new();
        for &id in kernels {
            let kernel = self.kernel(id)?;
            if specs.iter().any(|spec| Self::kernel_runs_on(kernel, spec)) {
                kept.insert(id);
            }
        }
        Ok(kept)
    }
}

impl ComputeRuntime for SimulatedRuntime {
    fn platform_name(&self) -> &str {
        &self.platform
    }

    fn devices(&self) -> Vec<DeviceId> {
        (0..self.devices.len())
            .filter_map(|idx| u32::try_from(idx).ok())
            .map(DeviceId)
            .collect()
    }

    fn default_device(&self) -> DeviceId {
        self.default_device
    }

    fn default_context(&self) -> ContextId {
        SIMULATED_CONTEXT
    }

    fn has_aspect(&self, device: DeviceId, aspect: Aspect) -> bool {
        self.spec(device)
            .is_ok_and(|spec| spec.aspects.contains(&aspect))
    }

    fn device_info(&self, device: DeviceId) -> Result<DeviceInfo, RuntimeError> {
        let spec = self.spec(device)?;
        Ok(DeviceInfo {
            id: device,
            name: spec.name.clone(),
            sub_group_sizes: spec.sub_group_sizes.clone(),
            address_spaces: Self::supported_spaces(spec),
        })
    }

    fn kernel_ids(&self) -> Vec<KernelId> {
        self.kernels.iter().map(|kernel| kernel.id).collect()
    }

    fn has_kernel_bundle(
        &self,
        context: ContextId,
        devices: &[DeviceId],
        kernels: &[KernelId],
        state: BundleState,
    ) -> bool {
        self.record("has_kernel_bundle", state.as_str());
        if self.check_context(context).is_err() {
            return false;
        }
        let Ok(devices) = self.resolve_devices(devices) else {
            return false;
        };
        self.resolve_kernels(kernels).is_ok() && self.state_available(&devices, state)
    }

    fn get_kernel_bundle(
        &self,
        context: ContextId,
        devices: &[DeviceId],
        kernels: &[KernelId],
        state: BundleState,
    ) -> Result<KernelBundle, RuntimeError> {
        self.record("get_kernel_bundle", state.as_str());
        self.check_context(context)?;
        let devices = self.resolve_devices(devices)?;
        let requested = self.resolve_kernels(kernels)?;
        if !self.state_available(&devices, state) {
            return Err(RuntimeError::BundleUnavailable(state));
        }
        let kernels = match state {
            BundleState::Input => requested,
            BundleState::Object | BundleState::Executable => {
                self.compatible_kernels(&requested, &devices)?
            }
        };
        Ok(KernelBundle::new(state, context, devices, kernels))
    }

    fn compile(
        &self,
        bundle: &KernelBundle,
        devices: Option<&[DeviceId]>,
    ) -> Result<KernelBundle, RuntimeError> {
        self.record(
            "compile",
            format!(
                "{} kernels, explicit devices: {}",
                bundle.kernel_ids().len(),
                devices.is_some()
            ),
        );
        if bundle.state() != BundleState::Input {
            return Err(RuntimeError::InvalidBundleState {
                expected: BundleState::Input,
                actual: bundle.state(),
            });
        }
        self.check_context(bundle.context())?;
        if self.has_defect(Defect::PanicOnCompile) {
            panic!("simulated device compiler crashed");
        }

        let requested = devices.unwrap_or(bundle.devices());
        let targets = self.resolve_devices(requested)?;
        if let Some(&device) = targets
            .iter()
            .find(|&&device| !self.has_aspect(device, Aspect::OnlineCompiler))
        {
            return Err(RuntimeError::OnlineCompilationUnavailable(device));
        }

        let input_kernels = bundle.kernel_ids().into_iter().collect::<BTreeSet<_>>();
        let kernels = if self.has_defect(Defect::DropCompatibleKernels) {
            BTreeSet::new()
        } else if self.has_defect(Defect::KeepIncompatibleKernels) {
            input_kernels
        } else {
            self.compatible_kernels(&input_kernels, &targets)?
        };
        let result_devices = if self.has_defect(Defect::DuplicateDevices) {
            requested.to_vec()
        } else {
            targets
        };
        let context = if self.has_defect(Defect::ForeignContext) {
            ContextId(bundle.context().0 + 1)
        } else {
            bundle.context()
        };

        tracing::debug!(
            kernels = kernels.len(),
            devices = result_devices.len(),
            "simulated compile finished"
        );
        Ok(KernelBundle::new(
            BundleState::Object,
            context,
            result_devices,
            kernels,
        ))
    }

    fn usm_alloc(
        &self,
        context: ContextId,
        request: &UsmRequest,
    ) -> Result<Option<UsmPtr>, RuntimeError> {
        self.record(
            "usm_alloc",
            format!(
                "{} {} bytes align {:?}",
                request.kind.as_str(),
                request.bytes,
                request.alignment
            ),
        );
        self.check_context(context)?;
        let Some(aspect) = request.kind.required_aspect() else {
            return Ok(None);
        };
        let supported = match (request.kind, request.device) {
            (UsmKind::Host, _) => self
                .devices()
                .into_iter()
                .any(|device| self.has_aspect(device, aspect)),
            (_, Some(device)) => {
                self.spec(device)?;
                self.has_aspect(device, aspect)
            }
            (_, None) => false,
        };
        if !supported || request.bytes == 0 {
            return Ok(None);
        }
        let alignment = match request.alignment {
            None | Some(0) => USM_DEFAULT_ALIGNMENT,
            Some(align) if align.is_power_of_two() => align.max(USM_DEFAULT_ALIGNMENT),
            Some(_) => return Ok(None),
        };

        let mut usm = self.usm.lock().map_err(|_| RuntimeError::StatePoisoned)?;
        let mut address = usm.next_address.next_multiple_of(alignment);
        if self.has_defect(Defect::MisalignedAllocations) {
            address += 1;
        }
        usm.next_address = address + request.bytes;
        let device = match request.kind {
            UsmKind::Host => None,
            _ => request.device,
        };
        usm.live.insert(
            address,
            Allocation {
                kind: request.kind,
                device,
                bytes: request.bytes,
            },
        );
        Ok(Some(UsmPtr {
            address,
            bytes: request.bytes,
        }))
    }

    fn usm_pointer_kind(&self, context: ContextId, address: usize) -> UsmKind {
        if self.check_context(context).is_err() {
            return UsmKind::Unknown;
        }
        self.usm
            .lock()
            .ok()
            .and_then(|usm| {
                usm.live
                    .range(..=address)
                    .next_back()
                    .filter(|(start, alloc)| address < *start + alloc.bytes)
                    .map(|(_, alloc)| alloc.kind)
            })
            .unwrap_or(UsmKind::Unknown)
    }

    fn usm_pointer_device(&self, context: ContextId, address: usize) -> Option<DeviceId> {
        self.check_context(context).ok()?;
        let usm = self.usm.lock().ok()?;
        usm.live
            .range(..=address)
            .next_back()
            .filter(|(start, alloc)| address < *start + alloc.bytes)
            .and_then(|(_, alloc)| alloc.device)
    }

    fn usm_free(&self, context: ContextId, ptr: UsmPtr) -> Result<(), RuntimeError> {
        self.record("usm_free", format!("{:#x}", ptr.address));
        self.check_context(context)?;
        let mut usm = self.usm.lock().map_err(|_| RuntimeError::StatePoisoned)?;
        usm.live
            .remove(&ptr.address)
            .map(|_| ())
            .ok_or(RuntimeError::InvalidPointer(ptr.address))
    }

    fn multi_ptr(
        &self,
        device: DeviceId,
        request: &PointerRequest,
    ) -> Result<PointerView, RuntimeError> {
        self.record("multi_ptr", request.space.as_str());
        let spec = self.spec(device)?;
        if !Self::supported_spaces(spec).contains(&request.space) {
            return Err(RuntimeError::UnsupportedAddressSpace {
                device,
                space: request.space,
            });
        }
        let is_const = request.is_const && !self.has_defect(Defect::LoseConstness);
        Ok(PointerView {
            space: request.space,
            decoration: request.decoration,
            element_size: request.element_size,
            element_align: request.element_align,
            is_const,
            is_void: false,
            address: request.address,
        })
    }

    fn to_void(&self, view: &PointerView) -> Result<PointerView, RuntimeError> {
        self.record("to_void", view.space.as_str());
        Ok(PointerView {
            element_size: 0,
            element_align: 1,
            is_void: true,
            ..*view
        })
    }
}
