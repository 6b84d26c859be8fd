#![forbid(unsafe_code)]

pub mod simulated;

pub use simulated::{Defect, DeviceProfile, DeviceSpec, KernelDef, SimulatedRuntime};

use hct_types::{AddressSpace, Decoration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Handle to one compute-capable unit.
///
/// Handles compare, order and hash by identity, so device lists can be
/// deduplicated with ordinary set types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KernelId(pub u32);

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kernel#{}", self.0)
    }
}

/// Optional device capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    Cpu,
    Gpu,
    Accelerator,
    Fp16,
    Fp64,
    Atomic64,
    OnlineCompiler,
    OnlineLinker,
    UsmDeviceAllocations,
    UsmHostAllocations,
    UsmSharedAllocations,
    GenericAddressSpace,
}

impl Aspect {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
            Self::Accelerator => "accelerator",
            Self::Fp16 => "fp16",
            Self::Fp64 => "fp64",
            Self::Atomic64 => "atomic64",
            Self::OnlineCompiler => "online_compiler",
            Self::OnlineLinker => "online_linker",
            Self::UsmDeviceAllocations => "usm_device_allocations",
            Self::UsmHostAllocations => "usm_host_allocations",
            Self::UsmSharedAllocations => "usm_shared_allocations",
            Self::GenericAddressSpace => "generic_address_space",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub sub_group_sizes: Vec<u32>,
    pub address_spaces: Vec<AddressSpace>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleState {
    Input,
    Object,
    Executable,
}

impl BundleState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Object => "object",
            Self::Executable => "executable",
        }
    }
}

impl fmt::Display for BundleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kernels for a set of devices in one lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelBundle {
    state: BundleState,
    context: ContextId,
    devices: Vec<DeviceId>,
    kernels: BTreeSet<KernelId>,
}

impl KernelBundle {
    #[must_use]
    pub fn new(
        state: BundleState,
        context: ContextId,
        devices: Vec<DeviceId>,
        kernels: BTreeSet<KernelId>,
    ) -> Self {
        Self {
            state,
            context,
            devices,
            kernels,
        }
    }

    #[must_use]
    pub fn state(&self) -> BundleState {
        self.state
    }

    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    #[must_use]
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    #[must_use]
    pub fn has_kernel(&self, kernel: KernelId) -> bool {
        self.kernels.contains(&kernel)
    }

    #[must_use]
    pub fn kernel_ids(&self) -> Vec<KernelId> {
        self.kernels.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsmKind {
    Host,
    Device,
    Shared,
    Unknown,
}

impl UsmKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Device => "device",
            Self::Shared => "shared",
            Self::Unknown => "unknown",
        }
    }

    /// Aspect a device must report for allocations of this kind.
    #[must_use]
    pub const fn required_aspect(self) -> Option<Aspect> {
        match self {
            Self::Host => Some(Aspect::UsmHostAllocations),
            Self::Device => Some(Aspect::UsmDeviceAllocations),
            Self::Shared => Some(Aspect::UsmSharedAllocations),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsmRequest {
    pub kind: UsmKind,
    pub device: Option<DeviceId>,
    /// `None` for the plain allocation form.
    pub alignment: Option<usize>,
    pub bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsmPtr {
    pub address: usize,
    pub bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerRequest {
    pub space: AddressSpace,
    pub decoration: Decoration,
    pub element_size: usize,
    pub element_align: usize,
    pub is_const: bool,
    pub address: usize,
}

/// What the runtime reports back for a pointer it constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerView {
    pub space: AddressSpace,
    pub decoration: Decoration,
    /// Zero for `void` pointers.
    pub element_size: usize,
    pub element_align: usize,
    pub is_const: bool,
    pub is_void: bool,
    pub address: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),
    #[error("unknown context {0:?}")]
    UnknownContext(ContextId),
    #[error("unknown kernel {0}")]
    UnknownKernel(KernelId),
    #[error("no kernel bundle in {0} state for the requested devices")]
    BundleUnavailable(BundleState),
    #[error("invalid bundle state: expected {expected}, got {actual}")]
    InvalidBundleState {
        expected: BundleState,
        actual: BundleState,
    },
    #[error("{0} has no online compiler")]
    OnlineCompilationUnavailable(DeviceId),
    #[error("{device} does not support {space}")]
    UnsupportedAddressSpace {
        device: DeviceId,
        space: AddressSpace,
    },
    #[error("pointer {0:#x} was not allocated by this runtime")]
    InvalidPointer(usize),
    #[error("runtime state lock poisoned")]
    StatePoisoned,
    #[error("invalid device profile: {0}")]
    Profile(String),
}

/// Subject-under-test surface consumed by the conformance engine.
///
/// The engine reaches runtime state only through these operations.
pub trait ComputeRuntime {
    fn platform_name(&self) -> &str;

    fn devices(&self) -> Vec<DeviceId>;

    /// Device behind the default queue.
    fn default_device(&self) -> DeviceId;

    fn default_context(&self) -> ContextId;

    fn has_aspect(&self, device: DeviceId, aspect: Aspect) -> bool;

    fn device_info(&self, device: DeviceId) -> Result<DeviceInfo, RuntimeError>;

    fn kernel_ids(&self) -> Vec<KernelId>;

    /// An empty `devices` slice means every device of `context`; an empty
    /// `kernels` slice means every kernel.
    fn has_kernel_bundle(
        &self,
        context: ContextId,
        devices: &[DeviceId],
        kernels: &[KernelId],
        state: BundleState,
    ) -> bool;

    fn get_kernel_bundle(
        &self,
        context: ContextId,
        devices: &[DeviceId],
        kernels: &[KernelId],
        state: BundleState,
    ) -> Result<KernelBundle, RuntimeError>;

    /// Compiles an input bundle; `None` targets the bundle's own devices.
    fn compile(
        &self,
        bundle: &KernelBundle,
        devices: Option<&[DeviceId]>,
    ) -> Result<KernelBundle, RuntimeError>;

    /// `Ok(None)` is the null pointer returned for unsupported requests.
    fn usm_alloc(
        &self,
        context: ContextId,
        request: &UsmRequest,
    ) -> Result<Option<UsmPtr>, RuntimeError>;

    fn usm_pointer_kind(&self, context: ContextId, address: usize) -> UsmKind;

    fn usm_pointer_device(&self, context: ContextId, address: usize) -> Option<DeviceId>;

    fn usm_free(&self, context: ContextId, ptr: UsmPtr) -> Result<(), RuntimeError>;

    fn multi_ptr(
        &self,
        device: DeviceId,
        request: &PointerRequest,
    ) -> Result<PointerView, RuntimeError>;

    fn to_void(&self, view: &PointerView) -> Result<PointerView, RuntimeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCall {
    pub ts_millis: u128,
    pub op: &'static str,
    pub note: String,
}

/// Append-only record of the operations a runtime served.
#[derive(Debug, Default, Clone)]
pub struct CallLedger {
    calls: Vec<RuntimeCall>,
}

impl CallLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, op: &'static str, note: impl Into<String>) {
        let ts_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis());
        self.calls.push(RuntimeCall {
            ts_millis,
            op,
            note: note.into(),
        });
    }

    #[must_use]
    pub fn calls(&self) -> &[RuntimeCall] {
        &self.calls
    }

    #[must_use]
    pub fn count(&self, op: &str) -> usize {
        self.calls.iter().filter(|call| call.op == op).count()
    }

    #[must_use]
    pub fn last(&self) -> Option<&RuntimeCall> {
        self.calls.last()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Aspect, BundleState, CallLedger, ContextId, DeviceId, KernelBundle, KernelId,
        RuntimeError, UsmKind,
    };
    use std::collections::{BTreeSet, HashSet};

    #[test]
    fn device_handles_support_set_semantics() {
        let devices = [DeviceId(1), DeviceId(0), DeviceId(1)];
        assert_eq!(devices.iter().collect::<BTreeSet<_>>().len(), 2);
        assert_eq!(devices.iter().collect::<HashSet<_>>().len(), 2);
        assert!(DeviceId(0) < DeviceId(1));
    }

    #[test]
    fn bundle_inspection() {
        let bundle = KernelBundle::new(
            BundleState::Object,
            ContextId(7),
            vec![DeviceId(0)],
            [KernelId(1), KernelId(3)].into_iter().collect(),
        );
        assert!(bundle.has_kernel(KernelId(3)));
        assert!(!bundle.has_kernel(KernelId(2)));
        assert_eq!(bundle.devices(), &[DeviceId(0)]);
        assert_eq!(bundle.context(), ContextId(7));
        assert_eq!(bundle.kernel_ids(), vec![KernelId(1), KernelId(3)]);
    }

    #[test]
    fn usm_kinds_map_to_aspects() {
        assert_eq!(
            UsmKind::Device.required_aspect(),
            Some(Aspect::UsmDeviceAllocations)
        );
        assert_eq!(UsmKind::Unknown.required_aspect(), None);
    }

    #[test]
    fn ledger_counts_operations() {
        let mut ledger = CallLedger::new();
        ledger.record("compile", "bundle");
        ledger.record("usm_alloc", "64 bytes");
        ledger.record("compile", "bundle");
        assert_eq!(ledger.count("compile"), 2);
        assert_eq!(ledger.calls().len(), 3);
        assert_eq!(ledger.last().map(|call| call.op), Some("compile"));
    }

    #[test]
    fn error_messages_name_states() {
        let err = RuntimeError::InvalidBundleState {
            expected: BundleState::Input,
            actual: BundleState::Object,
        };
        assert_eq!(
            err.to_string(),
            "invalid bundle state: expected input, got object"
        );
    }
}
