#![forbid(unsafe_code)]

use crate::outcome::{CaseContext, CaseResult};
use crate::probe::Scenario;
use hct_runtime::{DeviceId, UsmKind, UsmRequest};
use hct_types::{
    CoverageLevel, MatrixType, NamedTypeSet, TypeMatrixError, TypeTag, TypeVisitor, core_types,
};
use std::mem::{align_of, size_of};

/// Alignments requested by the aligned form; 0 asks for the default.
pub const ALIGNMENTS: [usize; 11] = [0, 1, 2, 4, 8, 16, 32, 64, 128, 256, 4096];

const ELEMENT_COUNTS: [usize; 2] = [1, 7];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsmForm {
    Usual,
    Aligned,
}

impl UsmForm {
    pub const ALL: [Self; 2] = [Self::Usual, Self::Aligned];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Usual => "malloc",
            Self::Aligned => "aligned_alloc",
        }
    }
}

/// Allocation kinds with a named allocation function.
pub const USM_KINDS: [UsmKind; 3] = [UsmKind::Device, UsmKind::Host, UsmKind::Shared];

/// `malloc_device`, `aligned_alloc_host`, ...
#[must_use]
pub fn operation_name(form: UsmForm, kind: UsmKind) -> String {
    format!("{}_{}", form.as_str(), kind.as_str())
}

pub fn usm_types(level: CoverageLevel) -> Result<NamedTypeSet, TypeMatrixError> {
    match level {
        CoverageLevel::Minimal => NamedTypeSet::generate(&["int"], &[TypeTag::Int]),
        CoverageLevel::Full => Ok(core_types(CoverageLevel::Full)),
    }
}

struct AllocationVisitor<'c, 'a> {
    ctx: &'c mut CaseContext<'a>,
    form: UsmForm,
    kind: UsmKind,
    device: DeviceId,
}

impl AllocationVisitor<'_, '_> {
    fn requested_alignments(&self) -> Vec<Option<usize>> {
        match self.form {
            UsmForm::Usual => vec![None],
            UsmForm::Aligned => ALIGNMENTS.iter().copied().map(Some).collect(),
        }
    }
}

impl TypeVisitor for AllocationVisitor<'_, '_> {
    type Output = CaseResult;

    fn visit<T: MatrixType>(&mut self, _tag: TypeTag, name: &str) -> CaseResult {
        let runtime = self.ctx.runtime();
        let context = runtime.default_context();
        let op = operation_name(self.form, self.kind);

        for count in ELEMENT_COUNTS {
            for alignment in self.requested_alignments() {
                let label = match alignment {
                    Some(align) => format!("{op}<{name}>(count {count}, alignment {align})"),
                    None => format!("{op}<{name}>(count {count})"),
                };
                let request = UsmRequest {
                    kind: self.kind,
                    device: Some(self.device),
                    alignment,
                    bytes: count * size_of::<T>(),
                };
                let Some(ptr) = runtime.usm_alloc(context, &request)? else {
                    return Err(self.ctx.fail(format!("{label}: returned a null pointer")));
                };

                self.ctx.ensure(
                    ptr.address % align_of::<T>() == 0,
                    format!(
                        "{label}: {:#x} is not aligned for the element type",
                        ptr.address
                    ),
                )?;
                if let Some(align) = alignment.filter(|&align| align > 0) {
                    self.ctx.ensure(
                        ptr.address % align == 0,
                        format!("{label}: {:#x} ignores the requested alignment", ptr.address),
                    )?;
                }
                let reported = runtime.usm_pointer_kind(context, ptr.address);
                self.ctx.ensure(
                    reported == self.kind,
                    format!("{label}: pointer reports {} allocation", reported.as_str()),
                )?;
                if self.kind != UsmKind::Host {
                    let owner = runtime.usm_pointer_device(context, ptr.address);
                    self.ctx.ensure(
                        owner == Some(self.device),
                        format!("{label}: pointer is associated with {owner:?}"),
                    )?;
                }

                runtime.usm_free(context, ptr)?;
                let freed = runtime.usm_pointer_kind(context, ptr.address);
                self.ctx.ensure(
                    freed == UsmKind::Unknown,
                    format!("{label}: freed pointer still reports {}", freed.as_str()),
                )?;
            }
        }
        Ok(())
    }
}

/// Allocates, inspects and frees every type of `types` on the default device.
pub fn check_allocations(
    ctx: &mut CaseContext<'_>,
    form: UsmForm,
    kind: UsmKind,
    types: &NamedTypeSet,
) -> CaseResult {
    let device = ctx.runtime().default_device();
    if !ctx.require(
        device,
        &Scenario::UsmAllocation(kind),
        &operation_name(form, kind),
    ) {
        return Ok(());
    }

    let mut visitor = AllocationVisitor {
        ctx,
        form,
        kind,
        device,
    };
    for ty in types.iter() {
        ty.tag.dispatch(&ty.name, &mut visitor)?;
    }
    Ok(())
}
