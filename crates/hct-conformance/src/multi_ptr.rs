#![forbid(unsafe_code)]

use crate::outcome::{CaseContext, CaseError, CaseResult};
use crate::probe::Scenario;
use hct_runtime::{DeviceId, PointerRequest, PointerView};
use hct_types::{
    AddressSpace, Construction, Decoration, LegacyAlias, MatrixType, NamedTypeSet, TypeTag,
    TypeVisitor,
};
use std::ffi::c_int;
use std::mem::{align_of, size_of};

const BASE_ADDRESS: usize = 0x4000;

fn pointer_label(name: &str, space: AddressSpace, decoration: Decoration, is_const: bool) -> String {
    let constness = if is_const { "const " } else { "" };
    format!(
        "multi_ptr<{constness}{name}, {space}, {}>",
        decoration.as_str()
    )
}

/// Converts `view` to `void` and checks what must survive the conversion.
fn check_void_conversion(ctx: &mut CaseContext<'_>, view: &PointerView, label: &str) -> CaseResult {
    let erased = ctx.runtime().to_void(view)?;
    ctx.ensure(erased.is_void, format!("{label}: void conversion kept an element type"))?;
    ctx.ensure(
        erased.address == view.address,
        format!("{label}: void conversion moved the address"),
    )?;
    ctx.ensure(
        erased.space == view.space,
        format!("{label}: void conversion changed the address space"),
    )?;
    ctx.ensure(
        erased.is_const == view.is_const,
        format!("{label}: void conversion changed constness"),
    )
}

struct PointerVisitor<'c, 'a> {
    ctx: &'c mut CaseContext<'a>,
    device: DeviceId,
}

impl TypeVisitor for PointerVisitor<'_, '_> {
    type Output = CaseResult;

    fn visit<T: MatrixType>(&mut self, tag: TypeTag, name: &str) -> CaseResult {
        if tag.is_user_defined() {
            self.ctx
                .note(format!("{name}: {}", T::CONSTRUCTION.as_str()));
            let constructible = T::CONSTRUCTION != Construction::NonDefaultConstructible;
            if T::default_value().is_some() != constructible {
                return Err(CaseError::Fault(format!(
                    "{name}: default value does not match its construction rule"
                )));
            }
        }

        let runtime = self.ctx.runtime();
        let address = BASE_ADDRESS.next_multiple_of(align_of::<T>());
        for space in AddressSpace::MODERN {
            let what = format!("multi_ptr<{name}>");
            if !self
                .ctx
                .require(self.device, &Scenario::AddressSpace(space), &what)
            {
                continue;
            }
            for decoration in Decoration::MODERN {
                for is_const in [false, true] {
                    let label = pointer_label(name, space, decoration, is_const);
                    let request = PointerRequest {
                        space,
                        decoration,
                        element_size: size_of::<T>(),
                        element_align: align_of::<T>(),
                        is_const,
                        address,
                    };
                    let view = runtime.multi_ptr(self.device, &request)?;
                    self.ctx.ensure(
                        view.space == space,
                        format!("{label}: reports {}", view.space),
                    )?;
                    self.ctx.ensure(
                        view.decoration == decoration,
                        format!("{label}: reports {}", view.decoration.as_str()),
                    )?;
                    self.ctx.ensure(
                        view.element_size == request.element_size
                            && view.element_align == request.element_align
                            && !view.is_void,
                        format!("{label}: element layout does not match {name}"),
                    )?;
                    self.ctx.ensure(
                        view.is_const == is_const,
                        format!("{label}: constness was not preserved"),
                    )?;
                    check_void_conversion(self.ctx, &view, &label)?;
                }
            }
        }
        Ok(())
    }
}

/// Every type of `types` in every modern address space and decoration,
/// mutable and `const`.
pub fn check_types(ctx: &mut CaseContext<'_>, types: &NamedTypeSet) -> CaseResult {
    let device = ctx.runtime().default_device();
    let mut visitor = PointerVisitor { ctx, device };
    for ty in types.iter() {
        ty.tag.dispatch(&ty.name, &mut visitor)?;
    }
    Ok(())
}

/// `global_ptr` and friends pin the legacy decoration in their space.
pub fn check_legacy_aliases(ctx: &mut CaseContext<'_>) -> CaseResult {
    let runtime = ctx.runtime();
    let device = runtime.default_device();
    for alias in LegacyAlias::ALL {
        let space = alias.space();
        if !ctx.require(device, &Scenario::AddressSpace(space), alias.name()) {
            continue;
        }
        let label = format!("{}<int>", alias.name());
        let request = PointerRequest {
            space,
            decoration: alias.decoration(),
            element_size: size_of::<c_int>(),
            element_align: align_of::<c_int>(),
            is_const: false,
            address: BASE_ADDRESS,
        };
        let view = runtime.multi_ptr(device, &request)?;
        ctx.ensure(
            view.space == space && view.decoration == Decoration::Legacy,
            format!("{label}: reports {} {}", view.space, view.decoration.as_str()),
        )?;
        check_void_conversion(ctx, &view, &label)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::pointer_label;
    use hct_types::{AddressSpace, Decoration};

    #[test]
    fn labels_name_every_template_argument() {
        assert_eq!(
            pointer_label("int", AddressSpace::Local, Decoration::Yes, true),
            "multi_ptr<const int, access::address_space::local_space, decorated::yes>"
        );
    }
}
