#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::ffi::{
    c_char, c_int, c_long, c_longlong, c_schar, c_short, c_uchar, c_uint, c_ulong, c_ulonglong,
    c_ushort,
};
use std::fmt;

/// Element types a conformance matrix can be instantiated with.
///
/// The primitive tags follow the C-family names the runtime's API is specified
/// against; the last three are user-defined aggregates with distinct
/// construction rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Bool,
    Float,
    Double,
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    NoCnstr,
    DefCnstr,
    NoDefCnstr,
}

impl TypeTag {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Float => "float",
            Self::Double => "double",
            Self::Char => "char",
            Self::SignedChar => "signed char",
            Self::UnsignedChar => "unsigned char",
            Self::Short => "short",
            Self::UnsignedShort => "unsigned short",
            Self::Int => "int",
            Self::UnsignedInt => "unsigned int",
            Self::Long => "long",
            Self::UnsignedLong => "unsigned long",
            Self::LongLong => "long long",
            Self::UnsignedLongLong => "unsigned long long",
            Self::NoCnstr => "no_cnstr",
            Self::DefCnstr => "def_cnstr",
            Self::NoDefCnstr => "no_def_cnstr",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "bool" => Some(Self::Bool),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            "char" => Some(Self::Char),
            "signed char" | "schar" => Some(Self::SignedChar),
            "unsigned char" | "uchar" => Some(Self::UnsignedChar),
            "short" => Some(Self::Short),
            "unsigned short" | "ushort" => Some(Self::UnsignedShort),
            "int" => Some(Self::Int),
            "unsigned int" | "uint" => Some(Self::UnsignedInt),
            "long" => Some(Self::Long),
            "unsigned long" | "ulong" => Some(Self::UnsignedLong),
            "long long" => Some(Self::LongLong),
            "unsigned long long" => Some(Self::UnsignedLongLong),
            "no_cnstr" => Some(Self::NoCnstr),
            "def_cnstr" => Some(Self::DefCnstr),
            "no_def_cnstr" => Some(Self::NoDefCnstr),
            _ => None,
        }
    }

    /// Returns `true` for the user-defined aggregate tags.
    #[must_use]
    pub const fn is_user_defined(self) -> bool {
        matches!(self, Self::NoCnstr | Self::DefCnstr | Self::NoDefCnstr)
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Integer tags, `char` included, `bool` excluded.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        !self.is_float() && !self.is_user_defined() && !matches!(self, Self::Bool)
    }

    /// Calls `visitor` with the concrete Rust type behind this tag.
    pub fn dispatch<V: TypeVisitor>(self, name: &str, visitor: &mut V) -> V::Output {
        match self {
            Self::Bool => visitor.visit::<bool>(self, name),
            Self::Float => visitor.visit::<f32>(self, name),
            Self::Double => visitor.visit::<f64>(self, name),
            Self::Char => visitor.visit::<c_char>(self, name),
            Self::SignedChar => visitor.visit::<c_schar>(self, name),
            Self::UnsignedChar => visitor.visit::<c_uchar>(self, name),
            Self::Short => visitor.visit::<c_short>(self, name),
            Self::UnsignedShort => visitor.visit::<c_ushort>(self, name),
            Self::Int => visitor.visit::<c_int>(self, name),
            Self::UnsignedInt => visitor.visit::<c_uint>(self, name),
            Self::Long => visitor.visit::<c_long>(self, name),
            Self::UnsignedLong => visitor.visit::<c_ulong>(self, name),
            Self::LongLong => visitor.visit::<c_longlong>(self, name),
            Self::UnsignedLongLong => visitor.visit::<c_ulonglong>(self, name),
            Self::NoCnstr => visitor.visit::<user_def_types::NoCnstr>(self, name),
            Self::DefCnstr => visitor.visit::<user_def_types::DefCnstr>(self, name),
            Self::NoDefCnstr => visitor.visit::<user_def_types::NoDefCnstr>(self, name),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How values of a matrix type come into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Construction {
    Trivial,
    /// No constructor at all; built by listing every field.
    Aggregate,
    DefaultConstructible,
    NonDefaultConstructible,
}

impl Construction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::Aggregate => "aggregate",
            Self::DefaultConstructible => "default_constructible",
            Self::NonDefaultConstructible => "non_default_constructible",
        }
    }
}

/// A type the generic dispatcher can instantiate a check with.
pub trait MatrixType: Copy + fmt::Debug + 'static {
    const CONSTRUCTION: Construction;

    /// A value built the way the type allows, `None` when the type has no
    /// default constructor.
    fn default_value() -> Option<Self>;
}

macro_rules! trivial_matrix_type {
    ($($ty:ty),* $(,)?) => {
        $(
            impl MatrixType for $ty {
                const CONSTRUCTION: Construction = Construction::Trivial;

                fn default_value() -> Option<Self> {
                    Some(<$ty>::default())
                }
            }
        )*
    };
}

trivial_matrix_type!(bool, f32, f64, i8, u8, i16, u16, i32, u32, i64, u64);

/// User-defined element types with different constructor semantics.
pub mod user_def_types {
    use super::{Construction, MatrixType};

    /// Aggregate without any constructor.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct NoCnstr {
        pub a: i32,
        pub b: f32,
        pub c: u8,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct DefCnstr {
        a: i32,
        b: f32,
        c: u8,
    }

    impl Default for DefCnstr {
        fn default() -> Self {
            Self {
                a: 3,
                b: 2.0,
                c: b'c',
            }
        }
    }

    impl DefCnstr {
        #[must_use]
        pub const fn fields(&self) -> (i32, f32, u8) {
            (self.a, self.b, self.c)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct NoDefCnstr {
        a: i32,
        b: f32,
        c: u8,
    }

    impl NoDefCnstr {
        #[must_use]
        pub const fn new(value: i32) -> Self {
            Self {
                a: value,
                b: 0.5,
                c: b'n',
            }
        }

        #[must_use]
        pub const fn fields(&self) -> (i32, f32, u8) {
            (self.a, self.b, self.c)
        }
    }

    impl MatrixType for NoCnstr {
        const CONSTRUCTION: Construction = Construction::Aggregate;

        fn default_value() -> Option<Self> {
            Some(Self { a: 0, b: 0.0, c: 0 })
        }
    }

    impl MatrixType for DefCnstr {
        const CONSTRUCTION: Construction = Construction::DefaultConstructible;

        fn default_value() -> Option<Self> {
            Some(Self::default())
        }
    }

    impl MatrixType for NoDefCnstr {
        const CONSTRUCTION: Construction = Construction::NonDefaultConstructible;

        fn default_value() -> Option<Self> {
            None
        }
    }
}

/// Generic body invoked once per matrix cell.
pub trait TypeVisitor {
    type Output;

    fn visit<T: MatrixType>(&mut self, tag: TypeTag, name: &str) -> Self::Output;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeMatrixError {
    #[error("type matrix arity mismatch: {names} display names for {tags} type tags")]
    ArityMismatch { names: usize, tags: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedType {
    pub tag: TypeTag,
    pub name: String,
}

/// Ordered `(tag, display name)` pairs driving one type matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedTypeSet {
    entries: Vec<NamedType>,
}

impl NamedTypeSet {
    /// Pairs `names[i]` with `tags[i]`, preserving order.
    pub fn generate(names: &[&str], tags: &[TypeTag]) -> Result<Self, TypeMatrixError> {
        if names.len() != tags.len() {
            return Err(TypeMatrixError::ArityMismatch {
                names: names.len(),
                tags: tags.len(),
            });
        }
        let entries = tags
            .iter()
            .zip(names)
            .map(|(&tag, name)| NamedType {
                tag,
                name: (*name).to_string(),
            })
            .collect();
        Ok(Self { entries })
    }

    /// Builds a set whose display names are the tags' canonical names.
    #[must_use]
    pub fn from_tags(tags: &[TypeTag]) -> Self {
        Self {
            entries: tags
                .iter()
                .map(|&tag| NamedType {
                    tag,
                    name: tag.name().to_string(),
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedType> {
        self.entries.iter()
    }

    #[must_use]
    pub fn tags(&self) -> Vec<TypeTag> {
        self.entries.iter().map(|entry| entry.tag).collect()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    /// Runs `visitor` once per entry, in order.
    pub fn for_each<V: TypeVisitor>(&self, visitor: &mut V) -> Vec<V::Output> {
        self.entries
            .iter()
            .map(|entry| entry.tag.dispatch(&entry.name, visitor))
            .collect()
    }

    /// Concatenates two sets, keeping `self` first.
    #[must_use]
    pub fn chain(mut self, other: Self) -> Self {
        self.entries.extend(other.entries);
        self
    }
}

/// Minimal coverage runs representative types only; full coverage is opt-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageLevel {
    #[default]
    Minimal,
    Full,
}

impl CoverageLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Full => "full",
        }
    }

    #[must_use]
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "minimal" | "0" | "false" | "off" | "" => Some(Self::Minimal),
            "full" | "1" | "true" | "on" => Some(Self::Full),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_full(self) -> bool {
        matches!(self, Self::Full)
    }
}

const FULL_CORE_TAGS: &[TypeTag] = &[
    TypeTag::Bool,
    TypeTag::Float,
    TypeTag::Double,
    TypeTag::Char,
    TypeTag::SignedChar,
    TypeTag::UnsignedChar,
    TypeTag::Short,
    TypeTag::UnsignedShort,
    TypeTag::Int,
    TypeTag::UnsignedInt,
    TypeTag::Long,
    TypeTag::UnsignedLong,
    TypeTag::LongLong,
    TypeTag::UnsignedLongLong,
];

const FULL_COMPOSITE_TAGS: &[TypeTag] =
    &[TypeTag::NoCnstr, TypeTag::DefCnstr, TypeTag::NoDefCnstr];

fn generate_canonical(tags: &[TypeTag]) -> NamedTypeSet {
    let names = tags.iter().map(|tag| tag.name()).collect::<Vec<_>>();
    // Same length by construction.
    NamedTypeSet::generate(&names, tags).unwrap_or_default()
}

/// Primitive element types, grouped by sign in full coverage.
#[must_use]
pub fn core_types(level: CoverageLevel) -> NamedTypeSet {
    match level {
        CoverageLevel::Minimal => generate_canonical(&[TypeTag::Int, TypeTag::Float]),
        CoverageLevel::Full => generate_canonical(FULL_CORE_TAGS),
    }
}

/// User-defined element types.
#[must_use]
pub fn composite_types(level: CoverageLevel) -> NamedTypeSet {
    match level {
        CoverageLevel::Minimal => generate_canonical(&[TypeTag::DefCnstr]),
        CoverageLevel::Full => generate_canonical(FULL_COMPOSITE_TAGS),
    }
}

/// Every primitive and user-defined type.
#[must_use]
pub fn exhaustive_types() -> NamedTypeSet {
    core_types(CoverageLevel::Full).chain(composite_types(CoverageLevel::Full))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSpace {
    Global,
    Local,
    Private,
    Generic,
    /// Deprecated; only reachable through the legacy `constant_ptr` alias.
    Constant,
}

impl AddressSpace {
    pub const MODERN: [Self; 4] = [Self::Global, Self::Local, Self::Private, Self::Generic];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global_space",
            Self::Local => "local_space",
            Self::Private => "private_space",
            Self::Generic => "generic_space",
            Self::Constant => "constant_space",
        }
    }

    /// Qualified name used in failure messages.
    #[must_use]
    pub fn qualified_name(self) -> String {
        match self {
            Self::Constant => "unknown or deprecated address_space".to_string(),
            space => format!("access::address_space::{}", space.as_str()),
        }
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decoration {
    Yes,
    No,
    Legacy,
}

impl Decoration {
    pub const MODERN: [Self; 2] = [Self::Yes, Self::No];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "decorated::yes",
            Self::No => "decorated::no",
            Self::Legacy => "decorated::legacy",
        }
    }
}

/// Pointer aliases that pin `Decoration::Legacy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyAlias {
    GlobalPtr,
    LocalPtr,
    PrivatePtr,
    ConstantPtr,
}

impl LegacyAlias {
    pub const ALL: [Self; 4] = [
        Self::GlobalPtr,
        Self::LocalPtr,
        Self::PrivatePtr,
        Self::ConstantPtr,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GlobalPtr => "global_ptr",
            Self::LocalPtr => "local_ptr",
            Self::PrivatePtr => "private_ptr",
            Self::ConstantPtr => "constant_ptr",
        }
    }

    #[must_use]
    pub const fn space(self) -> AddressSpace {
        match self {
            Self::GlobalPtr => AddressSpace::Global,
            Self::LocalPtr => AddressSpace::Local,
            Self::PrivatePtr => AddressSpace::Private,
            Self::ConstantPtr => AddressSpace::Constant,
        }
    }

    #[must_use]
    pub const fn decoration(self) -> Decoration {
        Decoration::Legacy
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AddressSpace, Construction, CoverageLevel, Decoration, LegacyAlias, MatrixType,
        NamedTypeSet, TypeMatrixError, TypeTag, TypeVisitor, composite_types, core_types,
        exhaustive_types,
    };
    use proptest::prelude::*;

    struct SizeVisitor;

    impl TypeVisitor for SizeVisitor {
        type Output = (String, usize, Construction);

        fn visit<T: MatrixType>(&mut self, _tag: TypeTag, name: &str) -> Self::Output {
            (name.to_string(), std::mem::size_of::<T>(), T::CONSTRUCTION)
        }
    }

    #[test]
    fn minimal_generation_keeps_order() {
        let set = NamedTypeSet::generate(&["int", "float"], &[TypeTag::Int, TypeTag::Float])
            .expect("arity matches");
        assert_eq!(set.len(), 2);
        assert_eq!(set.tags(), vec![TypeTag::Int, TypeTag::Float]);
        assert_eq!(set.names(), vec!["int", "float"]);
        assert_eq!(core_types(CoverageLevel::Minimal), set);
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let err = NamedTypeSet::generate(&["int"], &[TypeTag::Int, TypeTag::Float])
            .expect_err("mismatched lengths");
        assert_eq!(err, TypeMatrixError::ArityMismatch { names: 1, tags: 2 });
    }

    #[test]
    fn full_coverage_spans_signedness_widths_and_user_types() {
        let core = core_types(CoverageLevel::Full);
        assert_eq!(core.len(), 14);
        assert!(core.tags().iter().any(|tag| *tag == TypeTag::UnsignedLongLong));
        assert_eq!(composite_types(CoverageLevel::Full).len(), 3);
        assert_eq!(composite_types(CoverageLevel::Minimal).names(), vec!["def_cnstr"]);

        let all = exhaustive_types();
        assert_eq!(all.len(), 17);
        let constructions = all
            .for_each(&mut SizeVisitor)
            .into_iter()
            .map(|(_, _, construction)| construction)
            .collect::<Vec<_>>();
        assert!(constructions.contains(&Construction::Aggregate));
        assert!(constructions.contains(&Construction::DefaultConstructible));
        assert!(constructions.contains(&Construction::NonDefaultConstructible));
    }

    #[test]
    fn dispatch_reaches_concrete_types() {
        let outputs = core_types(CoverageLevel::Minimal).for_each(&mut SizeVisitor);
        assert_eq!(outputs[0], ("int".to_string(), 4, Construction::Trivial));
        assert_eq!(outputs[1], ("float".to_string(), 4, Construction::Trivial));
        let (_, double_size, _) = TypeTag::Double.dispatch("double", &mut SizeVisitor);
        assert_eq!(double_size, 8);
    }

    #[test]
    fn user_types_follow_their_construction_rules() {
        use super::user_def_types::{DefCnstr, NoCnstr, NoDefCnstr};

        let aggregate = NoCnstr::default_value().expect("aggregate can be listed");
        assert_eq!(aggregate, NoCnstr { a: 0, b: 0.0, c: 0 });
        assert_eq!(
            DefCnstr::default_value().map(|value| value.fields()),
            Some((3, 2.0, b'c'))
        );
        assert!(NoDefCnstr::default_value().is_none());
        assert_eq!(NoDefCnstr::new(7).fields().0, 7);
    }

    #[test]
    fn names_parse_back_to_tags() {
        for entry in exhaustive_types().iter() {
            assert_eq!(TypeTag::parse(&entry.name), Some(entry.tag));
        }
        assert_eq!(TypeTag::parse("wchar_t"), None);
    }

    #[test]
    fn coverage_level_wire_values() {
        assert_eq!(CoverageLevel::from_wire("1"), Some(CoverageLevel::Full));
        assert_eq!(CoverageLevel::from_wire("FULL"), Some(CoverageLevel::Full));
        assert_eq!(CoverageLevel::from_wire(""), Some(CoverageLevel::Minimal));
        assert_eq!(CoverageLevel::from_wire("maybe"), None);
    }

    #[test]
    fn address_space_stringification() {
        assert_eq!(
            AddressSpace::Local.to_string(),
            "access::address_space::local_space"
        );
        assert_eq!(
            AddressSpace::Constant.to_string(),
            "unknown or deprecated address_space"
        );
    }

    #[test]
    fn legacy_aliases_pin_the_legacy_decoration() {
        let spaces = LegacyAlias::ALL.map(LegacyAlias::space);
        assert_eq!(
            spaces,
            [
                AddressSpace::Global,
                AddressSpace::Local,
                AddressSpace::Private,
                AddressSpace::Constant
            ]
        );
        assert!(
            LegacyAlias::ALL
                .iter()
                .all(|alias| alias.decoration() == Decoration::Legacy)
        );
    }

    proptest! {
        #[test]
        fn generation_is_idempotent(indices in proptest::collection::vec(0usize..17, 0..24)) {
            let pool = exhaustive_types().tags();
            let tags = indices.iter().map(|&i| pool[i]).collect::<Vec<_>>();
            let names = tags.iter().map(|tag| tag.name()).collect::<Vec<_>>();
            let first = NamedTypeSet::generate(&names, &tags).expect("arity matches");
            let second = NamedTypeSet::generate(&names, &tags).expect("arity matches");
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.tags(), tags);
            prop_assert_eq!(first.names(), names);
        }
    }
}
