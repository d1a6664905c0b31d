use crate::ast::*;

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct MemberLayout {
    pub name: Identifier,
    pub mtype: Type,
    pub offset: u64,
}

/// Struct/union layout, computed once per tag at definition time.
#[derive(Debug, Clone)]
pub struct RecordLayout {
    pub is_union: bool,
    pub members: Vec<MemberLayout>,
    pub size: u64,
    pub align: u64,
}

impl RecordLayout {
    pub fn member(&self, name: &str) -> Option<&MemberLayout> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StaticItem {
    Scalar { width: Width, value: i64 },
    Zero(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StaticInit {
    /// Uninitialized or tentative definition: `.bss`, zero-filled.
    Zero(u64),
    Scalar {
        width: Width,
        value: i64,
    },
    /// Pointer global initialized with the address of a string literal.
    StringPtr(Identifier),
    /// Brace-initialized aggregate: scalars and padding in layout order.
    Items(Vec<StaticItem>),
}

#[derive(Debug, Clone)]
pub struct StaticVariable {
    pub name: Identifier,
    pub global: bool,
    pub align: u64,
    pub init: StaticInit,
}

#[derive(Debug, Clone)]
pub enum SymbolKind {
    Local { is_register: bool },
    Static { global: bool, defined: bool },
    Fun { global: bool, defined: bool },
    EnumConst(i64),
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub sym_type: Type,
    pub kind: SymbolKind,
}

impl Symbol {
    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(self.kind, SymbolKind::Local { .. })
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        matches!(self.kind, SymbolKind::Static { .. })
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self.kind, SymbolKind::Fun { .. })
    }

    #[inline]
    pub fn is_register(&self) -> bool {
        matches!(self.kind, SymbolKind::Local { is_register: true })
    }

    pub fn enum_value(&self) -> Option<i64> {
        match self.kind {
            SymbolKind::EnumConst(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub loc: Loc,
    pub message: String,
}

/// Everything semantic analysis learns about a translation unit and the
/// later phases consume: symbols, layouts, typedefs, enum constants, the
/// string-literal table and global initializers. One value per compile;
/// nothing outlives the invocation.
#[derive(Debug, Default)]
pub struct Env {
    pub symbols: HashMap<Identifier, Symbol>,
    pub layouts: HashMap<Identifier, RecordLayout>,
    pub typedefs: HashMap<Identifier, Type>,
    pub enum_consts: HashMap<Identifier, i64>,
    pub warnings: Vec<Warning>,
    strings: Vec<(Identifier, Vec<u8>)>,
    string_index: HashMap<Vec<u8>, usize>,
    statics: Vec<StaticVariable>,
    static_index: HashMap<Identifier, usize>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn add_symbol(&mut self, name: Identifier, sym: Symbol) {
        self.symbols.insert(name, sym);
    }

    pub fn warn(&mut self, loc: Loc, message: impl Into<String>) {
        self.warnings.push(Warning {
            loc,
            message: message.into(),
        });
    }

    /// Returns the `.rodata` label for the payload, interning it on first use.
    pub fn intern_string(&mut self, bytes: &[u8]) -> Identifier {
        if let Some(idx) = self.string_index.get(bytes) {
            return self.strings[*idx].0.clone();
        }
        let label = format!(".Lstr{}", self.strings.len());
        self.string_index.insert(bytes.to_vec(), self.strings.len());
        self.strings.push((label.clone(), bytes.to_vec()));
        label
    }

    pub fn string_literals(&self) -> &[(Identifier, Vec<u8>)] {
        &self.strings
    }

    /// Registers or replaces a file-scope object definition, keeping the
    /// first-seen order for emission.
    pub fn register_static(&mut self, var: StaticVariable) {
        if let Some(idx) = self.static_index.get(&var.name) {
            self.statics[*idx] = var;
        } else {
            self.static_index.insert(var.name.clone(), self.statics.len());
            self.statics.push(var);
        }
    }

    pub fn static_variables(&self) -> &[StaticVariable] {
        &self.statics
    }

    /// Resolves typedef aliases down to a concrete type. The const
    /// qualifier of the alias use is kept.
    pub fn resolve(&self, t: &Type) -> Type {
        let mut result = t.clone();
        let mut depth = 0;
        while let TypeKind::Alias(name) = &result.kind {
            let Some(aliased) = self.typedefs.get(name) else {
                break;
            };
            let is_const = result.is_const || aliased.is_const;
            result = aliased.clone();
            result.is_const = is_const;
            depth += 1;
            if depth > 64 {
                break;
            }
        }
        result
    }

    pub fn align_of(&self, t: &Type) -> Option<u64> {
        let t = self.resolve(t);
        match &t.kind {
            TypeKind::Int { kind, .. } => Some(kind.size()),
            TypeKind::Pointer(_) => Some(8),
            TypeKind::Array(elem, _) => self.align_of(elem),
            TypeKind::Struct(tag) | TypeKind::Union(tag) => {
                self.layouts.get(tag).map(|l| l.align)
            }
            TypeKind::Void | TypeKind::Fun(_) | TypeKind::Alias(_) => None,
        }
    }

    pub fn size_of(&self, t: &Type) -> Option<u64> {
        let t = self.resolve(t);
        match &t.kind {
            TypeKind::Int { kind, .. } => Some(kind.size()),
            TypeKind::Pointer(_) => Some(8),
            TypeKind::Array(elem, Some(n)) => self.size_of(elem).map(|s| s * n),
            TypeKind::Array(_, None) => None,
            TypeKind::Struct(tag) | TypeKind::Union(tag) => self.layouts.get(tag).map(|l| l.size),
            TypeKind::Void | TypeKind::Fun(_) | TypeKind::Alias(_) => None,
        }
    }

    /// Access width of a scalar type.
    pub fn width_of(&self, t: &Type) -> Width {
        self.size_of(t).map_or(Width::B8, Width::from_size)
    }

    pub fn is_signed(&self, t: &Type) -> bool {
        self.resolve(t).is_signed()
    }

    pub fn layout_of(&self, t: &Type) -> Option<&RecordLayout> {
        match &self.resolve(t).kind {
            TypeKind::Struct(tag) | TypeKind::Union(tag) => self.layouts.get(tag),
            _ => None,
        }
    }
}

pub fn round_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}
