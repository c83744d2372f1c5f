//! IR Modules
//!
//! The unit of compilation: struct types, globals and functions, each kept in
//! insertion order so printing is deterministic.

use super::{IrConstant, IrFunction, IrType, IrValue, Linkage};
use fxhash::FxHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Size of a pointer in bytes on the supported 64-bit targets
pub const POINTER_SIZE: u64 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrGlobal {
    pub name: String,
    pub ty: IrType,
    pub initializer: IrConstant,
    pub is_constant: bool,
    pub linkage: Linkage,
    pub unnamed_addr: bool,
    pub align: Option<u32>,
}

impl IrGlobal {
    /// Mutable module-level variable
    pub fn variable(name: impl Into<String>, ty: IrType, initializer: IrConstant) -> Self {
        Self {
            name: name.into(),
            ty,
            initializer,
            is_constant: false,
            linkage: Linkage::External,
            unnamed_addr: false,
            align: None,
        }
    }

    /// Read-only module-level constant
    pub fn constant(name: impl Into<String>, ty: IrType, initializer: IrConstant) -> Self {
        Self {
            is_constant: true,
            ..Self::variable(name, ty, initializer)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrModule {
    pub name: String,
    pub target_triple: Option<String>,

    /// Named struct types; `None` while opaque
    pub struct_types: IndexMap<String, Option<Vec<IrType>>>,

    pub globals: IndexMap<String, IrGlobal>,

    /// Definitions and declarations
    pub functions: IndexMap<String, IrFunction>,

    /// Interned string constants, text -> global name
    #[serde(skip)]
    string_pool: FxHashMap<String, String>,
}

impl IrModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_triple: None,
            struct_types: IndexMap::new(),
            globals: IndexMap::new(),
            functions: IndexMap::new(),
            string_pool: FxHashMap::default(),
        }
    }

    // === Struct types ===

    /// Declare an opaque struct type; no-op if it already exists
    pub fn declare_struct(&mut self, name: impl Into<String>) {
        self.struct_types.entry(name.into()).or_insert(None);
    }

    pub fn set_struct_body(&mut self, name: impl Into<String>, fields: Vec<IrType>) {
        self.struct_types.insert(name.into(), Some(fields));
    }

    pub fn has_struct(&self, name: &str) -> bool {
        self.struct_types.contains_key(name)
    }

    /// Field types of a struct with a body
    pub fn struct_fields(&self, name: &str) -> Option<&[IrType]> {
        self.struct_types
            .get(name)
            .and_then(|body| body.as_deref())
    }

    // === Globals ===

    pub fn add_global(&mut self, global: IrGlobal) {
        self.globals.insert(global.name.clone(), global);
    }

    pub fn get_global(&self, name: &str) -> Option<&IrGlobal> {
        self.globals.get(name)
    }

    /// Intern a NUL-terminated string constant and return its global name
    pub fn add_string_constant(&mut self, text: &str) -> String {
        if let Some(name) = self.string_pool.get(text) {
            return name.clone();
        }

        let name = format!(".str.{}", self.string_pool.len());
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        let ty = IrType::Array(Box::new(IrType::I8), bytes.len());

        let mut global = IrGlobal::constant(name.clone(), ty, IrConstant::Bytes(bytes));
        global.linkage = Linkage::Private;
        global.unnamed_addr = true;
        self.add_global(global);

        self.string_pool.insert(text.to_string(), name.clone());
        name
    }

    // === Functions ===

    pub fn add_function(&mut self, function: IrFunction) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn get_function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.get(name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut IrFunction> {
        self.functions.get_mut(name)
    }

    // === Data layout ===

    /// Allocation size in bytes, including tail padding
    pub fn size_of(&self, ty: &IrType) -> u64 {
        match ty {
            IrType::Void | IrType::Function { .. } => 0,
            IrType::I1 | IrType::I8 => 1,
            IrType::I32 => 4,
            IrType::I64 | IrType::Ptr(_) => POINTER_SIZE,
            IrType::Array(element, count) => self.size_of(element) * *count as u64,
            IrType::Struct(name) => {
                let fields = match self.struct_fields(name) {
                    Some(fields) => fields,
                    None => return 0,
                };
                let mut offset = 0;
                for field in fields {
                    offset = align_to(offset, self.align_of(field));
                    offset += self.size_of(field);
                }
                align_to(offset, self.align_of(ty))
            }
        }
    }

    pub fn align_of(&self, ty: &IrType) -> u64 {
        match ty {
            IrType::Array(element, _) => self.align_of(element),
            IrType::Struct(name) => self
                .struct_fields(name)
                .map(|fields| fields.iter().map(|f| self.align_of(f)).max().unwrap_or(1))
                .unwrap_or(1),
            IrType::Void | IrType::Function { .. } => 1,
            other => self.size_of(other).max(1),
        }
    }

    /// Type of an operand as seen from inside `function`
    pub fn type_of_value(&self, function: Option<&IrFunction>, value: &IrValue) -> Option<IrType> {
        match value {
            IrValue::Reg(id) => function.and_then(|f| f.register_type(*id)).cloned(),
            IrValue::Int { ty, .. } | IrValue::Null(ty) | IrValue::Undef(ty) => Some(ty.clone()),
            IrValue::Global(name) => self.get_global(name).map(|g| g.ty.pointer_to()),
            IrValue::Function(name) => self
                .get_function(name)
                .map(|f| f.function_type().pointer_to()),
            IrValue::Str(_) => Some(IrType::byte_ptr()),
        }
    }
}

fn align_to(offset: u64, align: u64) -> u64 {
    if align <= 1 {
        offset
    } else {
        offset.div_ceil(align) * align
    }
}
