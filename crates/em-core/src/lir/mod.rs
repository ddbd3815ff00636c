//! Low-level IR consumed by the native backend: typed registers, basic
//! blocks and explicit memory operations.

pub mod builder;
pub mod layout;
pub mod pretty;
pub mod ty;
pub mod verify;

pub use builder::FunctionBuilder;
pub use ty::Ty;
pub use verify::verify_function;
pub type LirType = Ty;
pub type LirId = u32;
pub type RegisterId = u32;
pub type BasicBlockId = u32;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LirProgram {
    pub functions: Vec<LirFunction>,
    pub globals: Vec<LirGlobal>,
    pub type_definitions: Vec<LirTypeDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LirFunction {
    pub name: String,
    pub signature: LirFunctionSignature,
    /// Empty for external declarations.
    pub basic_blocks: Vec<LirBasicBlock>,
    pub locals: Vec<LirLocal>,
    pub calling_convention: CallingConvention,
    pub linkage: Linkage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LirFunctionSignature {
    pub params: Vec<LirType>,
    pub return_type: LirType,
    pub is_variadic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LirBasicBlock {
    pub id: BasicBlockId,
    pub label: Option<String>,
    pub instructions: Vec<LirInstruction>,
    /// `None` while the block is still open.
    pub terminator: Option<LirTerminator>,
    pub predecessors: Vec<BasicBlockId>,
    pub successors: Vec<BasicBlockId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LirInstruction {
    pub id: LirId,
    pub kind: LirInstructionKind,
    pub type_hint: Option<LirType>,
    pub debug_info: Option<DebugInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LirInstructionKind {
    // Arithmetic operations
    Add(LirValue, LirValue),
    Sub(LirValue, LirValue),
    Mul(LirValue, LirValue),
    Div(LirValue, LirValue),
    UDiv(LirValue, LirValue),
    Rem(LirValue, LirValue),
    URem(LirValue, LirValue),
    Neg(LirValue),

    // Bitwise operations
    And(LirValue, LirValue),
    Or(LirValue, LirValue),
    Xor(LirValue, LirValue),
    Shl(LirValue, LirValue),
    Shr(LirValue, LirValue),
    LShr(LirValue, LirValue),
    Not(LirValue),

    // Comparison operations
    Eq(LirValue, LirValue),
    Ne(LirValue, LirValue),
    Lt(LirValue, LirValue),
    Le(LirValue, LirValue),
    Gt(LirValue, LirValue),
    Ge(LirValue, LirValue),
    ULt(LirValue, LirValue),
    ULe(LirValue, LirValue),
    UGt(LirValue, LirValue),
    UGe(LirValue, LirValue),

    // Memory operations
    Load {
        address: LirValue,
        alignment: Option<u32>,
        volatile: bool,
    },
    Store {
        value: LirValue,
        address: LirValue,
        alignment: Option<u32>,
        volatile: bool,
    },
    Alloca {
        ty: LirType,
        alignment: u32,
    },

    // Pointer operations
    GetElementPtr {
        ptr: LirValue,
        indices: Vec<LirValue>,
        inbounds: bool,
    },
    PtrToInt(LirValue),
    IntToPtr(LirValue),

    // Type conversion operations
    Trunc(LirValue, LirType),
    ZExt(LirValue, LirType),
    SExt(LirValue, LirType),
    FPTrunc(LirValue, LirType),
    FPExt(LirValue, LirType),
    FPToSI(LirValue, LirType),
    SIToFP(LirValue, LirType),
    Bitcast(LirValue, LirType),

    // Aggregate operations
    ExtractValue {
        aggregate: LirValue,
        indices: Vec<u32>,
    },
    InsertValue {
        aggregate: LirValue,
        element: LirValue,
        indices: Vec<u32>,
    },

    // Function operations
    Call {
        function: LirValue,
        args: Vec<LirValue>,
        calling_convention: CallingConvention,
        tail_call: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LirTerminator {
    Return(Option<LirValue>),
    Br(BasicBlockId),
    CondBr {
        condition: LirValue,
        if_true: BasicBlockId,
        if_false: BasicBlockId,
    },
    Unreachable,
}

impl LirTerminator {
    pub fn successors(&self) -> Vec<BasicBlockId> {
        match self {
            LirTerminator::Br(target) => vec![*target],
            LirTerminator::CondBr {
                if_true, if_false, ..
            } => vec![*if_true, *if_false],
            LirTerminator::Return(_) | LirTerminator::Unreachable => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LirValue {
    // Registers/SSA values
    Register(RegisterId),

    // Constants
    Constant(LirConstant),

    // Address of a global; the type is the global's value type
    Global(String, Ty),

    // Function references
    Function(String),

    // Function parameters
    Local(u32),

    // Undefined value
    Undef(LirType),

    // Null pointer
    Null(LirType),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LirConstant {
    Int(i128, LirType),
    UInt(u64, LirType),
    Float(f64, LirType),
    Bool(bool),
    String(String),
    Array(Vec<LirConstant>, LirType),
    Struct(Vec<LirConstant>, LirType),
    Null(LirType),
    Undef(LirType),
    ZeroInitializer(LirType),
}

impl LirConstant {
    pub fn ty(&self) -> LirType {
        match self {
            LirConstant::Int(_, ty)
            | LirConstant::UInt(_, ty)
            | LirConstant::Float(_, ty)
            | LirConstant::Null(ty)
            | LirConstant::Undef(ty)
            | LirConstant::ZeroInitializer(ty)
            | LirConstant::Struct(_, ty) => ty.clone(),
            LirConstant::Array(items, elem) => Ty::Array(Box::new(elem.clone()), items.len() as u64),
            LirConstant::Bool(_) => Ty::I1,
            LirConstant::String(s) => Ty::Array(Box::new(Ty::I8), s.len() as u64 + 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LirGlobal {
    pub name: String,
    pub ty: LirType,
    pub initializer: Option<LirConstant>,
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub is_constant: bool,
    pub alignment: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LirTypeDefinition {
    pub name: String,
    pub ty: LirType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LirLocal {
    pub id: u32,
    pub ty: LirType,
    pub name: Option<String>,
    pub is_argument: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    #[default]
    C,
    Fast,
    Cold,
    X86_64SysV,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Linkage {
    #[default]
    External,
    LinkOnceAny,
    LinkOnceOdr,
    Internal,
    Private,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Visibility {
    #[default]
    Default,
    Hidden,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugInfo {
    pub file: String,
    pub line: u32,
}

// Implementation helpers
impl LirProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, function: LirFunction) {
        self.functions.push(function);
    }

    pub fn add_global(&mut self, global: LirGlobal) {
        self.globals.push(global);
    }

    pub fn function(&self, name: &str) -> Option<&LirFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&LirGlobal> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Number of definitions (functions with a body) under `name`.
    pub fn definition_count(&self, name: &str) -> usize {
        self.functions
            .iter()
            .filter(|f| f.name == name && !f.is_declaration())
            .count()
    }
}

impl LirFunction {
    pub fn new(
        name: impl Into<String>,
        signature: LirFunctionSignature,
        calling_convention: CallingConvention,
        linkage: Linkage,
    ) -> Self {
        Self {
            name: name.into(),
            signature,
            basic_blocks: Vec::new(),
            locals: Vec::new(),
            calling_convention,
            linkage,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.basic_blocks.is_empty()
    }

    pub fn get_basic_block(&self, id: BasicBlockId) -> Option<&LirBasicBlock> {
        self.basic_blocks.iter().find(|bb| bb.id == id)
    }

    pub fn get_basic_block_mut(&mut self, id: BasicBlockId) -> Option<&mut LirBasicBlock> {
        self.basic_blocks.iter_mut().find(|bb| bb.id == id)
    }

    pub fn instructions(&self) -> impl Iterator<Item = &LirInstruction> {
        self.basic_blocks.iter().flat_map(|bb| bb.instructions.iter())
    }
}

impl LirBasicBlock {
    pub fn new(id: BasicBlockId, label: Option<String>) -> Self {
        Self {
            id,
            label,
            instructions: Vec::new(),
            terminator: None,
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }
}

impl LirInstruction {
    pub fn new(id: LirId, kind: LirInstructionKind) -> Self {
        Self {
            id,
            kind,
            type_hint: None,
            debug_info: None,
        }
    }

    pub fn with_type(mut self, ty: LirType) -> Self {
        self.type_hint = Some(ty);
        self
    }
}

impl LirType {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            LirType::I1 | LirType::I8 | LirType::I16 | LirType::I32 | LirType::I64 | LirType::I128
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            LirType::F16 | LirType::BF16 | LirType::F32 | LirType::F64 | LirType::F128
        )
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, LirType::Ptr(_))
    }
}
