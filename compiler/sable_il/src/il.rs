//! Intermediate language data model
//!
//! A module holds globals, imports, exports and functions; a function owns
//! its basic blocks; a block owns its instructions. Cross-function
//! references go by name, never by pointer. Every virtual register has
//! exactly one IL type, fixed at creation, and every register ID comes
//! from the owning function's single monotonic allocator.

use hashbrown::HashMap;
use sable_common::{Metadata, Span};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Globally-unique (per function) virtual register ID.
pub type ValueId = u32;
/// Basic-block ID; doubles as the index into the function's block list.
pub type BlockId = u32;
/// Instruction ID, unique within its function.
pub type InstId = u32;
/// Pre-SSA local-variable slot.
pub type VarId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IlType {
    Byte,
    Word,
    Bool,
    Void,
    /// 16-bit address.
    Pointer,
    Array {
        element: Box<IlType>,
        len: Option<u16>,
    },
    Function {
        params: Vec<IlType>,
        ret: Box<IlType>,
    },
}

impl IlType {
    pub fn size_in_bytes(&self) -> u32 {
        match self {
            IlType::Byte | IlType::Bool => 1,
            IlType::Word | IlType::Pointer | IlType::Function { .. } => 2,
            IlType::Void => 0,
            IlType::Array { element, len } => {
                element.size_in_bytes() * len.map(u32::from).unwrap_or(0)
            }
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, IlType::Byte | IlType::Word)
    }
}

impl fmt::Display for IlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IlType::Byte => write!(f, "byte"),
            IlType::Word => write!(f, "word"),
            IlType::Bool => write!(f, "bool"),
            IlType::Void => write!(f, "void"),
            IlType::Pointer => write!(f, "ptr"),
            IlType::Array { element, len: Some(n) } => write!(f, "{}[{}]", element, n),
            IlType::Array { element, len: None } => write!(f, "{}[]", element),
            IlType::Function { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, "): {}", ret)
            }
        }
    }
}

/// A typed virtual register with an optional debug name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Register {
    pub id: ValueId,
    pub ty: IlType,
    pub name: Option<String>,
}

/// An immediate value with its IL type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub value: i64,
    pub ty: IlType,
}

impl Constant {
    pub fn byte(value: i64) -> Self {
        Self { value, ty: IlType::Byte }
    }

    pub fn word(value: i64) -> Self {
        Self { value, ty: IlType::Word }
    }

    pub fn zero(ty: IlType) -> Self {
        Self { value: 0, ty }
    }
}

/// An instruction operand: a register reference or an immediate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Reg(ValueId),
    Imm(Constant),
}

impl Value {
    pub fn as_reg(&self) -> Option<ValueId> {
        match self {
            Value::Reg(id) => Some(*id),
            Value::Imm(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryIlOp {
    Neg,
    /// Logical not over a Bool operand.
    Not,
    BitNot,
    /// Byte → word widening.
    Zext,
    /// Word → byte narrowing.
    Trunc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryIlOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Opaque single-instruction CPU operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuOp {
    Sei,
    Cli,
    Nop,
    Brk,
    Pha,
    /// The only one with a result (byte).
    Pla,
    Php,
    Plp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstKind {
    /// Constant load.
    Const(Constant),
    /// Register-to-register move; carries pre-SSA variable versions.
    Copy(Value),
    Unary {
        op: UnaryIlOp,
        operand: Value,
    },
    Binary {
        op: BinaryIlOp,
        lhs: Value,
        rhs: Value,
    },
    Cmp {
        op: CmpOp,
        lhs: Value,
        rhs: Value,
    },
    LoadGlobal {
        name: String,
    },
    StoreGlobal {
        name: String,
        value: Value,
    },
    /// Address of a global, for array indexing and `@`.
    AddrOfGlobal {
        name: String,
    },
    AddrOfFunction {
        name: String,
    },
    /// 8-bit load at a computed address.
    Peek {
        addr: Value,
    },
    Poke {
        addr: Value,
        value: Value,
    },
    /// 16-bit little-endian load.
    PeekW {
        addr: Value,
    },
    PokeW {
        addr: Value,
        value: Value,
    },
    /// Like Peek/Poke but never CSE'd or reordered by the optimizer.
    VolatileRead {
        addr: Value,
    },
    VolatileWrite {
        addr: Value,
        value: Value,
    },
    Call {
        callee: String,
        args: Vec<Value>,
    },
    CallIndirect {
        target: Value,
        args: Vec<Value>,
    },
    Return(Value),
    ReturnVoid,
    Jump(BlockId),
    Branch {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// One source per predecessor, filled in during SSA renaming.
    Phi {
        sources: Vec<(Value, BlockId)>,
    },
    Cpu(CpuOp),
    /// Optimization barrier; codegen must not move memory ops across it.
    Barrier,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Return(_) | InstKind::ReturnVoid | InstKind::Jump(_) | InstKind::Branch { .. }
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi { .. })
    }

    /// Branch targets of a terminator.
    pub fn targets(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            InstKind::Jump(target) => SmallVec::from_slice(&[*target]),
            InstKind::Branch { then_block, else_block, .. } => {
                SmallVec::from_slice(&[*then_block, *else_block])
            }
            _ => SmallVec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: InstId,
    pub kind: InstKind,
    pub result: Option<ValueId>,
    pub span: Span,
    pub metadata: Metadata,
}

impl Instruction {
    /// Operand values in a deterministic order (phi sources included).
    pub fn operands(&self) -> SmallVec<[&Value; 4]> {
        let mut out = SmallVec::new();
        match &self.kind {
            InstKind::Const(_)
            | InstKind::LoadGlobal { .. }
            | InstKind::AddrOfGlobal { .. }
            | InstKind::AddrOfFunction { .. }
            | InstKind::ReturnVoid
            | InstKind::Jump(_)
            | InstKind::Cpu(_)
            | InstKind::Barrier => {}
            InstKind::Copy(v) | InstKind::Unary { operand: v, .. } | InstKind::Return(v) => {
                out.push(v)
            }
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => {
                out.push(lhs);
                out.push(rhs);
            }
            InstKind::StoreGlobal { value, .. } => out.push(value),
            InstKind::Peek { addr } | InstKind::PeekW { addr } | InstKind::VolatileRead { addr } => {
                out.push(addr)
            }
            InstKind::Poke { addr, value }
            | InstKind::PokeW { addr, value }
            | InstKind::VolatileWrite { addr, value } => {
                out.push(addr);
                out.push(value);
            }
            InstKind::Call { args, .. } => out.extend(args.iter()),
            InstKind::CallIndirect { target, args } => {
                out.push(target);
                out.extend(args.iter());
            }
            InstKind::Branch { cond, .. } => out.push(cond),
            InstKind::Phi { sources } => out.extend(sources.iter().map(|(v, _)| v)),
        }
        out
    }

    /// Mutable view of the same operands, in the same order.
    pub fn operands_mut(&mut self) -> SmallVec<[&mut Value; 4]> {
        let mut out = SmallVec::new();
        match &mut self.kind {
            InstKind::Const(_)
            | InstKind::LoadGlobal { .. }
            | InstKind::AddrOfGlobal { .. }
            | InstKind::AddrOfFunction { .. }
            | InstKind::ReturnVoid
            | InstKind::Jump(_)
            | InstKind::Cpu(_)
            | InstKind::Barrier => {}
            InstKind::Copy(v) | InstKind::Unary { operand: v, .. } | InstKind::Return(v) => {
                out.push(v)
            }
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => {
                out.push(lhs);
                out.push(rhs);
            }
            InstKind::StoreGlobal { value, .. } => out.push(value),
            InstKind::Peek { addr } | InstKind::PeekW { addr } | InstKind::VolatileRead { addr } => {
                out.push(addr)
            }
            InstKind::Poke { addr, value }
            | InstKind::PokeW { addr, value }
            | InstKind::VolatileWrite { addr, value } => {
                out.push(addr);
                out.push(value);
            }
            InstKind::Call { args, .. } => out.extend(args.iter_mut()),
            InstKind::CallIndirect { target, args } => {
                out.push(target);
                out.extend(args.iter_mut());
            }
            InstKind::Branch { cond, .. } => out.push(cond),
            InstKind::Phi { sources } => out.extend(sources.iter_mut().map(|(v, _)| v)),
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
}

impl BasicBlock {
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.kind.is_terminator())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator().is_some()
    }

    /// Number of leading phi instructions.
    pub fn phi_count(&self) -> usize {
        self.instructions.iter().take_while(|i| i.kind.is_phi()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: IlType,
    /// Pre-allocated register, defined at function entry.
    pub register: ValueId,
}

/// Pre-SSA bookkeeping for register-allocated locals, produced by the
/// lowerer and consumed (then cleared) by SSA construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalVars {
    /// VarId → (debug name, type).
    pub slots: Vec<(String, IlType)>,
    /// Parameters seeded as definitions at entry.
    pub params: Vec<(VarId, ValueId)>,
    /// Blocks containing at least one assignment per variable.
    pub def_blocks: HashMap<VarId, Vec<BlockId>>,
    /// Instructions whose result defines a variable version.
    pub def_insts: HashMap<InstId, VarId>,
    /// Variable reads: instruction → (operand index, variable).
    pub use_sites: HashMap<InstId, Vec<(usize, VarId)>>,
}

impl LocalVars {
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn add_slot(&mut self, name: &str, ty: IlType) -> VarId {
        let id = self.slots.len() as VarId;
        self.slots.push((name.to_string(), ty));
        id
    }

    pub fn record_def(&mut self, var: VarId, block: BlockId, inst: InstId) {
        let blocks = self.def_blocks.entry(var).or_default();
        if !blocks.contains(&block) {
            blocks.push(block);
        }
        self.def_insts.insert(inst, var);
    }

    pub fn record_use(&mut self, inst: InstId, operand_index: usize, var: VarId) {
        self.use_sites.entry(inst).or_default().push((operand_index, var));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: IlType,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub is_exported: bool,
    /// Callback functions become interrupt handlers in codegen.
    pub is_interrupt: bool,
    pub is_stub: bool,
    /// Register table: id → type and debug name.
    pub registers: HashMap<ValueId, Register>,
    pub locals: LocalVars,
    next_value: u32,
    next_inst: u32,
}

impl Function {
    pub fn new(
        name: &str,
        params: Vec<(String, IlType)>,
        return_type: IlType,
        is_exported: bool,
        is_interrupt: bool,
        is_stub: bool,
    ) -> Self {
        let mut func = Self {
            name: name.to_string(),
            params: Vec::new(),
            return_type,
            blocks: Vec::new(),
            entry: 0,
            is_exported,
            is_interrupt,
            is_stub,
            registers: HashMap::new(),
            locals: LocalVars::default(),
            next_value: 0,
            next_inst: 0,
        };
        func.entry = func.add_block("entry");
        for (param_name, ty) in params {
            let register = func.alloc_register(ty.clone(), Some(&param_name));
            func.params.push(Parameter { name: param_name, ty, register });
        }
        func
    }

    /// The single per-function monotonic register allocator. Every virtual
    /// register ID in this function comes from here.
    pub fn alloc_register(&mut self, ty: IlType, name: Option<&str>) -> ValueId {
        let id = self.next_value;
        self.next_value += 1;
        self.registers.insert(
            id,
            Register { id, ty, name: name.map(str::to_string) },
        );
        id
    }

    pub fn register_type(&self, id: ValueId) -> Option<&IlType> {
        self.registers.get(&id).map(|r| &r.ty)
    }

    pub fn value_type(&self, value: &Value) -> Option<IlType> {
        match value {
            Value::Reg(id) => self.register_type(*id).cloned(),
            Value::Imm(c) => Some(c.ty.clone()),
        }
    }

    pub fn add_block(&mut self, label: &str) -> BlockId {
        let id = self.blocks.len() as BlockId;
        self.blocks.push(BasicBlock {
            id,
            label: format!("{}_{}", label, id),
            instructions: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
        });
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id as usize]
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        let from_block = &mut self.blocks[from as usize];
        if !from_block.succs.contains(&to) {
            from_block.succs.push(to);
        }
        let to_block = &mut self.blocks[to as usize];
        if !to_block.preds.contains(&from) {
            to_block.preds.push(from);
        }
    }

    /// Append an instruction to `block`, allocating its ID.
    pub fn push_instruction(
        &mut self,
        block: BlockId,
        kind: InstKind,
        result: Option<ValueId>,
        span: Span,
    ) -> InstId {
        let id = self.next_inst;
        self.next_inst += 1;
        for target in kind.targets() {
            self.add_edge(block, target);
        }
        self.blocks[block as usize].instructions.push(Instruction {
            id,
            kind,
            result,
            span,
            metadata: Metadata::new(),
        });
        id
    }

    /// Insert a phi at the top of `block`.
    pub fn insert_phi(&mut self, block: BlockId, result: ValueId, span: Span) -> InstId {
        let id = self.next_inst;
        self.next_inst += 1;
        self.blocks[block as usize].instructions.insert(
            0,
            Instruction {
                id,
                kind: InstKind::Phi { sources: Vec::new() },
                result: Some(result),
                span,
                metadata: Metadata::new(),
            },
        );
        id
    }

    pub fn register_count(&self) -> u32 {
        self.next_value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    ZeroPage,
    Ram,
    Data,
    /// Fixed-address memory-mapped register; `address` is required.
    Map,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GlobalInit {
    Scalar(i64),
    Array(Vec<i64>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: IlType,
    pub storage: StorageClass,
    pub initial: Option<GlobalInit>,
    /// Required for `Map`, forbidden otherwise.
    pub address: Option<u16>,
    pub is_exported: bool,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IlImport {
    pub name: String,
    pub module_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportKind {
    Function,
    Variable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IlExport {
    pub local_name: String,
    pub export_name: String,
    pub kind: ExportKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub globals: Vec<GlobalVariable>,
    pub imports: Vec<IlImport>,
    pub exports: Vec<IlExport>,
    pub functions: Vec<Function>,
    functions_by_name: HashMap<String, usize>,
    pub entry_point: Option<String>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            globals: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            functions: Vec::new(),
            functions_by_name: HashMap::new(),
            entry_point: None,
        }
    }

    pub fn add_function(&mut self, func: Function) {
        self.functions_by_name.insert(func.name.clone(), self.functions.len());
        self.functions.push(func);
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions_by_name.get(name).map(|&i| &self.functions[i])
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        let index = *self.functions_by_name.get(name)?;
        self.functions.get_mut(index)
    }

    pub fn global(&self, name: &str) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| g.name == name)
    }
}
