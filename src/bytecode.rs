// File: src/bytecode.rs
//
// Bytecode instruction definitions and structures for the Slate VM.
// Defines the value types, the OpCode enum representing all bytecode
// instructions, and the Instruction/Operand pair the compiler emits and
// the VM executes.

use serde::Serialize;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

/// Two packed ints, the value behind the `ivec2` source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Int2 {
    pub x: i32,
    pub y: i32,
}

/// Two packed floats, the value behind the `vec2` source type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Float2 {
    pub x: f32,
    pub y: f32,
}

impl Int2 {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Float2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Int2 {
    type Output = Int2;
    fn add(self, r: Int2) -> Int2 {
        Int2::new(self.x + r.x, self.y + r.y)
    }
}

impl Sub for Int2 {
    type Output = Int2;
    fn sub(self, r: Int2) -> Int2 {
        Int2::new(self.x - r.x, self.y - r.y)
    }
}

impl Mul for Int2 {
    type Output = Int2;
    fn mul(self, r: Int2) -> Int2 {
        Int2::new(self.x * r.x, self.y * r.y)
    }
}

impl Div for Int2 {
    type Output = Int2;
    fn div(self, r: Int2) -> Int2 {
        Int2::new(self.x / r.x, self.y / r.y)
    }
}

impl Mul<i32> for Int2 {
    type Output = Int2;
    fn mul(self, r: i32) -> Int2 {
        Int2::new(self.x * r, self.y * r)
    }
}

impl Div<i32> for Int2 {
    type Output = Int2;
    fn div(self, r: i32) -> Int2 {
        Int2::new(self.x / r, self.y / r)
    }
}

impl Add for Float2 {
    type Output = Float2;
    fn add(self, r: Float2) -> Float2 {
        Float2::new(self.x + r.x, self.y + r.y)
    }
}

impl Sub for Float2 {
    type Output = Float2;
    fn sub(self, r: Float2) -> Float2 {
        Float2::new(self.x - r.x, self.y - r.y)
    }
}

impl Mul for Float2 {
    type Output = Float2;
    fn mul(self, r: Float2) -> Float2 {
        Float2::new(self.x * r.x, self.y * r.y)
    }
}

impl Div for Float2 {
    type Output = Float2;
    fn div(self, r: Float2) -> Float2 {
        Float2::new(self.x / r.x, self.y / r.y)
    }
}

impl Mul<f32> for Float2 {
    type Output = Float2;
    fn mul(self, r: f32) -> Float2 {
        Float2::new(self.x * r, self.y * r)
    }
}

impl Div<f32> for Float2 {
    type Output = Float2;
    fn div(self, r: f32) -> Float2 {
        Float2::new(self.x / r, self.y / r)
    }
}

/// Value types of the source language.
///
/// The `u8` discriminant doubles as the stack tag byte and the image
/// encoding, so the declaration order is part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Type {
    /// Only valid as a function return type.
    Void,
    String,
    Bool,
    Int,
    Float,
    Int2,
    Float2,
}

const TYPE_NAMES: [&str; 7] = ["VOID", "STRING", "BOOL", "INT", "FLOAT", "INT2", "FLOAT2"];

const ALL_TYPES: [Type; 7] = [
    Type::Void,
    Type::String,
    Type::Bool,
    Type::Int,
    Type::Float,
    Type::Int2,
    Type::Float2,
];

impl Type {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Type> {
        ALL_TYPES.get(tag as usize).copied()
    }

    /// Maps a source type token to its value type.
    pub fn from_keyword(name: &str) -> Option<Type> {
        match name {
            "void" => Some(Type::Void),
            "string" => Some(Type::String),
            "bool" => Some(Type::Bool),
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "ivec2" => Some(Type::Int2),
            "vec2" => Some(Type::Float2),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", TYPE_NAMES[*self as usize])
    }
}

/// A literal value. Equality is structural.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    String(String),
    Bool(bool),
    Int(i32),
    Float(f32),
    Int2(Int2),
    Float2(Float2),
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::String(_) => Type::String,
            Literal::Bool(_) => Type::Bool,
            Literal::Int(_) => Type::Int,
            Literal::Float(_) => Type::Float,
            Literal::Int2(_) => Type::Int2,
            Literal::Float2(_) => Type::Float2,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Literal::String(value) => write!(f, "\"{}\"", value),
            Literal::Bool(value) => write!(f, "{}", value),
            Literal::Int(value) => write!(f, "{}", value),
            Literal::Float(value) => write!(f, "{}", value),
            Literal::Int2(value) => write!(f, "({}, {})", value.x, value.y),
            Literal::Float2(value) => write!(f, "({}, {})", value.x, value.y),
        }
    }
}

/// Source-level binary operators, before resolution against operand types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
}

impl BinaryOperator {
    pub fn from_symbol(symbol: &str) -> Option<BinaryOperator> {
        match symbol {
            "+" => Some(BinaryOperator::Add),
            "-" => Some(BinaryOperator::Subtract),
            "*" => Some(BinaryOperator::Multiply),
            "/" => Some(BinaryOperator::Divide),
            "==" => Some(BinaryOperator::Equal),
            "!=" => Some(BinaryOperator::NotEqual),
            "<" => Some(BinaryOperator::LessThan),
            ">" => Some(BinaryOperator::GreaterThan),
            "<=" => Some(BinaryOperator::LessThanEqual),
            ">=" => Some(BinaryOperator::GreaterThanEqual),
            _ => None,
        }
    }
}

/// Source-level unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOperator {
    Not,
    Negate,
}

impl UnaryOperator {
    pub fn from_symbol(symbol: &str) -> Option<UnaryOperator> {
        match symbol {
            "!" => Some(UnaryOperator::Not),
            "-" => Some(UnaryOperator::Negate),
            _ => None,
        }
    }
}

/// Bytecode instruction opcodes for the Slate VM.
///
/// Each arithmetic and comparison opcode is specialized per operand type;
/// the compiler's operator tables pick the specialization so the VM never
/// inspects types on the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum OpCode {
    /// Backpatch target only. Executing one is a compiler bug.
    Placeholder,

    /// Force the program counter past the end of the operations.
    Halt,

    // === Stack Operations ===
    /// Push a literal operand onto the stack.
    PushLiteral,

    /// Push a named variable's current value onto the stack.
    PushVariable,

    /// Pop the top value and store it under the operand's name.
    StoreVariable,

    /// Pop the top value and discard it.
    Pop,

    // === Control Flow ===
    /// Push the program counter and jump to a function's first instruction.
    CallFunction,

    /// Marshal arguments off the stack into a host procedure.
    CallFunctionExternal,

    /// Return to the saved call site, or halt if the call stack is empty.
    Return,

    /// Unconditional transfer to the operand's code index.
    Jump,

    /// Pop a bool and transfer iff it is false.
    JumpIfFalse,

    // === Unary Operations ===
    NotBool,
    NegateInt,
    NegateFloat,

    // === Arithmetic ===
    AddInt,
    AddFloat,
    AddInt2,
    AddFloat2,

    SubtractInt,
    SubtractFloat,
    SubtractInt2,
    SubtractFloat2,

    MultiplyInt,
    MultiplyFloat,
    MultiplyInt2,
    MultiplyInt2Int,
    MultiplyFloat2,
    MultiplyFloat2Float,

    DivideInt,
    DivideFloat,
    DivideInt2,
    DivideInt2Int,
    DivideFloat2,
    DivideFloat2Float,

    // === Comparison ===
    EqualsString,
    EqualsBool,
    EqualsInt,
    EqualsInt2,
    EqualsFloat,
    EqualsFloat2,

    NotEqualsString,
    NotEqualsBool,
    NotEqualsInt,
    NotEqualsInt2,
    NotEqualsFloat,
    NotEqualsFloat2,

    LessThanInt,
    LessThanFloat,

    GreaterThanInt,
    GreaterThanFloat,

    LessThanEqualsInt,
    LessThanEqualsFloat,

    GreaterThanEqualsInt,
    GreaterThanEqualsFloat,
}

pub const OP_CODE_COUNT: usize = 54;

const OP_CODE_NAMES: [&str; OP_CODE_COUNT] = [
    "PLACEHOLDER",
    "HALT",
    "PUSH_LITERAL",
    "PUSH_VARIABLE",
    "STORE_VARIABLE",
    "POP",
    "CALL_FUNCTION",
    "CALL_FUNCTION_EXTERNAL",
    "RETURN",
    "JUMP",
    "JUMP_IF_FALSE",
    "NOT_BOOL",
    "NEGATE_INT",
    "NEGATE_FLOAT",
    "ADD_INT",
    "ADD_FLOAT",
    "ADD_INT2",
    "ADD_FLOAT2",
    "SUBTRACT_INT",
    "SUBTRACT_FLOAT",
    "SUBTRACT_INT2",
    "SUBTRACT_FLOAT2",
    "MULTIPLY_INT",
    "MULTIPLY_FLOAT",
    "MULTIPLY_INT2",
    "MULTIPLY_INT2_INT",
    "MULTIPLY_FLOAT2",
    "MULTIPLY_FLOAT2_FLOAT",
    "DIVIDE_INT",
    "DIVIDE_FLOAT",
    "DIVIDE_INT2",
    "DIVIDE_INT2_INT",
    "DIVIDE_FLOAT2",
    "DIVIDE_FLOAT2_FLOAT",
    "EQUALS_STRING",
    "EQUALS_BOOL",
    "EQUALS_INT",
    "EQUALS_INT2",
    "EQUALS_FLOAT",
    "EQUALS_FLOAT2",
    "NOT_EQUALS_STRING",
    "NOT_EQUALS_BOOL",
    "NOT_EQUALS_INT",
    "NOT_EQUALS_INT2",
    "NOT_EQUALS_FLOAT",
    "NOT_EQUALS_FLOAT2",
    "LESS_THAN_INT",
    "LESS_THAN_FLOAT",
    "GREATER_THAN_INT",
    "GREATER_THAN_FLOAT",
    "LESS_THAN_EQUALS_INT",
    "LESS_THAN_EQUALS_FLOAT",
    "GREATER_THAN_EQUALS_INT",
    "GREATER_THAN_EQUALS_FLOAT",
];

const ALL_OP_CODES: [OpCode; OP_CODE_COUNT] = [
    OpCode::Placeholder,
    OpCode::Halt,
    OpCode::PushLiteral,
    OpCode::PushVariable,
    OpCode::StoreVariable,
    OpCode::Pop,
    OpCode::CallFunction,
    OpCode::CallFunctionExternal,
    OpCode::Return,
    OpCode::Jump,
    OpCode::JumpIfFalse,
    OpCode::NotBool,
    OpCode::NegateInt,
    OpCode::NegateFloat,
    OpCode::AddInt,
    OpCode::AddFloat,
    OpCode::AddInt2,
    OpCode::AddFloat2,
    OpCode::SubtractInt,
    OpCode::SubtractFloat,
    OpCode::SubtractInt2,
    OpCode::SubtractFloat2,
    OpCode::MultiplyInt,
    OpCode::MultiplyFloat,
    OpCode::MultiplyInt2,
    OpCode::MultiplyInt2Int,
    OpCode::MultiplyFloat2,
    OpCode::MultiplyFloat2Float,
    OpCode::DivideInt,
    OpCode::DivideFloat,
    OpCode::DivideInt2,
    OpCode::DivideInt2Int,
    OpCode::DivideFloat2,
    OpCode::DivideFloat2Float,
    OpCode::EqualsString,
    OpCode::EqualsBool,
    OpCode::EqualsInt,
    OpCode::EqualsInt2,
    OpCode::EqualsFloat,
    OpCode::EqualsFloat2,
    OpCode::NotEqualsString,
    OpCode::NotEqualsBool,
    OpCode::NotEqualsInt,
    OpCode::NotEqualsInt2,
    OpCode::NotEqualsFloat,
    OpCode::NotEqualsFloat2,
    OpCode::LessThanInt,
    OpCode::LessThanFloat,
    OpCode::GreaterThanInt,
    OpCode::GreaterThanFloat,
    OpCode::LessThanEqualsInt,
    OpCode::LessThanEqualsFloat,
    OpCode::GreaterThanEqualsInt,
    OpCode::GreaterThanEqualsFloat,
];

impl OpCode {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<OpCode> {
        ALL_OP_CODES.get(tag as usize).copied()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", OP_CODE_NAMES[*self as usize])
    }
}

/// Instruction operand. The tag is redundant with the opcode for a
/// well-formed program; the VM panics on a mismatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operand {
    None,
    PushLiteral { ty: Type, value: Literal },
    PushVariable { ty: Type, name: String },
    StoreVariable { ty: Type, name: String },
    Call { index: usize },
    Jump { index: usize },
}

/// A single element of `Program::operations`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instruction {
    pub opcode: OpCode,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(opcode: OpCode) -> Self {
        Self { opcode, operand: Operand::None }
    }

    pub fn placeholder() -> Self {
        Self::new(OpCode::Placeholder)
    }

    pub fn push_literal(value: Literal) -> Self {
        let ty = value.ty();
        Self {
            opcode: OpCode::PushLiteral,
            operand: Operand::PushLiteral { ty, value },
        }
    }

    pub fn push_variable(ty: Type, name: impl Into<String>) -> Self {
        Self {
            opcode: OpCode::PushVariable,
            operand: Operand::PushVariable { ty, name: name.into() },
        }
    }

    pub fn store_variable(ty: Type, name: impl Into<String>) -> Self {
        Self {
            opcode: OpCode::StoreVariable,
            operand: Operand::StoreVariable { ty, name: name.into() },
        }
    }

    /// Call of a script function; the index is a code offset.
    pub fn call(code_index: usize) -> Self {
        Self {
            opcode: OpCode::CallFunction,
            operand: Operand::Call { index: code_index },
        }
    }

    /// Call of a host procedure; the index is an external-table slot.
    pub fn call_external(function_index: usize) -> Self {
        Self {
            opcode: OpCode::CallFunctionExternal,
            operand: Operand::Call { index: function_index },
        }
    }

    pub fn jump(code_index: usize) -> Self {
        Self {
            opcode: OpCode::Jump,
            operand: Operand::Jump { index: code_index },
        }
    }

    pub fn jump_if_false(code_index: usize) -> Self {
        Self {
            opcode: OpCode::JumpIfFalse,
            operand: Operand::Jump { index: code_index },
        }
    }

    /// The call operand's index. Panics if the operand is not a call.
    pub fn call_index(&self) -> usize {
        match &self.operand {
            Operand::Call { index } => *index,
            _ => panic!("instruction {} has no call operand", self.opcode),
        }
    }

    /// The jump operand's target. Panics if the operand is not a jump.
    pub fn jump_index(&self) -> usize {
        match &self.operand {
            Operand::Jump { index } => *index,
            _ => panic!("instruction {} has no jump operand", self.opcode),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.operand {
            Operand::None => write!(f, "{}", self.opcode),
            Operand::PushLiteral { ty, value } => write!(f, "{} {} {}", self.opcode, ty, value),
            Operand::PushVariable { ty, name } | Operand::StoreVariable { ty, name } => {
                write!(f, "{} {} {}", self.opcode, ty, name)
            }
            Operand::Call { index } | Operand::Jump { index } => {
                write!(f, "{} {}", self.opcode, index)
            }
        }
    }
}

/// A typed, named variable slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub ty: Type,
    pub name: String,
}

impl Variable {
    pub fn new(ty: Type, name: impl Into<String>) -> Self {
        Self { ty, name: name.into() }
    }
}
