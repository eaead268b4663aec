// File: src/ops.rs
//
// Operator resolution tables for the Slate compiler. Maps (operand types,
// source operator) to the typed opcode that implements it and the result
// type it leaves on the stack. The semantic walker consults the validator
// first for a precise diagnostic, then the mapper; a mapper miss after a
// clean validation is a plain type mismatch.

use crate::bytecode::{BinaryOperator, OpCode, Type, UnaryOperator};
use crate::errors::CompileErrorKind;
use ahash::AHashMap;
use once_cell::sync::Lazy;

/// Resolution of an operator against concrete operand types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpMapping {
    pub opcode: OpCode,
    pub result_type: Type,
}

const fn mapping(opcode: OpCode, result_type: Type) -> OpMapping {
    OpMapping { opcode, result_type }
}

#[rustfmt::skip]
static UNARY_OPS: Lazy<AHashMap<(Type, UnaryOperator), OpMapping>> = Lazy::new(|| {
    AHashMap::from_iter([
        // Right        Operator               Operation                    Result
        ((Type::Bool,   UnaryOperator::Not),    mapping(OpCode::NotBool,     Type::Bool)),
        ((Type::Int,    UnaryOperator::Negate), mapping(OpCode::NegateInt,   Type::Int)),
        ((Type::Float,  UnaryOperator::Negate), mapping(OpCode::NegateFloat, Type::Float)),
    ])
});

#[rustfmt::skip]
static BINARY_OPS: Lazy<AHashMap<(Type, Type, BinaryOperator), OpMapping>> = Lazy::new(|| {
    AHashMap::from_iter([
        // Left          Right         Operator                            Operation                               Result
        ((Type::Int,    Type::Int,    BinaryOperator::Add),               mapping(OpCode::AddInt,                 Type::Int)),
        ((Type::Float,  Type::Float,  BinaryOperator::Add),               mapping(OpCode::AddFloat,               Type::Float)),
        ((Type::Int2,   Type::Int2,   BinaryOperator::Add),               mapping(OpCode::AddInt2,                Type::Int2)),
        ((Type::Float2, Type::Float2, BinaryOperator::Add),               mapping(OpCode::AddFloat2,              Type::Float2)),
        ((Type::Int,    Type::Int,    BinaryOperator::Subtract),          mapping(OpCode::SubtractInt,            Type::Int)),
        ((Type::Float,  Type::Float,  BinaryOperator::Subtract),          mapping(OpCode::SubtractFloat,          Type::Float)),
        ((Type::Int2,   Type::Int2,   BinaryOperator::Subtract),          mapping(OpCode::SubtractInt2,           Type::Int2)),
        ((Type::Float2, Type::Float2, BinaryOperator::Subtract),          mapping(OpCode::SubtractFloat2,         Type::Float2)),
        ((Type::Int,    Type::Int,    BinaryOperator::Multiply),          mapping(OpCode::MultiplyInt,            Type::Int)),
        ((Type::Float,  Type::Float,  BinaryOperator::Multiply),          mapping(OpCode::MultiplyFloat,          Type::Float)),
        ((Type::Int2,   Type::Int2,   BinaryOperator::Multiply),          mapping(OpCode::MultiplyInt2,           Type::Int2)),
        ((Type::Int2,   Type::Int,    BinaryOperator::Multiply),          mapping(OpCode::MultiplyInt2Int,        Type::Int2)),
        ((Type::Float2, Type::Float2, BinaryOperator::Multiply),          mapping(OpCode::MultiplyFloat2,         Type::Float2)),
        ((Type::Float2, Type::Float,  BinaryOperator::Multiply),          mapping(OpCode::MultiplyFloat2Float,    Type::Float2)),
        ((Type::Int,    Type::Int,    BinaryOperator::Divide),            mapping(OpCode::DivideInt,              Type::Int)),
        ((Type::Float,  Type::Float,  BinaryOperator::Divide),            mapping(OpCode::DivideFloat,            Type::Float)),
        ((Type::Int2,   Type::Int2,   BinaryOperator::Divide),            mapping(OpCode::DivideInt2,             Type::Int2)),
        ((Type::Int2,   Type::Int,    BinaryOperator::Divide),            mapping(OpCode::DivideInt2Int,          Type::Int2)),
        ((Type::Float2, Type::Float2, BinaryOperator::Divide),            mapping(OpCode::DivideFloat2,           Type::Float2)),
        ((Type::Float2, Type::Float,  BinaryOperator::Divide),            mapping(OpCode::DivideFloat2Float,      Type::Float2)),
        ((Type::String, Type::String, BinaryOperator::Equal),             mapping(OpCode::EqualsString,           Type::Bool)),
        ((Type::Bool,   Type::Bool,   BinaryOperator::Equal),             mapping(OpCode::EqualsBool,             Type::Bool)),
        ((Type::Int,    Type::Int,    BinaryOperator::Equal),             mapping(OpCode::EqualsInt,              Type::Bool)),
        ((Type::Int2,   Type::Int2,   BinaryOperator::Equal),             mapping(OpCode::EqualsInt2,             Type::Bool)),
        ((Type::Float,  Type::Float,  BinaryOperator::Equal),             mapping(OpCode::EqualsFloat,            Type::Bool)),
        ((Type::Float2, Type::Float2, BinaryOperator::Equal),             mapping(OpCode::EqualsFloat2,           Type::Bool)),
        ((Type::String, Type::String, BinaryOperator::NotEqual),          mapping(OpCode::NotEqualsString,        Type::Bool)),
        ((Type::Bool,   Type::Bool,   BinaryOperator::NotEqual),          mapping(OpCode::NotEqualsBool,          Type::Bool)),
        ((Type::Int,    Type::Int,    BinaryOperator::NotEqual),          mapping(OpCode::NotEqualsInt,           Type::Bool)),
        ((Type::Int2,   Type::Int2,   BinaryOperator::NotEqual),          mapping(OpCode::NotEqualsInt2,          Type::Bool)),
        ((Type::Float,  Type::Float,  BinaryOperator::NotEqual),          mapping(OpCode::NotEqualsFloat,         Type::Bool)),
        ((Type::Float2, Type::Float2, BinaryOperator::NotEqual),          mapping(OpCode::NotEqualsFloat2,        Type::Bool)),
        ((Type::Int,    Type::Int,    BinaryOperator::LessThan),          mapping(OpCode::LessThanInt,            Type::Bool)),
        ((Type::Float,  Type::Float,  BinaryOperator::LessThan),          mapping(OpCode::LessThanFloat,          Type::Bool)),
        ((Type::Int,    Type::Int,    BinaryOperator::GreaterThan),       mapping(OpCode::GreaterThanInt,         Type::Bool)),
        ((Type::Float,  Type::Float,  BinaryOperator::GreaterThan),       mapping(OpCode::GreaterThanFloat,       Type::Bool)),
        ((Type::Int,    Type::Int,    BinaryOperator::LessThanEqual),     mapping(OpCode::LessThanEqualsInt,      Type::Bool)),
        ((Type::Float,  Type::Float,  BinaryOperator::LessThanEqual),     mapping(OpCode::LessThanEqualsFloat,    Type::Bool)),
        ((Type::Int,    Type::Int,    BinaryOperator::GreaterThanEqual),  mapping(OpCode::GreaterThanEqualsInt,   Type::Bool)),
        ((Type::Float,  Type::Float,  BinaryOperator::GreaterThanEqual),  mapping(OpCode::GreaterThanEqualsFloat, Type::Bool)),
    ])
});

pub fn map_unary_op(right_type: Type, op: UnaryOperator) -> Option<OpMapping> {
    UNARY_OPS.get(&(right_type, op)).copied()
}

/// Precise diagnostics for unary operators that the plain table miss would
/// report as a type mismatch.
pub fn map_unary_op_validate(right_type: Type, _op: UnaryOperator) -> Option<CompileErrorKind> {
    if right_type == Type::String {
        return Some(CompileErrorKind::MathOperationOnString);
    }

    None
}

pub fn map_binary_op(left_type: Type, right_type: Type, op: BinaryOperator) -> Option<OpMapping> {
    BINARY_OPS.get(&(left_type, right_type, op)).copied()
}

/// Strings support equality only; every other operator on a pair of strings
/// is reported as math on a string rather than a generic mismatch.
pub fn map_binary_op_validate(
    left_type: Type,
    right_type: Type,
    op: BinaryOperator,
) -> Option<CompileErrorKind> {
    if left_type == Type::String
        && right_type == Type::String
        && op != BinaryOperator::Equal
        && op != BinaryOperator::NotEqual
    {
        return Some(CompileErrorKind::MathOperationOnString);
    }

    None
}
