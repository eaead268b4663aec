// File: src/image.rs
//
// Binary program image. Serializes a compiled Program to a flat byte
// layout and loads it back, re-binding external procs by name from the
// host's registration list. All multi-byte integers are little-endian;
// strings are a u32 length followed by utf-8 bytes.
//
// Layout:
//   u8  version
//   u32 operation count, operations (opcode tag, operand tag, payload)
//   u32 function count, functions
//   u32 external count, external metadata
//   u64 main_code_index

use crate::bytecode::{Float2, Instruction, Int2, Literal, OpCode, Operand, Type, Variable};
use crate::program::{ExternalFunction, Function, Program};
use std::io;

const IMAGE_VERSION: u8 = 1;

const OPERAND_NONE: u8 = 0;
const OPERAND_PUSH_LITERAL: u8 = 1;
const OPERAND_PUSH_VARIABLE: u8 = 2;
const OPERAND_STORE_VARIABLE: u8 = 3;
const OPERAND_CALL: u8 = 4;
const OPERAND_JUMP: u8 = 5;

/// Serializes a program. External functions contribute metadata only;
/// their procs are re-bound at load time.
pub fn save(program: &Program) -> Vec<u8> {
    let mut writer = Writer::default();

    writer.u8(IMAGE_VERSION);

    writer.u32(program.operations.len() as u32);
    for instruction in &program.operations {
        writer.instruction(instruction);
    }

    writer.u32(program.functions.len() as u32);
    for function in &program.functions {
        writer.function(function);
    }

    writer.u32(program.external_functions.len() as u32);
    for function in &program.external_functions {
        writer.external(function);
    }

    writer.u64(program.main_code_index as u64);

    writer.bytes
}

/// Loads a program image, binding each recorded external to the host
/// function of the same name. Signature mismatches, unknown tags, and
/// truncated or oversized input are `InvalidData` errors.
pub fn load(bytes: &[u8], host_functions: &[ExternalFunction]) -> io::Result<Program> {
    let mut reader = Reader { bytes, pos: 0 };

    let version = reader.u8()?;
    if version != IMAGE_VERSION {
        return Err(invalid(format!("unsupported image version {}", version)));
    }

    let operation_count = reader.u32()? as usize;
    let mut operations = Vec::with_capacity(operation_count);
    for _ in 0..operation_count {
        operations.push(reader.instruction()?);
    }

    let function_count = reader.u32()? as usize;
    let mut functions = Vec::with_capacity(function_count);
    for _ in 0..function_count {
        functions.push(reader.function()?);
    }

    let external_count = reader.u32()? as usize;
    let mut external_functions = Vec::with_capacity(external_count);
    for _ in 0..external_count {
        let (return_type, name, arguments) = reader.external()?;
        external_functions.push(bind_external(return_type, name, arguments, host_functions)?);
    }

    let main_code_index = reader.u64()? as usize;

    if reader.pos != bytes.len() {
        return Err(invalid("trailing bytes after the program image"));
    }

    let program = Program { operations, functions, external_functions, main_code_index };

    if let Err(message) = program.validate() {
        return Err(invalid(format!("loaded program is malformed: {}", message)));
    }

    Ok(program)
}

fn bind_external(
    return_type: Type,
    name: String,
    arguments: Vec<Variable>,
    host_functions: &[ExternalFunction],
) -> io::Result<ExternalFunction> {
    let host = host_functions
        .iter()
        .find(|function| function.name == name)
        .ok_or_else(|| invalid(format!("external function '{}' is not provided by the host", name)))?;

    let host_argument_types: Vec<Type> = host.arguments.iter().map(|v| v.ty).collect();
    let recorded_argument_types: Vec<Type> = arguments.iter().map(|v| v.ty).collect();

    if host.return_type != return_type || host_argument_types != recorded_argument_types {
        return Err(invalid(format!(
            "external function '{}' does not match the recorded signature",
            name
        )));
    }

    Ok(ExternalFunction { return_type, name, arguments, proc: host.proc.clone() })
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

// === Writing ===

#[derive(Default)]
struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn f32(&mut self, value: f32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn string(&mut self, value: &str) {
        self.u32(value.len() as u32);
        self.bytes.extend_from_slice(value.as_bytes());
    }

    fn literal(&mut self, value: &Literal) {
        self.u8(value.ty().tag());
        match value {
            Literal::String(value) => self.string(value),
            Literal::Bool(value) => self.u8(*value as u8),
            Literal::Int(value) => self.i32(*value),
            Literal::Float(value) => self.f32(*value),
            Literal::Int2(value) => {
                self.i32(value.x);
                self.i32(value.y);
            }
            Literal::Float2(value) => {
                self.f32(value.x);
                self.f32(value.y);
            }
        }
    }

    fn variable(&mut self, variable: &Variable) {
        self.u8(variable.ty.tag());
        self.string(&variable.name);
    }

    fn instruction(&mut self, instruction: &Instruction) {
        self.u8(instruction.opcode.tag());
        match &instruction.operand {
            Operand::None => self.u8(OPERAND_NONE),
            Operand::PushLiteral { ty, value } => {
                self.u8(OPERAND_PUSH_LITERAL);
                self.u8(ty.tag());
                self.literal(value);
            }
            Operand::PushVariable { ty, name } => {
                self.u8(OPERAND_PUSH_VARIABLE);
                self.u8(ty.tag());
                self.string(name);
            }
            Operand::StoreVariable { ty, name } => {
                self.u8(OPERAND_STORE_VARIABLE);
                self.u8(ty.tag());
                self.string(name);
            }
            Operand::Call { index } => {
                self.u8(OPERAND_CALL);
                self.u64(*index as u64);
            }
            Operand::Jump { index } => {
                self.u8(OPERAND_JUMP);
                self.u64(*index as u64);
            }
        }
    }

    fn function(&mut self, function: &Function) {
        self.u64(function.code_index as u64);
        self.u8(function.return_type.tag());
        self.string(&function.name);
        self.u64(function.argument_count as u64);
        self.u32(function.local_variables.len() as u32);
        for variable in &function.local_variables {
            self.variable(variable);
        }
    }

    fn external(&mut self, function: &ExternalFunction) {
        self.u8(function.return_type.tag());
        self.string(&function.name);
        self.u32(function.arguments.len() as u32);
        for variable in &function.arguments {
            self.variable(variable);
        }
    }
}

// === Reading ===

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, count: usize) -> io::Result<&'a [u8]> {
        if self.pos + count > self.bytes.len() {
            return Err(invalid("truncated program image"));
        }
        let slice = &self.bytes[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> io::Result<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(bytes))
    }

    fn u64(&mut self) -> io::Result<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(bytes))
    }

    fn i32(&mut self) -> io::Result<i32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(bytes))
    }

    fn f32(&mut self) -> io::Result<f32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(f32::from_le_bytes(bytes))
    }

    fn string(&mut self) -> io::Result<String> {
        let length = self.u32()? as usize;
        let bytes = self.take(length)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| invalid("image holds a non-utf8 string"))
    }

    fn type_tag(&mut self) -> io::Result<Type> {
        let tag = self.u8()?;
        Type::from_tag(tag).ok_or_else(|| invalid(format!("unknown type tag {}", tag)))
    }

    fn literal(&mut self) -> io::Result<Literal> {
        let ty = self.type_tag()?;
        match ty {
            Type::String => Ok(Literal::String(self.string()?)),
            Type::Bool => Ok(Literal::Bool(self.u8()? != 0)),
            Type::Int => Ok(Literal::Int(self.i32()?)),
            Type::Float => Ok(Literal::Float(self.f32()?)),
            Type::Int2 => Ok(Literal::Int2(Int2::new(self.i32()?, self.i32()?))),
            Type::Float2 => Ok(Literal::Float2(Float2::new(self.f32()?, self.f32()?))),
            Type::Void => Err(invalid("image holds a void literal")),
        }
    }

    fn variable(&mut self) -> io::Result<Variable> {
        let ty = self.type_tag()?;
        let name = self.string()?;
        Ok(Variable { ty, name })
    }

    fn instruction(&mut self) -> io::Result<Instruction> {
        let opcode_tag = self.u8()?;
        let opcode = OpCode::from_tag(opcode_tag)
            .ok_or_else(|| invalid(format!("unknown opcode tag {}", opcode_tag)))?;

        let operand_tag = self.u8()?;
        let operand = match operand_tag {
            OPERAND_NONE => Operand::None,
            OPERAND_PUSH_LITERAL => {
                let ty = self.type_tag()?;
                let value = self.literal()?;
                Operand::PushLiteral { ty, value }
            }
            OPERAND_PUSH_VARIABLE => {
                let ty = self.type_tag()?;
                let name = self.string()?;
                Operand::PushVariable { ty, name }
            }
            OPERAND_STORE_VARIABLE => {
                let ty = self.type_tag()?;
                let name = self.string()?;
                Operand::StoreVariable { ty, name }
            }
            OPERAND_CALL => Operand::Call { index: self.u64()? as usize },
            OPERAND_JUMP => Operand::Jump { index: self.u64()? as usize },
            _ => return Err(invalid(format!("unknown operand tag {}", operand_tag))),
        };

        Ok(Instruction { opcode, operand })
    }

    fn function(&mut self) -> io::Result<Function> {
        let code_index = self.u64()? as usize;
        let return_type = self.type_tag()?;
        let name = self.string()?;
        let argument_count = self.u64()? as usize;

        let local_count = self.u32()? as usize;
        let mut local_variables = Vec::with_capacity(local_count);
        for _ in 0..local_count {
            local_variables.push(self.variable()?);
        }

        Ok(Function { code_index, return_type, name, argument_count, local_variables })
    }

    fn external(&mut self) -> io::Result<(Type, String, Vec<Variable>)> {
        let return_type = self.type_tag()?;
        let name = self.string()?;

        let argument_count = self.u32()? as usize;
        let mut arguments = Vec::with_capacity(argument_count);
        for _ in 0..argument_count {
            arguments.push(self.variable()?);
        }

        Ok((return_type, name, arguments))
    }
}
