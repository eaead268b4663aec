// File: src/vm.rs
//
// Virtual machine for executing Slate bytecode. A fetch/decode/execute
// loop over the program's operations, owning the typed value stack, the
// name-addressed variable frame, and the call stack of return addresses.
// The program is borrowed read-only for the VM's lifetime.
//
// The VM has no user-visible errors: operations are total over well-typed
// inputs by construction. Anything that goes wrong here (placeholder
// executed, variable lookup miss, operand shape mismatch) is a compiler
// bug and panics.

use crate::byte_stack::ByteStack;
use crate::bytecode::{Float2, Int2, Literal, OpCode, Operand, Type};
use crate::program::{CallableFunctionInfo, FunctionType, Program};
use ahash::AHashMap;
use colored::Colorize;

/// Snapshot of the VM's mutable state, for tests and presenters.
#[derive(Debug, Clone)]
pub struct VmState {
    pub stack: ByteStack,
    pub variables: AHashMap<String, (Type, Literal)>,
    pub call_stack: Vec<usize>,
    pub program_counter: usize,
}

pub struct ByteCodeVm<'a> {
    stack: ByteStack,
    variables: AHashMap<String, (Type, Literal)>,
    call_stack: Vec<usize>,
    program_counter: usize,
    next_program_counter: usize,
    program: &'a Program,
}

impl<'a> ByteCodeVm<'a> {
    pub fn new(program: &'a Program) -> Self {
        Self {
            stack: ByteStack::new(),
            variables: AHashMap::new(),
            call_stack: Vec::new(),
            program_counter: program.main_code_index,
            next_program_counter: program.main_code_index,
            program,
        }
    }

    pub fn program(&self) -> &'a Program {
        self.program
    }

    /// Pushes the values `main`'s prologue will pop into its parameters.
    /// Values go on in declaration order, first parameter first.
    pub fn set_main_args(&mut self, args: &[(Type, Literal)]) {
        for (ty, value) in args {
            self.push_variant(*ty, value);
        }
    }

    /// Runs until the program counter passes the end of the operations.
    pub fn execute(&mut self) {
        while self.get_is_not_halted() {
            self.execute_op();
        }
    }

    /// Executes exactly one instruction.
    pub fn execute_op(&mut self) {
        self.next_program_counter = self.program_counter + 1;
        self.dispatch();
        self.program_counter = self.next_program_counter;
    }

    /// Forces the program counter past the end. The stack is not drained.
    pub fn halt(&mut self) {
        self.program_counter = self.program.operations.len();
        self.next_program_counter = self.program_counter;
    }

    /// Host-initiated call. Pushes the arguments and either transfers into
    /// a script function (the current program counter is saved so RETURN
    /// re-enters it) or runs an external synchronously. Returns false when
    /// the name resolves to nothing.
    pub fn call_function(&mut self, identifier: &str, args: &[(Type, Literal)]) -> bool {
        for (ty, value) in args {
            self.push_variant(*ty, value);
        }

        match self.program.find_function(identifier) {
            Some(CallableFunctionInfo { ty: FunctionType::Script, function_index }) => {
                let code_index = self.program.functions[function_index].code_index;
                self.call_stack.push(self.program_counter);
                self.program_counter = code_index;
                self.next_program_counter = code_index;
                true
            }
            Some(CallableFunctionInfo { ty: FunctionType::External, function_index }) => {
                self.execute_op_call_external_function(function_index);
                true
            }
            None => false,
        }
    }

    pub fn get_is_not_halted(&self) -> bool {
        self.program_counter < self.program.operations.len()
    }

    pub fn get_program_counter(&self) -> usize {
        self.program_counter
    }

    pub fn get_state(&self) -> VmState {
        VmState {
            stack: self.stack.clone(),
            variables: self.variables.clone(),
            call_stack: self.call_stack.clone(),
            program_counter: self.program_counter,
        }
    }

    pub fn print(&self) {
        print_state(self.program, &self.get_state());
    }

    // === Dispatch ===

    fn dispatch(&mut self) {
        let program = self.program;
        let instruction = &program.operations[self.program_counter];

        match instruction.opcode {
            OpCode::Placeholder => {
                panic!("executed an unpatched placeholder at {}", self.program_counter);
            }

            OpCode::Halt => {
                self.next_program_counter = program.operations.len();
            }

            OpCode::PushLiteral => match &instruction.operand {
                Operand::PushLiteral { ty, value } => {
                    let (ty, value) = (*ty, value.clone());
                    self.push_variant(ty, &value);
                }
                _ => panic!("PUSH_LITERAL has no literal operand"),
            },

            OpCode::PushVariable => match &instruction.operand {
                Operand::PushVariable { ty, name } => {
                    let (ty, name) = (*ty, name.clone());
                    let value = match self.variables.get(&name) {
                        Some((_, value)) => value.clone(),
                        None => panic!("variable '{}' was never stored", name),
                    };
                    self.push_variant(ty, &value);
                }
                _ => panic!("PUSH_VARIABLE has no variable operand"),
            },

            OpCode::StoreVariable => match &instruction.operand {
                Operand::StoreVariable { name, .. } => {
                    let name = name.clone();
                    let value = self.pop_variant();
                    self.variables.insert(name, value);
                }
                _ => panic!("STORE_VARIABLE has no variable operand"),
            },

            OpCode::Pop => {
                self.stack.pop(1);
            }

            OpCode::CallFunction => {
                let code_index = instruction.call_index();
                self.call_stack.push(self.program_counter);
                self.next_program_counter = code_index;
            }

            OpCode::CallFunctionExternal => {
                let function_index = instruction.call_index();
                self.execute_op_call_external_function(function_index);
            }

            OpCode::Return => match self.call_stack.pop() {
                Some(code_index) => {
                    self.next_program_counter = code_index + 1;
                }
                None => {
                    self.next_program_counter = program.operations.len();
                }
            },

            OpCode::Jump => {
                self.next_program_counter = instruction.jump_index();
            }

            OpCode::JumpIfFalse => {
                let value = self.stack.top_as_bool(0);
                self.stack.pop(1);

                if !value {
                    self.next_program_counter = instruction.jump_index();
                }
            }

            // === Unary ===
            OpCode::NotBool => {
                let value = self.stack.top_as_bool(0);
                self.stack.pop(1);
                self.stack.push_bool(!value);
            }

            OpCode::NegateInt => {
                let value = self.stack.top_as_int(0);
                self.stack.pop(1);
                self.stack.push_int(-value);
            }

            OpCode::NegateFloat => {
                let value = self.stack.top_as_float(0);
                self.stack.pop(1);
                self.stack.push_float(-value);
            }

            // === Arithmetic ===
            OpCode::AddInt => self.binary_int(|op1, op0| op1 + op0),
            OpCode::AddFloat => self.binary_float(|op1, op0| op1 + op0),
            OpCode::AddInt2 => self.binary_int2(|op1, op0| op1 + op0),
            OpCode::AddFloat2 => self.binary_float2(|op1, op0| op1 + op0),

            OpCode::SubtractInt => self.binary_int(|op1, op0| op1 - op0),
            OpCode::SubtractFloat => self.binary_float(|op1, op0| op1 - op0),
            OpCode::SubtractInt2 => self.binary_int2(|op1, op0| op1 - op0),
            OpCode::SubtractFloat2 => self.binary_float2(|op1, op0| op1 - op0),

            OpCode::MultiplyInt => self.binary_int(|op1, op0| op1 * op0),
            OpCode::MultiplyFloat => self.binary_float(|op1, op0| op1 * op0),
            OpCode::MultiplyInt2 => self.binary_int2(|op1, op0| op1 * op0),
            OpCode::MultiplyInt2Int => self.binary_int2_int(|op1, op0| op1 * op0),
            OpCode::MultiplyFloat2 => self.binary_float2(|op1, op0| op1 * op0),
            OpCode::MultiplyFloat2Float => self.binary_float2_float(|op1, op0| op1 * op0),

            OpCode::DivideInt => self.binary_int(|op1, op0| op1 / op0),
            OpCode::DivideFloat => self.binary_float(|op1, op0| op1 / op0),
            OpCode::DivideInt2 => self.binary_int2(|op1, op0| op1 / op0),
            OpCode::DivideInt2Int => self.binary_int2_int(|op1, op0| op1 / op0),
            OpCode::DivideFloat2 => self.binary_float2(|op1, op0| op1 / op0),
            OpCode::DivideFloat2Float => self.binary_float2_float(|op1, op0| op1 / op0),

            // === Comparison ===
            OpCode::EqualsString => self.compare_string(|op1, op0| op1 == op0),
            OpCode::EqualsBool => self.compare_bool(|op1, op0| op1 == op0),
            OpCode::EqualsInt => self.compare_int(|op1, op0| op1 == op0),
            OpCode::EqualsInt2 => self.compare_int2(|op1, op0| op1 == op0),
            OpCode::EqualsFloat => self.compare_float(|op1, op0| op1 == op0),
            OpCode::EqualsFloat2 => self.compare_float2(|op1, op0| op1 == op0),

            OpCode::NotEqualsString => self.compare_string(|op1, op0| op1 != op0),
            OpCode::NotEqualsBool => self.compare_bool(|op1, op0| op1 != op0),
            OpCode::NotEqualsInt => self.compare_int(|op1, op0| op1 != op0),
            OpCode::NotEqualsInt2 => self.compare_int2(|op1, op0| op1 != op0),
            OpCode::NotEqualsFloat => self.compare_float(|op1, op0| op1 != op0),
            OpCode::NotEqualsFloat2 => self.compare_float2(|op1, op0| op1 != op0),

            OpCode::LessThanInt => self.compare_int(|op1, op0| op1 < op0),
            OpCode::LessThanFloat => self.compare_float(|op1, op0| op1 < op0),

            OpCode::GreaterThanInt => self.compare_int(|op1, op0| op1 > op0),
            OpCode::GreaterThanFloat => self.compare_float(|op1, op0| op1 > op0),

            OpCode::LessThanEqualsInt => self.compare_int(|op1, op0| op1 <= op0),
            OpCode::LessThanEqualsFloat => self.compare_float(|op1, op0| op1 <= op0),

            OpCode::GreaterThanEqualsInt => self.compare_int(|op1, op0| op1 >= op0),
            OpCode::GreaterThanEqualsFloat => self.compare_float(|op1, op0| op1 >= op0),
        }
    }

    /// Marshals the top N stack values into the external's proc, deepest
    /// first so the argument slice is in declared order, and pushes the
    /// result under the declared return type.
    fn execute_op_call_external_function(&mut self, function_index: usize) {
        let program = self.program;
        let function = &program.external_functions[function_index];
        let count = function.arguments.len();

        let mut args = Vec::with_capacity(count);
        for index in 0..count {
            args.push(self.stack.top_literal(count - 1 - index));
        }
        self.stack.pop(count);

        let result = (function.proc)(&args);

        if function.return_type != Type::Void {
            match result {
                Some(value) => self.push_variant(function.return_type, &value),
                None => panic!("external function '{}' returned no value", function.name),
            }
        }
    }

    // === Typed stack helpers ===

    fn push_variant(&mut self, ty: Type, value: &Literal) {
        match (ty, value) {
            (Type::String, Literal::String(value)) => self.stack.push_string(value),
            (Type::Bool, Literal::Bool(value)) => self.stack.push_bool(*value),
            (Type::Int, Literal::Int(value)) => self.stack.push_int(*value),
            (Type::Float, Literal::Float(value)) => self.stack.push_float(*value),
            (Type::Int2, Literal::Int2(value)) => self.stack.push_int2(*value),
            (Type::Float2, Literal::Float2(value)) => self.stack.push_float2(*value),
            _ => panic!("value {} does not match its declared type {}", value, ty),
        }
    }

    fn pop_variant(&mut self) -> (Type, Literal) {
        let ty = self.stack.top_value_type(0);
        let value = self.stack.top_literal(0);
        self.stack.pop(1);
        (ty, value)
    }

    fn binary_int(&mut self, op: impl Fn(i32, i32) -> i32) {
        let result = op(self.stack.top_as_int(1), self.stack.top_as_int(0));
        self.stack.pop(2);
        self.stack.push_int(result);
    }

    fn binary_float(&mut self, op: impl Fn(f32, f32) -> f32) {
        let result = op(self.stack.top_as_float(1), self.stack.top_as_float(0));
        self.stack.pop(2);
        self.stack.push_float(result);
    }

    fn binary_int2(&mut self, op: impl Fn(Int2, Int2) -> Int2) {
        let result = op(self.stack.top_as_int2(1), self.stack.top_as_int2(0));
        self.stack.pop(2);
        self.stack.push_int2(result);
    }

    fn binary_int2_int(&mut self, op: impl Fn(Int2, i32) -> Int2) {
        let result = op(self.stack.top_as_int2(1), self.stack.top_as_int(0));
        self.stack.pop(2);
        self.stack.push_int2(result);
    }

    fn binary_float2(&mut self, op: impl Fn(Float2, Float2) -> Float2) {
        let result = op(self.stack.top_as_float2(1), self.stack.top_as_float2(0));
        self.stack.pop(2);
        self.stack.push_float2(result);
    }

    fn binary_float2_float(&mut self, op: impl Fn(Float2, f32) -> Float2) {
        let result = op(self.stack.top_as_float2(1), self.stack.top_as_float(0));
        self.stack.pop(2);
        self.stack.push_float2(result);
    }

    fn compare_string(&mut self, op: impl Fn(&str, &str) -> bool) {
        let result = op(self.stack.top_as_string(1), self.stack.top_as_string(0));
        self.stack.pop(2);
        self.stack.push_bool(result);
    }

    fn compare_bool(&mut self, op: impl Fn(bool, bool) -> bool) {
        let result = op(self.stack.top_as_bool(1), self.stack.top_as_bool(0));
        self.stack.pop(2);
        self.stack.push_bool(result);
    }

    fn compare_int(&mut self, op: impl Fn(i32, i32) -> bool) {
        let result = op(self.stack.top_as_int(1), self.stack.top_as_int(0));
        self.stack.pop(2);
        self.stack.push_bool(result);
    }

    fn compare_float(&mut self, op: impl Fn(f32, f32) -> bool) {
        let result = op(self.stack.top_as_float(1), self.stack.top_as_float(0));
        self.stack.pop(2);
        self.stack.push_bool(result);
    }

    fn compare_int2(&mut self, op: impl Fn(Int2, Int2) -> bool) {
        let result = op(self.stack.top_as_int2(1), self.stack.top_as_int2(0));
        self.stack.pop(2);
        self.stack.push_bool(result);
    }

    fn compare_float2(&mut self, op: impl Fn(Float2, Float2) -> bool) {
        let result = op(self.stack.top_as_float2(1), self.stack.top_as_float2(0));
        self.stack.pop(2);
        self.stack.push_bool(result);
    }
}

/// Renders a state snapshot next to its program: the highlighted listing,
/// then the counters, call stack, value stack, and variables.
pub fn print_state(program: &Program, state: &VmState) {
    program.print(Some(state.program_counter));

    println!("\nProgram Counter: {}", state.program_counter);

    println!("\nCall Stack:");
    for (index, code_index) in state.call_stack.iter().enumerate() {
        println!("  [{}] -> {}", index, code_index);
    }

    println!("\nStack:");
    for value in state.stack.entries() {
        println!("  {} {}", value.ty(), value);
    }

    println!("\nVariables:");
    let mut variables: Vec<_> = state.variables.iter().collect();
    variables.sort_by(|a, b| a.0.cmp(b.0));
    for (name, (ty, value)) in variables {
        println!("  {} : {} {}", name.bold(), ty, value);
    }
}
