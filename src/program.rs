// File: src/program.rs
//
// The compiled program artifact: the linear operations, the script and
// external function tables, and the main entry point. Produced by the
// compiler, consumed read-only by the VM.

use crate::bytecode::{Instruction, Literal, OpCode, Type, Variable};
use colored::Colorize;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A host procedure bound to an external function. Receives the call
/// arguments in declared order; returns `None` for a void result.
pub type ExternalProc = Arc<dyn Fn(&[Literal]) -> Option<Literal> + Send + Sync>;

/// A host-provided callable exposed to scripts under a name. The declared
/// arity and argument types are authoritative for compile-time checks; the
/// proc itself is trusted to match.
#[derive(Clone, Serialize)]
pub struct ExternalFunction {
    pub return_type: Type,
    pub name: String,
    pub arguments: Vec<Variable>,
    #[serde(skip)]
    pub proc: ExternalProc,
}

impl ExternalFunction {
    pub fn new(
        return_type: Type,
        name: impl Into<String>,
        arguments: Vec<Variable>,
        proc: impl Fn(&[Literal]) -> Option<Literal> + Send + Sync + 'static,
    ) -> Self {
        Self { return_type, name: name.into(), arguments, proc: Arc::new(proc) }
    }
}

impl fmt::Debug for ExternalFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ExternalFunction")
            .field("return_type", &self.return_type)
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish()
    }
}

// Metadata equality only; the proc is opaque.
impl PartialEq for ExternalFunction {
    fn eq(&self, other: &Self) -> bool {
        self.return_type == other.return_type
            && self.name == other.name
            && self.arguments == other.arguments
    }
}

/// A script function. The first `argument_count` entries of
/// `local_variables` are the parameters, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub code_index: usize,
    pub return_type: Type,
    pub name: String,
    pub argument_count: usize,
    pub local_variables: Vec<Variable>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FunctionType {
    Script,
    External,
}

/// Resolution of a callable name to one of the two function tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallableFunctionInfo {
    pub ty: FunctionType,
    pub function_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Program {
    pub operations: Vec<Instruction>,
    pub functions: Vec<Function>,
    pub external_functions: Vec<ExternalFunction>,
    pub main_code_index: usize,
}

impl Program {
    /// Resolves a callable name, script functions first.
    pub fn find_function(&self, identifier: &str) -> Option<CallableFunctionInfo> {
        if let Some(index) = self.functions.iter().position(|f| f.name == identifier) {
            return Some(CallableFunctionInfo { ty: FunctionType::Script, function_index: index });
        }

        if let Some(index) = self.external_functions.iter().position(|f| f.name == identifier) {
            return Some(CallableFunctionInfo {
                ty: FunctionType::External,
                function_index: index,
            });
        }

        None
    }

    /// Checks the invariants every finalized program must satisfy: no
    /// placeholder survives, jump targets stay within the operations (the
    /// end-of-program sentinel included), and call indices resolve.
    pub fn validate(&self) -> Result<(), String> {
        for (index, instruction) in self.operations.iter().enumerate() {
            match instruction.opcode {
                OpCode::Placeholder => {
                    return Err(format!("operation {} is an unpatched placeholder", index));
                }
                OpCode::Jump | OpCode::JumpIfFalse => {
                    let target = instruction.jump_index();
                    if target > self.operations.len() {
                        return Err(format!(
                            "operation {} jumps to {} which is outside the program",
                            index, target
                        ));
                    }
                }
                OpCode::CallFunction => {
                    let target = instruction.call_index();
                    if !self.functions.iter().any(|f| f.code_index == target) {
                        return Err(format!(
                            "operation {} calls code index {} which is no function entry",
                            index, target
                        ));
                    }
                }
                OpCode::CallFunctionExternal => {
                    let target = instruction.call_index();
                    if target >= self.external_functions.len() {
                        return Err(format!(
                            "operation {} calls external {} which is not registered",
                            index, target
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Plain listing of the operations, one per line.
    pub fn disassemble(&self) -> String {
        let mut listing = String::new();
        for (index, instruction) in self.operations.iter().enumerate() {
            listing.push_str(&format!("{:3} : {}\n", index, instruction));
        }
        listing
    }

    /// Prints the listing with an optional highlighted instruction, then
    /// the function tables.
    pub fn print(&self, highlight_code_index: Option<usize>) {
        println!("Program:");
        for (index, instruction) in self.operations.iter().enumerate() {
            let is_current = highlight_code_index == Some(index);
            let line = format!("{}{:3} : {}", if is_current { ">" } else { " " }, index, instruction);

            if is_current {
                println!("{}", line.yellow().bold());
            } else {
                println!("{}", line);
            }
        }

        if !self.functions.is_empty() {
            println!("\nFunctions:");
            for (index, function) in self.functions.iter().enumerate() {
                println!(
                    "{:3} : {} {}({}) at {}",
                    index,
                    function.return_type,
                    function.name,
                    function
                        .local_variables
                        .iter()
                        .take(function.argument_count)
                        .map(|v| format!("{} {}", v.ty, v.name))
                        .collect::<Vec<_>>()
                        .join(", "),
                    function.code_index
                );

                for variable in &function.local_variables {
                    println!("      {} {}", variable.ty, variable.name);
                }
            }
        }

        if !self.external_functions.is_empty() {
            println!("\nExternal Functions:");
            for (index, function) in self.external_functions.iter().enumerate() {
                println!(
                    "{:3} : {} {}({})",
                    index,
                    function.return_type,
                    function.name,
                    function
                        .arguments
                        .iter()
                        .map(|v| format!("{} {}", v.ty, v.name))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }

        println!("\nMain Code Index: {}", self.main_code_index);
    }
}
