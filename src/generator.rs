// File: src/generator.rs
//
// Bytecode generator for the Slate compiler. Owns the emit buffer, the
// identifier scope stack, the variable and function tables, and the single
// sticky compilation error slot. The semantic walker drives it; nothing in
// here inspects the parse tree.

use crate::bytecode::{Instruction, OpCode, Type, Variable};
use crate::errors::{CompileError, CompileErrorKind};
use crate::program::{ExternalFunction, Function, Program};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Variable,
    Function,
}

/// A named, kinded entry on the scope stack. Identifiers declared in a
/// popped scope become invisible; names must be unique across all live
/// scopes.
#[derive(Debug, Clone)]
pub struct Identifier {
    pub kind: IdentifierKind,
    pub name: String,
    pub is_external: bool,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    identifiers: Vec<Identifier>,
}

/// Owned resolution of a callable name for the call-site checks. For a
/// script function `call_index` is its code offset; for an external it is
/// the external-table slot.
#[derive(Debug, Clone)]
pub struct CallTarget {
    pub is_external: bool,
    pub call_index: usize,
    pub return_type: Type,
    pub argument_count: usize,
    pub parameter_types: Vec<Type>,
}

#[derive(Default)]
pub struct ByteCodeGenerator {
    ops: Vec<Instruction>,
    scopes: Vec<Scope>,
    global_variables: Vec<Variable>,
    functions: Vec<Function>,
    external_functions: Vec<ExternalFunction>,
    current_function: Option<usize>,
    error: Option<CompileError>,
}

impl ByteCodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    // === Emission ===

    pub fn emit(&mut self, instruction: Instruction) {
        self.ops.push(instruction);
    }

    /// Appends a placeholder and returns its index for a later `patch`.
    pub fn emit_placeholder(&mut self) -> usize {
        let index = self.ops.len();
        self.ops.push(Instruction::placeholder());
        index
    }

    pub fn patch(&mut self, code_index: usize, instruction: Instruction) {
        self.ops[code_index] = instruction;
    }

    /// The next emission offset, which is the branch target for anything
    /// emitted after this point.
    pub fn current_index(&self) -> usize {
        self.ops.len()
    }

    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    pub fn last_opcode(&self) -> Option<OpCode> {
        self.ops.last().map(|instruction| instruction.opcode)
    }

    // === Scopes and identifiers ===

    pub fn scope_push(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope { kind, identifiers: Vec::new() });
    }

    pub fn scope_pop(&mut self) {
        self.scopes.pop();
    }

    /// Declares an identifier in the innermost scope. Names must be unique
    /// across every scope currently on the stack.
    pub fn declare_identifier(
        &mut self,
        kind: IdentifierKind,
        name: &str,
        is_external: bool,
    ) -> Result<(), CompileErrorKind> {
        if self.lookup(name).is_some() {
            return Err(CompileErrorKind::IdentifierAlreadyDeclared);
        }

        match self.scopes.last_mut() {
            Some(scope) => {
                scope.identifiers.push(Identifier { kind, name: name.to_string(), is_external });
                Ok(())
            }
            None => panic!("identifier declared with no scope on the stack"),
        }
    }

    /// Declares an identifier in the bottom (global) scope regardless of
    /// the current nesting. Used for external functions.
    pub fn declare_identifier_global(
        &mut self,
        kind: IdentifierKind,
        name: &str,
        is_external: bool,
    ) -> Result<(), CompileErrorKind> {
        if self.lookup(name).is_some() {
            return Err(CompileErrorKind::IdentifierAlreadyDeclared);
        }

        match self.scopes.first_mut() {
            Some(scope) => {
                scope.identifiers.push(Identifier { kind, name: name.to_string(), is_external });
                Ok(())
            }
            None => panic!("identifier declared with no scope on the stack"),
        }
    }

    /// Walks the scopes innermost-first.
    pub fn lookup(&self, name: &str) -> Option<&Identifier> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.identifiers.iter())
            .find(|identifier| identifier.name == name)
    }

    // === Variables ===

    /// Declares a variable in the current scope and records it in the
    /// runtime-addressing mirror: the global table when the current scope
    /// is global, otherwise the current function's locals.
    pub fn variable_declare(&mut self, ty: Type, name: &str) -> Result<(), CompileErrorKind> {
        self.declare_identifier(IdentifierKind::Variable, name, false)?;

        let variable = Variable::new(ty, name);
        match self.current_scope_kind() {
            ScopeKind::Global => self.global_variables.push(variable),
            ScopeKind::Function | ScopeKind::Block => match self.current_function {
                Some(index) => self.functions[index].local_variables.push(variable),
                None => panic!("variable declared outside a function body"),
            },
        }

        Ok(())
    }

    /// Type of a visible variable. Visibility comes from the scope stack;
    /// the type comes from the mirrors.
    pub fn variable_get_type(&self, name: &str) -> Option<Type> {
        match self.lookup(name) {
            Some(identifier) if identifier.kind == IdentifierKind::Variable => {}
            _ => return None,
        }

        if let Some(index) = self.current_function {
            if let Some(variable) = self.functions[index]
                .local_variables
                .iter()
                .rev()
                .find(|variable| variable.name == name)
            {
                return Some(variable.ty);
            }
        }

        self.global_variables
            .iter()
            .rev()
            .find(|variable| variable.name == name)
            .map(|variable| variable.ty)
    }

    // === Functions ===

    /// Registers a script function starting at the current emission offset
    /// and makes it the function under compilation.
    pub fn function_declare(
        &mut self,
        return_type: Type,
        name: &str,
        argument_count: usize,
    ) -> Result<(), CompileErrorKind> {
        self.declare_identifier(IdentifierKind::Function, name, false)?;

        self.functions.push(Function {
            code_index: self.ops.len(),
            return_type,
            name: name.to_string(),
            argument_count,
            local_variables: Vec::new(),
        });
        self.current_function = Some(self.functions.len() - 1);

        Ok(())
    }

    /// Registers a host function at global scope. Externals are registered
    /// before any source is compiled and are immutable afterwards.
    pub fn function_declare_external(
        &mut self,
        function: ExternalFunction,
    ) -> Result<(), CompileErrorKind> {
        self.declare_identifier_global(IdentifierKind::Function, &function.name, true)?;
        self.external_functions.push(function);
        Ok(())
    }

    /// Resolves a callable name for a call site, script functions first.
    pub fn function_get_info(&self, name: &str) -> Option<CallTarget> {
        if let Some(function) = self.functions.iter().find(|function| function.name == name) {
            return Some(CallTarget {
                is_external: false,
                call_index: function.code_index,
                return_type: function.return_type,
                argument_count: function.argument_count,
                parameter_types: function
                    .local_variables
                    .iter()
                    .take(function.argument_count)
                    .map(|variable| variable.ty)
                    .collect(),
            });
        }

        if let Some(index) =
            self.external_functions.iter().position(|function| function.name == name)
        {
            let function = &self.external_functions[index];
            return Some(CallTarget {
                is_external: true,
                call_index: index,
                return_type: function.return_type,
                argument_count: function.arguments.len(),
                parameter_types: function.arguments.iter().map(|variable| variable.ty).collect(),
            });
        }

        None
    }

    /// Return type of the function whose body is being compiled.
    pub fn function_get_current_return_type(&self) -> Option<Type> {
        self.current_function.map(|index| self.functions[index].return_type)
    }

    // === Error slot ===

    /// Records a compilation error. The slot is sticky: the first error
    /// wins and later calls are ignored.
    pub fn set_error(&mut self, error: CompileError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Finalizes the program. The entry point is the script function named
    /// `main`, defaulting to offset 0 when absent. A set error slot means
    /// the program is partial and not guaranteed executable.
    pub fn into_results(self) -> (Program, Option<CompileError>) {
        let main_code_index = self
            .functions
            .iter()
            .find(|function| function.name == "main")
            .map(|function| function.code_index)
            .unwrap_or(0);

        (
            Program {
                operations: self.ops,
                functions: self.functions,
                external_functions: self.external_functions,
                main_code_index,
            },
            self.error,
        )
    }

    fn current_scope_kind(&self) -> ScopeKind {
        self.scopes.last().map(|scope| scope.kind).unwrap_or(ScopeKind::Global)
    }
}
