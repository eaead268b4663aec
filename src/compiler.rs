// File: src/compiler.rs
//
// Semantic walker and bytecode emitter for the Slate compiler. Visits the
// parse tree in a single pass, performing identifier resolution, type
// checking, and operator selection while emitting instructions through the
// generator. Forward jumps are emitted as placeholders and backpatched once
// the target offset is known.
//
// Error protocol: the first semantic error is written into the generator's
// sticky slot together with the offending node's span, and the walk unwinds
// to the driver through the payload-free `Abort` marker.

use crate::ast::{self, Block, Expr, FunctionDecl, Stmt};
use crate::bytecode::{BinaryOperator, Instruction, OpCode, Type, UnaryOperator};
use crate::errors::{CompileError, CompileErrorKind, Span};
use crate::generator::{ByteCodeGenerator, ScopeKind};
use crate::lexer;
use crate::ops;
use crate::parser::Parser;
use crate::program::{ExternalFunction, Program};
use once_cell::sync::OnceCell;

/// Output of a compilation: the program plus the error slot. On error the
/// program is the partial emission up to the abort, useful for inspection
/// but not guaranteed executable.
#[derive(Debug)]
pub struct CompilationResult {
    pub program: Program,
    pub error: Option<CompileError>,
}

/// Compiles source text against a set of pre-registered host functions.
pub fn compile(text: &str, external_functions: Vec<ExternalFunction>) -> CompilationResult {
    let tokens = match lexer::tokenize(text) {
        Ok(tokens) => tokens,
        Err(error) => {
            return CompilationResult {
                program: Program::default(),
                error: Some(error.with_excerpt(text)),
            };
        }
    };

    let tree = match Parser::new(tokens).parse_program() {
        Ok(tree) => tree,
        Err(error) => {
            return CompilationResult {
                program: Program::default(),
                error: Some(error.with_excerpt(text)),
            };
        }
    };

    let mut compiler = Compiler::new();

    // An abort carries no payload; the generator's error slot is the
    // authoritative diagnostic.
    if compiler.compile_program(&tree, external_functions).is_err() {
        debug_assert!(compiler.gen.has_error());
    }

    let (program, error) = compiler.gen.into_results();
    CompilationResult { program, error: error.map(|error| error.with_excerpt(text)) }
}

/// Unwind marker raised by a handler after it has set the error slot.
pub(crate) struct Abort;

type Fallible<T> = Result<T, Abort>;

struct Compiler {
    gen: ByteCodeGenerator,
    trace_depth: usize,
}

impl Compiler {
    fn new() -> Self {
        Self { gen: ByteCodeGenerator::new(), trace_depth: 0 }
    }

    fn fail(&mut self, span: Span, kind: CompileErrorKind, message: impl Into<String>) -> Abort {
        self.gen.set_error(CompileError::new(kind, span, message));
        Abort
    }

    // === Program and functions ===

    fn compile_program(
        &mut self,
        tree: &ast::Program,
        external_functions: Vec<ExternalFunction>,
    ) -> Fallible<()> {
        self.trace("program");
        self.gen.scope_push(ScopeKind::Global);

        let result = self.compile_program_body(tree, external_functions);

        self.gen.scope_pop();
        result
    }

    fn compile_program_body(
        &mut self,
        tree: &ast::Program,
        external_functions: Vec<ExternalFunction>,
    ) -> Fallible<()> {
        for function in external_functions {
            let name = function.name.clone();
            if let Err(kind) = self.gen.function_declare_external(function) {
                return Err(self.fail(
                    Span::default(),
                    kind,
                    format!("external function '{}' collides with another declaration", name),
                ));
            }
        }

        for function in &tree.functions {
            self.compile_function(function)?;
        }

        Ok(())
    }

    fn compile_function(&mut self, decl: &FunctionDecl) -> Fallible<()> {
        self.trace(format!("function {}", decl.name));

        if let Err(kind) = self.gen.function_declare(decl.return_type, &decl.name, decl.params.len())
        {
            return Err(self.fail(decl.span, kind, format!("cannot declare function '{}'", decl.name)));
        }

        self.gen.scope_push(ScopeKind::Function);
        self.trace_depth += 1;

        let result = self.compile_function_body(decl);

        self.trace_depth -= 1;
        self.gen.scope_pop();
        result
    }

    fn compile_function_body(&mut self, decl: &FunctionDecl) -> Fallible<()> {
        for param in &decl.params {
            if let Err(kind) = self.gen.variable_declare(param.ty, &param.name) {
                return Err(self.fail(
                    param.span,
                    kind,
                    format!("cannot declare parameter '{}'", param.name),
                ));
            }
        }

        // The caller pushes arguments left-to-right, so the rightmost one
        // is on top and must be stored first.
        for param in decl.params.iter().rev() {
            self.gen.emit(Instruction::store_variable(param.ty, &param.name));
        }

        self.compile_block(&decl.body)?;

        if self.gen.op_count() == 0 || self.gen.last_opcode() != Some(OpCode::Return) {
            if decl.return_type == Type::Void {
                self.gen.emit(Instruction::new(OpCode::Return));
            } else {
                return Err(self.fail(
                    decl.span,
                    CompileErrorKind::NonVoidFunctionMissingReturn,
                    format!("function '{}' does not end with a return", decl.name),
                ));
            }
        }

        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Fallible<()> {
        self.trace("block");
        self.gen.scope_push(ScopeKind::Block);
        self.trace_depth += 1;

        let mut result = Ok(());
        for statement in &block.statements {
            result = self.compile_stmt(statement);
            if result.is_err() {
                break;
            }
        }

        self.trace_depth -= 1;
        self.gen.scope_pop();
        result
    }

    // === Statements ===

    fn compile_stmt(&mut self, statement: &Stmt) -> Fallible<()> {
        match statement {
            Stmt::VarDecl { ty, name, value, span } => {
                self.trace(format!("declare {}", name));

                let expression_type = self.compile_expr(value)?;
                if expression_type != *ty {
                    return Err(self.fail(
                        *span,
                        CompileErrorKind::TypeMismatch,
                        format!(
                            "'{}' is declared {} but initialized with {}",
                            name, ty, expression_type
                        ),
                    ));
                }

                if let Err(kind) = self.gen.variable_declare(*ty, name) {
                    return Err(self.fail(*span, kind, format!("cannot declare variable '{}'", name)));
                }

                self.gen.emit(Instruction::store_variable(*ty, name));
                Ok(())
            }

            Stmt::Assign { name, value, span } => {
                self.trace(format!("assign {}", name));

                if self.gen.variable_get_type(name).is_none() {
                    return Err(self.fail(
                        *span,
                        CompileErrorKind::IdentifierNotDeclared,
                        format!("'{}' is not a declared variable", name),
                    ));
                }

                // The store carries the expression's type, not the declared
                // one; assignment trusts the most recent expression.
                let expression_type = self.compile_expr(value)?;
                self.gen.emit(Instruction::store_variable(expression_type, name));
                Ok(())
            }

            Stmt::Return { value, span } => {
                self.trace("return");

                let expression_type = match value {
                    Some(expression) => self.compile_expr(expression)?,
                    None => Type::Void,
                };

                let return_type = match self.gen.function_get_current_return_type() {
                    Some(return_type) => return_type,
                    None => {
                        return Err(self.fail(
                            *span,
                            CompileErrorKind::ParseError,
                            "return outside of a function",
                        ));
                    }
                };

                if expression_type != return_type {
                    return Err(self.fail(
                        *span,
                        CompileErrorKind::TypeMismatch,
                        format!("returning {} from a {} function", expression_type, return_type),
                    ));
                }

                self.gen.emit(Instruction::new(OpCode::Return));
                Ok(())
            }

            Stmt::If { condition, body, .. } => {
                self.trace("if");

                let condition_type = self.compile_expr(condition)?;
                if condition_type != Type::Bool {
                    return Err(self.fail(
                        condition.span(),
                        CompileErrorKind::TypeMismatch,
                        format!("if condition is {}, not BOOL", condition_type),
                    ));
                }

                let jump_to_patch = self.gen.emit_placeholder();

                self.compile_block(body)?;

                let after_block = self.gen.current_index();
                self.gen.patch(jump_to_patch, Instruction::jump_if_false(after_block));
                Ok(())
            }

            Stmt::While { condition, body, .. } => {
                self.trace("while");

                let before_condition = self.gen.current_index();

                let condition_type = self.compile_expr(condition)?;
                if condition_type != Type::Bool {
                    return Err(self.fail(
                        condition.span(),
                        CompileErrorKind::TypeMismatch,
                        format!("while condition is {}, not BOOL", condition_type),
                    ));
                }

                let jump_to_patch = self.gen.emit_placeholder();

                self.compile_block(body)?;
                self.gen.emit(Instruction::jump(before_condition));

                let after_block = self.gen.current_index();
                self.gen.patch(jump_to_patch, Instruction::jump_if_false(after_block));
                Ok(())
            }

            Stmt::Expr { expr, .. } => {
                self.trace("expression statement");

                self.compile_expr(expr)?;
                self.gen.emit(Instruction::new(OpCode::Pop));
                Ok(())
            }

            Stmt::Block(block) => self.compile_block(block),
        }
    }

    // === Expressions ===

    fn compile_expr(&mut self, expression: &Expr) -> Fallible<Type> {
        match expression {
            Expr::Literal { value, span: _ } => {
                let ty = value.ty();
                self.gen.emit(Instruction::push_literal(value.clone()));
                Ok(ty)
            }

            Expr::Identifier { name, span } => {
                let ty = match self.gen.variable_get_type(name) {
                    Some(ty) => ty,
                    None => {
                        return Err(self.fail(
                            *span,
                            CompileErrorKind::IdentifierNotDeclared,
                            format!("'{}' is not a declared variable", name),
                        ));
                    }
                };

                self.gen.emit(Instruction::push_variable(ty, name));
                Ok(ty)
            }

            Expr::Unary { op, operand, span } => {
                let right_type = self.compile_expr(operand)?;
                self.emit_unary_op(*span, right_type, *op)
            }

            Expr::Binary { op, left, right, span } => {
                let left_type = self.compile_expr(left)?;
                let right_type = self.compile_expr(right)?;
                self.emit_binary_op(*span, left_type, right_type, *op)
            }

            Expr::Call { name, args, span } => self.compile_call(name, args, *span),
        }
    }

    fn compile_call(&mut self, name: &str, args: &[Expr], span: Span) -> Fallible<Type> {
        self.trace(format!("call {}", name));

        let target = match self.gen.function_get_info(name) {
            Some(target) => target,
            None => {
                return Err(self.fail(
                    span,
                    CompileErrorKind::IdentifierNotDeclared,
                    format!("'{}' is not a declared function", name),
                ));
            }
        };

        // Arguments are evaluated and pushed in source order.
        let mut argument_types = Vec::with_capacity(args.len());
        for arg in args {
            argument_types.push((self.compile_expr(arg)?, arg.span()));
        }

        if argument_types.len() != target.argument_count {
            return Err(self.fail(
                span,
                CompileErrorKind::FunctionCalledWithWrongNumberOfArgs,
                format!(
                    "'{}' takes {} arguments, {} given",
                    name,
                    target.argument_count,
                    argument_types.len()
                ),
            ));
        }

        for (index, (argument_type, argument_span)) in argument_types.iter().enumerate() {
            if target.parameter_types.get(index) != Some(argument_type) {
                return Err(self.fail(
                    *argument_span,
                    CompileErrorKind::TypeMismatch,
                    format!("argument {} of '{}' has the wrong type", index + 1, name),
                ));
            }
        }

        if target.is_external {
            self.gen.emit(Instruction::call_external(target.call_index));
        } else {
            self.gen.emit(Instruction::call(target.call_index));
        }

        Ok(target.return_type)
    }

    // === Operator emission ===

    fn emit_unary_op(&mut self, span: Span, right_type: Type, op: UnaryOperator) -> Fallible<Type> {
        if let Some(kind) = ops::map_unary_op_validate(right_type, op) {
            return Err(self.fail(span, kind, format!("unary operator applied to {}", right_type)));
        }

        let mapping = match ops::map_unary_op(right_type, op) {
            Some(mapping) => mapping,
            None => {
                return Err(self.fail(
                    span,
                    CompileErrorKind::TypeMismatch,
                    format!("no unary operator for {}", right_type),
                ));
            }
        };

        self.gen.emit(Instruction::new(mapping.opcode));
        Ok(mapping.result_type)
    }

    fn emit_binary_op(
        &mut self,
        span: Span,
        left_type: Type,
        right_type: Type,
        op: BinaryOperator,
    ) -> Fallible<Type> {
        if let Some(kind) = ops::map_binary_op_validate(left_type, right_type, op) {
            return Err(self.fail(span, kind, "strings only support equality comparisons"));
        }

        let mapping = match ops::map_binary_op(left_type, right_type, op) {
            Some(mapping) => mapping,
            None => {
                return Err(self.fail(
                    span,
                    CompileErrorKind::TypeMismatch,
                    format!("no operator for {} and {}", left_type, right_type),
                ));
            }
        };

        self.gen.emit(Instruction::new(mapping.opcode));
        Ok(mapping.result_type)
    }

    // === Trace ===

    fn trace(&self, label: impl std::fmt::Display) {
        if trace_enabled() {
            eprintln!("{:indent$}{}", "", label, indent = self.trace_depth * 2);
        }
    }
}

fn trace_enabled() -> bool {
    static TRACE_ENABLED: OnceCell<bool> = OnceCell::new();
    *TRACE_ENABLED.get_or_init(|| std::env::var("SLATE_TRACE").is_ok())
}
