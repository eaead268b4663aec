// Integration tests for the Slate compiler
//
// These tests compile complete programs and check the produced bytecode,
// the function tables, and the error taxonomy: every compile error kind is
// exercised, and every compiled program is held to the finalized-program
// invariants.

use slate::bytecode::{BinaryOperator, Instruction, Literal, OpCode, Type, UnaryOperator, Variable};
use slate::compiler::{compile, CompilationResult};
use slate::errors::CompileErrorKind;
use slate::ops;
use slate::program::ExternalFunction;

fn compile_source(text: &str) -> CompilationResult {
    compile(text, vec![])
}

fn error_kind(result: &CompilationResult) -> Option<CompileErrorKind> {
    result.error.as_ref().map(|error| error.kind)
}

fn assert_clean(result: &CompilationResult) {
    assert_eq!(error_kind(result), None, "unexpected error: {:?}", result.error);
    result.program.validate().expect("compiled program violates an invariant");
}

// === Error taxonomy ===

#[test]
fn identifier_not_declared() {
    let result = compile_source(
        "void main() {
            int x = x;
        }",
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::IdentifierNotDeclared));
}

#[test]
fn identifier_already_declared() {
    let result = compile_source(
        "void main() {
            int x = 0;
            int x = 0;
        }",
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::IdentifierAlreadyDeclared));
}

#[test]
fn math_type_mismatch() {
    let result = compile_source(
        "void main() {
            string x = \"\";
            string z = x + 1;
        }",
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::TypeMismatch));
}

#[test]
fn no_strings_in_math_operations() {
    let result = compile_source(
        "void main() {
            string x = \"\";
            string z = x + \"\";
        }",
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::MathOperationOnString));
}

#[test]
fn no_ordered_comparisons_on_strings() {
    let result = compile_source(
        "void main() {
            string x = \"\";
            bool z = x > \"\";
        }",
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::MathOperationOnString));
}

#[test]
fn can_compare_strings() {
    let result = compile_source(
        "void main() {
            string x = \"\";
            bool z = x == \"\";
            bool w = x != \"\";
        }",
    );

    assert_clean(&result);
}

#[test]
fn scope_owns_declaration() {
    let result = compile_source(
        "void main() {
            int x = 4;
            {
                int y = 3;
            }
            int z = x + y;
        }",
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::IdentifierNotDeclared));
}

#[test]
fn return_statement_needs_same_type() {
    let result = compile_source(
        "float main() {
            return 1;
        }",
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::TypeMismatch));
}

#[test]
fn non_void_function_needs_return() {
    let result = compile_source("int main() { }");

    assert_eq!(error_kind(&result), Some(CompileErrorKind::NonVoidFunctionMissingReturn));
}

#[test]
fn function_needs_correct_number_of_args() {
    let result = compile_source(
        "void test(int x) {
        }

        void main() {
            test();
        }",
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::FunctionCalledWithWrongNumberOfArgs));
}

#[test]
fn function_needs_correct_type_of_args() {
    let result = compile_source(
        "void test(int x) {
        }

        void main() {
            test(1.1);
        }",
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::TypeMismatch));
}

#[test]
fn mixed_int_and_float_is_a_mismatch() {
    let result = compile_source(
        "void main() {
            int x = 1 + 1.5;
        }",
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::TypeMismatch));
}

#[test]
fn if_condition_must_be_bool() {
    let result = compile_source(
        "void main() {
            if (1) {
            }
        }",
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::TypeMismatch));
}

#[test]
fn calling_an_unknown_function_is_reported() {
    let result = compile_source(
        "void main() {
            missing();
        }",
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::IdentifierNotDeclared));
}

#[test]
fn malformed_source_is_a_parse_error() {
    let result = compile_source("void main() { int = ; }");

    assert_eq!(error_kind(&result), Some(CompileErrorKind::ParseError));
}

#[test]
fn state_blocks_are_not_part_of_the_surface() {
    let result = compile_source("state { int x = 0; } void main() { }");

    assert_eq!(error_kind(&result), Some(CompileErrorKind::ParseError));
}

#[test]
fn first_error_wins() {
    let result = compile_source(
        "void main() {
            int x = x;
            int y = y;
        }",
    );

    let error = result.error.expect("expected an error");
    assert_eq!(error.kind, CompileErrorKind::IdentifierNotDeclared);
    assert_eq!(error.span.start_line, 2);
}

#[test]
fn errors_carry_the_offending_excerpt() {
    let result = compile_source("void main() { int x = y; }");

    let error = result.error.expect("expected an error");
    assert_eq!(error.kind, CompileErrorKind::IdentifierNotDeclared);
    assert_eq!(error.excerpt.as_deref(), Some("y"));
}

// === Bytecode shapes ===

#[test]
fn return_literal() {
    let result = compile_source("int main() { return 1; }");

    assert_clean(&result);
    assert_eq!(
        result.program.operations,
        vec![Instruction::push_literal(Literal::Int(1)), Instruction::new(OpCode::Return)]
    );
    assert_eq!(result.program.main_code_index, 0);
}

#[test]
fn empty_void_function_is_a_single_return() {
    let result = compile_source("void main() { }");

    assert_clean(&result);
    assert_eq!(result.program.operations, vec![Instruction::new(OpCode::Return)]);
}

#[test]
fn if_statement_backpatches_past_the_block() {
    let result = compile_source(
        "void main() {
            int x = 0;

            if (x == 0) {
                x = 1;
            }
        }",
    );

    assert_clean(&result);
    assert_eq!(
        result.program.operations,
        vec![
            Instruction::push_literal(Literal::Int(0)),
            Instruction::store_variable(Type::Int, "x"),
            Instruction::push_variable(Type::Int, "x"),
            Instruction::push_literal(Literal::Int(0)),
            Instruction::new(OpCode::EqualsInt),
            Instruction::jump_if_false(8),
            Instruction::push_literal(Literal::Int(1)),
            Instruction::store_variable(Type::Int, "x"),
            Instruction::new(OpCode::Return),
        ]
    );
}

#[test]
fn while_statement_jumps_back_to_the_condition() {
    let result = compile_source(
        "void main() {
            int x = 0;

            while (x < 10) {
                x = x + 1;
            }
        }",
    );

    assert_clean(&result);

    let operations = &result.program.operations;
    assert_eq!(operations[5], Instruction::jump_if_false(11));
    assert_eq!(operations[10], Instruction::jump(2));
    assert_eq!(operations[11], Instruction::new(OpCode::Return));
}

#[test]
fn parameters_are_stored_in_reverse_declaration_order() {
    let result = compile_source(
        "int test(int x, int y) {
            return x + y;
        }

        void main() {
            int x = test(1, 2);
        }",
    );

    assert_clean(&result);

    // The caller pushes left-to-right, so the prologue pops the rightmost
    // parameter first.
    assert_eq!(result.program.operations[0], Instruction::store_variable(Type::Int, "y"));
    assert_eq!(result.program.operations[1], Instruction::store_variable(Type::Int, "x"));

    // The function table still records the parameters in declaration order.
    let test = &result.program.functions[0];
    assert_eq!(test.name, "test");
    assert_eq!(test.argument_count, 2);
    assert_eq!(
        test.local_variables[..2],
        [Variable::new(Type::Int, "x"), Variable::new(Type::Int, "y")]
    );
}

#[test]
fn main_entry_points_at_main() {
    let result = compile_source(
        "void helper() {
        }

        void main() {
        }",
    );

    assert_clean(&result);

    let main = result
        .program
        .functions
        .iter()
        .find(|function| function.name == "main")
        .expect("main is in the function table");
    assert_eq!(result.program.main_code_index, main.code_index);
    assert_eq!(result.program.main_code_index, 1);
}

#[test]
fn unary_operators_pick_typed_opcodes() {
    let result = compile_source(
        "void main() {
            bool b = !true;
            int i = -3;
            float f = -1.5;
        }",
    );

    assert_clean(&result);

    let opcodes: Vec<OpCode> =
        result.program.operations.iter().map(|instruction| instruction.opcode).collect();
    assert!(opcodes.contains(&OpCode::NotBool));
    assert!(opcodes.contains(&OpCode::NegateInt));
    assert!(opcodes.contains(&OpCode::NegateFloat));
}

#[test]
fn assignment_stores_the_expression_type() {
    // The initializer rule is the only declared-type check; assignment
    // trusts the most recent expression.
    let result = compile_source(
        "void main() {
            int x = 0;
            x = 1 == 1;
        }",
    );

    assert_clean(&result);
    assert!(result
        .program
        .operations
        .contains(&Instruction::store_variable(Type::Bool, "x")));
}

#[test]
fn recompiling_is_deterministic() {
    let text = "int test(int x, int y) {
            return x + y;
        }

        void main() {
            int x = test(1, 2);

            while (x < 10) {
                x = x + 1;
            }
        }";

    let first = compile_source(text);
    let second = compile_source(text);

    assert_clean(&first);
    assert_clean(&second);
    assert_eq!(first.program, second.program);
}

// === External functions ===

fn external_sub() -> ExternalFunction {
    ExternalFunction::new(
        Type::Int,
        "sub",
        vec![Variable::new(Type::Int, "a"), Variable::new(Type::Int, "b")],
        |args| match (&args[0], &args[1]) {
            (Literal::Int(a), Literal::Int(b)) => Some(Literal::Int(a - b)),
            _ => None,
        },
    )
}

#[test]
fn external_calls_emit_the_external_opcode() {
    let result = compile(
        "void main() {
            int x = sub(5, 2);
        }",
        vec![external_sub()],
    );

    assert_clean(&result);
    assert!(result.program.operations.contains(&Instruction::call_external(0)));
}

#[test]
fn external_calls_check_arity() {
    let result = compile(
        "void main() {
            int x = sub(5);
        }",
        vec![external_sub()],
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::FunctionCalledWithWrongNumberOfArgs));
}

#[test]
fn external_calls_check_argument_types() {
    let result = compile(
        "void main() {
            int x = sub(5, 2.0);
        }",
        vec![external_sub()],
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::TypeMismatch));
}

#[test]
fn script_functions_cannot_shadow_externals() {
    let result = compile(
        "int sub(int a, int b) {
            return a - b;
        }

        void main() {
        }",
        vec![external_sub()],
    );

    assert_eq!(error_kind(&result), Some(CompileErrorKind::IdentifierAlreadyDeclared));
}

// === Operator tables ===

#[test]
fn binary_table_covers_the_scalar_baseline() {
    let add = ops::map_binary_op(Type::Int, Type::Int, BinaryOperator::Add)
        .expect("int addition resolves");
    assert_eq!(add.opcode, OpCode::AddInt);
    assert_eq!(add.result_type, Type::Int);

    let less = ops::map_binary_op(Type::Float, Type::Float, BinaryOperator::LessThan)
        .expect("float comparison resolves");
    assert_eq!(less.opcode, OpCode::LessThanFloat);
    assert_eq!(less.result_type, Type::Bool);

    let equals = ops::map_binary_op(Type::String, Type::String, BinaryOperator::Equal)
        .expect("string equality resolves");
    assert_eq!(equals.opcode, OpCode::EqualsString);
    assert_eq!(equals.result_type, Type::Bool);

    assert_eq!(ops::map_binary_op(Type::Int, Type::Float, BinaryOperator::Add), None);
}

#[test]
fn binary_table_covers_the_vector_extensions() {
    let scale = ops::map_binary_op(Type::Int2, Type::Int, BinaryOperator::Multiply)
        .expect("vector-by-scalar multiply resolves");
    assert_eq!(scale.opcode, OpCode::MultiplyInt2Int);
    assert_eq!(scale.result_type, Type::Int2);

    let add = ops::map_binary_op(Type::Float2, Type::Float2, BinaryOperator::Add)
        .expect("vector addition resolves");
    assert_eq!(add.opcode, OpCode::AddFloat2);

    // Ordered comparison never extends to vectors.
    assert_eq!(ops::map_binary_op(Type::Int2, Type::Int2, BinaryOperator::LessThan), None);
}

#[test]
fn validators_flag_string_math_before_the_mapper_runs() {
    assert_eq!(
        ops::map_binary_op_validate(Type::String, Type::String, BinaryOperator::Add),
        Some(CompileErrorKind::MathOperationOnString)
    );
    assert_eq!(
        ops::map_binary_op_validate(Type::String, Type::String, BinaryOperator::Equal),
        None
    );
    assert_eq!(
        ops::map_unary_op_validate(Type::String, UnaryOperator::Negate),
        Some(CompileErrorKind::MathOperationOnString)
    );
    assert_eq!(ops::map_unary_op_validate(Type::Int, UnaryOperator::Negate), None);

    let negate = ops::map_unary_op(Type::Int, UnaryOperator::Negate).expect("negate resolves");
    assert_eq!(negate.opcode, OpCode::NegateInt);
    assert_eq!(ops::map_unary_op(Type::Bool, UnaryOperator::Negate), None);
}
