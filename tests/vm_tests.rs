// Integration tests for the Slate VM
//
// These tests compile complete programs and execute them to halt, checking
// the final stack, the variable frame, the external-function bridge, the
// host call entry point, and the program image round-trip.

use slate::byte_stack::ByteStack;
use slate::bytecode::{Int2, Literal, Type, Variable};
use slate::compiler::compile;
use slate::image;
use slate::program::{ExternalFunction, FunctionType, Program};
use slate::vm::{ByteCodeVm, VmState};
use std::sync::{Arc, Mutex};

fn run_source(text: &str) -> (Program, VmState) {
    run_with_externals(text, vec![])
}

fn run_with_externals(text: &str, externals: Vec<ExternalFunction>) -> (Program, VmState) {
    let result = compile(text, externals);
    assert!(result.error.is_none(), "unexpected error: {:?}", result.error);
    result.program.validate().expect("compiled program violates an invariant");

    let state = {
        let mut vm = ByteCodeVm::new(&result.program);
        vm.execute();
        vm.get_state()
    };

    (result.program, state)
}

fn variable(state: &VmState, name: &str) -> (Type, Literal) {
    state.variables.get(name).unwrap_or_else(|| panic!("variable '{}' was never stored", name)).clone()
}

// === End-to-end scenarios ===

#[test]
fn return_literal_leaves_the_value_on_the_stack() {
    let (_, state) = run_source("int main() { return 1; }");

    let mut expected = ByteStack::new();
    expected.push_int(1);
    assert!(state.stack.equals(&expected));
}

#[test]
fn if_statement_runs_its_body_when_true() {
    let (_, state) = run_source(
        "void main() {
            int x = 0;

            if (x == 0) {
                x = 1;
            }
        }",
    );

    assert_eq!(variable(&state, "x"), (Type::Int, Literal::Int(1)));
}

#[test]
fn if_statement_skips_its_body_when_false() {
    let (_, state) = run_source(
        "void main() {
            int x = 0;

            if (false) {
                x = 1;
            }
        }",
    );

    assert_eq!(variable(&state, "x"), (Type::Int, Literal::Int(0)));
}

#[test]
fn while_loop_counts_to_ten() {
    let (_, state) = run_source(
        "void main() {
            int x = 0;

            while (x < 10) {
                x = x + 1;
            }
        }",
    );

    assert_eq!(variable(&state, "x"), (Type::Int, Literal::Int(10)));
}

#[test]
fn while_loop_with_a_false_condition_never_runs() {
    let (_, state) = run_source(
        "void main() {
            int x = 0;

            while (false) {
                x = 1;
            }
        }",
    );

    assert_eq!(variable(&state, "x"), (Type::Int, Literal::Int(0)));
}

#[test]
fn function_call_returns_a_value() {
    let (_, state) = run_source(
        "int test() {
            return 1;
        }

        void main() {
            int x = test();
        }",
    );

    assert_eq!(variable(&state, "x"), (Type::Int, Literal::Int(1)));
}

#[test]
fn function_arguments_arrive_in_declaration_order() {
    let (_, state) = run_source(
        "int test(int x, int y) {
            return x + y;
        }

        void main() {
            int x = test(1, 2);
        }",
    );

    assert_eq!(variable(&state, "x"), (Type::Int, Literal::Int(3)));
    assert_eq!(variable(&state, "y"), (Type::Int, Literal::Int(2)));
}

#[test]
fn argument_order_is_observable_through_subtraction() {
    let (_, state) = run_source(
        "int sub(int a, int b) {
            return a - b;
        }

        void main() {
            int x = sub(5, 2);
        }",
    );

    assert_eq!(variable(&state, "x"), (Type::Int, Literal::Int(3)));
}

#[test]
fn expression_statements_leave_the_stack_empty() {
    let (_, state) = run_source(
        "void test() {
        }

        void main() {
            test();
        }",
    );

    assert_eq!(state.stack.len(), 0);
}

#[test]
fn recursion_unwinds_through_the_call_stack() {
    let (_, state) = run_source(
        "int sum(int n) {
            if (n == 0) {
                return 0;
            }
            return n + sum(n - 1);
        }

        void main() {
            int total = sum(4);
        }",
    );

    assert_eq!(variable(&state, "total"), (Type::Int, Literal::Int(10)));
    assert!(state.call_stack.is_empty());
}

// === Main args and determinism ===

#[test]
fn main_args_feed_the_prologue() {
    let result = compile("int main(int a, int b) { return a - b; }", vec![]);
    assert!(result.error.is_none());

    let mut vm = ByteCodeVm::new(&result.program);
    vm.set_main_args(&[(Type::Int, Literal::Int(5)), (Type::Int, Literal::Int(2))]);
    vm.execute();

    let state = vm.get_state();
    assert_eq!(variable(&state, "a"), (Type::Int, Literal::Int(5)));
    assert_eq!(variable(&state, "b"), (Type::Int, Literal::Int(2)));

    let mut expected = ByteStack::new();
    expected.push_int(3);
    assert!(state.stack.equals(&expected));
}

#[test]
fn execution_is_deterministic_for_pure_main() {
    let result = compile("int main(int a, int b) { return a * b + a; }", vec![]);
    assert!(result.error.is_none());

    let run = || {
        let mut vm = ByteCodeVm::new(&result.program);
        vm.set_main_args(&[(Type::Int, Literal::Int(6)), (Type::Int, Literal::Int(7))]);
        vm.execute();
        vm.get_state()
    };

    let first = run();
    let second = run();

    assert!(first.stack.equals(&second.stack));
    assert_eq!(first.variables, second.variables);
    assert_eq!(first.program_counter, second.program_counter);
}

// === Halt and host calls ===

#[test]
fn halt_stops_the_fetch_loop_without_draining_the_stack() {
    let result = compile("int main() { return 7; }", vec![]);
    assert!(result.error.is_none());

    let mut vm = ByteCodeVm::new(&result.program);
    vm.execute_op();
    vm.halt();

    assert!(!vm.get_is_not_halted());

    let state = vm.get_state();
    assert_eq!(state.stack.len(), 1);
    assert_eq!(state.stack.top_literal(0), Literal::Int(7));
}

#[test]
fn host_initiated_script_call_runs_to_completion() {
    let result = compile(
        "int double(int v) {
            return v + v;
        }

        void main() {
        }",
        vec![],
    );
    assert!(result.error.is_none());

    let mut vm = ByteCodeVm::new(&result.program);
    vm.execute();
    assert!(!vm.get_is_not_halted());

    assert!(vm.call_function("double", &[(Type::Int, Literal::Int(21))]));
    vm.execute();

    let state = vm.get_state();
    assert_eq!(state.stack.top_literal(0), Literal::Int(42));
}

#[test]
fn host_initiated_call_of_an_unknown_name_reports_failure() {
    let result = compile("void main() { }", vec![]);
    assert!(result.error.is_none());

    let mut vm = ByteCodeVm::new(&result.program);
    vm.execute();

    assert!(!vm.call_function("missing", &[]));
}

// === External functions ===

#[test]
fn external_arguments_arrive_in_declared_order() {
    let external = ExternalFunction::new(
        Type::Int,
        "sub",
        vec![Variable::new(Type::Int, "a"), Variable::new(Type::Int, "b")],
        |args| match (&args[0], &args[1]) {
            (Literal::Int(a), Literal::Int(b)) => Some(Literal::Int(a - b)),
            _ => None,
        },
    );

    let (_, state) = run_with_externals(
        "void main() {
            int x = sub(5, 2);
        }",
        vec![external],
    );

    assert_eq!(variable(&state, "x"), (Type::Int, Literal::Int(3)));
}

#[test]
fn void_externals_push_nothing() {
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = recorded.clone();

    let external = ExternalFunction::new(
        Type::Void,
        "emit",
        vec![Variable::new(Type::String, "message")],
        move |args| {
            if let Some(Literal::String(message)) = args.first() {
                sink.lock().unwrap().push(message.clone());
            }
            None
        },
    );

    let (_, state) = run_with_externals(
        "void main() {
            emit(\"first\");
            emit(\"second\");
        }",
        vec![external],
    );

    assert_eq!(state.stack.len(), 0);
    assert_eq!(*recorded.lock().unwrap(), vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn host_initiated_external_call_runs_synchronously() {
    let external = ExternalFunction::new(
        Type::Int,
        "answer",
        vec![],
        |_args| Some(Literal::Int(42)),
    );

    let result = compile("void main() { }", vec![external]);
    assert!(result.error.is_none());

    let mut vm = ByteCodeVm::new(&result.program);
    vm.execute();

    assert!(vm.call_function("answer", &[]));
    assert_eq!(vm.get_state().stack.top_literal(0), Literal::Int(42));
}

#[test]
fn vector_values_flow_through_externals_and_operators() {
    let external = ExternalFunction::new(
        Type::Int2,
        "make_ivec2",
        vec![Variable::new(Type::Int, "x"), Variable::new(Type::Int, "y")],
        |args| match (&args[0], &args[1]) {
            (Literal::Int(x), Literal::Int(y)) => Some(Literal::Int2(Int2::new(*x, *y))),
            _ => None,
        },
    );

    let (_, state) = run_with_externals(
        "void main() {
            ivec2 a = make_ivec2(1, 2);
            ivec2 b = a + a;
            ivec2 c = b * 3;
            bool same = a == a;
        }",
        vec![external],
    );

    assert_eq!(variable(&state, "b"), (Type::Int2, Literal::Int2(Int2::new(2, 4))));
    assert_eq!(variable(&state, "c"), (Type::Int2, Literal::Int2(Int2::new(6, 12))));
    assert_eq!(variable(&state, "same"), (Type::Bool, Literal::Bool(true)));
}

// === Function resolution ===

#[test]
fn find_function_distinguishes_script_and_external() {
    let external = ExternalFunction::new(Type::Void, "emit", vec![], |_args| None);

    let result = compile(
        "void helper() {
        }

        void main() {
        }",
        vec![external],
    );
    assert!(result.error.is_none());

    let helper = result.program.find_function("helper").expect("helper resolves");
    assert_eq!(helper.ty, FunctionType::Script);

    let emit = result.program.find_function("emit").expect("emit resolves");
    assert_eq!(emit.ty, FunctionType::External);
    assert_eq!(emit.function_index, 0);

    assert!(result.program.find_function("missing").is_none());
}

// === The typed stack ===

#[test]
fn byte_stack_tracks_types_through_mixed_pushes() {
    let mut stack = ByteStack::new();
    stack.push_int(7);
    stack.push_string("between");
    stack.push_bool(true);

    assert_eq!(stack.len(), 3);
    assert_eq!(stack.top_value_type(0), Type::Bool);
    assert_eq!(stack.top_value_type(1), Type::String);
    assert_eq!(stack.top_value_type(2), Type::Int);

    assert!(stack.top_as_bool(0));
    assert_eq!(stack.top_as_string(1), "between");
    assert_eq!(stack.top_as_int(2), 7);

    stack.pop(1);
    assert_eq!(stack.top_value_type(0), Type::String);
    assert_eq!(stack.top_as_string(0), "between");
}

#[test]
fn byte_stack_equality_is_byte_equality() {
    let mut left = ByteStack::new();
    left.push_int(1);
    left.push_string("x");

    let mut right = ByteStack::new();
    right.push_int(1);
    right.push_string("x");

    assert!(left.equals(&right));

    right.pop(1);
    right.push_string("y");
    assert!(!left.equals(&right));
}

#[test]
fn byte_stack_pop_clamps_at_the_bottom() {
    let mut stack = ByteStack::new();
    stack.push_int(1);
    stack.push_int(2);

    stack.pop(5);
    assert!(stack.is_empty());
    assert_eq!(stack.len(), 0);

    // Popping an empty stack stays a no-op.
    stack.pop(1);
    assert!(stack.is_empty());
}

#[test]
fn byte_stack_entries_walk_top_down() {
    let mut stack = ByteStack::new();
    stack.push_int(1);
    stack.push_float(2.5);

    assert_eq!(stack.entries(), vec![Literal::Float(2.5), Literal::Int(1)]);
}

// === Program images ===

#[test]
fn image_round_trips_and_stays_byte_identical() {
    let external = ExternalFunction::new(
        Type::Int,
        "sub",
        vec![Variable::new(Type::Int, "a"), Variable::new(Type::Int, "b")],
        |args| match (&args[0], &args[1]) {
            (Literal::Int(a), Literal::Int(b)) => Some(Literal::Int(a - b)),
            _ => None,
        },
    );

    let result = compile(
        "void main() {
            int x = sub(5, 2);

            while (x < 10) {
                x = x + 1;
            }
        }",
        vec![external.clone()],
    );
    assert!(result.error.is_none());

    let bytes = image::save(&result.program);
    let loaded = image::load(&bytes, &[external]).expect("the image loads");

    assert_eq!(loaded, result.program);
    assert_eq!(image::save(&loaded), bytes);

    let mut vm = ByteCodeVm::new(&loaded);
    vm.execute();
    assert_eq!(variable(&vm.get_state(), "x"), (Type::Int, Literal::Int(10)));
}

#[test]
fn image_load_requires_the_recorded_externals() {
    let external = ExternalFunction::new(Type::Void, "emit", vec![], |_args| None);

    let result = compile("void main() { emit(); }", vec![external.clone()]);
    assert!(result.error.is_none());

    let bytes = image::save(&result.program);

    let missing = image::load(&bytes, &[]);
    assert!(missing.is_err());

    let mismatched = ExternalFunction::new(Type::Int, "emit", vec![], |_args| Some(Literal::Int(0)));
    assert!(image::load(&bytes, &[mismatched]).is_err());

    assert!(image::load(&bytes, &[external]).is_ok());
}

#[test]
fn image_load_rejects_garbage() {
    assert!(image::load(&[], &[]).is_err());
    assert!(image::load(&[9, 0, 0, 0, 0], &[]).is_err());

    let result = compile("void main() { }", vec![]);
    let mut bytes = image::save(&result.program);
    bytes.push(0);
    assert!(image::load(&bytes, &[]).is_err());
}
