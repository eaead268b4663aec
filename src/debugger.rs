// File: src/debugger.rs
//
// Thin controller over a VM providing step, continue, and breakpoint
// primitives. Strictly single-threaded: the debugger holds the only
// mutable handle on its VM, and breakpoints are cooperative pauses of the
// fetch loop.

use crate::program::Program;
use crate::vm::{print_state, ByteCodeVm, VmState};

/// A pause point, as a code offset into the program's operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub code_index: usize,
}

/// Consumer of VM state snapshots after each pause.
pub trait Presenter {
    fn present(&mut self, state: &VmState, program: &Program);
}

/// Default presenter: clears the terminal and renders the listing with the
/// current instruction highlighted, plus the VM state.
pub struct TerminalPresenter;

impl Presenter for TerminalPresenter {
    fn present(&mut self, state: &VmState, program: &Program) {
        print!("\x1b[2J\x1b[H");
        print_state(program, state);
    }
}

pub struct Debugger<'vm, 'p> {
    vm: &'vm mut ByteCodeVm<'p>,
    breakpoints: Vec<Breakpoint>,
    breakpoint_hit: bool,
    presenter: Box<dyn Presenter>,
}

impl<'vm, 'p> Debugger<'vm, 'p> {
    pub fn new(vm: &'vm mut ByteCodeVm<'p>) -> Self {
        Self::with_presenter(vm, Box::new(TerminalPresenter))
    }

    pub fn with_presenter(vm: &'vm mut ByteCodeVm<'p>, presenter: Box<dyn Presenter>) -> Self {
        Self { vm, breakpoints: Vec::new(), breakpoint_hit: false, presenter }
    }

    /// Runs to the next breakpoint or to halt.
    pub fn execute(&mut self) {
        self.breakpoint_continue();
    }

    pub fn breakpoint_add(&mut self, code_index: usize) {
        let breakpoint = Breakpoint { code_index };
        if !self.breakpoints.contains(&breakpoint) {
            self.breakpoints.push(breakpoint);
        }
    }

    pub fn breakpoint_remove(&mut self, code_index: usize) {
        self.breakpoints.retain(|breakpoint| breakpoint.code_index != code_index);
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// Executes one instruction if the VM is not halted, then presents.
    pub fn breakpoint_step(&mut self) {
        if self.vm.get_is_not_halted() {
            self.vm.execute_op();
        }

        self.present();
    }

    /// Executes until halted or until the program counter lands on a
    /// breakpoint, then presents.
    pub fn breakpoint_continue(&mut self) {
        self.breakpoint_hit = false;

        while self.vm.get_is_not_halted() && !self.breakpoint_hit {
            self.vm.execute_op();

            for breakpoint in &self.breakpoints {
                if breakpoint.code_index == self.vm.get_program_counter() {
                    self.breakpoint_hit = true;
                    break;
                }
            }
        }

        self.present();
    }

    /// Presents the current state without executing anything.
    pub fn present(&mut self) {
        let state = self.vm.get_state();
        self.presenter.present(&state, self.vm.program());
    }
}
