use std::str::FromStr;

use crate::machine::{MachineState, RunErrorKind, RunState};
use crate::output::DisplayMode;
use crate::program::Program;
use crate::radix::MAX_ADDR;

/// The thirteen defined machine operations, decoded from bits 15-12 of an
/// instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
    JnS = 0,
    Load,
    Store,
    Add,
    Subt,
    Input,
    Output,
    Halt,
    SkipCond,
    Jump,
    Clear,
    AddI,
    JumpI,
}

impl Opcode {
    pub fn from_nibble(nibble: u8) -> Option<Opcode> {
        Some(match nibble {
            0 => Opcode::JnS,
            1 => Opcode::Load,
            2 => Opcode::Store,
            3 => Opcode::Add,
            4 => Opcode::Subt,
            5 => Opcode::Input,
            6 => Opcode::Output,
            7 => Opcode::Halt,
            8 => Opcode::SkipCond,
            9 => Opcode::Jump,
            10 => Opcode::Clear,
            11 => Opcode::AddI,
            12 => Opcode::JumpI,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether the assembler demands an operand token for this mnemonic.
    pub fn requires_operand(self) -> bool {
        !matches!(
            self,
            Opcode::Input | Opcode::Output | Opcode::Halt | Opcode::Clear
        )
    }

    /// Whether fetch pre-loads MAR/MBR from the operand field. SkipCond and
    /// Jump take their operand straight from IR and touch no memory.
    pub fn fetches_operand(self) -> bool {
        matches!(
            self,
            Opcode::JnS
                | Opcode::Load
                | Opcode::Store
                | Opcode::Add
                | Opcode::Subt
                | Opcode::AddI
                | Opcode::JumpI
        )
    }
}

impl FromStr for Opcode {
    type Err = ();

    /// Expects the uppercased mnemonic.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "JNS" => Opcode::JnS,
            "LOAD" => Opcode::Load,
            "STORE" => Opcode::Store,
            "ADD" => Opcode::Add,
            "SUBT" => Opcode::Subt,
            "INPUT" => Opcode::Input,
            "OUTPUT" => Opcode::Output,
            "HALT" => Opcode::Halt,
            "SKIPCOND" => Opcode::SkipCond,
            "JUMP" => Opcode::Jump,
            "CLEAR" => Opcode::Clear,
            "ADDI" => Opcode::AddI,
            "JUMPI" => Opcode::JumpI,
            _ => return Err(()),
        })
    }
}

/// A machine wired up for execution: state plus the external I/O seam.
///
/// All mutation of registers and memory funnels through [`step`], which
/// performs one fetch-decode-execute cycle. There is no internal threading;
/// "run until halted" is a loop over `step` with a pollable stop flag as the
/// cooperative cancellation point, and input blocking is an explicit state
/// rather than a parked thread.
///
/// [`step`]: RunEnvironment::step
pub struct RunEnvironment {
    state: MachineState,
    opcode: Option<Opcode>,
    output_log: Vec<i16>,
    input_ready: bool,
    stop_requested: bool,
    stepping: bool,
}

impl RunEnvironment {
    /// Load a program into a fresh machine, ready to run.
    pub fn new(program: &Program) -> Result<RunEnvironment, RunErrorKind> {
        let mut state = MachineState::new();
        state.load(program)?;
        Ok(RunEnvironment {
            state,
            opcode: None,
            output_log: Vec::new(),
            input_ready: false,
            stop_requested: false,
            stepping: false,
        })
    }

    pub fn machine(&self) -> &MachineState {
        &self.state
    }

    /// Every word the program has emitted through `Output`, oldest first.
    pub fn output(&self) -> &[i16] {
        &self.output_log
    }

    /// Stop after each instruction instead of running freely.
    pub fn set_stepping(&mut self, stepping: bool) {
        self.stepping = stepping;
    }

    /// Ask the machine to halt at the next step boundary.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Hand a value to the INPUT register. Only meaningful while the machine
    /// is blocked on input; the next `step` moves it into the accumulator.
    pub fn supply_input(&mut self, value: i16) {
        if self.state.run_state() == RunState::BlockedOnInput {
            self.state.set_input(value);
            self.input_ready = true;
        }
    }

    /// Parse terminal text in the given display mode and supply it as input.
    ///
    /// A value that does not read back as a machine word halts the machine
    /// with a register error, the same as overrunning a physical register.
    pub fn supply_input_text(
        &mut self,
        text: &str,
        mode: DisplayMode,
    ) -> Result<(), RunErrorKind> {
        match mode.parse_word(text.trim()) {
            Some(value) => {
                self.supply_input(value);
                Ok(())
            }
            None => {
                self.state.set_fatal(RunErrorKind::RegisterOverflow);
                self.halt();
                Err(RunErrorKind::RegisterOverflow)
            }
        }
    }

    /// Execute one instruction and report the resulting state.
    ///
    /// From a halted state this restarts at the program's first address, the
    /// same as pressing run again after completion. From `BlockedOnInput` the
    /// step completes the pending `Input` (if a value has been supplied) and
    /// does nothing more. From states with no program there is nothing to do.
    pub fn step(&mut self) -> RunState {
        if self.stop_requested {
            self.stop_requested = false;
            self.state.set_run_state(RunState::HaltedByUser);
            return RunState::HaltedByUser;
        }
        match self.state.run_state() {
            RunState::Uninitialized | RunState::NoProgramLoaded => {
                return self.state.run_state();
            }
            RunState::BlockedOnInput => {
                if self.input_ready {
                    self.input_ready = false;
                    self.state.set_ac(self.state.input());
                    self.state.set_run_state(RunState::Running);
                    self.pause_if_stepping();
                }
                return self.state.run_state();
            }
            RunState::HaltedNormal | RunState::HaltedAbnormal | RunState::HaltedByUser => {
                self.restart();
            }
            RunState::Paused => self.state.set_run_state(RunState::Running),
            RunState::Running => {}
        }

        self.fetch();
        if self.state.fatal().is_none() {
            self.execute();
        }
        if self.state.fatal().is_some() {
            self.halt();
        } else {
            self.pause_if_stepping();
        }
        self.state.run_state()
    }

    /// Run until the machine leaves `Running`: a halt, an input block, a
    /// pause, or an external stop request.
    pub fn run(&mut self) -> RunState {
        loop {
            let state = self.step();
            if state != RunState::Running {
                return state;
            }
        }
    }

    /// Reset PC to the program start for a fresh run, keeping memory as the
    /// previous run left it.
    fn restart(&mut self) {
        self.state.clear_fatal();
        let start = self.state.start() as i16;
        self.state.set_pc(start);
        self.state.set_run_state(RunState::Running);
    }

    fn pause_if_stepping(&mut self) {
        if self.stepping && self.state.run_state() == RunState::Running {
            self.state.set_run_state(RunState::Paused);
        }
    }

    /// The fetch half of the cycle: IR from memory at PC, operand pre-load
    /// for the opcodes that take one, PC incremented.
    fn fetch(&mut self) {
        let m = &mut self.state;
        m.set_mar(m.pc() as i16);
        let instr = match m.read_mem(m.mar()) {
            Ok(word) => word,
            Err(kind) => return m.set_fatal(kind),
        };
        m.set_ir(instr);

        let nibble = ((instr as u16) >> 12) as u8;
        let Some(opcode) = Opcode::from_nibble(nibble) else {
            return m.set_fatal(RunErrorKind::IllegalOpcode);
        };
        self.opcode = Some(opcode);

        if opcode.fetches_operand() {
            m.set_mar((instr as u16 & MAX_ADDR) as i16);
            match m.read_mem(m.mar()) {
                Ok(word) => m.set_mbr(word),
                Err(kind) => return m.set_fatal(kind),
            }
        }

        let next = m.pc() + 1;
        if next > MAX_ADDR {
            return m.set_fatal(RunErrorKind::MaxAddressExceeded);
        }
        m.set_pc(next as i16);
    }

    /// The execute half of the cycle, dispatched on the opcode decoded by
    /// fetch. Each register transfer applies immediately; there is no
    /// rollback on error.
    fn execute(&mut self) {
        let Some(opcode) = self.opcode else { return };
        let m = &mut self.state;
        match opcode {
            Opcode::JnS => {
                let ret = m.pc() as i16;
                if let Err(kind) = m.write_mem(m.mar(), ret) {
                    return m.set_fatal(kind);
                }
                m.set_pc((m.mar() + 1) as i16);
            }
            Opcode::Load => m.set_ac(m.mbr()),
            Opcode::Store => {
                m.set_mbr(m.ac());
                if let Err(kind) = m.write_mem(m.mar(), m.mbr()) {
                    return m.set_fatal(kind);
                }
            }
            Opcode::Add => m.set_ac(m.ac().wrapping_add(m.mbr())),
            Opcode::Subt => m.set_ac(m.ac().wrapping_sub(m.mbr())),
            Opcode::Input => m.set_run_state(RunState::BlockedOnInput),
            Opcode::Output => {
                m.set_output(m.ac());
                let out = m.output();
                self.output_log.push(out);
            }
            Opcode::Halt => self.halt(),
            Opcode::SkipCond => {
                let cond = ((m.ir() as u16) >> 10) & 0x3;
                if cond == 3 {
                    return m.set_fatal(RunErrorKind::IllegalCondition);
                }
                let ac = m.ac();
                let skip = (ac < 0 && cond == 0) || (ac == 0 && cond == 1) || (ac > 0 && cond == 2);
                if skip {
                    m.set_pc((m.pc() + 1) as i16);
                }
            }
            Opcode::Jump => {
                let target = (m.ir() as u16 & MAX_ADDR) as i16;
                m.set_pc(target);
            }
            Opcode::Clear => m.set_ac(0),
            Opcode::AddI => {
                m.set_mar(m.mbr());
                match m.read_mem(m.mar()) {
                    Ok(word) => m.set_mbr(word),
                    Err(kind) => return m.set_fatal(kind),
                }
                m.set_ac(m.ac().wrapping_add(m.mbr()));
            }
            Opcode::JumpI => m.set_pc(m.mbr()),
        }
    }

    /// Transition to the matching halted state; a fatal error always forces
    /// `HaltedAbnormal`.
    fn halt(&mut self) {
        let halted = if self.state.fatal().is_some() {
            RunState::HaltedAbnormal
        } else {
            RunState::HaltedNormal
        };
        self.state.set_run_state(halted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;

    fn env_for(src: &str) -> RunEnvironment {
        let assembly = assemble(src);
        assert_eq!(assembly.error_count, 0, "fixture source must be clean");
        RunEnvironment::new(&assembly.program().unwrap()).unwrap()
    }

    #[test]
    fn add_and_store() {
        let mut env = env_for(
            "     LOAD X\n     ADD Y\n     STORE Z\n     HALT\nX,   DEC 5\nY,   DEC 7\nZ,   DEC 0\n     END\n",
        );
        assert_eq!(env.run(), RunState::HaltedNormal);
        // Z lives at address 6
        assert_eq!(env.machine().read_mem(6), Ok(12));
        assert_eq!(env.machine().ac(), 12);
    }

    #[test]
    fn subt_and_output() {
        let mut env = env_for(
            "     LOAD X\n     SUBT Y\n     OUTPUT\n     HALT\nX,   DEC 5\nY,   DEC 7\n     END\n",
        );
        assert_eq!(env.run(), RunState::HaltedNormal);
        assert_eq!(env.output(), &[-2]);
        assert_eq!(env.machine().output(), -2);
    }

    #[test]
    fn skipcond_on_negative_accumulator() {
        // Condition bits 00 skip when AC < 0: the OUTPUT is stepped over
        let mut env = env_for(
            "     LOAD X\n     SKIPCOND 000\n     OUTPUT\n     HALT\nX,   DEC -3\n     END\n",
        );
        assert_eq!(env.run(), RunState::HaltedNormal);
        assert!(env.output().is_empty());

        // AC = 3: no skip, the OUTPUT runs
        let mut env = env_for(
            "     LOAD X\n     SKIPCOND 000\n     OUTPUT\n     HALT\nX,   DEC 3\n     END\n",
        );
        assert_eq!(env.run(), RunState::HaltedNormal);
        assert_eq!(env.output(), &[3]);
    }

    #[test]
    fn skipcond_zero_and_positive_conditions() {
        // Condition bits 01 (operand 400) skip when AC == 0
        let mut env = env_for(
            "     CLEAR\n     SKIPCOND 0400\n     OUTPUT\n     HALT\n     END\n",
        );
        assert_eq!(env.run(), RunState::HaltedNormal);
        assert!(env.output().is_empty());

        // Condition bits 10 (operand 800) skip when AC > 0
        let mut env = env_for(
            "     LOAD X\n     SKIPCOND 800\n     OUTPUT\n     HALT\nX,   DEC 3\n     END\n",
        );
        assert_eq!(env.run(), RunState::HaltedNormal);
        assert!(env.output().is_empty());
    }

    #[test]
    fn illegal_condition_is_fatal() {
        // Condition bits 11
        let mut env = env_for("     SKIPCOND 0C00\n     HALT\n     END\n");
        assert_eq!(env.run(), RunState::HaltedAbnormal);
        assert_eq!(
            env.machine().fatal(),
            Some(RunErrorKind::IllegalCondition)
        );
    }

    #[test]
    fn input_blocks_until_supplied() {
        let mut env = env_for("     INPUT\n     OUTPUT\n     HALT\n     END\n");
        assert_eq!(env.run(), RunState::BlockedOnInput);
        // Without a value the machine stays put
        assert_eq!(env.step(), RunState::BlockedOnInput);
        env.supply_input(42);
        assert_eq!(env.step(), RunState::Running);
        assert_eq!(env.machine().ac(), 42);
        assert_eq!(env.run(), RunState::HaltedNormal);
        assert_eq!(env.output(), &[42]);
    }

    #[test]
    fn unparseable_input_halts_abnormally() {
        let mut env = env_for("     INPUT\n     HALT\n     END\n");
        assert_eq!(env.run(), RunState::BlockedOnInput);
        assert!(env
            .supply_input_text("xyzzy", crate::output::DisplayMode::Dec)
            .is_err());
        assert_eq!(env.machine().run_state(), RunState::HaltedAbnormal);
        assert_eq!(
            env.machine().fatal(),
            Some(RunErrorKind::RegisterOverflow)
        );
    }

    #[test]
    fn jns_stores_return_address_and_jumps() {
        // JnS SUB stores the return address (1) at SUB and continues at SUB+1
        let mut env = env_for(
            "     JNS SUB\n     HALT\nSUB, HEX 0\n     LOAD SUB\n     OUTPUT\n     JUMPI SUB\n     END\n",
        );
        assert_eq!(env.run(), RunState::HaltedNormal);
        assert_eq!(env.output(), &[1]);
        assert_eq!(env.machine().read_mem(2), Ok(1));
    }

    #[test]
    fn addi_dereferences_pointer() {
        let mut env = env_for(
            "     CLEAR\n     ADDI P\n     OUTPUT\n     HALT\nP,   HEX 5\nV,   DEC 33\n     END\n",
        );
        assert_eq!(env.run(), RunState::HaltedNormal);
        assert_eq!(env.output(), &[33]);
    }

    #[test]
    fn illegal_opcode_forces_abnormal_halt() {
        // 0xD000 carries opcode 13
        let mut env = env_for("     HEX 0D000\n     HALT\n     END\n");
        assert_eq!(env.run(), RunState::HaltedAbnormal);
        assert_eq!(env.machine().fatal(), Some(RunErrorKind::IllegalOpcode));
    }

    #[test]
    fn stop_request_halts_between_steps() {
        //  Tight loop that would never halt on its own
        let mut env = env_for("loop, JUMP loop\n END\n");
        assert_eq!(env.step(), RunState::Running);
        env.request_stop();
        assert_eq!(env.step(), RunState::HaltedByUser);
    }

    #[test]
    fn stepping_pauses_after_each_instruction() {
        let mut env = env_for(" CLEAR\n CLEAR\n HALT\n END\n");
        env.set_stepping(true);
        assert_eq!(env.run(), RunState::Paused);
        assert_eq!(env.run(), RunState::Paused);
        assert_eq!(env.run(), RunState::HaltedNormal);
    }

    #[test]
    fn run_after_halt_restarts_from_program_start() {
        let mut env = env_for(" LOAD X\n OUTPUT\n HALT\nX, DEC 9\n END\n");
        assert_eq!(env.run(), RunState::HaltedNormal);
        assert_eq!(env.run(), RunState::HaltedNormal);
        assert_eq!(env.output(), &[9, 9]);
    }

    #[test]
    fn jump_within_program() {
        let mut env = env_for(
            "     JUMP skip\n     OUTPUT\nskip, HALT\n     END\n",
        );
        assert_eq!(env.run(), RunState::HaltedNormal);
        assert!(env.output().is_empty());
    }
}
