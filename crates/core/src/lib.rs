//! Core emulator primitives: the 8086 CPU and shared logging.

pub mod cpu_8086;
pub mod logging;

/// A CPU-like component that can be stepped; returns cycles consumed.
pub trait Cpu {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Execute one instruction
    fn step(&mut self) -> Result<u32, Self::Error>;

    /// Whether the CPU stopped fetching (e.g. after HLT)
    fn is_halted(&self) -> bool;
}

impl<B: cpu_8086::Bus8086> Cpu for cpu_8086::Cpu8086<B> {
    type Error = cpu_8086::CpuError;

    fn step(&mut self) -> Result<u32, Self::Error> {
        self.run_instruction()
    }

    fn is_halted(&self) -> bool {
        cpu_8086::Cpu8086::is_halted(self)
    }
}
