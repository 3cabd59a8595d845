//! Software interrupt dispatch
//!
//! An interrupt is either serviced by the host (when the bus claims the vector
//! through [`Bus8086::is_interrupt_override`]) or taken through the interrupt
//! vector table at 0000:0000 the way the hardware does it.

use super::flags::{FLAG_IF, FLAG_TF};
use super::{Bus8086, Cpu8086, CpuError, Flags};
use crate::logging::{log, LogCategory, LogLevel};

/// Outcome of raising an interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptRequest {
    pub vector: u8,
    /// True when the host serviced the vector; no stack frame was built
    pub overridden: bool,
}

impl<B: Bus8086> Cpu8086<B> {
    /// Raise software interrupt `vector`
    ///
    /// Host-overridden vectors run the bus handler against the live registers
    /// and resume at the instruction after `INT`. All other vectors push FLAGS,
    /// CS and IP, clear IF and TF, and load CS:IP from the vector table.
    pub fn interrupt(&mut self, vector: u8) -> Result<InterruptRequest, CpuError> {
        if self.bus.is_interrupt_override(vector) {
            log(LogCategory::Interrupts, LogLevel::Debug, || {
                format!(
                    "INT {:02X}h AH={:02X} serviced by host",
                    vector,
                    self.regs.ah()
                )
            });
            self.bus.interrupt_override(&mut self.regs, vector)?;
            return Ok(InterruptRequest {
                vector,
                overridden: true,
            });
        }

        let entry = vector as u16 * 4;
        let ip = self.read_u16(0, entry);
        let cs = self.read_u16(0, entry.wrapping_add(2));
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!(
                "INT {:02X}h from {:04X}:{:04X} -> {:04X}:{:04X}",
                vector, self.regs.cs, self.regs.ip, cs, ip
            )
        });

        self.push(self.regs.flags.bits());
        self.regs.flags.set(FLAG_IF, false);
        self.regs.flags.set(FLAG_TF, false);
        self.push(self.regs.cs);
        self.push(self.regs.ip);
        self.regs.cs = cs;
        self.regs.ip = ip;

        Ok(InterruptRequest {
            vector,
            overridden: false,
        })
    }

    /// INT 3 (0xCC)
    pub(super) fn op_int3(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        self.interrupt(3)?;
        Ok(52)
    }

    /// INT imm8 (0xCD)
    pub(super) fn op_int(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        let vector = self.fetch_u8();
        self.interrupt(vector)?;
        Ok(51)
    }

    /// INTO (0xCE): INT 4 when OF is set
    pub(super) fn op_into(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        if !self.regs.flags.overflow() {
            return Ok(4);
        }
        self.interrupt(4)?;
        Ok(53)
    }

    /// IRET (0xCF)
    pub(super) fn op_iret(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        self.regs.ip = self.pop();
        self.regs.cs = self.pop();
        let bits = self.pop();
        self.regs.flags = Flags::from_bits(bits);
        Ok(24)
    }
}
