//! Host-side firmware services
//!
//! Software interrupts the [`PcBus`] claims through the interrupt override are
//! serviced here instead of by guest code. Only the INT 13h diskette services
//! a boot loader needs are implemented; INT 10h and every other vector report
//! an error to the driving loop.

use crate::bus::PcBus;
use crate::disk::SECTOR_SIZE;
use i86_core::cpu_8086::{physical_address, Bus8086, BusError, Registers};
use i86_core::logging::{log, LogCategory, LogLevel};

/// INT 13h status codes (returned in AH)
pub const STATUS_OK: u8 = 0x00;
pub const STATUS_INVALID_COMMAND: u8 = 0x01;
pub const STATUS_SECTOR_NOT_FOUND: u8 = 0x04;
pub const STATUS_NOT_READY: u8 = 0x80;

/// Dispatch an overridden interrupt
pub(crate) fn service_interrupt(
    bus: &mut PcBus,
    regs: &mut Registers,
    vector: u8,
) -> Result<(), BusError> {
    match vector {
        0x10 => Err(BusError::UnrecognizedService {
            vector,
            service: regs.ah(),
        }),
        0x13 => disk_service(bus, regs),
        _ => Err(BusError::UnrecognizedInterrupt(vector)),
    }
}

/// INT 13h: diskette services for drive 0
fn disk_service(bus: &mut PcBus, regs: &mut Registers) -> Result<(), BusError> {
    match regs.ah() {
        // Reset disk system
        0x00 => {
            finish(bus, regs, STATUS_OK);
        }
        // Status of last operation
        0x01 => {
            let status = bus.disk_status();
            regs.set_ah(status);
            regs.set_carry(status != STATUS_OK);
        }
        0x02 => read_sectors(bus, regs),
        0x08 => drive_parameters(bus, regs),
        service => {
            return Err(BusError::UnrecognizedService {
                vector: 0x13,
                service,
            })
        }
    }
    Ok(())
}

/// Record the status and report it in AH/CF
fn finish(bus: &mut PcBus, regs: &mut Registers, status: u8) {
    bus.set_disk_status(status);
    regs.set_ah(status);
    regs.set_carry(status != STATUS_OK);
}

/// Decode the cylinder and sector packed into CX
///
/// CH holds cylinder bits 0-7, CL bits 6-7 hold cylinder bits 8-9 and
/// CL bits 0-5 hold the sector.
fn unpack_cylinder_sector(cx: u16) -> (u16, u8) {
    let cylinder = (cx >> 8) | ((cx & 0xC0) << 2);
    let sector = (cx & 0x3F) as u8;
    (cylinder, sector)
}

/// AH=02h: read AL sectors starting at CHS into ES:BX
fn read_sectors(bus: &mut PcBus, regs: &mut Registers) {
    let count = regs.al();
    let (cylinder, sector) = unpack_cylinder_sector(regs.cx());
    let head = regs.dh();
    let drive = regs.dl();

    log(LogCategory::Disk, LogLevel::Debug, || {
        format!(
            "INT 13h read: drive {:02X}h C={} H={} S={} count={} -> {:04X}:{:04X}",
            drive,
            cylinder,
            head,
            sector,
            count,
            regs.es,
            regs.bx()
        )
    });

    if drive != 0 || bus.floppy().is_none() {
        log(LogCategory::Disk, LogLevel::Warn, || {
            format!("INT 13h read from invalid drive {:02X}h", drive)
        });
        finish(bus, regs, STATUS_NOT_READY);
        return;
    }

    if count == 0 {
        finish(bus, regs, STATUS_INVALID_COMMAND);
        return;
    }

    let seeked = bus
        .floppy_mut()
        .is_some_and(|floppy| floppy.seek(cylinder, head, sector));
    if !seeked {
        regs.set_al(0);
        finish(bus, regs, STATUS_SECTOR_NOT_FOUND);
        return;
    }

    let buffer = physical_address(regs.es, regs.bx());
    let mut sectors_read: u32 = 0;

    for _ in 0..count {
        let data = match bus.floppy_mut() {
            Some(floppy) => floppy.read_sector(),
            None => break,
        };
        if data.is_empty() {
            break;
        }

        let base = buffer + sectors_read * SECTOR_SIZE as u32;
        for (i, &byte) in data.iter().enumerate() {
            bus.write_byte((base + i as u32) & 0xFFFFF, byte);
        }
        sectors_read += 1;
    }

    log(LogCategory::Disk, LogLevel::Debug, || {
        format!("INT 13h read {} of {} sectors", sectors_read, count)
    });

    regs.set_al(sectors_read as u8);
    finish(bus, regs, STATUS_OK);
}

/// AH=08h: geometry of drive 0
fn drive_parameters(bus: &mut PcBus, regs: &mut Registers) {
    let geometry = match bus.floppy() {
        Some(floppy) if regs.dl() == 0 => floppy.geometry(),
        _ => {
            finish(bus, regs, STATUS_NOT_READY);
            return;
        }
    };

    let max_cylinder = geometry.cylinders.saturating_sub(1);
    let drive_type = match (geometry.cylinders, geometry.sectors_per_track) {
        (_, 18) => 4,
        (_, 15) => 2,
        (80, 9) => 3,
        _ => 1,
    };

    regs.set_al(0);
    regs.set_bl(drive_type);
    regs.set_ch(max_cylinder as u8);
    regs.set_cl(geometry.sectors_per_track | ((max_cylinder >> 2) as u8 & 0xC0));
    regs.set_dh(geometry.heads.saturating_sub(1));
    regs.set_dl(1);
    finish(bus, regs, STATUS_OK);
}
