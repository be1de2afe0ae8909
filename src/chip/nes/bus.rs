//! NSF memory map.
//!
//! | range           | device                                   |
//! |-----------------|------------------------------------------|
//! | `$0000-$1FFF`   | 2 KiB RAM, mirrored                      |
//! | `$4000-$4017`   | APU registers (`$4015` readable)         |
//! | `$5FF8-$5FFF`   | bank select, one register per 4 KiB page |
//! | `$6000-$7FFF`   | 8 KiB work RAM                           |
//! | `$8000-$FFFF`   | program space, flat or banked            |

use log::trace;

use super::apu::Apu;
use super::cpu::CpuBus;

const RAM_SIZE: usize = 0x0800;
const WRAM_SIZE: usize = 0x2000;
const PROGRAM_SIZE: usize = 0x8000;
const BANK_SIZE: usize = 0x1000;

/// Address space shared by the CPU and the APU.
#[derive(Debug, Clone)]
pub struct NsfBus {
    ram: Box<[u8; RAM_SIZE]>,
    wram: Box<[u8; WRAM_SIZE]>,
    program: Box<[u8; PROGRAM_SIZE]>,
    /// Bank-aligned image for banked playback: padded in front by `load & 0xFFF`.
    banked_image: Vec<u8>,
    banks: [u8; 8],
    banked: bool,
    pub(super) apu: Apu,
}

impl Default for NsfBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NsfBus {
    /// Empty address space.
    pub fn new() -> Self {
        Self {
            ram: Box::new([0; RAM_SIZE]),
            wram: Box::new([0; WRAM_SIZE]),
            program: Box::new([0; PROGRAM_SIZE]),
            banked_image: Vec::new(),
            banks: [0; 8],
            banked: false,
            apu: Apu::new(),
        }
    }

    /// Clear all memory and return to flat mapping.
    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.wram.fill(0);
        self.program.fill(0);
        self.banked_image.clear();
        self.banks = [0; 8];
        self.banked = false;
        self.apu = Apu::new();
    }

    /// Place a program image at `base`.
    ///
    /// The flat copy covers whatever part of the image falls inside
    /// `$6000-$FFFF`. A bank-aligned copy is kept for when the program
    /// writes the bank registers.
    pub fn load_image(&mut self, base: u16, image: &[u8]) {
        for (offset, &byte) in image.iter().enumerate() {
            let address = base as usize + offset;
            match address {
                0x6000..=0x7FFF => self.wram[address - 0x6000] = byte,
                0x8000..=0xFFFF => self.program[address - 0x8000] = byte,
                _ => {}
            }
        }
        let padding = base as usize & (BANK_SIZE - 1);
        self.banked_image = vec![0; padding];
        self.banked_image.extend_from_slice(image);
    }

    /// Copy `payload` into program space starting at `base`, wrapping inside `$8000-$FFFF`.
    pub fn load_program_ram(&mut self, base: u16, payload: &[u8]) {
        let start = (base as usize) & (PROGRAM_SIZE - 1);
        for (offset, &byte) in payload.iter().enumerate() {
            self.program[(start + offset) & (PROGRAM_SIZE - 1)] = byte;
        }
    }

    /// True once any bank register has been written.
    pub fn is_banked(&self) -> bool {
        self.banked
    }

    fn read_program(&self, address: u16) -> u8 {
        let offset = address as usize - 0x8000;
        if self.banked {
            let bank = self.banks[offset / BANK_SIZE] as usize;
            self.banked_image
                .get(bank * BANK_SIZE + (offset & (BANK_SIZE - 1)))
                .copied()
                .unwrap_or(0)
        } else {
            self.program[offset]
        }
    }

    /// Advance the APU one CPU cycle, serving DMC fetches from program space.
    pub fn clock_apu(&mut self) {
        self.apu.clock();
        if let Some(address) = self.apu.dmc_fetch_address() {
            let byte = self.read_program(address | 0x8000);
            self.apu.dmc_feed_byte(byte);
        }
    }
}

impl CpuBus for NsfBus {
    fn read(&mut self, address: u16) -> u8 {
        match address {
            0x0000..=0x1FFF => self.ram[address as usize & (RAM_SIZE - 1)],
            0x4015 => self.apu.read_status(),
            0x5FF8..=0x5FFF => self.banks[(address - 0x5FF8) as usize],
            0x6000..=0x7FFF => self.wram[address as usize - 0x6000],
            0x8000..=0xFFFF => self.read_program(address),
            _ => 0,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x1FFF => self.ram[address as usize & (RAM_SIZE - 1)] = value,
            0x4000..=0x4017 => self.apu.write(address, value),
            0x5FF8..=0x5FFF => {
                trace!("bank {} -> {value}", address - 0x5FF8);
                self.banks[(address - 0x5FF8) as usize] = value;
                self.banked = true;
            }
            0x6000..=0x7FFF => self.wram[address as usize - 0x6000] = value,
            _ => {}
        }
    }
}
