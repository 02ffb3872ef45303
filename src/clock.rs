//! Master clock: a fixed-ratio divider driving PPU/CPU/APU from a single
//! wall-clock time accumulator.

use crate::config::Region;

/// One call into the three subsystems, always in master-cycle order: PPU
/// first, then CPU, then APU.
pub trait ClockedSystem {
    fn clock_ppu(&mut self);
    fn clock_cpu(&mut self);
    fn clock_apu(&mut self);
    /// True once a CPU instruction boundary and a PPU frame boundary have
    /// both just passed, for [`Granularity::Frame`]/[`Granularity::Instruction`].
    fn at_cpu_instruction_boundary(&self) -> bool;
    fn at_ppu_scanline_boundary(&self) -> bool;
    fn at_ppu_frame_boundary(&self) -> bool;
}

/// How far `Clock::step` should run before returning control to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    MasterCycle,
    PpuCycle,
    PpuScanline,
    CpuCycle,
    CpuInstruction,
    PpuFrame,
}

/// Per-region master-cycle dividers. NTSC is the only ratio implemented;
/// the table exists so PAL/Dendy support is a data change later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dividers {
    pub ppu: u64,
    pub cpu: u64,
    pub apu: u64,
}

impl Dividers {
    pub fn for_region(region: Region) -> Self {
        match region {
            // PAL/Dendy timing isn't implemented: the variants exist as
            // forward-compatible hooks, but only the NTSC divider ratio is
            // wired up, so every region resolves to it for now.
            Region::Ntsc | Region::Pal | Region::Dendy | Region::Auto => {
                Self { ppu: 1, cpu: 3, apu: 6 }
            }
        }
    }
}

/// Nanosecond-scale master-cycle period; only meaningful for `tick`, which
/// converts wall-clock time into a cycle count. `step` bypasses it entirely.
const NTSC_MASTER_HZ: f64 = 236_250_000.0 / 11.0; // ~21.477 MHz

impl Default for Clock {
    fn default() -> Self {
        Self::new(Region::default())
    }
}

#[derive(Debug, Clone)]
pub struct Clock {
    dividers: Dividers,
    master_cycle: u64,
    /// Fractional nanoseconds carried over between `tick` calls.
    accumulator_ns: f64,
    period_ns: f64,
}

impl Clock {
    pub fn new(region: Region) -> Self {
        Self {
            dividers: Dividers::for_region(region),
            master_cycle: 0,
            accumulator_ns: 0.0,
            period_ns: 1_000_000_000.0 / NTSC_MASTER_HZ,
        }
    }

    pub fn master_cycle(&self) -> u64 {
        self.master_cycle
    }

    fn run_one_master_cycle(&mut self, system: &mut impl ClockedSystem) {
        if self.master_cycle % self.dividers.ppu == 0 {
            system.clock_ppu();
        }
        if self.master_cycle % self.dividers.cpu == 0 {
            system.clock_cpu();
        }
        if self.master_cycle % self.dividers.apu == 0 {
            system.clock_apu();
        }
        self.master_cycle = self.master_cycle.wrapping_add(1);
    }

    /// Adds `duration` to the time accumulator and runs as many whole master
    /// cycles as it now covers.
    pub fn tick(&mut self, duration: std::time::Duration, system: &mut impl ClockedSystem) {
        self.accumulator_ns += duration.as_nanos() as f64;
        while self.accumulator_ns >= self.period_ns {
            self.accumulator_ns -= self.period_ns;
            self.run_one_master_cycle(system);
        }
    }

    /// Runs master cycles until `granularity`'s boundary condition is met.
    /// Always makes at least one master cycle of progress.
    pub fn step(&mut self, granularity: Granularity, system: &mut impl ClockedSystem) {
        match granularity {
            Granularity::MasterCycle => self.run_one_master_cycle(system),
            Granularity::PpuCycle => loop {
                self.run_one_master_cycle(system);
                if self.master_cycle % self.dividers.ppu == 0 {
                    break;
                }
            },
            Granularity::CpuCycle => loop {
                self.run_one_master_cycle(system);
                if self.master_cycle % self.dividers.cpu == 0 {
                    break;
                }
            },
            Granularity::PpuScanline => loop {
                self.run_one_master_cycle(system);
                if system.at_ppu_scanline_boundary() {
                    break;
                }
            },
            Granularity::CpuInstruction => loop {
                self.run_one_master_cycle(system);
                if system.at_cpu_instruction_boundary() {
                    break;
                }
            },
            Granularity::PpuFrame => loop {
                self.run_one_master_cycle(system);
                if system.at_ppu_frame_boundary() {
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counters {
        ppu: u64,
        cpu: u64,
        apu: u64,
    }

    impl ClockedSystem for Counters {
        fn clock_ppu(&mut self) {
            self.ppu += 1;
        }
        fn clock_cpu(&mut self) {
            self.cpu += 1;
        }
        fn clock_apu(&mut self) {
            self.apu += 1;
        }
        fn at_cpu_instruction_boundary(&self) -> bool {
            false
        }
        fn at_ppu_scanline_boundary(&self) -> bool {
            false
        }
        fn at_ppu_frame_boundary(&self) -> bool {
            false
        }
    }

    #[test]
    fn ntsc_dividers_clock_ppu_three_times_per_cpu_cycle() {
        let mut clock = Clock::new(Region::Ntsc);
        let mut counters = Counters::default();
        for _ in 0..6 {
            clock.step(Granularity::MasterCycle, &mut counters);
        }
        assert_eq!(counters.ppu, 6);
        assert_eq!(counters.cpu, 2);
        assert_eq!(counters.apu, 1);
    }
}
