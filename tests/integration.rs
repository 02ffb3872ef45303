//! End-to-end scenarios driven through the public `Nes` surface only,
//! against synthetic NROM/MMC1 images built in memory (no external `.nes`
//! fixtures ship with this crate).

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;

use nes_core::cartridge::{ConsoleType, Mirroring, Region as RomRegion};
use nes_core::{Granularity, Nes, RomData};

fn nrom(mapper: u16, prg: Vec<u8>) -> RomData {
    RomData {
        prg_rom: Cow::Owned(prg),
        chr_rom: Cow::Owned(vec![0u8; 0x2000]),
        sha1: [0u8; 20],
        mapper,
        submapper: 0,
        mirroring: Mirroring::Horizontal,
        battery: false,
        prg_ram_size: 0x2000,
        prg_nvram_size: 0,
        chr_ram_size: 0x2000,
        chr_nvram_size: 0,
        console: ConsoleType::Nes,
        region: RomRegion::Ntsc,
    }
}

#[test]
fn oam_dma_stalls_cpu_for_513_or_514_cycles() {
    let mut nes = Nes::default();
    let mut prg = vec![0u8; 0x8000];
    prg[0x0000] = 0xA9; // LDA #$02
    prg[0x0001] = 0x02;
    prg[0x0002] = 0x8D; // STA $4014
    prg[0x0003] = 0x14;
    prg[0x0004] = 0x40;
    prg[0x0005] = 0x4C; // JMP $8005
    prg[0x0006] = 0x05;
    prg[0x0007] = 0x80;
    prg[0x7FFC] = 0x00;
    prg[0x7FFD] = 0x80;
    nes.load_rom(nrom(0, prg)).expect("nrom image loads");

    // LDA #imm (2 cycles) + STA abs (4 cycles) = 6 cycles to reach the write.
    for _ in 0..6 {
        nes.step(Granularity::CpuCycle);
    }
    assert!(nes.cpu().oam_dma_active(), "DMA should be armed right after the $4014 write's last cycle");

    let mut stall_cycles = 0u32;
    while nes.cpu().oam_dma_active() {
        nes.step(Granularity::CpuCycle);
        stall_cycles += 1;
        assert!(stall_cycles <= 520, "DMA stall ran longer than the documented 513/514-cycle bound");
    }
    assert!(
        (513..=514).contains(&stall_cycles),
        "expected a 513- or 514-cycle stall depending on alignment, got {stall_cycles}"
    );
}

#[test]
fn nmi_handler_runs_once_vblank_starts() {
    let mut nes = Nes::default();
    let mut prg = vec![0u8; 0x8000];
    // $8000: LDA #$80 ; STA $2000 ; loop: JMP loop
    prg[0x0000] = 0xA9;
    prg[0x0001] = 0x80;
    prg[0x0002] = 0x8D;
    prg[0x0003] = 0x00;
    prg[0x0004] = 0x20;
    prg[0x0005] = 0x4C;
    prg[0x0006] = 0x05;
    prg[0x0007] = 0x80;
    // NMI handler at $8010: INC $00 ; RTI
    prg[0x0010] = 0xE6;
    prg[0x0011] = 0x00;
    prg[0x0012] = 0x40;
    prg[0x7FFA] = 0x10; // NMI vector -> $8010
    prg[0x7FFB] = 0x80;
    prg[0x7FFC] = 0x00; // reset vector -> $8000
    prg[0x7FFD] = 0x80;
    nes.load_rom(nrom(0, prg)).expect("nrom image loads");

    let mut saw_handler = false;
    for _ in 0..40_000 {
        nes.step(Granularity::CpuInstruction);
        if nes.cpu().pc == 0x8010 {
            saw_handler = true;
            break;
        }
    }
    assert!(saw_handler, "NMI handler never ran within one frame's worth of instructions");
}

#[test]
fn mmc1_rom_produces_one_frame_ready_callback_per_frame() {
    let mut nes = Nes::default();
    let mut prg = vec![0u8; 0x8000];
    prg[0x0000] = 0x4C; // JMP $8000
    prg[0x0001] = 0x00;
    prg[0x0002] = 0x80;
    prg[0x7FFC] = 0x00;
    prg[0x7FFD] = 0x80;
    nes.load_rom(nrom(1, prg)).expect("mmc1 image loads");

    let frames = Rc::new(RefCell::new(0u32));
    let f = frames.clone();
    nes.set_frame_ready_callback(move || *f.borrow_mut() += 1);

    nes.step(Granularity::PpuFrame);
    nes.step(Granularity::PpuFrame);

    assert_eq!(*frames.borrow(), 2);
}

/// Drives the canonical `nestest.nes` CPU-accuracy ROM.
///
/// `nestest.nes` is a widely distributed homebrew test ROM, not bundled with
/// this crate. To run this test, place a copy at
/// `tests/fixtures/nestest.nes` and run `cargo test -- --ignored`. Decoding
/// its iNES header into a [`RomData`] is left to the caller, since byte-level
/// ROM file parsing is outside this crate's boundary.
#[test]
#[ignore]
fn nestest_runs_without_tripping_an_illegal_opcode_halt() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/nestest.nes");
    let _bytes =
        std::fs::read(&path).unwrap_or_else(|_| panic!("place nestest.nes at {}", path.display()));
    panic!("wire up an iNES header decoder to build RomData from the fixture bytes, then drive Nes::step");
}
