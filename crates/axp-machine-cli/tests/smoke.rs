//! End-to-end smoke test: assembles a tiny program by hand (no assembler
//! in this workspace), boots it under the compiled `axp-machine` binary,
//! and checks the bytes it writes to the UART reach stdout.

use std::path::PathBuf;
use std::process::Command;

use axp_decoder::{Decoded, OperateOperand};

const LDA: u8 = 0x08;
const STB: u8 = 0x0E;
const SLL: u8 = 0x39;
const OPCODE_INTS: u8 = 0x12;

fn lda(ra: u8, rb: u8, disp: i64) -> u32 {
    Decoded::Memory { opcode: LDA, ra, rb, disp, raw16: disp as u16 }.encode()
}

fn stb(base_reg: u8, value_reg: u8) -> u32 {
    Decoded::Memory { opcode: STB, ra: base_reg, rb: value_reg, disp: 0, raw16: 0 }.encode()
}

fn sll_literal(ra: u8, shift: u8, rc: u8) -> u32 {
    Decoded::Operate {
        opcode: OPCODE_INTS,
        ra,
        operand: OperateOperand::Literal(shift),
        function: SLL,
        rc,
    }
    .encode()
}

fn call_pal_halt() -> u32 {
    Decoded::Pal { function: axp_pal::function::HALT }.encode()
}

/// R1 = 1; R2 = R1 << 32 (the default `--uart-base`, 0x1_0000_0000);
/// then STB each byte of `message` through R2 before halting.
fn assemble_uart_print(message: &[u8]) -> Vec<u8> {
    let mut words = vec![lda(31, 1, 1), sll_literal(1, 32, 2)];
    for &byte in message {
        words.push(lda(31, 3, byte as i64));
        words.push(stb(2, 3));
    }
    words.push(call_pal_halt());

    let mut bytes = Vec::with_capacity(words.len() * 4);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes
}

fn find_cli_exe() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let repo_root = manifest_dir.join("../..");
    let target_dir = std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| repo_root.join("target"));
    let exe_name = format!("axp-machine{}", std::env::consts::EXE_SUFFIX);
    let debug_exe = target_dir.join("debug").join(&exe_name);
    let release_exe = target_dir.join("release").join(&exe_name);
    if debug_exe.exists() {
        debug_exe
    } else if release_exe.exists() {
        release_exe
    } else {
        panic!("expected axp-machine binary at {} or {}", debug_exe.display(), release_exe.display());
    }
}

#[test]
fn boots_firmware_and_prints_serial_output() {
    let program = assemble_uart_print(b"AXP\r\n");

    let firmware = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(firmware.path(), &program).unwrap();

    let output = Command::new(find_cli_exe())
        .arg(firmware.path())
        .args(["--ram-mb", "4", "--timeout-secs", "10"])
        .output()
        .expect("failed to run axp-machine CLI");

    assert!(
        output.status.success(),
        "axp-machine exited with {}\nstderr:\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(output.stdout, b"AXP\r\n");
}
