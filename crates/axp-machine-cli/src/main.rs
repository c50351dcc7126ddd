//! Command-line front end for `axp-machine`: loads a firmware image,
//! boots it, drains the UART to stdout as it runs, and exits once the
//! boot core halts, an instruction budget is exhausted, or a timeout
//! elapses. Kept thin on purpose -- all the interesting behavior lives
//! in `axp-machine`; this binary only translates flags into a `Config`
//! and pumps the UART.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use axp_machine::{Config, DeviceConfig, EventSink, InstructionExecuted, Machine, NullDiskBackend, NullNetBackend};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "axp-machine", about = "Boots a DEC Alpha AXP firmware image under axp-machine")]
struct Args {
    /// Raw binary or Intel HEX firmware image.
    firmware: PathBuf,

    /// Physical address to load the firmware image at, and the PC core 0 starts at.
    #[arg(long, value_parser = parse_hex_u64, default_value = "0x10000")]
    load_addr: u64,

    /// RAM size in megabytes.
    #[arg(long, default_value_t = 64)]
    ram_mb: usize,

    /// Number of cores to boot.
    #[arg(long, default_value_t = 1)]
    cpus: usize,

    /// PALcode base physical address.
    #[arg(long, value_parser = parse_hex_u64, default_value = "0x8000")]
    pal_base: u64,

    /// MMIO base for the default UART's CSR window.
    #[arg(long, value_parser = parse_hex_u64, default_value = "0x100000000")]
    uart_base: u64,

    /// Stop core 0 after this many retired instructions (runs until halt if unset).
    #[arg(long)]
    max_insts: Option<u64>,

    /// Wall-clock seconds to wait for core 0 to halt before giving up.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

fn parse_hex_u64(s: &str) -> Result<u64, String> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| e.to_string())
}

/// Counts core 0's retired instructions and flags `done` once `limit` is
/// reached. Needs `Config::trace_level >= 2` to receive any callbacks at
/// all (see `axp-machine`'s driver doc comment on that gate).
struct InstructionBudget {
    count: AtomicU64,
    limit: Option<u64>,
    done: Arc<AtomicBool>,
}

impl EventSink for InstructionBudget {
    fn instruction_executed(&mut self, event: InstructionExecuted) {
        if event.core != 0 {
            return;
        }
        let limit = match self.limit {
            Some(limit) => limit,
            None => return,
        };
        let retired = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if retired >= limit {
            self.done.store(true, Ordering::Relaxed);
        }
    }
}

fn drain_uart_to_stdout(machine: &Machine<NullDiskBackend, NullNetBackend>) -> Result<()> {
    let bytes = machine.uart_drain_tx().context("reading UART output")?;
    if !bytes.is_empty() {
        let mut stdout = std::io::stdout();
        stdout.write_all(&bytes)?;
        stdout.flush()?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let ram_bytes = args.ram_mb.checked_mul(1024 * 1024).context("--ram-mb overflows a byte count")?;

    let mut cfg = Config {
        cpu_count: args.cpus,
        ram_bytes,
        pal_base: args.pal_base,
        start_pc: args.load_addr,
        trace_level: if args.max_insts.is_some() { 2 } else { 0 },
        ..Config::default()
    };
    cfg.devices.push(DeviceConfig::Uart { base: args.uart_base, irq_vector: 1 });

    let done = Arc::new(AtomicBool::new(false));
    let events: Arc<Mutex<dyn EventSink>> = Arc::new(Mutex::new(InstructionBudget {
        count: AtomicU64::new(0),
        limit: args.max_insts,
        done: done.clone(),
    }));

    let mut machine: Machine<NullDiskBackend, NullNetBackend> = Machine::new(cfg, Vec::new(), Vec::new(), events)?;
    machine.load_binary(&args.firmware, args.load_addr, true)?;
    machine.start();

    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);
    let timed_out = loop {
        machine.sync_status_events();
        drain_uart_to_stdout(&machine)?;
        if machine.core_status(0).is_halted() || done.load(Ordering::Relaxed) {
            break false;
        }
        if Instant::now() >= deadline {
            break true;
        }
        std::thread::sleep(Duration::from_millis(5));
    };

    machine.stop();
    drain_uart_to_stdout(&machine)?;

    if timed_out {
        bail!("core 0 did not halt within {}s", args.timeout_secs);
    }
    Ok(())
}
