//! # onefork
//!
//! Boots the simulated machine, loads a small program, forks it once, and
//! lets parent and child touch their memory on separate cores. Exits
//! non-zero if any frame is leaked.

use kernel::exec::{Image, Segment, load_image};
use kernel::logger::ConsoleLogger;
use kernel::syscall::{sys_exit, sys_fork};
use kernel::{BootConfig, Kernel, Process};
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::RegionFlags;
use log::{error, info};
use std::process::ExitCode;
use std::sync::Arc;

const TEXT: u32 = 0x0040_0000;
const DATA: u32 = 0x1000_0000;
const STACK_TOP: u32 = 0x8000_0000;

fn main() -> ExitCode {
    let config = match BootConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("onefork: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = ConsoleLogger::new(config.log_level).init() {
        eprintln!("onefork: {e}");
    }

    let kernel = match Kernel::boot(config) {
        Ok(kernel) => kernel,
        Err(e) => {
            error!("onefork: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&kernel) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("onefork: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(kernel: &Kernel) -> Result<(), Box<dyn std::error::Error>> {
    let baseline = kernel.stats();
    info!("onefork: {baseline}");

    let text = [0x27_u8, 0xbd, 0xff, 0xe8, 0x00, 0x00, 0x00, 0x0c];
    let greeting = b"hello from the data segment";
    let segments = [
        Segment {
            vaddr: VirtualAddress::new(TEXT),
            mem_size: 0x1800,
            bytes: &text,
            flags: RegionFlags::READ | RegionFlags::EXECUTE,
        },
        Segment {
            vaddr: VirtualAddress::new(DATA),
            mem_size: 0x2000,
            bytes: greeting,
            flags: RegionFlags::READ | RegionFlags::WRITE,
        },
    ];
    let image = Image {
        entry: VirtualAddress::new(TEXT),
        segments: &segments,
    };

    let mut cpu0 = kernel.cpu(0);
    let mut cpu1 = kernel.cpu(1 % kernel.config().cores);

    let parent = Arc::new(Process::new("onefork"));
    cpu0.switch_to(Some(Arc::clone(&parent)));
    let entry = load_image(kernel, &mut cpu0, &image)?;
    info!("onefork: entry {} stack {}", entry.pc, entry.sp);

    let sp = VirtualAddress::new(STACK_TOP - 4);
    cpu0.store(kernel, sp, &0xdead_beef_u32.to_le_bytes())?;

    let child = sys_fork(kernel, &mut cpu0)?;
    let data = VirtualAddress::new(DATA);

    std::thread::scope(|s| -> Result<(), Box<dyn std::error::Error>> {
        let child_run = s.spawn(|| -> Result<(), kernel_vmem::VmError> {
            cpu1.switch_to(Some(Arc::clone(&child)));
            cpu1.store(kernel, data, b"child")?;
            let mut word = [0; 4];
            cpu1.load(kernel, sp, &mut word)?;
            info!("onefork: child sees stack word {:#x}", u32::from_le_bytes(word));
            Ok(())
        });
        cpu0.store(kernel, data, b"PARENT")?;
        child_run.join().map_err(|_| "child core panicked")??;
        Ok(())
    })?;

    let mut buf = [0; 11];
    cpu0.load(kernel, data, &mut buf)?;
    info!("onefork: parent data {:?}", String::from_utf8_lossy(&buf));
    cpu1.load(kernel, data, &mut buf)?;
    info!("onefork: child data {:?}", String::from_utf8_lossy(&buf));

    // The parent's text is frozen; the child's copy is not until it is loaded.
    match cpu0.store(kernel, VirtualAddress::new(TEXT), &[0]) {
        Err(e) => info!("onefork: parent store to text refused: {e} (errno {})", e.errno()),
        Ok(()) => return Err("parent store to text succeeded".into()),
    }
    cpu1.store(kernel, VirtualAddress::new(TEXT), &[0])?;
    info!("onefork: child store to text accepted");

    info!("onefork: {}", kernel.stats());
    sys_exit(kernel, &mut cpu1, 0);
    sys_exit(kernel, &mut cpu0, 0);

    let end = kernel.stats();
    info!("onefork: {end}");
    if end == baseline {
        Ok(())
    } else {
        Err(format!("leaked {} frames", end.allocated.saturating_sub(baseline.allocated)).into())
    }
}
