use kernel::exec::{Image, Segment, load_image};
use kernel::syscall::{sys_exit, sys_fork};
use kernel::{BootConfig, Kernel, Process};
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};
use kernel_vmem::RegionFlags;
use std::sync::{Arc, Barrier};
use std::thread;

const CORES: usize = 4;
const TEXT: u32 = 0x0040_0000;
const DATA: u32 = 0x1000_0000;
const DATA_PAGES: u32 = 4;

fn boot() -> Kernel {
    Kernel::boot(BootConfig {
        ram_bytes: 2048 * PAGE_SIZE,
        kernel_image_bytes: 16 * PAGE_SIZE,
        cores: CORES,
        tlb_seed: 3,
        ..BootConfig::default()
    })
    .unwrap()
}

fn image() -> [Segment<'static>; 2] {
    [
        Segment {
            vaddr: VirtualAddress::new(TEXT),
            mem_size: PAGE_SIZE,
            bytes: &[0x42; 16],
            flags: RegionFlags::READ | RegionFlags::EXECUTE,
        },
        Segment {
            vaddr: VirtualAddress::new(DATA),
            mem_size: DATA_PAGES * PAGE_SIZE,
            bytes: &[],
            flags: RegionFlags::READ | RegionFlags::WRITE,
        },
    ]
}

#[test]
fn independent_processes_fork_and_exit_concurrently() {
    let kernel = boot();
    let baseline = kernel.stats();
    let barrier = Barrier::new(CORES);

    thread::scope(|s| {
        for id in 0..CORES {
            let kernel = &kernel;
            let barrier = &barrier;
            s.spawn(move || {
                let mut cpu = kernel.cpu(id);
                let segments = image();
                let image = Image {
                    entry: VirtualAddress::new(TEXT),
                    segments: &segments,
                };
                barrier.wait();

                for round in 0..20_u8 {
                    let process = Arc::new(Process::new(format!("p{id}")));
                    cpu.switch_to(Some(process));
                    load_image(kernel, &mut cpu, &image).unwrap();

                    let stamp = [u8::try_from(id).unwrap(), round];
                    cpu.store(kernel, VirtualAddress::new(DATA + PAGE_SIZE), &stamp).unwrap();
                    let child = sys_fork(kernel, &mut cpu).unwrap();
                    sys_exit(kernel, &mut cpu, 0);

                    cpu.switch_to(Some(child));
                    let mut seen = [0; 2];
                    cpu.load(kernel, VirtualAddress::new(DATA + PAGE_SIZE), &mut seen).unwrap();
                    assert_eq!(seen, stamp);
                    sys_exit(kernel, &mut cpu, 0);
                }
            });
        }
    });

    assert_eq!(kernel.stats(), baseline);
}

#[test]
fn cores_share_one_address_space() {
    let kernel = boot();
    let mut cpu = kernel.cpu(0);
    let process = Arc::new(Process::new("shared"));
    cpu.switch_to(Some(Arc::clone(&process)));
    let segments = image();
    load_image(
        &kernel,
        &mut cpu,
        &Image {
            entry: VirtualAddress::new(TEXT),
            segments: &segments,
        },
    )
    .unwrap();

    let barrier = Barrier::new(CORES);
    thread::scope(|s| {
        for id in 0..CORES {
            let (kernel, barrier, process) = (&kernel, &barrier, &process);
            s.spawn(move || {
                let mut cpu = kernel.cpu(id);
                cpu.switch_to(Some(Arc::clone(process)));
                barrier.wait();

                // Each core owns one data page and writes it through its own TLB.
                let page = DATA + u32::try_from(id).unwrap() * PAGE_SIZE;
                for offset in (0..PAGE_SIZE).step_by(256) {
                    cpu.store(kernel, VirtualAddress::new(page + offset), &[u8::try_from(id).unwrap(); 4]).unwrap();
                }
                let mut text = [0; 16];
                cpu.load(kernel, VirtualAddress::new(TEXT), &mut text).unwrap();
                assert_eq!(text, [0x42; 16]);
            });
        }
    });

    // Every core's writes are visible through another core's TLB.
    for id in 0..CORES {
        let mut word = [0; 4];
        let page = DATA + u32::try_from(id).unwrap() * PAGE_SIZE;
        cpu.load(&kernel, VirtualAddress::new(page + PAGE_SIZE - 256), &mut word).unwrap();
        assert_eq!(word, [u8::try_from(id).unwrap(); 4]);
    }
    sys_exit(&kernel, &mut cpu, 0);
}
