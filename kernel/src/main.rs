//! Binary entry point. All real logic lives in the `kernel` library crate;
//! this file only wires up the panic handler and the boot trampoline, the
//! same split the teacher's `main.rs` makes between `kstart` and the rest
//! of the kernel.

#![no_std]
#![no_main]

extern crate alloc;

use core::panic::PanicInfo;

use kernel::{config::KernelConfig, logln, scheduler::Scheduler};

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kernel::logging::panic_dump(info);
    kernel::arch::halt_forever()
}

/// Called by the bootstrap CPU once the arch layer has parsed the task map
/// and built the initial address space. `config` comes from whatever
/// bootloader-specific code (out of scope) resolved CPU count and memory
/// zones into a [`KernelConfig`].
#[unsafe(no_mangle)]
extern "C" fn kstart(config: KernelConfig) -> ! {
    kernel::config::init(config);
    logln!(
        "core: starting scheduler on {} cpu(s)",
        kernel::config::get().cpu_count
    );
    Scheduler::init();

    #[allow(unreachable_code)]
    {
        panic!("scheduler init returned")
    }
}
