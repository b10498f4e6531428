#![cfg_attr(target_arch = "arm", no_std)]

pub mod diagnostics;

#[cfg(any(target_arch = "arm", test))]
pub mod heap;

#[cfg(feature = "std")]
pub mod release;

#[cfg(target_arch = "arm")]
pub mod program {
    use super::*;

    use embassy_executor::Spawner;

    use defmt::{info, warn};
    use {defmt_rtt as _, panic_probe as _};

    use diagnostics::{BootLine, LogSink, Runtime};

    /// Platform SDK identifier, resolved by the build script from the lock file.
    pub const SDK_VERSION: &str = env!("PLATFORM_SDK_VERSION");

    // Program metadata for `picotool info`.
    // This isn't needed, but it's recommended to have these minimal entries.
    #[unsafe(link_section = ".bi_entries")]
    #[used]
    pub static PICOTOOL_ENTRIES: [embassy_rp::binary_info::EntryAddr; 4] = [
        embassy_rp::binary_info::rp_program_name!(c"Boot Diagnostics"),
        embassy_rp::binary_info::rp_program_description!(
            c"Logs free heap and sdk version at boot"
        ),
        embassy_rp::binary_info::rp_cargo_version!(),
        embassy_rp::binary_info::rp_program_build_attribute!(),
    ];

    /// Runtime queries answered by the allocator and the build.
    pub struct TargetRuntime;

    impl Runtime for TargetRuntime {
        fn free_heap_bytes(&self) -> u32 {
            heap::free_bytes()
        }
        fn sdk_version(&self) -> &str {
            SDK_VERSION
        }
    }

    /// Sends the boot lines out through defmt.
    pub struct DefmtSink;

    impl LogSink for DefmtSink {
        fn info(&mut self, tag: &str, line: &BootLine<'_>) {
            info!("{=str}: {}", tag, line);
        }
    }

    pub async fn main(_spawner: Spawner) {
        let _p = embassy_rp::init(Default::default());

        if !heap::init() {
            warn!("heap was already initialised");
        }

        diagnostics::report_boot(&TargetRuntime, &mut DefmtSink);
    }
}
