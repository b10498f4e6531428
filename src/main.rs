#![cfg_attr(target_arch = "arm", no_std)]
#![cfg_attr(target_arch = "arm", no_main)]

#[cfg(target_arch = "arm")]
pub mod program {
    use embassy_executor::Spawner;
    #[embassy_executor::main]
    async fn main(spawner: Spawner) {
        boot_diag::program::main(spawner).await;
    }
}

#[cfg(not(target_arch = "arm"))]
fn main() {
    eprintln!("the firmware only runs on the rp2350, build for thumbv8m.main-none-eabihf");
}
