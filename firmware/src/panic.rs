use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let message = defmt::Display2Format(&info.message());
    match info.location() {
        Some(location) => defmt::error!(
            "PANIC at {}:{}: {}",
            location.file(),
            location.line(),
            message
        ),
        None => defmt::error!("PANIC: {}", message),
    }
    cortex_m::asm::udf();
}
