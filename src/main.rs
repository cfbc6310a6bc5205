//! Amplifier Link Main Application
//!
//! Entry point for the STM32F446-based amplifier controller.
//! Initializes hardware and spawns async tasks.

#![no_std]
#![no_main]

use defmt::info;
use embassy_executor::Spawner;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use {defmt_rtt as _, panic_probe as _};

use amp_link_firmware::hal::gpio::{PowerRelay, StatusLed, TriggerInputs};
use amp_link_firmware::power::PowerSequencer;
use amp_link_firmware::prelude::*;
use amp_link_firmware::usb::bridge::HostBridge;
use amp_link_firmware::usb::driver::DeviceDriver;

/// Shared state between the device driver, the sequencer and observers
static LINK: AmpLink<CriticalSectionRawMutex> = AmpLink::new();

/// Event/request exchange with the board's USB host controller driver
pub static HOST_BRIDGE: HostBridge<CriticalSectionRawMutex> = HostBridge::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Amp Link Firmware v{}", env!("CARGO_PKG_VERSION"));

    let config = embassy_stm32::Config::default();
    let p = embassy_stm32::init(config);

    info!("Peripherals initialized");

    // Status LED (PA5 on Nucleo boards)
    let led = StatusLed::new(Output::new(p.PA5, Level::Low, Speed::Low));

    // Trigger inputs are open-collector, asserted low
    let triggers = TriggerInputs::new(
        Input::new(p.PC0, Pull::Up),
        Input::new(p.PC1, Pull::Up),
        Input::new(p.PC2, Pull::Up),
    );

    // Relay starts open: amplifier off until a trigger arrives
    let relay = PowerRelay::new(Output::new(p.PB0, Level::Low, Speed::Low));

    spawner.spawn(heartbeat_task(led)).unwrap();
    spawner.spawn(device_task()).unwrap();
    spawner.spawn(trigger_task(triggers, relay)).unwrap();
    spawner.spawn(state_report_task()).unwrap();

    info!("Tasks spawned, entering main loop");

    loop {
        Timer::after(Duration::from_secs(60)).await;
        info!(
            "connected: {}, epoch {}",
            LINK.is_device_connected(),
            LINK.connection_epoch()
        );
    }
}

/// Device lifecycle task - owns the amplifier connection
#[embassy_executor::task]
async fn device_task() {
    let mut driver = DeviceDriver::new(HOST_BRIDGE.port(), &LINK, DriverConfig::default());
    driver.run().await
}

/// Trigger task - sequences amplifier power from the trigger inputs
#[embassy_executor::task]
async fn trigger_task(
    triggers: TriggerInputs<Input<'static>, Input<'static>, Input<'static>>,
    relay: PowerRelay<Output<'static>>,
) {
    let mut sequencer = PowerSequencer::new(triggers, relay, &LINK, SequencerConfig::default());
    sequencer.run().await
}

/// State report task - logs every state change
#[embassy_executor::task]
async fn state_report_task() {
    loop {
        LINK.wait_state_changed().await;
        let state = LINK.get_state();
        let name = LINK.get_filter_name();
        info!("state: {:?}, filter: {=str}", state, name.as_str());
    }
}

/// Heartbeat task - blinks slowly while the amplifier is connected, fast otherwise
#[embassy_executor::task]
async fn heartbeat_task(mut led: StatusLed<Output<'static>>) {
    loop {
        led.toggle();
        let period = if LINK.is_device_connected() {
            HEARTBEAT_CONNECTED_MS
        } else {
            HEARTBEAT_ABSENT_MS
        };
        Timer::after(Duration::from_millis(period / 2)).await;
    }
}
