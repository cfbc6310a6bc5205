//! GPIO Abstractions
//!
//! Type-safe GPIO pin wrappers for the amplifier controller.
//! Provides semantic meaning to pins through the type system.

use embedded_hal::digital::{InputPin, OutputPin, StatefulOutputPin};

use crate::types::Preset;

/// Status LED driver
pub struct StatusLed<P: OutputPin> {
    pin: P,
    lit: bool,
}

impl<P: OutputPin> StatusLed<P> {
    /// Create a new status LED (initially off)
    pub fn new(mut pin: P) -> Self {
        let _ = pin.set_low();
        Self { pin, lit: false }
    }

    /// Turn LED on
    pub fn on(&mut self) {
        let _ = self.pin.set_high();
        self.lit = true;
    }

    /// Turn LED off
    pub fn off(&mut self) {
        let _ = self.pin.set_low();
        self.lit = false;
    }

    /// Toggle LED state
    pub fn toggle(&mut self) {
        if self.lit {
            self.off();
        } else {
            self.on();
        }
    }
}

/// The three preset trigger inputs (active low)
pub struct TriggerInputs<T1: InputPin, T2: InputPin, T3: InputPin> {
    preset_1: T1,
    preset_2: T2,
    preset_3: T3,
}

impl<T1: InputPin, T2: InputPin, T3: InputPin> TriggerInputs<T1, T2, T3> {
    /// Group the trigger pins
    pub const fn new(preset_1: T1, preset_2: T2, preset_3: T3) -> Self {
        Self {
            preset_1,
            preset_2,
            preset_3,
        }
    }

    /// Read the requested preset, `None` when no trigger is asserted
    ///
    /// Triggers are mutually exclusive; if several read asserted the lowest
    /// preset wins.
    pub fn read(&mut self) -> Option<Preset> {
        if is_asserted(&mut self.preset_1) {
            Some(Preset::One)
        } else if is_asserted(&mut self.preset_2) {
            Some(Preset::Two)
        } else if is_asserted(&mut self.preset_3) {
            Some(Preset::Three)
        } else {
            None
        }
    }
}

fn is_asserted<P: InputPin>(pin: &mut P) -> bool {
    pin.is_low().unwrap_or_else(|_| {
        warn!("trigger read failed");
        false
    })
}

/// Amplifier mains relay
///
/// The pin's set state doubles as the "is powered" feedback.
pub struct PowerRelay<R: StatefulOutputPin> {
    pin: R,
    powered: bool,
}

impl<R: StatefulOutputPin> PowerRelay<R> {
    /// Wrap the relay pin, keeping its current state
    pub fn new(mut pin: R) -> Self {
        let powered = pin.is_set_high().unwrap_or(false);
        Self { pin, powered }
    }

    /// Close the relay
    pub fn on(&mut self) {
        if self.pin.set_high().is_err() {
            error!("relay on failed");
        }
        self.powered = true;
        info!("amplifier power on");
    }

    /// Open the relay
    pub fn off(&mut self) {
        if self.pin.set_low().is_err() {
            error!("relay off failed");
        }
        self.powered = false;
        info!("amplifier power off");
    }

    /// Read back whether the amplifier is powered
    pub fn is_powered(&mut self) -> bool {
        self.pin.is_set_high().unwrap_or(self.powered)
    }
}
