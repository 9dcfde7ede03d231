//! Status bitfield carried at offset `0x8E` of every packet

use serde::{Deserialize, Serialize};

/// Bit masks of the console's status field.
pub mod simulator_flags {
    pub const CAR_ON_TRACK: u16 = 1 << 0;
    pub const PAUSED: u16 = 1 << 1;
    pub const LOADING_OR_PROCESSING: u16 = 1 << 2;
    pub const IN_GEAR: u16 = 1 << 3;
    pub const HAS_TURBO: u16 = 1 << 4;
    pub const REV_LIMITER_ALERT: u16 = 1 << 5;
    pub const HAND_BRAKE: u16 = 1 << 6;
    pub const LIGHTS: u16 = 1 << 7;
    pub const HIGH_BEAM: u16 = 1 << 8;
    pub const LOW_BEAM: u16 = 1 << 9;
    pub const ASM_ACTIVE: u16 = 1 << 10;
    pub const TCS_ACTIVE: u16 = 1 << 11;
}

use simulator_flags::*;

/// Packed status flags decoded with bitwise tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimulatorFlags(pub u16);

impl SimulatorFlags {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Check if any bit of `flag` is set.
    pub fn has_flag(&self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    /// Return a copy with `flag` set or cleared.
    pub fn with(self, flag: u16, enabled: bool) -> Self {
        if enabled { Self(self.0 | flag) } else { Self(self.0 & !flag) }
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn car_on_track(&self) -> bool {
        self.has_flag(CAR_ON_TRACK)
    }

    pub fn paused(&self) -> bool {
        self.has_flag(PAUSED)
    }

    pub fn loading(&self) -> bool {
        self.has_flag(LOADING_OR_PROCESSING)
    }

    pub fn in_gear(&self) -> bool {
        self.has_flag(IN_GEAR)
    }

    pub fn has_turbo(&self) -> bool {
        self.has_flag(HAS_TURBO)
    }

    pub fn rev_limiter(&self) -> bool {
        self.has_flag(REV_LIMITER_ALERT)
    }

    pub fn hand_brake(&self) -> bool {
        self.has_flag(HAND_BRAKE)
    }

    pub fn lights(&self) -> bool {
        self.has_flag(LIGHTS)
    }

    pub fn high_beam(&self) -> bool {
        self.has_flag(HIGH_BEAM)
    }

    pub fn low_beam(&self) -> bool {
        self.has_flag(LOW_BEAM)
    }

    pub fn asm_active(&self) -> bool {
        self.has_flag(ASM_ACTIVE)
    }

    pub fn tcs_active(&self) -> bool {
        self.has_flag(TCS_ACTIVE)
    }

    /// True when the frame reflects live driving rather than menus or pauses.
    pub fn is_driving(&self) -> bool {
        self.car_on_track() && !self.paused() && !self.loading()
    }
}
