// Kiki Companion — LEDC Servo Bank
//
// Five hobby servos on LEDC channels 0–4 sharing one 50 Hz timer. Angles
// arrive in logical degrees and go out trimmed and mirrored through
// `Calibration`. Detaching drops the duty to zero so the horns go limp.

use esp_idf_hal::ledc::LedcDriver;

use super::{duty_for_pulse, pulse_width_us};
use crate::config::SERVO_NEUTRAL_DEG;
use crate::motion::{Calibration, Joint, ServoBank};

pub struct LedcServoBank {
    channels: [LedcDriver<'static>; Joint::COUNT],
    calibration: Calibration,
    positions: [i32; Joint::COUNT],
    attached: bool,
}

impl LedcServoBank {
    /// `channels` are indexed by `Joint` discriminant.
    pub fn new(channels: [LedcDriver<'static>; Joint::COUNT], calibration: Calibration) -> Self {
        Self {
            channels,
            calibration,
            positions: [SERVO_NEUTRAL_DEG; Joint::COUNT],
            attached: false,
        }
    }

    fn drive(&mut self, joint: Joint) {
        let physical = self.calibration.to_physical(joint, self.positions[joint as usize]);
        let channel = &mut self.channels[joint as usize];
        let duty = duty_for_pulse(pulse_width_us(physical), channel.get_max_duty());
        if let Err(e) = channel.set_duty(duty) {
            log::warn!("Servo {:?} duty {} failed: {}", joint, duty, e);
        }
    }
}

impl ServoBank for LedcServoBank {
    fn attach(&mut self) {
        if self.attached {
            return;
        }
        self.attached = true;
        for joint in Joint::ALL {
            self.drive(joint);
        }
        log::debug!("Servos attached");
    }

    fn detach(&mut self) {
        if !self.attached {
            return;
        }
        for (i, channel) in self.channels.iter_mut().enumerate() {
            if let Err(e) = channel.set_duty(0) {
                log::warn!("Servo {} release failed: {}", i, e);
            }
        }
        self.attached = false;
        log::debug!("Servos detached");
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn write(&mut self, joint: Joint, angle: i32) {
        self.positions[joint as usize] = angle.clamp(0, 180);
        if self.attached {
            self.drive(joint);
        }
    }

    fn position(&self, joint: Joint) -> i32 {
        self.positions[joint as usize]
    }
}
