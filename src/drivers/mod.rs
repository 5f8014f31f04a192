// Kiki Companion — Hardware Drivers

#[cfg(target_os = "espidf")]
pub mod servo;

/// Pulse width in microseconds for a physical angle (0–180°).
pub fn pulse_width_us(angle: i32) -> u32 {
    use crate::config::{SERVO_PULSE_MAX_US, SERVO_PULSE_MIN_US};
    let angle = angle.clamp(0, 180) as u32;
    SERVO_PULSE_MIN_US + (SERVO_PULSE_MAX_US - SERVO_PULSE_MIN_US) * angle / 180
}

/// LEDC duty for a pulse width at `max_duty` resolution over one PWM period.
pub fn duty_for_pulse(pulse_us: u32, max_duty: u32) -> u32 {
    use crate::config::SERVO_PERIOD_US;
    ((pulse_us as u64 * max_duty as u64) / SERVO_PERIOD_US as u64) as u32
}
