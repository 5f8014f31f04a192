// Kiki Companion — Joints, Poses & Servo Calibration

use crate::config::SERVO_NEUTRAL_DEG;
use crate::settings::SettingsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Joint {
    LeftFront = 0,
    RightFront = 1,
    LeftBack = 2,
    RightBack = 3,
    Tail = 4,
}

impl Joint {
    pub const COUNT: usize = 5;
    pub const ALL: [Joint; Joint::COUNT] = [
        Joint::LeftFront,
        Joint::RightFront,
        Joint::LeftBack,
        Joint::RightBack,
        Joint::Tail,
    ];
    pub const LEGS: [Joint; 4] = [
        Joint::LeftFront,
        Joint::RightFront,
        Joint::LeftBack,
        Joint::RightBack,
    ];

    /// Right-side servos are mounted mirrored.
    pub fn is_mirrored(&self) -> bool {
        matches!(self, Self::RightFront | Self::RightBack)
    }

    fn trim_key(&self) -> &'static str {
        match self {
            Self::LeftFront => "left_front",
            Self::RightFront => "right_front",
            Self::LeftBack => "left_back",
            Self::RightBack => "right_back",
            Self::Tail => "tail",
        }
    }
}

/// Target angle per joint; `None` leaves that joint where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pose([Option<i32>; Joint::COUNT]);

impl Pose {
    pub const fn empty() -> Self {
        Pose([None; Joint::COUNT])
    }

    pub const fn legs(lf: i32, rf: i32, lb: i32, rb: i32) -> Self {
        Pose([Some(lf), Some(rf), Some(lb), Some(rb), None])
    }

    pub const fn all_legs(angle: i32) -> Self {
        Self::legs(angle, angle, angle, angle)
    }

    pub const fn tail(angle: i32) -> Self {
        Pose([None, None, None, None, Some(angle)])
    }

    pub fn joint(mut self, joint: Joint, angle: i32) -> Self {
        self.0[joint as usize] = Some(angle);
        self
    }

    pub fn get(&self, joint: Joint) -> Option<i32> {
        self.0[joint as usize]
    }

    pub fn targets(&self) -> impl Iterator<Item = (Joint, i32)> + '_ {
        Joint::ALL
            .into_iter()
            .filter_map(move |j| self.get(j).map(|a| (j, a)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

/// Servo outputs in logical degrees (0 = leg folded forward on both sides).
pub trait ServoBank: Send {
    fn attach(&mut self);
    fn detach(&mut self);
    fn is_attached(&self) -> bool;
    fn write(&mut self, joint: Joint, angle: i32);
    fn position(&self, joint: Joint) -> i32;
}

/// Per-joint trim, applied when converting logical to physical angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Calibration {
    trims: [i32; Joint::COUNT],
}

impl Calibration {
    pub fn new(trims: [i32; Joint::COUNT]) -> Self {
        Self { trims }
    }

    pub fn load(settings: &dyn SettingsStore, namespace: &str) -> Self {
        let mut trims = [0; Joint::COUNT];
        for joint in Joint::ALL {
            trims[joint as usize] = settings.get_int(namespace, joint.trim_key()).unwrap_or(0);
        }
        log::info!("Servo trims loaded: {:?}", trims);
        Self { trims }
    }

    pub fn trim(&self, joint: Joint) -> i32 {
        self.trims[joint as usize]
    }

    /// Logical angle → angle sent to the servo: trimmed, clamped, mirrored.
    pub fn to_physical(&self, joint: Joint, logical: i32) -> i32 {
        let angle = (logical + self.trim(joint)).clamp(0, 180);
        if joint.is_mirrored() {
            180 - angle
        } else {
            angle
        }
    }

    pub fn to_logical(&self, joint: Joint, physical: i32) -> i32 {
        let angle = if joint.is_mirrored() { 180 - physical } else { physical };
        angle - self.trim(joint)
    }
}

pub const NEUTRAL: Pose = Pose([Some(SERVO_NEUTRAL_DEG); Joint::COUNT]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrored_joints_invert_after_trim() {
        let cal = Calibration::new([2, -3, 0, 5, 0]);
        assert_eq!(cal.to_physical(Joint::LeftFront, 90), 92);
        assert_eq!(cal.to_physical(Joint::RightFront, 30), 153);
        assert_eq!(cal.to_logical(Joint::RightFront, 153), 30);
    }

    #[test]
    fn physical_angles_are_clamped() {
        let cal = Calibration::new([10, 0, 0, 0, 0]);
        assert_eq!(cal.to_physical(Joint::LeftFront, 175), 180);
        assert_eq!(cal.to_physical(Joint::LeftBack, -20), 0);
    }

    #[test]
    fn pose_targets_skip_unset_joints() {
        let pose = Pose::tail(150).joint(Joint::LeftFront, 35);
        let targets: Vec<_> = pose.targets().collect();
        assert_eq!(targets, vec![(Joint::LeftFront, 35), (Joint::Tail, 150)]);
        assert!(Pose::empty().is_empty());
    }
}
