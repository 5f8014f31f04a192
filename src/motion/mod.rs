// Kiki Companion — Motion Commands
//
// Action requests are small `Copy` records so they can travel through the
// bounded queue by value from any task.

pub mod choreography;
pub mod gestures;
pub mod pose;
pub mod queue;

pub use choreography::{Choreography, Interpolator, Playback, Transition, Waypoint};
pub use pose::{Calibration, Joint, Pose, ServoBank};
pub use queue::{ActionQueue, EnqueueError, StopSignal};

use crate::config::{ACTION_MAX_HOLD_MS, ACTION_MAX_PLAY_DEAD_S, ACTION_MAX_SPEED_MS, ACTION_MAX_STEPS};

/// One motion command. Meaning of `steps`/`speed` depends on the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionEntry {
    pub action_type: i32,
    pub steps: i32,
    pub speed: i32,
    pub direction: i32,
    pub amount: i32,
}

impl ActionEntry {
    pub fn new(kind: ActionKind, steps: i32, speed: i32) -> Self {
        Self {
            action_type: kind as i32,
            steps,
            speed,
            direction: 0,
            amount: 0,
        }
    }

    pub fn with_direction(mut self, direction: i32) -> Self {
        self.direction = direction;
        self
    }

    pub fn home() -> Self {
        Self::new(ActionKind::Home, 1, 1000)
    }

    pub fn kind(&self) -> Option<ActionKind> {
        ActionKind::try_from(self.action_type).ok()
    }

    /// Copy with `steps` and `speed` pulled into what the gesture library
    /// plays. Balance and toilet read `steps` as a hold in ms, play dead
    /// reads `speed` as seconds and delay reads it as a pause.
    pub fn clamped(&self) -> Self {
        let steps_max = match self.kind() {
            Some(ActionKind::Balance | ActionKind::Toilet) => ACTION_MAX_HOLD_MS,
            _ => ACTION_MAX_STEPS,
        };
        let speed_max = match self.kind() {
            Some(ActionKind::PlayDead) => ACTION_MAX_PLAY_DEAD_S,
            Some(ActionKind::Delay) => ACTION_MAX_HOLD_MS,
            _ => ACTION_MAX_SPEED_MS,
        };
        Self {
            steps: self.steps.clamp(0, steps_max),
            speed: self.speed.clamp(0, speed_max),
            ..*self
        }
    }
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    // Dog actions
    Walk = 1,
    WalkBack = 2,
    TurnLeft = 3,
    TurnRight = 4,
    SitDown = 5,
    LieDown = 6,
    Jump = 7,
    Bow = 8,
    Dance = 9,
    WaveRightFoot = 10,
    Dance4Feet = 11,
    Swing = 12,
    Stretch = 13,
    Scratch = 14,
    // Legacy biped actions mapped onto the dog body
    LegacyWalk = 15,
    LegacyTurn = 16,
    LegacyJump = 17,
    LegacyBend = 18,
    Home = 19,
    /// Pause; `speed` is the duration in ms.
    Delay = 20,
    JumpHappy = 21,
    WagTail = 22,
    RollOver = 23,
    /// `speed` is the duration in seconds.
    PlayDead = 24,
    ShakePaw = 25,
    Sidestep = 26,
    Pushup = 27,
    Balance = 28,
    Toilet = 29,
    StandUp = 30,
}

impl ActionKind {
    pub const ALL: [ActionKind; 30] = [
        Self::Walk, Self::WalkBack, Self::TurnLeft, Self::TurnRight, Self::SitDown,
        Self::LieDown, Self::Jump, Self::Bow, Self::Dance, Self::WaveRightFoot,
        Self::Dance4Feet, Self::Swing, Self::Stretch, Self::Scratch, Self::LegacyWalk,
        Self::LegacyTurn, Self::LegacyJump, Self::LegacyBend, Self::Home, Self::Delay,
        Self::JumpHappy, Self::WagTail, Self::RollOver, Self::PlayDead, Self::ShakePaw,
        Self::Sidestep, Self::Pushup, Self::Balance, Self::Toilet, Self::StandUp,
    ];

    /// Name used in completion notifications.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Walk => "walk",
            Self::WalkBack => "walk_back",
            Self::TurnLeft => "turn_left",
            Self::TurnRight => "turn_right",
            Self::SitDown => "sit_down",
            Self::LieDown => "lie_down",
            Self::Jump => "jump",
            Self::Bow => "bow",
            Self::Dance => "dance",
            Self::WaveRightFoot => "wave_right_foot",
            Self::Dance4Feet => "dance_4_feet",
            Self::Swing => "swing",
            Self::Stretch => "stretch",
            Self::Scratch => "scratch",
            Self::LegacyWalk => "legacy_walk",
            Self::LegacyTurn => "legacy_turn",
            Self::LegacyJump => "legacy_jump",
            Self::LegacyBend => "legacy_bend",
            Self::Home => "home",
            Self::Delay => "delay",
            Self::JumpHappy => "jump_happy",
            Self::WagTail => "wag_tail",
            Self::RollOver => "roll_over",
            Self::PlayDead => "play_dead",
            Self::ShakePaw => "shake_paw",
            Self::Sidestep => "sidestep",
            Self::Pushup => "pushup",
            Self::Balance => "balance",
            Self::Toilet => "toilet",
            Self::StandUp => "stand_up",
        }
    }

    /// Pose names accepted for custom keyword bindings.
    pub fn from_pose_name(name: &str) -> Option<Self> {
        match name {
            "sit" => Some(Self::SitDown),
            "wave" => Some(Self::WaveRightFoot),
            "bow" => Some(Self::Bow),
            "stretch" => Some(Self::Stretch),
            "swing" => Some(Self::Swing),
            "dance" => Some(Self::Dance),
            _ => None,
        }
    }
}

impl TryFrom<i32> for ActionKind {
    type Error = i32;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        if (1..=30).contains(&raw) {
            Ok(Self::ALL[(raw - 1) as usize])
        } else {
            Err(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_decode_to_matching_variant() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::try_from(kind as i32), Ok(kind));
        }
        assert_eq!(ActionKind::try_from(0), Err(0));
        assert_eq!(ActionKind::try_from(31), Err(31));
    }

    #[test]
    fn clamping_depends_on_what_the_field_means() {
        let wild = ActionEntry::new(ActionKind::Walk, i32::MAX, i32::MAX);
        assert_eq!(wild.clamped(), ActionEntry::new(ActionKind::Walk, ACTION_MAX_STEPS, ACTION_MAX_SPEED_MS));

        let balance = ActionEntry::new(ActionKind::Balance, 5000, -3).clamped();
        assert_eq!((balance.steps, balance.speed), (5000, 0));

        let dead = ActionEntry::new(ActionKind::PlayDead, 1, 3600).clamped();
        assert_eq!(dead.speed, ACTION_MAX_PLAY_DEAD_S);

        let sidestep = ActionEntry::new(ActionKind::Sidestep, 3, 80).with_direction(-1);
        assert_eq!(sidestep.clamped(), sidestep);
    }

    #[test]
    fn pose_names() {
        assert_eq!(ActionKind::from_pose_name("dance"), Some(ActionKind::Dance));
        assert_eq!(ActionKind::from_pose_name("none"), None);
    }
}
