// Kiki Companion — Gesture Library
//
// Maps each action tag to a choreography. Angles are logical degrees with
// 90 = leg straight down; see `Calibration` for the trim/mirror step.

use super::choreography::{Choreography, Waypoint};
use super::pose::{Joint, Pose, NEUTRAL};
use super::{ActionEntry, ActionKind};

const GLIDE_STEP_MS: u32 = 12;
const TAIL_CENTER: i32 = 90;
const TAIL_LEFT: i32 = 30;
const TAIL_RIGHT: i32 = 150;

fn ms(value: i32) -> u32 {
    value.max(0) as u32
}

fn pair(a: Joint, b: Joint, angle: i32) -> Pose {
    Pose::empty().joint(a, angle).joint(b, angle)
}

fn lean(a: Joint, a_angle: i32, b: Joint, b_angle: i32) -> Pose {
    Pose::empty().joint(a, a_angle).joint(b, b_angle)
}

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

fn stand_up() -> Choreography {
    Choreography::new("stand_up")
        .then(Waypoint::glide(Pose::all_legs(90), GLIDE_STEP_MS))
        .then(Waypoint::snap(NEUTRAL, 300))
}

fn sit_down(hold_ms: u32) -> Choreography {
    Choreography::new("sit_down")
        .then(Waypoint::glide(Pose::legs(90, 90, 30, 30), GLIDE_STEP_MS).hold(hold_ms))
}

fn lie_down() -> Choreography {
    Choreography::new("lie_down").then(Waypoint::glide(Pose::all_legs(5), GLIDE_STEP_MS).hold(500))
}

fn wag_tail(wags: i32, speed: u32) -> Choreography {
    Choreography::new("wag_tail")
        .then(Waypoint::snap(Pose::tail(TAIL_CENTER), 200))
        .repeat(
            wags,
            &[
                Waypoint::snap(Pose::tail(TAIL_RIGHT), speed),
                Waypoint::snap(Pose::tail(TAIL_LEFT), speed),
            ],
        )
        .then(Waypoint::snap(Pose::tail(TAIL_CENTER), 0))
}

/// Diagonal gait. `reverse` swaps the swing direction of every pair.
fn walk(steps: i32, delay: u32, reverse: bool) -> Choreography {
    use Joint::*;
    let (fwd, back) = if reverse { (145, 35) } else { (35, 145) };
    let cycle = [
        Waypoint::snap(pair(LeftFront, RightBack, fwd), delay),
        Waypoint::snap(pair(RightFront, LeftBack, back), delay),
        Waypoint::snap(pair(LeftFront, RightBack, 90), delay),
        Waypoint::snap(pair(RightFront, LeftBack, 90), delay),
        Waypoint::snap(pair(RightFront, LeftBack, fwd), delay),
        Waypoint::snap(pair(LeftFront, RightBack, back), delay),
        Waypoint::snap(pair(RightFront, LeftBack, 90), delay),
        Waypoint::snap(pair(LeftFront, RightBack, 90), delay),
    ];
    Choreography::new(if reverse { "walk_back" } else { "walk" })
        .then_all(stand_up())
        .then(Waypoint::pause(120))
        .repeat(steps, &cycle)
}

fn turn(steps: i32, delay: u32, left: bool) -> Choreography {
    use Joint::*;
    let (first, second) = if left {
        ((RightFront, LeftBack), (LeftFront, RightBack))
    } else {
        ((LeftFront, RightBack), (RightFront, LeftBack))
    };
    let cycle = [
        Waypoint::snap(lean(first.0, 45, first.1, 135), delay),
        Waypoint::snap(lean(second.0, 45, second.1, 135), delay),
        Waypoint::snap(pair(first.0, first.1, 90), delay),
        Waypoint::snap(pair(second.0, second.1, 90), delay),
    ];
    Choreography::new(if left { "turn_left" } else { "turn_right" })
        .then_all(stand_up())
        .then(Waypoint::pause(500))
        .repeat(steps, &cycle)
}

fn jump(delay: u32) -> Choreography {
    Choreography::new("jump")
        .then(Waypoint::snap(Pose::all_legs(60), delay))
        .then(Waypoint::snap(Pose::all_legs(120), 100))
        .then(Waypoint::pause(300))
        .then_all(stand_up())
}

fn bow(hold_ms: u32) -> Choreography {
    Choreography::new("bow")
        .then(Waypoint::glide(Pose::legs(0, 0, 90, 90), GLIDE_STEP_MS).hold(hold_ms))
        .then_all(stand_up())
}

fn dance(cycles: i32) -> Choreography {
    Choreography::new("dance")
        .repeat(
            cycles,
            &[
                Waypoint::snap(Pose::legs(60, 120, 60, 120), 200),
                Waypoint::snap(Pose::legs(120, 60, 120, 60), 200),
                Waypoint::snap(Pose::legs(75, 75, 105, 105), 250),
                Waypoint::snap(Pose::legs(105, 105, 75, 75), 150),
            ],
        )
        .then_all(stand_up())
}

fn dance_4_feet(cycles: i32, delay: u32) -> Choreography {
    Choreography::new("dance_4_feet")
        .then_all(stand_up())
        .then(Waypoint::pause(200))
        .repeat(
            cycles,
            &[
                Waypoint::snap(Pose::all_legs(60), delay.saturating_add(400)),
                Waypoint::snap(Pose::all_legs(120), delay.saturating_add(400)),
                Waypoint::snap(Pose::all_legs(90), delay.saturating_add(200)),
            ],
        )
        .then_all(stand_up())
        .then(Waypoint::pause(500))
}

fn wave_right_foot(waves: i32, delay: u32) -> Choreography {
    let mut wave: Vec<Waypoint> = (0..=18)
        .rev()
        .map(|i| Waypoint::snap(Pose::empty().joint(Joint::RightFront, i * 5), 16))
        .collect();
    wave.push(Waypoint::pause(delay));
    wave.extend((0..=18).map(|i| Waypoint::snap(Pose::empty().joint(Joint::RightFront, i * 5), 16)));
    wave.push(Waypoint::pause(delay));

    Choreography::new("wave_right_foot")
        .then(Waypoint::snap(Pose::legs(90, 90, 30, 30), 300))
        .repeat(waves, &wave)
        .then_all(sit_down(300))
}

fn swing(cycles: i32, delay: u32) -> Choreography {
    let sway = |i: i32| Waypoint::snap(Pose::legs(i, 110 - i, i, 110 - i), delay);
    let mut cycle: Vec<Waypoint> = (30..90).map(sway).collect();
    cycle.extend((31..=90).rev().map(sway));

    let mut c = Choreography::new("swing")
        .then_all(stand_up())
        .then(Waypoint::pause(500));
    for i in (31..=90).rev() {
        c = c.then(Waypoint::snap(Pose::all_legs(i), delay));
    }
    c.repeat(cycles, &cycle).then_all(sit_down(0))
}

fn stretch(cycles: i32, delay: u32) -> Choreography {
    let front = |j: i32| Waypoint::snap(Pose::legs(j, j, 90, 90), delay);
    let back = |j: i32| Waypoint::snap(Pose::legs(90, 90, j, j), delay);
    let mut cycle: Vec<Waypoint> = (11..=90).rev().map(front).collect();
    cycle.extend((10..90).map(front));
    cycle.extend((90..170).map(back));
    cycle.extend((91..=170).rev().map(back));

    Choreography::new("stretch")
        .then(Waypoint::snap(Pose::all_legs(90), 80))
        .repeat(cycles, &cycle)
}

fn scratch(scratches: i32, delay: u32) -> Choreography {
    let paw = |a: i32| Waypoint::snap(Pose::empty().joint(Joint::RightBack, a), 20);
    let mut cycle: Vec<Waypoint> = [30, 20, 10, 0].into_iter().map(paw).collect();
    cycle.push(Waypoint::pause(delay));
    cycle.extend([0, 10, 20, 30].into_iter().map(paw));
    cycle.push(Waypoint::pause(delay));

    Choreography::new("scratch")
        .then_all(sit_down(500))
        .then(Waypoint::pause(300))
        .repeat(scratches, &cycle)
}

fn roll_over() -> Choreography {
    Choreography::new("roll_over")
        .then_all(lie_down())
        .then(Waypoint::pause(500))
        .then_all(swing(3, 10))
        .then(Waypoint::pause(500))
        .then_all(lie_down())
        .then(Waypoint::pause(500))
        .then_all(stand_up())
        .then_all(wag_tail(5, 100))
        .with_mood("excited", "happy")
}

fn play_dead(seconds: i32) -> Choreography {
    Choreography::new("play_dead")
        .then_all(lie_down())
        .then(Waypoint::pause(ms(seconds).saturating_mul(1000)))
        .then_all(sit_down(800))
        .then(Waypoint::pause(500))
        .then_all(stand_up())
        .with_mood("neutral", "happy")
}

fn shake_paw(shakes: i32, delay: u32) -> Choreography {
    Choreography::new("shake_paw")
        .then_all(stand_up())
        .then(Waypoint::pause(50))
        .repeat(
            shakes,
            &[
                Waypoint::snap(Pose::legs(80, 75, 70, 110), (delay / 2).saturating_add(40)),
                Waypoint::snap(Pose::legs(80, 0, 70, 110), (delay / 4).saturating_add(150)),
                Waypoint::snap(Pose::legs(80, 90, 70, 110), (delay / 4).saturating_add(40)),
            ],
        )
        .then_all(stand_up())
}

fn sidestep(steps: i32, delay: u32, direction: i32) -> Choreography {
    let d = delay.saturating_mul(2);
    let a = Waypoint::snap(Pose::legs(120, 80, 120, 80), d);
    let b = Waypoint::snap(Pose::legs(80, 120, 80, 120), d);
    let cycle = if direction > 0 { [a, b] } else { [b, a] };
    Choreography::new("sidestep")
        .then_all(stand_up())
        .then(Waypoint::pause(200))
        .repeat(steps, &cycle)
        .then_all(stand_up())
}

fn pushup(pushups: i32, delay: u32) -> Choreography {
    let d = delay.saturating_mul(2).saturating_add(500);
    Choreography::new("pushup")
        .then_all(lie_down())
        .then(Waypoint::pause(500))
        .repeat(
            pushups,
            &[
                Waypoint::snap(Pose::legs(35, 35, 95, 95), d),
                Waypoint::snap(Pose::legs(100, 100, 95, 95), d),
            ],
        )
        .then_all(stand_up())
        .with_mood("confused", "happy")
}

fn toilet(hold_ms: u32, delay: u32) -> Choreography {
    let d = delay.saturating_mul(2);
    Choreography::new("toilet")
        .then_all(sit_down(d))
        .then(Waypoint::pause(400))
        .then(Waypoint::snap(Pose::legs(100, 100, 130, 130), d.saturating_add(300)))
        .then_all(wag_tail(2, 120))
        .then(Waypoint::pause(hold_ms))
        .then_all(sit_down(d))
        .then(Waypoint::pause(300))
        .then_all(stand_up())
}

fn balance(hold_ms: u32, delay: u32) -> Choreography {
    let d = delay.saturating_mul(2);
    Choreography::new("balance")
        .then(Waypoint::snap(Pose::legs(70, 70, 60, 60), d.saturating_add(500)))
        .then(Waypoint::snap(Pose::legs(100, 100, 50, 50), d.saturating_add(300)))
        .then(Waypoint::snap(Pose::legs(120, 120, 45, 45), d.saturating_add(300)))
        .then(Waypoint::snap(Pose::legs(140, 140, 40, 40), d.saturating_add(hold_ms)))
        .then(Waypoint::snap(Pose::legs(110, 110, 50, 50), d.saturating_add(300)))
        .then(Waypoint::snap(Pose::legs(90, 90, 75, 75), d.saturating_add(300)))
        .then_all(stand_up())
        .with_mood("neutral", "neutral")
}

fn wagging(c: Choreography) -> Choreography {
    c.then_all(wag_tail(3, 100))
}

/// Choreography for one queued action, or `None` for an unknown tag.
/// Out-of-range `steps`/`speed` are clamped first.
pub fn choreograph(entry: &ActionEntry) -> Option<Choreography> {
    let entry = &entry.clamped();
    let kind = entry.kind()?;
    let steps = entry.steps;
    let speed = ms(entry.speed);

    let mut c = match kind {
        ActionKind::Walk => wagging(walk(steps, speed, false)),
        ActionKind::WalkBack => wagging(walk(steps, speed, true)),
        ActionKind::TurnLeft => wagging(turn(steps, speed, true)),
        ActionKind::TurnRight => wagging(turn(steps, speed, false)),
        ActionKind::SitDown => wagging(sit_down(speed)),
        ActionKind::LieDown => lie_down(),
        ActionKind::Jump => wagging(jump(speed)).with_mood("angry", "neutral"),
        ActionKind::JumpHappy => wagging(jump(speed)).with_mood("happy", "neutral"),
        ActionKind::Bow => wagging(bow(speed)),
        ActionKind::Dance => dance(steps).then_all(wag_tail(5, 80)),
        ActionKind::WaveRightFoot => wagging(wave_right_foot(steps, speed)),
        ActionKind::Dance4Feet => dance_4_feet(steps, speed).then_all(wag_tail(5, 80)),
        ActionKind::Swing => wagging(swing(steps, speed)),
        ActionKind::Stretch => stretch(steps, speed).with_mood("sleepy", "neutral"),
        ActionKind::Scratch => wagging(scratch(steps, speed)),
        ActionKind::WagTail => wag_tail(steps, speed),
        ActionKind::RollOver => roll_over(),
        ActionKind::PlayDead => play_dead(entry.speed),
        ActionKind::ShakePaw => shake_paw(steps, speed),
        ActionKind::Sidestep => sidestep(steps, speed, entry.direction),
        ActionKind::Pushup => pushup(steps, speed),
        ActionKind::Balance => balance(ms(steps), speed),
        ActionKind::Toilet => toilet(ms(steps), speed),
        ActionKind::StandUp | ActionKind::Home => stand_up(),
        ActionKind::Delay => Choreography::new("delay").then(Waypoint::pause(speed)),
        // Biped-era commands, period-based
        ActionKind::LegacyWalk => wagging(walk(steps, speed / 4, entry.direction < 0)),
        ActionKind::LegacyTurn => wagging(turn(steps, speed / 4, entry.direction >= 0)),
        ActionKind::LegacyJump => wagging(jump(speed / 2)).with_mood("angry", "neutral"),
        ActionKind::LegacyBend => wagging(bow(speed)),
    };
    c.name = kind.name();
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ACTION_MAX_HOLD_MS, ACTION_MAX_STEPS};

    #[test]
    fn every_tag_has_a_choreography() {
        for kind in ActionKind::ALL {
            let c = choreograph(&ActionEntry::new(kind, 1, 100)).unwrap();
            assert!(!c.is_empty(), "{} is empty", kind.name());
            assert_eq!(c.name, kind.name());
        }
        assert!(choreograph(&ActionEntry { action_type: 99, ..Default::default() }).is_none());
    }

    #[test]
    fn walk_repeats_eight_half_steps_per_step() {
        let one = choreograph(&ActionEntry::new(ActionKind::Walk, 1, 100)).unwrap();
        let three = choreograph(&ActionEntry::new(ActionKind::Walk, 3, 100)).unwrap();
        assert_eq!(three.len() - one.len(), 16);
    }

    #[test]
    fn dramatic_actions_carry_a_mood() {
        let jump = choreograph(&ActionEntry::new(ActionKind::Jump, 1, 200)).unwrap();
        let mood = jump.mood.unwrap();
        assert_eq!((mood.during, mood.after), ("angry", "neutral"));

        let dead = choreograph(&ActionEntry::new(ActionKind::PlayDead, 1, 5)).unwrap();
        assert!(dead.waypoints().any(|w| w.hold_ms == 5000));

        assert!(choreograph(&ActionEntry::home()).unwrap().mood.is_none());
    }

    #[test]
    fn extreme_parameters_stay_bounded() {
        for kind in ActionKind::ALL {
            let c = choreograph(&ActionEntry::new(kind, i32::MAX, i32::MAX)).unwrap();
            assert!(c.stored_len() < 1_000, "{} stores {} waypoints", kind.name(), c.stored_len());
            assert!(c.waypoints().all(|w| w.hold_ms <= 10 * ACTION_MAX_HOLD_MS as u32));
        }
        let stretch = choreograph(&ActionEntry::new(ActionKind::Stretch, 10_000, 5)).unwrap();
        let one = choreograph(&ActionEntry::new(ActionKind::Stretch, 1, 5)).unwrap();
        assert_eq!(stretch.len() - 1, (one.len() - 1) * ACTION_MAX_STEPS as usize);
    }

    #[test]
    fn negative_speed_is_treated_as_zero() {
        let c = choreograph(&ActionEntry::new(ActionKind::Delay, 1, -50)).unwrap();
        assert_eq!(c.waypoints().next().map(|w| w.hold_ms), Some(0));
    }
}
