// Kiki Companion — Choreography Interpreter
//
// A gesture is data: an ordered list of waypoints, each a target pose, a way
// of getting there and a hold. `Interpolator` plays it on a `ServoBank`,
// polling the cancel check between every servo step.

use std::time::Duration;

use super::pose::{Joint, Pose, ServoBank};
use crate::config::{HOLD_SLICE_MS, INTERPOLATION_TICK_MS};
use crate::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Write the targets immediately.
    Snap,
    /// One-degree increments along the largest delta, `step_ms` apart.
    Stepwise { step_ms: u32 },
    /// Linear interpolation over a fixed duration.
    Timed { duration_ms: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waypoint {
    pub target: Pose,
    pub transition: Transition,
    pub hold_ms: u32,
}

impl Waypoint {
    pub fn snap(target: Pose, hold_ms: u32) -> Self {
        Self { target, transition: Transition::Snap, hold_ms }
    }

    pub fn glide(target: Pose, step_ms: u32) -> Self {
        Self { target, transition: Transition::Stepwise { step_ms }, hold_ms: 0 }
    }

    pub fn sweep(target: Pose, duration_ms: u32) -> Self {
        Self { target, transition: Transition::Timed { duration_ms }, hold_ms: 0 }
    }

    pub fn pause(ms: u32) -> Self {
        Self::snap(Pose::empty(), ms)
    }

    pub fn hold(mut self, ms: u32) -> Self {
        self.hold_ms = ms;
        self
    }
}

/// Emotions shown while a gesture plays and after it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mood {
    pub during: &'static str,
    pub after: &'static str,
}

/// A run of waypoints played `times` times in a row. Repeats stay folded
/// until playback walks them.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    pattern: Vec<Waypoint>,
    times: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choreography {
    pub name: &'static str,
    segments: Vec<Segment>,
    pub mood: Option<Mood>,
}

impl Choreography {
    pub fn new(name: &'static str) -> Self {
        Self { name, segments: Vec::new(), mood: None }
    }

    pub fn then(mut self, waypoint: Waypoint) -> Self {
        match self.segments.last_mut() {
            Some(last) if last.times == 1 => last.pattern.push(waypoint),
            _ => self.segments.push(Segment { pattern: vec![waypoint], times: 1 }),
        }
        self
    }

    pub fn then_all(mut self, other: Choreography) -> Self {
        self.segments.extend(other.segments);
        self
    }

    pub fn repeat(mut self, times: i32, pattern: &[Waypoint]) -> Self {
        let times = times.max(0) as u32;
        if times > 0 && !pattern.is_empty() {
            self.segments.push(Segment { pattern: pattern.to_vec(), times });
        }
        self
    }

    pub fn with_mood(mut self, during: &'static str, after: &'static str) -> Self {
        self.mood = Some(Mood { during, after });
        self
    }

    /// Every waypoint in play order, repeats expanded on the fly.
    pub fn waypoints(&self) -> impl Iterator<Item = &Waypoint> + '_ {
        self.segments
            .iter()
            .flat_map(|s| (0..s.times).flat_map(move |_| s.pattern.iter()))
    }

    pub fn len(&self) -> usize {
        self.segments
            .iter()
            .map(|s| s.pattern.len().saturating_mul(s.times as usize))
            .fold(0, usize::saturating_add)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sum of waypoint count over stored segments, repeats folded.
    pub fn stored_len(&self) -> usize {
        self.segments.iter().map(|s| s.pattern.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Completed,
    Cancelled,
}

pub struct Interpolator<'a> {
    servos: &'a mut dyn ServoBank,
    platform: &'a dyn Platform,
    cancelled: &'a dyn Fn() -> bool,
}

impl<'a> Interpolator<'a> {
    pub fn new(
        servos: &'a mut dyn ServoBank,
        platform: &'a dyn Platform,
        cancelled: &'a dyn Fn() -> bool,
    ) -> Self {
        Self { servos, platform, cancelled }
    }

    pub fn play(&mut self, choreography: &Choreography) -> Playback {
        for waypoint in choreography.waypoints() {
            if (self.cancelled)() {
                return Playback::Cancelled;
            }
            let moved = match waypoint.transition {
                Transition::Snap => {
                    self.write_pose(&waypoint.target);
                    Playback::Completed
                }
                Transition::Stepwise { step_ms } => self.stepwise(&waypoint.target, step_ms),
                Transition::Timed { duration_ms } => self.timed(&waypoint.target, duration_ms),
            };
            if moved == Playback::Cancelled || self.hold(waypoint.hold_ms) == Playback::Cancelled {
                return Playback::Cancelled;
            }
        }
        Playback::Completed
    }

    fn write_pose(&mut self, pose: &Pose) {
        for (joint, angle) in pose.targets() {
            self.servos.write(joint, angle);
        }
    }

    fn starts(&self, pose: &Pose) -> Vec<(Joint, i32, i32)> {
        pose.targets()
            .map(|(joint, target)| (joint, self.servos.position(joint), target))
            .collect()
    }

    fn stepwise(&mut self, pose: &Pose, step_ms: u32) -> Playback {
        let starts = self.starts(pose);
        let span = starts.iter().map(|(_, from, to)| (to - from).abs()).max().unwrap_or(0);
        for step in 0..=span {
            if (self.cancelled)() {
                return Playback::Cancelled;
            }
            for &(joint, from, to) in &starts {
                let angle = if span == 0 { to } else { from + (to - from) * step / span };
                self.servos.write(joint, angle);
            }
            self.delay(step_ms);
        }
        self.write_pose(pose);
        Playback::Completed
    }

    fn timed(&mut self, pose: &Pose, duration_ms: u32) -> Playback {
        if duration_ms <= INTERPOLATION_TICK_MS {
            self.write_pose(pose);
            self.delay(duration_ms);
            return Playback::Completed;
        }
        let starts = self.starts(pose);
        let ticks = (duration_ms / INTERPOLATION_TICK_MS) as i32;
        for tick in 1..=ticks {
            if (self.cancelled)() {
                return Playback::Cancelled;
            }
            for &(joint, from, to) in &starts {
                self.servos.write(joint, from + (to - from) * tick / ticks);
            }
            self.delay(INTERPOLATION_TICK_MS);
        }
        self.write_pose(pose);
        Playback::Completed
    }

    fn hold(&self, ms: u32) -> Playback {
        let mut left = ms;
        while left > 0 {
            if (self.cancelled)() {
                return Playback::Cancelled;
            }
            let slice = left.min(HOLD_SLICE_MS);
            self.delay(slice);
            left -= slice;
        }
        Playback::Completed
    }

    fn delay(&self, ms: u32) {
        if ms > 0 {
            self.platform.sleep(Duration::from_millis(ms as u64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sim::{SimPlatform, SimServos};
    use std::cell::Cell;

    #[test]
    fn stepwise_ends_on_target_and_takes_one_step_per_degree() {
        let platform = SimPlatform::virtual_time();
        let mut servos = SimServos::new();
        let never = || false;
        let mut interp = Interpolator::new(&mut servos, &platform, &never);
        let c = Choreography::new("sit").then(Waypoint::glide(Pose::legs(90, 90, 30, 30), 12));
        assert_eq!(interp.play(&c), Playback::Completed);
        assert_eq!(servos.position(Joint::LeftBack), 30);
        // 60 degrees of travel → 61 writes at 12 ms
        assert_eq!(platform.now_ms(), 61 * 12);
    }

    #[test]
    fn timed_sweep_spreads_over_duration() {
        let platform = SimPlatform::virtual_time();
        let mut servos = SimServos::new();
        let never = || false;
        let mut interp = Interpolator::new(&mut servos, &platform, &never);
        let c = Choreography::new("sweep").then(Waypoint::sweep(Pose::all_legs(120), 200));
        interp.play(&c);
        assert_eq!(servos.position(Joint::RightBack), 120);
        assert_eq!(platform.now_ms(), 200);
    }

    #[test]
    fn cancel_stops_between_steps() {
        let platform = SimPlatform::virtual_time();
        let mut servos = SimServos::new();
        let checks = Cell::new(0);
        let cancel_after_three = || {
            checks.set(checks.get() + 1);
            checks.get() > 3
        };
        let mut interp = Interpolator::new(&mut servos, &platform, &cancel_after_three);
        let c = Choreography::new("walk")
            .repeat(10, &[Waypoint::snap(Pose::legs(35, 145, 145, 35), 100), Waypoint::snap(Pose::all_legs(90), 100)]);
        assert_eq!(interp.play(&c), Playback::Cancelled);
        assert!(platform.now_ms() < 1000);
    }

    #[test]
    fn repeats_stay_folded_until_played() {
        let c = Choreography::new("tap").then(Waypoint::pause(0)).repeat(
            10_000,
            &[Waypoint::snap(Pose::all_legs(80), 0), Waypoint::snap(Pose::all_legs(100), 0)],
        );
        assert_eq!(c.len(), 20_001);
        assert_eq!(c.stored_len(), 3);
        assert_eq!(c.waypoints().nth(2).map(|w| w.target), Some(Pose::all_legs(100)));
    }

    #[test]
    fn long_holds_are_interruptible() {
        let platform = SimPlatform::virtual_time();
        let mut servos = SimServos::new();
        let cancel_late = || platform.now_ms() >= 300;
        let mut interp = Interpolator::new(&mut servos, &platform, &cancel_late);
        let c = Choreography::new("dead").then(Waypoint::pause(5000));
        assert_eq!(interp.play(&c), Playback::Cancelled);
        assert_eq!(platform.now_ms(), 300);
    }
}
