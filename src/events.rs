// Kiki Companion — System Events & Signal Types

// ---------------------------------------------------------------------------
// Main loop wake reasons
// ---------------------------------------------------------------------------

/// One condition that wakes the main loop. Discriminants are the bit index
/// and the declaration order is the dispatch priority within one wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MainEvent {
    NetworkError = 0,
    SendAudio = 1,
    WakeWordDetected = 2,
    VadChange = 3,
    Schedule = 4,
    ClockTick = 5,
}

impl MainEvent {
    /// Dispatch order used by the main loop.
    pub const PRIORITY: [MainEvent; 6] = [
        MainEvent::NetworkError,
        MainEvent::SendAudio,
        MainEvent::WakeWordDetected,
        MainEvent::VadChange,
        MainEvent::Schedule,
        MainEvent::ClockTick,
    ];

    pub const fn bit(self) -> u8 {
        1 << self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::SendAudio => "send_audio",
            Self::WakeWordDetected => "wake_word",
            Self::VadChange => "vad_change",
            Self::Schedule => "schedule",
            Self::ClockTick => "clock_tick",
        }
    }
}

/// A set of [`MainEvent`]s packed into one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventSet(u8);

impl EventSet {
    pub const EMPTY: EventSet = EventSet(0);
    pub const ALL: EventSet = EventSet(0b0011_1111);

    pub const fn from_bits(bits: u8) -> Self {
        EventSet(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, event: MainEvent) -> bool {
        self.0 & event.bit() != 0
    }

    pub fn insert(&mut self, event: MainEvent) {
        self.0 |= event.bit();
    }

    pub const fn with(self, event: MainEvent) -> Self {
        EventSet(self.0 | event.bit())
    }

    pub const fn intersect(self, other: EventSet) -> Self {
        EventSet(self.0 & other.0)
    }

    /// Members in dispatch priority order.
    pub fn iter(self) -> impl Iterator<Item = MainEvent> {
        MainEvent::PRIORITY
            .into_iter()
            .filter(move |event| self.contains(*event))
    }
}

impl From<MainEvent> for EventSet {
    fn from(event: MainEvent) -> Self {
        EventSet(event.bit())
    }
}

impl FromIterator<MainEvent> for EventSet {
    fn from_iter<I: IntoIterator<Item = MainEvent>>(iter: I) -> Self {
        let mut set = EventSet::EMPTY;
        for event in iter {
            set.insert(event);
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Audio cues
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    Popup,
    Success,
    Exclamation,
    Vibration,
    Upgrade,
    Activation,
    Ding,
    Digit(u8),
}

impl Sound {
    pub fn name(&self) -> String {
        match self {
            Self::Popup => "popup".into(),
            Self::Success => "success".into(),
            Self::Exclamation => "exclamation".into(),
            Self::Vibration => "vibration".into(),
            Self::Upgrade => "upgrade".into(),
            Self::Activation => "activation".into(),
            Self::Ding => "ding".into(),
            Self::Digit(d) => format!("digit_{}", d),
        }
    }

    /// Map an activation-code character to its spoken digit.
    pub fn from_digit(c: char) -> Option<Self> {
        c.to_digit(10).map(|d| Self::Digit(d as u8))
    }
}

// ---------------------------------------------------------------------------
// Protocol notifications
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    None,
    WakeWordDetected,
}

impl AbortReason {
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::WakeWordDetected => Some("wake_word_detected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_follows_priority_not_insertion() {
        let set: EventSet = [MainEvent::ClockTick, MainEvent::Schedule, MainEvent::NetworkError]
            .into_iter()
            .collect();
        let order: Vec<_> = set.iter().collect();
        assert_eq!(
            order,
            vec![MainEvent::NetworkError, MainEvent::Schedule, MainEvent::ClockTick]
        );
    }

    #[test]
    fn from_bits_masks_unknown_bits() {
        assert_eq!(EventSet::from_bits(0xFF), EventSet::ALL);
        assert!(EventSet::from_bits(0b1100_0000).is_empty());
    }

    #[test]
    fn digit_sounds() {
        assert_eq!(Sound::from_digit('7'), Some(Sound::Digit(7)));
        assert_eq!(Sound::from_digit('x'), None);
        assert_eq!(Sound::Digit(3).name(), "digit_3");
    }
}
