// Kiki Companion — Board Facade
//
// Hardware collaborators handed to the core at construction. Board variants
// that lack a part return `None` from the matching accessor.

use std::time::Duration;

use crate::state::{DeviceState, MediaActivity};

pub trait Display: Send + Sync {
    fn set_status(&self, status: &str);
    fn set_emotion(&self, emotion: &str);
    fn set_chat_message(&self, role: &str, content: &str);
    fn show_notification(&self, message: &str, duration: Duration);
    fn update_status_bar(&self, update_all: bool);
    fn set_power_save_mode(&self, on: bool);

    /// Flush a last frame and stop the render task; light sleep only.
    fn pause_rendering(&self) {}
    fn resume_rendering(&self) {}

    /// The emoji overlay, on displays that have one.
    fn emoji_overlay(&self) -> Option<&dyn EmojiOverlay> {
        None
    }
}

/// Full-screen animated face layered over the chat view.
pub trait EmojiOverlay: Send + Sync {
    fn set_overlay_mode(&self, on: bool);
    fn set_chat_hidden(&self, hidden: bool);
    fn show_qr_code(&self, text: &str, duration: Duration);
    /// `true` for the animated emoji set, `false` for plain unicode emoji.
    fn is_animated_style(&self) -> bool;
    fn set_animated_style(&self, animated: bool);
    fn toggle_clock(&self);
}

pub trait Led: Send + Sync {
    fn on_state_changed(&self, state: DeviceState, voice_detected: bool);
}

pub trait Backlight: Send + Sync {
    fn set_brightness(&self, percent: u8);
    fn restore_brightness(&self);
}

/// Streaming music player running alongside the conversation.
pub trait BackgroundMedia: Send + Sync {
    fn activity(&self) -> MediaActivity;
    fn stop_streaming(&self, notify_server: bool);
    fn download_and_play(&self, song: &str) -> bool;
}

/// Auxiliary control-panel web server.
pub trait AuxServer: Send + Sync {
    /// Start (or keep running) and return the URL it answers on.
    fn start(&self) -> Option<String>;
    fn stop(&self);
}

pub trait Board: Send + Sync {
    fn name(&self) -> &str;
    fn user_agent(&self) -> String;
    fn display(&self) -> &dyn Display;
    fn led(&self) -> &dyn Led;
    fn backlight(&self) -> Option<&dyn Backlight>;
    fn music(&self) -> Option<&dyn BackgroundMedia>;
    fn control_panel(&self) -> Option<&dyn AuxServer>;
    fn set_power_save_mode(&self, enabled: bool);
    fn start_network(&self);
}
