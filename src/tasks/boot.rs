// Kiki Companion — Boot Task
//
// Network bring-up and the version check can take minutes when the server is
// unreachable, so they run here while the main loop keeps dispatching.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::app::AppHandle;
use crate::board::Board;
use crate::config::{CONTROL_PANEL_AUTOSTART_MS, STACK_BOOT};
use crate::ota::{self, Ota, VersionCheckOutcome};
use crate::platform::Platform;

pub fn boot_task(
    handle: AppHandle,
    board: Arc<dyn Board>,
    platform: Arc<dyn Platform>,
    mut ota: Box<dyn Ota>,
) {
    log::info!("Boot task started");
    board.start_network();
    board.display().update_status_bar(true);

    let outcome = ota::check_new_version(ota.as_mut(), &handle, platform.as_ref());
    log::info!("Version check finished: {:?}", outcome);
    if outcome == VersionCheckOutcome::Upgraded {
        return;
    }
    handle.schedule(|app| app.finish_boot());

    let Some(panel) = board.control_panel() else {
        return;
    };
    platform.sleep(Duration::from_millis(CONTROL_PANEL_AUTOSTART_MS));
    match panel.start() {
        Some(url) => log::info!("Control panel started at {}", url),
        None => log::warn!("Control panel failed to start"),
    }
}

pub fn spawn(
    handle: AppHandle,
    board: Arc<dyn Board>,
    platform: Arc<dyn Platform>,
    ota: Box<dyn Ota>,
) -> anyhow::Result<JoinHandle<()>> {
    let task = thread::Builder::new()
        .name("boot".into())
        .stack_size(STACK_BOOT)
        .spawn(move || boot_task(handle, board, platform, ota))?;
    Ok(task)
}
