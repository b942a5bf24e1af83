//! Application menu for the main window and its actions.

use tauri::menu::{Menu, MenuItem, PredefinedMenuItem, Submenu};
use tauri::{AppHandle, Manager, Runtime, WebviewWindow};
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};

use super::view::ViewState;
use super::MAIN_LABEL;

pub const RELOAD: &str = "view.reload";
pub const ZOOM_IN: &str = "view.zoom_in";
pub const ZOOM_OUT: &str = "view.zoom_out";
pub const ZOOM_RESET: &str = "view.zoom_reset";
pub const FULLSCREEN: &str = "view.fullscreen";
pub const DEVTOOLS: &str = "view.devtools";
pub const ABOUT: &str = "help.about";

pub fn build<R: Runtime>(app: &AppHandle<R>, app_name: &str) -> tauri::Result<Menu<R>> {
    let file = Submenu::with_items(
        app,
        "File",
        true,
        &[&PredefinedMenuItem::quit(app, None)?],
    )?;
    let view = Submenu::with_items(
        app,
        "View",
        true,
        &[
            &MenuItem::with_id(app, RELOAD, "Reload", true, Some("CmdOrCtrl+R"))?,
            &MenuItem::with_id(app, FULLSCREEN, "Toggle Full Screen", true, Some("F11"))?,
            &PredefinedMenuItem::separator(app)?,
            &MenuItem::with_id(app, ZOOM_IN, "Zoom In", true, Some("CmdOrCtrl+="))?,
            &MenuItem::with_id(app, ZOOM_OUT, "Zoom Out", true, Some("CmdOrCtrl+-"))?,
            &MenuItem::with_id(app, ZOOM_RESET, "Reset Zoom", true, Some("CmdOrCtrl+0"))?,
            &PredefinedMenuItem::separator(app)?,
            &MenuItem::with_id(app, DEVTOOLS, "Developer Tools", true, Some("F12"))?,
        ],
    )?;
    let help = Submenu::with_items(
        app,
        "Help",
        true,
        &[&MenuItem::with_id(
            app,
            ABOUT,
            format!("About {app_name}"),
            true,
            None::<&str>,
        )?],
    )?;
    Menu::with_items(app, &[&file, &view, &help])
}

pub fn handle_menu_event<R: Runtime>(app: &AppHandle<R>, id: &str) {
    if id == ABOUT {
        show_about(app);
        return;
    }
    let Some(window) = app.get_webview_window(MAIN_LABEL) else {
        return;
    };
    let result = match id {
        RELOAD => window.eval("window.location.reload()"),
        ZOOM_IN | ZOOM_OUT | ZOOM_RESET => apply_zoom(app, &window, id),
        FULLSCREEN => window
            .is_fullscreen()
            .and_then(|fullscreen| window.set_fullscreen(!fullscreen)),
        DEVTOOLS => {
            if window.is_devtools_open() {
                window.close_devtools();
            } else {
                window.open_devtools();
            }
            Ok(())
        }
        _ => Ok(()),
    };
    if let Err(err) = result {
        log::warn!("Menu action {id} failed: {err}");
    }
}

fn apply_zoom<R: Runtime>(app: &AppHandle<R>, window: &WebviewWindow<R>, id: &str) -> tauri::Result<()> {
    let state = app.state::<ViewState>();
    let factor = {
        let mut zoom = match state.zoom.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match id {
            ZOOM_IN => zoom.zoom_in(),
            ZOOM_OUT => zoom.zoom_out(),
            _ => zoom.reset(),
        }
    };
    window.set_zoom(factor)
}

fn show_about<R: Runtime>(app: &AppHandle<R>) {
    let info = app.package_info();
    app.dialog()
        .message(format!(
            "{} v{}\n\nEnvironmental Quality Assessment Application\nUsing Vietnamese QCVN Standards\n\n© 2024-2026 Environmental Engineering Team",
            info.name, info.version
        ))
        .title(format!("About {}", info.name))
        .kind(MessageDialogKind::Info)
        .show(|_| {});
}
