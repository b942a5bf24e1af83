//! [`ShellHost`] backed by Tauri windows, dialogs and the system opener.

use std::sync::Arc;
use tauri::{AppHandle, Manager, Url, WebviewUrl, WebviewWindowBuilder};
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};
use tauri_plugin_opener::OpenerExt;

use super::{menu, Controller, ShellHost, LOADING_LABEL, MAIN_LABEL};
use crate::bridge;
use crate::config::{LaunchConfig, WindowConfig};
use crate::error::LaunchError;

pub type DesktopController = Controller<TauriHost>;

pub struct TauriHost {
    app: AppHandle,
    app_name: String,
    window: WindowConfig,
}

impl TauriHost {
    pub fn new(app: AppHandle, config: &LaunchConfig) -> Self {
        Self {
            app,
            app_name: config.app_name.clone(),
            window: config.window,
        }
    }
}

impl ShellHost for TauriHost {
    fn show_loading(&self) -> Result<(), LaunchError> {
        WebviewWindowBuilder::new(&self.app, LOADING_LABEL, WebviewUrl::App("loading.html".into()))
            .title(&self.app_name)
            .inner_size(400.0, 300.0)
            .decorations(false)
            .always_on_top(true)
            .resizable(false)
            .skip_taskbar(true)
            .center()
            .build()
            .map_err(LaunchError::window)?;
        Ok(())
    }

    fn close_loading(&self) {
        if let Some(window) = self.app.get_webview_window(LOADING_LABEL) {
            if let Err(err) = window.close() {
                log::warn!("Failed to close loading window: {err}");
            }
        }
    }

    fn create_main_window(&self, url: &str) -> Result<(), LaunchError> {
        let target: Url = url.parse().map_err(LaunchError::window)?;
        let menu = menu::build(&self.app, &self.app_name).map_err(LaunchError::window)?;
        let app = self.app.clone();

        WebviewWindowBuilder::new(&self.app, MAIN_LABEL, WebviewUrl::External(target))
            .title(&self.app_name)
            .inner_size(self.window.width, self.window.height)
            .min_inner_size(self.window.min_width, self.window.min_height)
            .visible(false)
            .menu(menu)
            .initialization_script(&bridge::init_script())
            .on_navigation(move |url| match app.try_state::<Arc<DesktopController>>() {
                Some(controller) => controller.navigate(url),
                None => false,
            })
            .build()
            .map_err(LaunchError::window)?;
        Ok(())
    }

    fn show_main_window(&self) {
        let Some(window) = self.app.get_webview_window(MAIN_LABEL) else {
            return;
        };
        if let Err(err) = window.show() {
            log::warn!("Failed to show main window: {err}");
        }
        let _ = window.set_focus();
    }

    fn show_fatal_error(&self, title: &str, message: &str) {
        let app = self.app.clone();
        self.app
            .dialog()
            .message(message)
            .title(title)
            .kind(MessageDialogKind::Error)
            .show(move |_| app.exit(1));
    }

    fn open_external(&self, url: &str) {
        if let Err(err) = self.app.opener().open_url(url, None::<&str>) {
            log::warn!("Failed to open {url} externally: {err}");
        }
    }
}
