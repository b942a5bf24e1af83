//! EnviroAnalyzer Pro desktop shell.
//!
//! Starts the bundled R/Shiny application as a child process on a free
//! loopback port and shows it in a native webview window once it answers.
//! The child is stopped whenever the shell exits.

pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod interpreter;
pub mod port;
pub mod readiness;
pub mod session;
pub mod shell;
pub mod supervisor;

use std::path::Path;
use std::sync::Arc;
use tauri::webview::PageLoadEvent;
use tauri::{AppHandle, Manager, RunEvent};

use config::{HostPaths, LaunchConfig};
use session::Session;
use shell::tauri_host::{DesktopController, TauriHost};
use shell::view::ViewState;

pub fn run() {
    tauri::Builder::default()
        .plugin(
            tauri_plugin_log::Builder::new()
                .level(if cfg!(debug_assertions) {
                    log::LevelFilter::Debug
                } else {
                    log::LevelFilter::Info
                })
                .targets([
                    tauri_plugin_log::Target::new(tauri_plugin_log::TargetKind::Stdout),
                    tauri_plugin_log::Target::new(tauri_plugin_log::TargetKind::LogDir {
                        file_name: None,
                    }),
                ])
                .build(),
        )
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_opener::init())
        .manage(ViewState::default())
        .invoke_handler(tauri::generate_handler![
            bridge::get_app_version,
            bridge::window_minimize,
            bridge::window_maximize,
            bridge::window_close
        ])
        .setup(|app| {
            log::info!("EnviroAnalyzer desktop shell starting");
            let handle = app.handle().clone();
            let config = LaunchConfig::resolve(&host_paths(&handle));
            let session = Arc::new(Session::new(config));
            install_panic_hook(Arc::clone(&session));

            let host = TauriHost::new(handle, session.config());
            let controller = Arc::new(DesktopController::new(host, session));
            app.manage(Arc::clone(&controller));
            tauri::async_runtime::spawn(controller.run());
            Ok(())
        })
        .on_menu_event(|app, event| shell::menu::handle_menu_event(app, event.id().as_ref()))
        .on_page_load(|webview, payload| {
            if webview.label() != shell::MAIN_LABEL
                || !matches!(payload.event(), PageLoadEvent::Finished)
            {
                return;
            }
            if let Some(controller) = webview.app_handle().try_state::<Arc<DesktopController>>() {
                let controller = Arc::clone(controller.inner());
                tauri::async_runtime::spawn(async move {
                    controller.on_main_content_ready().await;
                });
            }
        })
        .build(tauri::generate_context!())
        .expect("error while building EnviroAnalyzer desktop shell")
        .run(|app, event| match event {
            RunEvent::ExitRequested { code: None, api, .. } => {
                if controller(app).is_some_and(|c| c.keeps_running_without_windows()) {
                    api.prevent_exit();
                } else {
                    shutdown(app);
                }
            }
            RunEvent::ExitRequested { .. } | RunEvent::Exit => shutdown(app),
            _ => {}
        });
}

fn controller(app: &AppHandle) -> Option<Arc<DesktopController>> {
    app.try_state::<Arc<DesktopController>>()
        .map(|state| Arc::clone(state.inner()))
}

fn shutdown(app: &AppHandle) {
    if let Some(controller) = controller(app) {
        controller.shutdown();
    }
}

fn host_paths(app: &AppHandle) -> HostPaths {
    HostPaths {
        resource_dir: app.path().resource_dir().ok(),
        exe_dir: std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf)),
        log_dir: app.path().app_log_dir().ok(),
    }
}

/// A panic anywhere in the shell must not leave R running.
fn install_panic_hook(session: Arc<Session>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!("Unexpected fault: {info}");
        session.stop();
        previous(info);
    }));
}
