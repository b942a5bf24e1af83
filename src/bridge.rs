//! The host operations reachable from the displayed Shiny content.
//!
//! Exposed as `window.desktopShell`; nothing else is bridged.

use tauri::{AppHandle, WebviewWindow};

pub fn platform() -> &'static str {
    std::env::consts::OS
}

/// Initialization script injected into the main window.
pub fn init_script() -> String {
    let platform = serde_json::to_string(platform()).unwrap_or_else(|_| "\"unknown\"".to_string());
    format!(
        r#"(function () {{
  if (window.desktopShell) return;
  const invoke = (cmd) => window.__TAURI_INTERNALS__.invoke(cmd);
  Object.defineProperty(window, "desktopShell", {{
    value: Object.freeze({{
      getAppVersion: () => invoke("get_app_version"),
      minimize: () => invoke("window_minimize"),
      maximize: () => invoke("window_maximize"),
      close: () => invoke("window_close"),
      platform: {platform},
    }}),
    writable: false,
    configurable: false,
  }});
}})();"#
    )
}

#[tauri::command]
pub fn get_app_version(app: AppHandle) -> String {
    app.package_info().version.to_string()
}

#[tauri::command]
pub fn window_minimize(window: WebviewWindow) -> Result<(), String> {
    window
        .minimize()
        .map_err(|err| format!("failed to minimize window: {err}"))
}

/// Toggles between maximized and restored.
#[tauri::command]
pub fn window_maximize(window: WebviewWindow) -> Result<(), String> {
    let maximized = window
        .is_maximized()
        .map_err(|err| format!("failed to read window state: {err}"))?;
    let result = if maximized {
        window.unmaximize()
    } else {
        window.maximize()
    };
    result.map_err(|err| format!("failed to maximize window: {err}"))
}

#[tauri::command]
pub fn window_close(window: WebviewWindow) -> Result<(), String> {
    window
        .close()
        .map_err(|err| format!("failed to close window: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_exposes_only_the_bridged_operations() {
        let script = init_script();
        for command in ["get_app_version", "window_minimize", "window_maximize", "window_close"] {
            assert!(script.contains(&format!("invoke(\"{command}\")")), "{command}");
        }
        assert_eq!(script.matches("invoke(\"").count(), 4);
        assert!(script.contains(&format!("platform: \"{}\"", platform())));
        assert!(script.contains("Object.freeze"));
    }
}
