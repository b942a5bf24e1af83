//! Window-level orchestration of a session.
//!
//! [`Controller`] drives `Launching -> Ready -> Running -> Closing` against a
//! [`ShellHost`], the capability that actually owns native windows and
//! dialogs. The Tauri implementation lives in [`tauri_host`].

pub mod menu;
pub mod tauri_host;
pub mod view;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tauri::Url;

use crate::error::LaunchError;
use crate::session::{Endpoint, Session};

pub const MAIN_LABEL: &str = "main";
pub const LOADING_LABEL: &str = "loading";

/// Native window operations the controller needs from the platform.
pub trait ShellHost: Send + Sync + 'static {
    fn show_loading(&self) -> Result<(), LaunchError>;
    fn close_loading(&self);
    /// Creates the main window hidden, already navigating to `url`.
    fn create_main_window(&self, url: &str) -> Result<(), LaunchError>;
    fn show_main_window(&self);
    /// Blocking error dialog; the application terminates once dismissed.
    fn show_fatal_error(&self, title: &str, message: &str);
    fn open_external(&self, url: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Launching,
    Ready,
    Running,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    OpenExternal,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Startup,
    Crash,
}

pub struct Controller<H: ShellHost> {
    host: H,
    session: Arc<Session>,
    phase: Mutex<Phase>,
    fatal_reported: AtomicBool,
}

impl<H: ShellHost> Controller<H> {
    pub fn new(host: H, session: Arc<Session>) -> Self {
        Self {
            host,
            session,
            phase: Mutex::new(Phase::Launching),
            fatal_reported: AtomicBool::new(false),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        match self.phase.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_phase(&self, next: Phase) {
        let mut phase = match self.phase.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *phase != next {
            log::debug!("Shell phase {:?} -> {next:?}", *phase);
            *phase = next;
        }
    }

    /// Launches the child and then watches it for the rest of the session.
    pub async fn run(self: Arc<Self>) {
        let exits = self.session.take_exit_events();
        if let Err(err) = self.launch().await {
            self.host.close_loading();
            self.fail(&err, Failure::Startup);
            return;
        }
        let Some(mut exits) = exits else {
            return;
        };
        while let Some(exit) = exits.recv().await {
            if exit.deliberate || self.phase() == Phase::Closing {
                continue;
            }
            self.fail(
                &LaunchError::UnexpectedChildExit { code: exit.code },
                Failure::Crash,
            );
            break;
        }
    }

    async fn launch(&self) -> Result<(), LaunchError> {
        if let Err(err) = self.host.show_loading() {
            log::warn!("Failed to show loading window: {err}");
        }
        let endpoint = self.session.launch().await?;
        if self.phase() == Phase::Closing {
            // Shutdown raced the launch; the child it missed is stopped here.
            self.session.stop();
            return Ok(());
        }
        self.set_phase(Phase::Ready);
        self.host.create_main_window(&endpoint.url())
    }

    /// The main window finished loading. Only the first load reveals it.
    pub async fn on_main_content_ready(&self) {
        if self.phase() != Phase::Ready {
            return;
        }
        self.set_phase(Phase::Running);
        self.host.show_main_window();
        tokio::time::sleep(self.session.config().loading_close_delay).await;
        self.host.close_loading();
    }

    /// Returns whether the main window may follow a navigation to `target`.
    pub fn navigate(&self, target: &Url) -> bool {
        match classify_navigation(target, self.session.endpoint()) {
            Navigation::Allow => true,
            Navigation::OpenExternal => {
                log::info!("Opening external link: {target}");
                self.host.open_external(target.as_str());
                false
            }
            Navigation::Block => {
                log::warn!("Blocked navigation to {target}");
                false
            }
        }
    }

    /// Windows may all be gone while launching or reporting a fatal error;
    /// the process has to stay alive through that.
    pub fn keeps_running_without_windows(&self) -> bool {
        self.phase() == Phase::Launching || self.fatal_reported.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.set_phase(Phase::Closing);
        if self.session.stop() {
            log::info!("Shiny server stopped");
        }
    }

    fn fail(&self, err: &LaunchError, failure: Failure) {
        if self.fatal_reported.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_phase(Phase::Closing);
        self.session.stop();
        let (title, message) = fatal_text(failure, err, &self.session.config().app_name);
        log::error!("{title}: {err}");
        self.host.show_fatal_error(title, &message);
    }
}

fn fatal_text(failure: Failure, err: &LaunchError, app_name: &str) -> (&'static str, String) {
    match failure {
        Failure::Startup => (
            "Startup Error",
            format!(
                "Failed to start {app_name}.\n\nError: {err}\n\nPlease make sure R is installed and try again."
            ),
        ),
        Failure::Crash => (
            "Application Error",
            "The R process has stopped unexpectedly. Please restart the application.".to_string(),
        ),
    }
}

fn is_loopback_host(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "localhost" | "[::1]" | "::1")
}

/// Same scheme and port as the child server on a loopback host.
fn is_app_origin(target: &Url, endpoint: Endpoint) -> bool {
    target.scheme() == "http"
        && target.port_or_known_default() == Some(endpoint.port)
        && target.host_str().is_some_and(is_loopback_host)
}

pub fn classify_navigation(target: &Url, endpoint: Option<Endpoint>) -> Navigation {
    match target.scheme() {
        "about" | "data" | "blob" | "javascript" => Navigation::Allow,
        "http" | "https" => match endpoint {
            Some(endpoint) if is_app_origin(target, endpoint) => Navigation::Allow,
            _ => Navigation::OpenExternal,
        },
        "mailto" | "tel" => Navigation::OpenExternal,
        _ => Navigation::Block,
    }
}
