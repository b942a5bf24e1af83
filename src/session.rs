//! One launch of the child server: configuration, resolved endpoint,
//! supervisor and diagnostics in a single context.

use std::net::IpAddr;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::mpsc;

use crate::config::LaunchConfig;
use crate::diagnostics::EventLog;
use crate::error::LaunchError;
use crate::interpreter;
use crate::port;
use crate::readiness::{self, ReadySignal};
use crate::supervisor::{ChildExit, SpawnPlan, Supervisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub host: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn url(&self) -> String {
        readiness::server_url(self.host, self.port)
    }
}

pub struct Session {
    config: LaunchConfig,
    endpoint: OnceLock<Endpoint>,
    supervisor: Supervisor,
    exits: Mutex<Option<mpsc::UnboundedReceiver<ChildExit>>>,
    events: Arc<EventLog>,
}

impl Session {
    pub fn new(config: LaunchConfig) -> Self {
        let events = Arc::new(EventLog::open(config.diagnostics_path.clone()));
        let (supervisor, exits) = Supervisor::new(Arc::clone(&events));
        Self {
            config,
            endpoint: OnceLock::new(),
            supervisor,
            exits: Mutex::new(Some(exits)),
            events,
        }
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.endpoint.get().copied()
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Crash notifications for after the launch succeeded. Can be taken once.
    pub fn take_exit_events(&self) -> Option<mpsc::UnboundedReceiver<ChildExit>> {
        match self.exits.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Locates R, picks a port, spawns the child and waits for the first
    /// readiness signal.
    pub async fn launch(&self) -> Result<Endpoint, LaunchError> {
        if self.endpoint.get().is_some() {
            return Err(LaunchError::AlreadyLaunched);
        }
        let config = &self.config;
        let interpreter =
            interpreter::locate(config.interpreter.as_deref(), &config.portable_roots);
        let port = port::allocate(config.host, config.port, config.base_port).await?;
        let endpoint = Endpoint {
            host: config.host,
            port,
        };
        if self.endpoint.set(endpoint).is_err() {
            return Err(LaunchError::AlreadyLaunched);
        }

        log::info!("Starting Shiny server...");
        log::info!("R Path: {}", interpreter.display());
        log::info!("App Directory: {}", config.app_dir.display());
        log::info!("Port: {port}");
        self.events.info(
            "runtime",
            format!(
                "Start requested: rscript={} app_dir={} port={port}",
                interpreter.display(),
                config.app_dir.display()
            ),
        );

        let plan = SpawnPlan::shiny(&interpreter, config, port);
        self.launch_plan(&plan, endpoint).await
    }

    async fn launch_plan(&self, plan: &SpawnPlan, endpoint: Endpoint) -> Result<Endpoint, LaunchError> {
        let (signal, outcome) = ReadySignal::new();
        if let Err(err) = self
            .supervisor
            .start(plan, &self.config.readiness.markers, signal.clone())
        {
            self.events.error("runtime", err.to_string());
            return Err(err);
        }

        let readiness = &self.config.readiness;
        let probe = tokio::spawn(readiness::probe_into(
            signal,
            endpoint.host,
            endpoint.port,
            readiness.interval,
            readiness.max_attempts,
        ));

        let result = match outcome.await {
            Ok(result) => result,
            Err(_) => Err(LaunchError::UnexpectedChildExit { code: None }),
        };
        probe.abort();

        match result {
            Ok(source) => {
                log::info!("Shiny server ready at {} ({})", endpoint.url(), source.as_str());
                self.events
                    .info("runtime", format!("Ready via {}", source.as_str()));
                Ok(endpoint)
            }
            Err(err) => {
                log::error!("Failed to start Shiny server: {err}");
                self.events.error("runtime", err.to_string());
                Err(err)
            }
        }
    }

    /// Deliberate shutdown of the child; safe to call any number of times.
    pub fn stop(&self) -> bool {
        self.supervisor.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortRequest;
    use std::net::Ipv4Addr;
    use std::path::PathBuf;

    #[test]
    fn endpoint_url_points_at_the_root() {
        let endpoint = Endpoint {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3838,
        };
        assert_eq!(endpoint.url(), "http://127.0.0.1:3838/");
    }

    #[test]
    fn exit_events_can_only_be_taken_once() {
        let session = Session::new(LaunchConfig::default());
        assert!(session.take_exit_events().is_some());
        assert!(session.take_exit_events().is_none());
        assert!(!session.stop());
    }

    #[tokio::test]
    async fn missing_interpreter_fails_the_launch() {
        let dir = tempfile::tempdir().unwrap();
        let config = LaunchConfig {
            interpreter: Some(dir.path().join("no-such-Rscript")),
            app_dir: dir.path().to_path_buf(),
            port: PortRequest::Fixed(3999),
            ..LaunchConfig::default()
        };
        let session = Session::new(config);

        let err = session.launch().await.unwrap_err();
        assert!(matches!(err, LaunchError::InterpreterNotFound { .. }));
        assert_eq!(session.endpoint().map(|e| e.port), Some(3999));

        // One child per session, even after a failed launch.
        assert!(matches!(
            session.launch().await,
            Err(LaunchError::AlreadyLaunched)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn marker_wins_over_slow_probe() {
        use std::time::{Duration, Instant};

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("launcher.sh");
        // Prints the marker but never opens the port.
        std::fs::write(
            &script,
            "echo \"Listening on http://127.0.0.1:$2\" >&2\nexec sleep 30\n",
        )
        .unwrap();

        let mut config = LaunchConfig {
            interpreter: Some(PathBuf::from("sh")),
            interpreter_flags: Vec::new(),
            launcher_script: script,
            app_dir: dir.path().to_path_buf(),
            base_port: 21_000,
            ..LaunchConfig::default()
        };
        config.readiness.interval = Duration::from_secs(2);
        let session = Session::new(config);

        let started = Instant::now();
        let endpoint = session.launch().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(endpoint.port >= 21_000);
        assert!(session.supervisor().is_running());

        assert!(session.stop());
        assert!(!session.stop());
    }
}
