//! rehost: a hot-reloadable plugin host.
//!
//! Modules dropped into the module directory are loaded as dynamic libraries, their capabilities
//! are published in an atomically swapped registry, and console lines are dispatched to every
//! capability whose prefix matches. The directory is watched and reconciled continuously, so
//! modules can be added, replaced and removed while the host runs.

pub mod common;
pub mod config;
pub mod modules;
pub mod registry;
pub mod router;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use common::{HostError, HostResult};
pub use config::{FaultPolicy, HostArgs, HostConfig, ShutdownPolicy};
use modules::{DirectoryWatcher, DylibLoader, ModuleLoader, ModuleManager, WatchOptions};
pub use registry::{CapabilityRegistry, RegistryState};
pub use router::ConsoleExit;

/// The plugin host: a reconciliation loop driven by the directory watcher and a console dispatch
/// loop, sharing one registry and one cancellation token.
pub struct Host {
    config: HostConfig,
    loader: Arc<dyn ModuleLoader>,
    modules: Arc<ModuleManager>,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl Host {
    /// A host that loads modules as dynamic libraries.
    pub fn new(config: HostConfig) -> Self {
        let loader = Arc::new(DylibLoader::new(&config.shadow_dir));
        Self::with_loader(config, loader)
    }

    pub fn with_loader(config: HostConfig, loader: Arc<dyn ModuleLoader>) -> Self {
        let registry = Arc::new(CapabilityRegistry::new());
        let modules = ModuleManager::new(&config.module_dir, Arc::clone(&loader), registry)
            .with_extension(config.module_extension.clone());

        Self {
            config,
            loader,
            modules: Arc::new(modules),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        self.modules.registry()
    }

    pub fn modules(&self) -> &Arc<ModuleManager> {
        &self.modules
    }

    /// Token that stops both loops when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the host until the shutdown policy says to stop, then unloads every module.
    ///
    /// A host runs once; a second call fails with [`HostError::AlreadyStarted`].
    pub async fn run<R, W>(&self, input: R, output: W) -> HostResult<ConsoleExit>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(HostError::AlreadyStarted);
        }

        let module_dir = &self.config.module_dir;
        tokio::fs::create_dir_all(module_dir)
            .await
            .map_err(|source| HostError::ModuleDir {
                path: module_dir.clone(),
                source,
            })?;

        info!("Starting host with module directory {:?}", module_dir);
        self.modules.resync().await;

        let reconciling = async {
            self.watch_loop().await;
            self.settle("module watcher").await;
        };

        let dispatching = async {
            let exit = router::run_console(
                Arc::clone(self.registry()),
                input,
                output,
                &self.cancel,
                self.config.fault_policy,
            )
            .await;
            match &exit {
                Ok(_) => self.settle("console").await,
                Err(e) => {
                    warn!("Console loop failed: {}", e);
                    self.cancel.cancel();
                }
            }
            exit
        };

        let ((), exit) = tokio::join!(reconciling, dispatching);

        self.modules.shutdown().await;
        self.loader.shutdown();
        info!("Host stopped");
        exit
    }

    async fn watch_loop(&self) {
        let options = WatchOptions {
            extension: self.config.module_extension.clone(),
            poll_interval: self.config.poll_interval,
            debounce: self.config.debounce,
        };
        let mut watcher =
            DirectoryWatcher::watch(&self.config.module_dir, options, self.cancel.clone());

        while let Some(event) = watcher.next().await {
            debug!("Rescanning modules after {:?}", event.reason);
            self.modules.resync().await;
        }
    }

    /// Called when one loop has finished on its own.
    async fn settle(&self, activity: &str) {
        if self.cancel.is_cancelled() {
            return;
        }
        match self.config.shutdown_policy {
            ShutdownPolicy::FirstToFinish => {
                info!("{} finished; shutting down", activity);
                self.cancel.cancel();
            }
            ShutdownPolicy::OnCancel => {
                info!("{} finished; running until cancelled", activity);
                self.cancel.cancelled().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::modules::testing::ScriptedLoader;

    fn config(dir: &Path, policy: ShutdownPolicy) -> HostConfig {
        HostConfig {
            module_extension: "so".to_string(),
            poll_interval: Duration::from_millis(50),
            debounce: Duration::from_millis(10),
            shutdown_policy: policy,
            ..HostConfig::for_dir(dir)
        }
    }

    async fn console(host: &Host, input: &str) -> String {
        let mut output = Vec::new();
        router::run_console(
            Arc::clone(host.registry()),
            input.as_bytes(),
            &mut output,
            &host.cancellation(),
            FaultPolicy::Isolate,
        )
        .await
        .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[tokio::test]
    async fn test_quit_stops_host_and_second_start_fails() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("modules");
        let host = Host::with_loader(config(&dir, ShutdownPolicy::OnCancel), ScriptedLoader::new());

        let mut output = Vec::new();
        let exit = tokio::time::timeout(
            Duration::from_secs(10),
            host.run("quit\n".as_bytes(), &mut output),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(exit, ConsoleExit::Quit);
        assert!(dir.is_dir());

        let again = host.run("quit\n".as_bytes(), &mut output).await;
        assert!(matches!(again, Err(HostError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_first_to_finish_ends_when_input_closes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("echo.so"), "echo").unwrap();
        let host = Host::with_loader(
            config(dir.path(), ShutdownPolicy::FirstToFinish),
            ScriptedLoader::new(),
        );

        let mut output = Vec::new();
        let exit = tokio::time::timeout(
            Duration::from_secs(10),
            host.run("echo hi\n".as_bytes(), &mut output),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(exit, ConsoleExit::EndOfInput);
        assert_eq!(String::from_utf8(output).unwrap(), "hi\n");
        assert!(host.registry().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_on_cancel_keeps_running_after_input_closes() {
        let dir = tempfile::tempdir().unwrap();
        let host = Host::with_loader(
            config(dir.path(), ShutdownPolicy::OnCancel),
            ScriptedLoader::new(),
        );
        let cancel = host.cancellation();

        let mut output = Vec::new();
        let run = host.run("".as_bytes(), &mut output);
        tokio::pin!(run);

        let early = tokio::time::timeout(Duration::from_millis(200), &mut run).await;
        assert!(early.is_err(), "host stopped without cancellation");

        cancel.cancel();
        let exit = tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, ConsoleExit::EndOfInput);
    }

    #[tokio::test]
    async fn test_end_to_end_module_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let host = Host::with_loader(
            config(dir.path(), ShutdownPolicy::OnCancel),
            ScriptedLoader::new(),
        );

        host.modules().resync().await;
        assert!(host.registry().snapshot().is_empty());

        let module = dir.path().join("echo.so");
        fs::write(&module, "echo").unwrap();
        host.modules().resync().await;
        assert_eq!(host.registry().snapshot().prefixes(), ["echo"]);

        assert_eq!(console(&host, "echo hi\n").await, "hi\n");
        assert_eq!(
            console(&host, "echo\n").await,
            "echo: argument fault: echo expects text to repeat\n"
        );

        fs::remove_file(&module).unwrap();
        host.modules().resync().await;
        assert_eq!(
            console(&host, "echo hi\n").await,
            "unrecognized command: echo hi\n"
        );
    }

    #[tokio::test]
    async fn test_watcher_picks_up_modules_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(Host::with_loader(
            config(dir.path(), ShutdownPolicy::OnCancel),
            ScriptedLoader::new(),
        ));
        let cancel = host.cancellation();

        let running = {
            let host = Arc::clone(&host);
            tokio::spawn(async move {
                // Input that never ends: only cancellation stops the host.
                let (_writer, reader) = tokio::io::duplex(64);
                host.run(tokio::io::BufReader::new(reader), tokio::io::sink())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(dir.path().join("alpha.so"), "alpha").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while host.registry().snapshot().is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "module never loaded");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(host.registry().snapshot().prefixes(), ["alpha"]);

        cancel.cancel();
        let exit = running.await.unwrap().unwrap();
        assert_eq!(exit, ConsoleExit::Cancelled);
    }
}
