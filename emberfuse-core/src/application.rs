// Application: base paths, container, router and service lifecycle

use crate::container::Container;
use crate::logging::{debug, info};
use crate::reflection::Value;
use crate::routing::Router;
use crate::Error;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Directories registered as `path.<name>` instances.
pub const APPLICATION_DIRECTORIES: [&str; 6] =
    ["app", "database", "public", "logs", "views", "config"];

/// Environment assumed when nothing set `env`.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// A one-time startup step run by the kernel before the first request.
pub trait Bootstrapper: Send + Sync {
    fn bootstrap(&self, app: &Application) -> Result<(), Error>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A unit of application wiring: registers bindings, then boots once the
/// whole application is registered.
pub trait ServiceProvider: Send + Sync {
    fn register(&self, app: &Application) -> Result<(), Error>;

    fn boot(&self, _app: &Application) -> Result<(), Error> {
        Ok(())
    }
}

/// The main application struct
pub struct Application {
    base_path: PathBuf,
    container: Container,
    router: Router,
    services: RwLock<Vec<Arc<dyn ServiceProvider>>>,
    booted: AtomicBool,
    bootstrapped: AtomicBool,
    boot_lock: Mutex<()>,
    bootstrap_lock: Mutex<()>,
}

impl Application {
    /// Create an application rooted at `base_path` with a fresh container.
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self::with_container(base_path, Container::new())
    }

    pub fn with_container(base_path: impl AsRef<Path>, container: Container) -> Self {
        let app = Self {
            base_path: trim_base_path(base_path.as_ref()),
            router: Router::new(container.clone()),
            container,
            services: RwLock::new(Vec::new()),
            booted: AtomicBool::new(false),
            bootstrapped: AtomicBool::new(false),
            boot_lock: Mutex::new(()),
            bootstrap_lock: Mutex::new(()),
        };
        app.bind_paths_in_container();
        app
    }

    fn bind_paths_in_container(&self) {
        self.container
            .instance("path.base", Value::new(self.base_path.clone()));
        for dir in APPLICATION_DIRECTORIES {
            self.container
                .instance(&format!("path.{dir}"), Value::new(self.path(dir)));
        }
        debug!(base_path = %self.base_path.display(), "Application paths registered");
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// `sub` resolved against the base path.
    pub fn path(&self, sub: &str) -> PathBuf {
        if sub.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(sub)
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Current environment name, from the `env` instance.
    pub fn environment(&self) -> String {
        self.container
            .make_as::<String>("env")
            .map(|env| env.as_ref().clone())
            .unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string())
    }

    /// Whether the environment matches any of `patterns`; `*` is a wildcard.
    pub fn environment_is(&self, patterns: &[&str]) -> bool {
        let env = self.environment();
        patterns.iter().any(|pattern| {
            let expr = format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"));
            Regex::new(&expr).is_ok_and(|re| re.is_match(&env))
        })
    }

    /// Register a service provider. Providers added after boot are booted
    /// immediately.
    pub fn register_service(&self, service: Arc<dyn ServiceProvider>) -> Result<(), Error> {
        service.register(self)?;
        if self.is_booted() {
            service.boot(self)?;
        }
        self.services.write().push(service);
        Ok(())
    }

    pub fn service_count(&self) -> usize {
        self.services.read().len()
    }

    /// Boot every registered service once.
    pub fn boot(&self) -> Result<(), Error> {
        if self.is_booted() {
            return Ok(());
        }
        let _guard = self.boot_lock.lock();
        if self.is_booted() {
            return Ok(());
        }

        let services: Vec<Arc<dyn ServiceProvider>> = self.services.read().clone();
        for service in &services {
            service.boot(self)?;
        }

        self.booted.store(true, Ordering::SeqCst);
        info!(service_count = services.len(), "Application booted");
        Ok(())
    }

    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::SeqCst)
    }

    /// Run `bootstrappers` in order and mark the application bootstrapped
    /// once all of them succeeded.
    pub fn bootstrap_with(&self, bootstrappers: &[Arc<dyn Bootstrapper>]) -> Result<(), Error> {
        let _guard = self.bootstrap_lock.lock();
        self.run_bootstrappers(bootstrappers)
    }

    /// Like [`bootstrap_with`](Self::bootstrap_with), but a no-op when the
    /// application is already bootstrapped. Concurrent callers wait for the
    /// first one to finish.
    pub fn bootstrap_once(&self, bootstrappers: &[Arc<dyn Bootstrapper>]) -> Result<(), Error> {
        if self.has_been_bootstrapped() {
            return Ok(());
        }
        let _guard = self.bootstrap_lock.lock();
        if self.has_been_bootstrapped() {
            return Ok(());
        }
        self.run_bootstrappers(bootstrappers)
    }

    fn run_bootstrappers(&self, bootstrappers: &[Arc<dyn Bootstrapper>]) -> Result<(), Error> {
        for bootstrapper in bootstrappers {
            debug!(bootstrapper = bootstrapper.name(), "Bootstrapping");
            bootstrapper.bootstrap(self)?;
        }
        self.bootstrapped.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn has_been_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("base_path", &self.base_path)
            .field("booted", &self.is_booted())
            .field("services", &self.service_count())
            .finish()
    }
}

fn trim_base_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let trimmed = raw.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        PathBuf::from(if raw.is_empty() { "." } else { "/" })
    } else {
        PathBuf::from(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingService {
        registered: AtomicUsize,
        booted: AtomicUsize,
    }

    impl ServiceProvider for CountingService {
        fn register(&self, app: &Application) -> Result<(), Error> {
            self.registered.fetch_add(1, Ordering::SeqCst);
            app.container()
                .bind_value("greeting", Value::new("hello".to_string()));
            Ok(())
        }

        fn boot(&self, _app: &Application) -> Result<(), Error> {
            self.booted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_paths_registered() {
        let app = Application::new("/srv/site/");

        assert_eq!(app.base_path(), Path::new("/srv/site"));
        let base = app.container().make_as::<PathBuf>("path.base").unwrap();
        assert_eq!(base.as_path(), Path::new("/srv/site"));
        let config = app.container().make_as::<PathBuf>("path.config").unwrap();
        assert_eq!(config.as_path(), Path::new("/srv/site/config"));
        let database = app.container().make_as::<PathBuf>("path.database").unwrap();
        assert_eq!(database.as_path(), Path::new("/srv/site/database"));
        for dir in ["app", "public", "logs", "views"] {
            assert!(app.container().has(&format!("path.{dir}")), "path.{dir}");
        }
    }

    #[test]
    fn test_environment() {
        let app = Application::new("/srv/site");
        assert_eq!(app.environment(), "production");

        app.container().instance("env", Value::new("local-dev".to_string()));
        assert_eq!(app.environment(), "local-dev");
        assert!(app.environment_is(&["staging", "local*"]));
        assert!(!app.environment_is(&["production"]));
    }

    #[test]
    fn test_services_register_and_boot_once() {
        let app = Application::new(".");
        let service = Arc::new(CountingService::default());
        app.register_service(service.clone()).unwrap();

        assert_eq!(service.registered.load(Ordering::SeqCst), 1);
        assert!(app.container().has("greeting"));
        assert!(!app.is_booted());

        app.boot().unwrap();
        app.boot().unwrap();
        assert!(app.is_booted());
        assert_eq!(service.booted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_service_boots_immediately() {
        let app = Application::new(".");
        app.boot().unwrap();

        let service = Arc::new(CountingService::default());
        app.register_service(service.clone()).unwrap();
        assert_eq!(service.booted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_router_shares_container() {
        let app = Application::new(".");
        app.container().bind_value("shared", Value::new(1u8));
        assert!(app.router().container().has("shared"));
    }
}
