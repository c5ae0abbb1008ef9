//! Integration tests for emberfuse-config

use emberfuse_config::{
    CONFIG_KEY, EnvLoader, LOG_KEY, LoadConfiguration, LoadEnvironmentVariables, LoadLogging,
    LoadServices, config_repository, default_bootstrappers,
};
use emberfuse_core::logging::{LogConfig, LogFormat, LogLevel, LogOutput};
use emberfuse_core::{Application, Bootstrapper, Error, HttpRequest, Kernel, ServiceProvider, Value};
use serde_json::json;
use std::env;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn app_with(files: &[(&str, &str)]) -> (TempDir, Application) {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    let app = Application::new(dir.path());
    (dir, app)
}

#[test]
fn test_env_loader_reads_prefixed_vars() {
    unsafe {
        env::set_var("EMBERFUSE_IT_DATABASE_URL", "postgres://localhost");
    }

    let loader = EnvLoader::with_prefix("EMBERFUSE_IT");
    assert_eq!(loader.load_var("database_url").unwrap(), "postgres://localhost");
    assert_eq!(
        loader.load().get("database_url"),
        Some(&json!("postgres://localhost"))
    );

    unsafe {
        env::remove_var("EMBERFUSE_IT_DATABASE_URL");
    }
}

#[test]
fn test_load_environment_variables_from_base_path() {
    let (_dir, app) = app_with(&[(
        ".env",
        "EMBERFUSE_IT_FOO=bar\nEMBERFUSE_IT_STAGE=staging\n",
    )]);

    LoadEnvironmentVariables::new()
        .env_var("EMBERFUSE_IT_STAGE")
        .bootstrap(&app)
        .unwrap();

    assert_eq!(env::var("EMBERFUSE_IT_FOO").unwrap(), "bar");
    assert_eq!(app.environment(), "staging");
}

#[test]
fn test_existing_variables_are_not_overridden() {
    unsafe {
        env::set_var("EMBERFUSE_IT_KEEP", "original");
    }
    let (_dir, app) = app_with(&[("custom.env", "EMBERFUSE_IT_KEEP=replaced\n")]);

    LoadEnvironmentVariables::new()
        .file("custom.env")
        .env_var("EMBERFUSE_IT_UNSET_STAGE")
        .bootstrap(&app)
        .unwrap();

    assert_eq!(env::var("EMBERFUSE_IT_KEEP").unwrap(), "original");
    assert_eq!(app.environment(), "production");
}

#[test]
fn test_load_configuration_from_directory() {
    let (_dir, app) = app_with(&[
        ("config/foo.json", r#"{ "bar": "baz" }"#),
        ("config/app.toml", "name = \"emberfuse\"\ndebug = true\n"),
        ("config/notes.txt", "ignored"),
    ]);

    LoadConfiguration.bootstrap(&app).unwrap();

    assert!(app.container().has(CONFIG_KEY));
    let config = config_repository(app.container()).unwrap();
    assert_eq!(config.keys(), vec!["app", "foo"]);
    assert_eq!(config.value("foo"), Some(json!({ "bar": "baz" })));
    assert_eq!(config.get::<String>("app.name").unwrap(), "emberfuse");
    assert!(config.get::<bool>("app.debug").unwrap());
}

#[test]
fn test_load_configuration_without_directory() {
    let (_dir, app) = app_with(&[]);
    LoadConfiguration.bootstrap(&app).unwrap();

    let config = config_repository(app.container()).unwrap();
    assert!(config.is_empty());
}

#[test]
fn test_invalid_configuration_fails_bootstrap() {
    let (_dir, app) = app_with(&[("config/broken.json", "{ nope")]);

    assert!(matches!(
        LoadConfiguration.bootstrap(&app),
        Err(Error::Bootstrap(_))
    ));
}

#[derive(Default)]
struct GreetingService {
    booted: AtomicUsize,
}

impl ServiceProvider for GreetingService {
    fn register(&self, app: &Application) -> Result<(), Error> {
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
fn test_load_services_from_configuration() {
    let (_dir, app) = app_with(&[("config/services.json", r#"["services.greeting"]"#)]);
    let service = Arc::new(GreetingService::default());
    let provider: Arc<dyn ServiceProvider> = service.clone();
    app.container()
        .bind_value("services.greeting", Value::new(provider));

    LoadConfiguration.bootstrap(&app).unwrap();
    LoadServices.bootstrap(&app).unwrap();

    assert_eq!(app.service_count(), 1);
    assert_eq!(
        app.container().make_as::<String>("greeting").unwrap().as_str(),
        "hello"
    );

    app.boot().unwrap();
    assert_eq!(service.booted.load(Ordering::SeqCst), 1);
}

#[test]
fn test_load_services_requires_configuration() {
    let (_dir, app) = app_with(&[]);
    assert!(LoadServices.bootstrap(&app).is_err());
}

#[test]
fn test_malformed_services_fail() {
    for services in [r#""services.greeting""#, "[1, 2]", r#"{ "greeting": true }"#] {
        let (_dir, app) = app_with(&[("config/services.json", services)]);
        LoadConfiguration.bootstrap(&app).unwrap();

        assert!(
            matches!(LoadServices.bootstrap(&app), Err(Error::Bootstrap(_))),
            "services = {services}"
        );
        assert_eq!(app.service_count(), 0);
    }
}

#[test]
fn test_null_services_register_nothing() {
    let (_dir, app) = app_with(&[("config/services.json", "null")]);
    LoadConfiguration.bootstrap(&app).unwrap();

    LoadServices.bootstrap(&app).unwrap();
    assert_eq!(app.service_count(), 0);
}

#[test]
fn test_unknown_service_fails() {
    let (_dir, app) = app_with(&[("config/services.json", r#"["services.missing"]"#)]);
    LoadConfiguration.bootstrap(&app).unwrap();

    assert!(matches!(
        LoadServices.bootstrap(&app),
        Err(Error::BindingResolution { .. })
    ));
}

#[test]
fn test_load_logging_writes_under_logs_path() {
    let (dir, app) = app_with(&[(
        "config/logging.toml",
        "level = \"debug\"\nformat = \"compact\"\nfile = \"emberfuse.log\"\n",
    )]);
    LoadConfiguration.bootstrap(&app).unwrap();
    LoadLogging.bootstrap(&app).unwrap();

    assert!(dir.path().join("logs").is_dir());
    let log = app.container().make_as::<LogConfig>(LOG_KEY).unwrap();
    assert_eq!(log.level, LogLevel::Debug);
    assert_eq!(log.format, LogFormat::Compact);
    let expected = dir.path().join("logs").join("emberfuse.log");
    assert_eq!(log.output, LogOutput::File(expected.to_string_lossy().into_owned()));

    // A second run keeps whichever subscriber is installed.
    LoadLogging.bootstrap(&app).unwrap();
}

#[test]
fn test_load_logging_without_configuration() {
    let (dir, app) = app_with(&[]);
    LoadLogging.bootstrap(&app).unwrap();

    let log = app.container().make_as::<LogConfig>(LOG_KEY).unwrap();
    assert_eq!(log.level, LogLevel::Info);
    let expected = dir.path().join("logs").join("app.log");
    assert_eq!(log.output, LogOutput::File(expected.to_string_lossy().into_owned()));
}

#[test]
fn test_unknown_log_level_fails() {
    let (_dir, app) = app_with(&[("config/logging.json", r#"{ "level": "loud" }"#)]);
    LoadConfiguration.bootstrap(&app).unwrap();

    assert!(matches!(LoadLogging.bootstrap(&app), Err(Error::Bootstrap(_))));
    assert!(!app.container().has(LOG_KEY));
}

#[test]
fn test_kernel_with_default_bootstrappers() {
    let (_dir, app) = app_with(&[
        (".env", "EMBERFUSE_IT_KERNEL=1\n"),
        ("config/app.json", r#"{ "name": "demo" }"#),
    ]);
    let kernel = Kernel::new(app).with_bootstrappers(default_bootstrappers());

    let response = kernel.handle(HttpRequest::new("GET", "/"));
    assert_eq!(response.status, 404);

    assert_eq!(env::var("EMBERFUSE_IT_KERNEL").unwrap(), "1");
    let config = config_repository(kernel.app().container()).unwrap();
    assert_eq!(config.get::<String>("app.name").unwrap(), "demo");
    assert_eq!(kernel.app().service_count(), 0);
    assert!(kernel.app().is_booted());
    assert!(kernel.app().container().has(LOG_KEY));
    assert!(kernel.app().path("logs").is_dir());
}
