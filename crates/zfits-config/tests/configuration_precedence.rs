//! Behavioural coverage for configuration layering.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ortho_config::OrthoConfig;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then};
use tempfile::TempDir;

use zfits_config::{
    Config, WriterOutputLevel, default_log_filter, default_log_format,
    default_readiness_delay_ms, default_shutdown_grace_ms, default_writer_binary,
    default_writer_output,
};

/// Scenarios share the process environment, so each harness holds this for
/// its whole lifetime.
static ENV_LOCK: Mutex<()> = Mutex::new(());

struct Harness {
    temp_dir: TempDir,
    cli_args: RefCell<Vec<OsString>>,
    file_lines: RefCell<Vec<String>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    loaded: RefCell<Option<Config>>,
    error: RefCell<Option<String>>,
    _env: MutexGuard<'static, ()>,
}

impl Harness {
    fn new() -> Self {
        let env = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        Self {
            temp_dir: TempDir::new().expect("create temporary directory"),
            cli_args: RefCell::new(vec![OsString::from("zfits-controller")]),
            file_lines: RefCell::new(Vec::new()),
            env_overrides: RefCell::new(Vec::new()),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
            _env: env,
        }
    }

    fn push_flag(&self, flag: &str, value: &str) {
        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from(flag));
        args.push(OsString::from(value));
    }

    fn push_file_line(&self, line: String) {
        self.file_lines.borrow_mut().push(line);
    }

    fn set_env(&self, key: &str, value: &str) {
        let previous = std::env::var_os(key);
        // SAFETY: `ENV_LOCK` serialises every scenario that reads or writes
        // the environment, and `Drop` restores the previous value.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn load(&self) {
        if self.loaded.borrow().is_some() || self.error.borrow().is_some() {
            return;
        }

        let mut args = self.cli_args.borrow().clone();
        let lines = self.file_lines.borrow();
        if !lines.is_empty() {
            let path = self.temp_dir.path().join("zfits.toml");
            fs::write(&path, lines.join("\n")).expect("write configuration file");
            args.insert(1, OsString::from("--config-path"));
            args.insert(2, path.into_os_string());
        }
        match Config::load_from_iter(args) {
            Ok(config) => *self.loaded.borrow_mut() = Some(config),
            Err(error) => *self.error.borrow_mut() = Some(error.to_string()),
        }
    }

    fn config(&self) -> Config {
        self.load();
        if let Some(error) = self.error.borrow().as_ref() {
            panic!("configuration failed to load: {error}");
        }
        match self.loaded.borrow().as_ref() {
            Some(config) => config.clone(),
            None => panic!("configuration was not loaded"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            // SAFETY: still under `ENV_LOCK`, which is released after this.
            match value {
                Some(previous) => unsafe { std::env::set_var(&key, previous) },
                None => unsafe { std::env::remove_var(&key) },
            }
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("no configuration overrides")]
fn given_no_overrides(harness: &Harness) {
    let _ = harness;
}

#[given("the shutdown grace period flag is set to {millis} milliseconds")]
fn given_grace_flag(harness: &Harness, millis: u64) {
    harness.push_flag("--shutdown-grace-ms", &millis.to_string());
}

#[given("the writer binary flag points at /opt/daq/bin/ZFitsWriter")]
fn given_binary_flag(harness: &Harness) {
    harness.push_flag("--writer-binary", "/opt/daq/bin/ZFitsWriter");
}

#[given("a configuration file sets the shutdown grace period to {millis} milliseconds")]
fn given_file_grace(harness: &Harness, millis: u64) {
    harness.push_file_line(format!("shutdown_grace_ms = {millis}"));
}

#[given("a configuration file silences writer output")]
fn given_file_silences_writer(harness: &Harness) {
    harness.push_file_line("writer_output = \"off\"".to_owned());
}

#[given("the environment sets the shutdown grace period to {millis} milliseconds")]
fn given_env_grace(harness: &Harness, millis: u64) {
    harness.set_env("ZFITS_SHUTDOWN_GRACE_MS", &millis.to_string());
}

#[given("the environment sets the readiness delay to {millis} milliseconds")]
fn given_env_readiness(harness: &Harness, millis: u64) {
    harness.set_env("ZFITS_READINESS_DELAY_MS", &millis.to_string());
}

#[then("loading the configuration applies the built-in defaults")]
fn then_defaults_applied(harness: &Harness) {
    let config = harness.config();
    assert_eq!(config.writer_binary(), &default_writer_binary());
    assert_eq!(config.readiness_delay_ms, default_readiness_delay_ms());
    assert_eq!(config.shutdown_grace_ms, default_shutdown_grace_ms());
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
    assert_eq!(config.writer_output(), default_writer_output());
}

#[then("the loaded shutdown grace period is {millis} milliseconds")]
fn then_grace(harness: &Harness, millis: u64) {
    assert_eq!(harness.config().shutdown_grace_ms, millis);
}

#[then("the loaded readiness delay is {millis} milliseconds")]
fn then_readiness(harness: &Harness, millis: u64) {
    assert_eq!(harness.config().readiness_delay_ms, millis);
}

#[then("the loaded writer binary is /opt/daq/bin/ZFitsWriter")]
fn then_binary_overridden(harness: &Harness) {
    assert_eq!(
        harness.config().writer_binary().as_str(),
        "/opt/daq/bin/ZFitsWriter"
    );
}

#[then("writer output is silenced")]
fn then_writer_silenced(harness: &Harness) {
    assert_eq!(harness.config().writer_output(), WriterOutputLevel::Off);
}

#[scenario(path = "tests/features/configuration_precedence.feature", index = 0)]
fn defaults_apply(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(path = "tests/features/configuration_precedence.feature", index = 1)]
fn cli_flags_override(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(path = "tests/features/configuration_precedence.feature", index = 2)]
fn environment_overrides_defaults(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(path = "tests/features/configuration_precedence.feature", index = 3)]
fn environment_overrides_file(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(path = "tests/features/configuration_precedence.feature", index = 4)]
fn cli_overrides_environment_and_file(#[from(harness)] harness: Harness) {
    let _ = harness;
}
