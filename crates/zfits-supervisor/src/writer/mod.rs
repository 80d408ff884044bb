//! Configuration set of the ZFits writer.
//!
//! [`WriterConfig`] holds every parameter the writer recognises, accepts flat
//! name/value updates from the lifecycle layer, and renders itself into the
//! writer's command line. Unknown update keys are ignored rather than
//! rejected so an upstream controller may send a superset of options shared
//! with other devices.

mod field;
mod scheme;
mod value;

use std::collections::BTreeMap;
use std::str::FromStr;

use camino::Utf8PathBuf;
use strum::IntoEnumIterator;
use tracing::{debug, warn};

use crate::error::ConfigError;

pub use field::{FieldKind, WriterField};
pub use scheme::CompressionScheme;
pub use value::ConfigValue;

/// Log target for configuration updates.
const CONFIG_TARGET: &str = "zfits_supervisor::writer";

/// Default input stream address.
pub const DEFAULT_INPUT: &str = "tcp://localhost:13581";

const DEFAULT_MAX_EVTS_PER_FILE: u64 = 10_000;
const DEFAULT_NUM_COMP_THREADS: u64 = 5;
const DEFAULT_MAX_COMP_MEM: u64 = 5_000;
const DEFAULT_MAX_FILE_SIZE: u64 = 5_000;

/// Flat option map as sent by an upstream controller.
pub type WriterOptions = BTreeMap<String, ConfigValue>;

/// Parses a JSON object of scalar options.
///
/// # Errors
///
/// Returns [`ConfigError::MalformedOptions`] when `json` is not an object
/// whose values are all booleans, integers or strings.
pub fn parse_options(json: &str) -> Result<WriterOptions, ConfigError> {
    serde_json::from_str(json).map_err(|error| ConfigError::MalformedOptions {
        message: error.to_string(),
    })
}

/// Parameters passed to one writer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    output_dir: Option<Utf8PathBuf>,
    input: Option<String>,
    id: Option<i64>,
    max_evts_per_file: Option<u64>,
    evts_per_tile: Option<u64>,
    num_comp_threads: Option<u64>,
    max_comp_mem: Option<u64>,
    max_file_size: Option<u64>,
    comp_scheme: Option<CompressionScheme>,
    comp_block_size: Option<u64>,
    head_flush_inter: Option<u64>,
    loop_forever: bool,
    suffix: String,
    run_number_in_suffix: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            input: Some(DEFAULT_INPUT.to_owned()),
            max_evts_per_file: Some(DEFAULT_MAX_EVTS_PER_FILE),
            num_comp_threads: Some(DEFAULT_NUM_COMP_THREADS),
            max_comp_mem: Some(DEFAULT_MAX_COMP_MEM),
            max_file_size: Some(DEFAULT_MAX_FILE_SIZE),
            comp_scheme: Some(CompressionScheme::default()),
            loop_forever: true,
            ..Self::blank()
        }
    }
}

/// Outcome of [`WriterConfig::apply`].
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Fields that took the supplied value.
    pub applied: Vec<WriterField>,
    /// Keys that do not name a writer parameter.
    pub ignored: Vec<String>,
    /// Recognised keys whose value could not be used.
    pub rejected: Vec<ConfigError>,
}

impl ApplyReport {
    /// Returns `true` when every supplied key was applied.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.ignored.is_empty() && self.rejected.is_empty()
    }
}

impl WriterConfig {
    /// A configuration with every optional field unset and every flag off
    /// except `run_number_in_suffix`.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            output_dir: None,
            input: None,
            id: None,
            max_evts_per_file: None,
            evts_per_tile: None,
            num_comp_threads: None,
            max_comp_mem: None,
            max_file_size: None,
            comp_scheme: None,
            comp_block_size: None,
            head_flush_inter: None,
            loop_forever: false,
            suffix: String::new(),
            run_number_in_suffix: true,
        }
    }

    /// Applies a flat set of updates.
    ///
    /// Unknown keys are skipped and listed in [`ApplyReport::ignored`]. A
    /// recognised key with an unusable value leaves the field untouched and
    /// is listed in [`ApplyReport::rejected`]; the remaining updates still
    /// apply.
    pub fn apply<I, K>(&mut self, updates: I) -> ApplyReport
    where
        I: IntoIterator<Item = (K, ConfigValue)>,
        K: AsRef<str>,
    {
        let mut report = ApplyReport::default();
        for (key, value) in updates {
            let key = key.as_ref();
            let Ok(field) = WriterField::from_str(key) else {
                debug!(target: CONFIG_TARGET, key, "ignoring unknown writer option");
                report.ignored.push(key.to_owned());
                continue;
            };
            match self.set(field, value) {
                Ok(()) => report.applied.push(field),
                Err(error) => {
                    warn!(target: CONFIG_TARGET, key, %error, "rejected writer option");
                    report.rejected.push(error);
                }
            }
        }
        report
    }

    /// Sets a single field.
    ///
    /// Integer fields also accept text holding a decimal number; text fields
    /// accept integers and store their decimal form.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TypeMismatch`] when the value has the wrong
    /// shape and [`ConfigError::InvalidValue`] when it is out of range or not
    /// a known compression scheme.
    pub fn set(&mut self, field: WriterField, value: ConfigValue) -> Result<(), ConfigError> {
        match field {
            WriterField::OutputDir => {
                self.output_dir = Some(Utf8PathBuf::from(text_value(field, value)?));
            }
            WriterField::Input => self.input = Some(text_value(field, value)?),
            WriterField::Suffix => self.suffix = text_value(field, value)?,
            WriterField::Id => self.id = Some(signed_value(field, value)?),
            WriterField::MaxEvtsPerFile => {
                self.max_evts_per_file = Some(unsigned_value(field, value)?);
            }
            WriterField::EvtsPerTile => self.evts_per_tile = Some(unsigned_value(field, value)?),
            WriterField::NumCompThreads => {
                self.num_comp_threads = Some(unsigned_value(field, value)?);
            }
            WriterField::MaxCompMem => self.max_comp_mem = Some(unsigned_value(field, value)?),
            WriterField::MaxFileSize => self.max_file_size = Some(unsigned_value(field, value)?),
            WriterField::CompBlockSize => {
                self.comp_block_size = Some(unsigned_value(field, value)?);
            }
            WriterField::HeadFlushInter => {
                self.head_flush_inter = Some(unsigned_value(field, value)?);
            }
            WriterField::CompScheme => self.comp_scheme = Some(scheme_value(field, value)?),
            WriterField::Loop => self.loop_forever = flag_value(field, value)?,
            WriterField::RunNumberInSuffix => self.run_number_in_suffix = flag_value(field, value)?,
        }
        Ok(())
    }

    /// Current value of a field, or `None` when it is unset.
    ///
    /// An empty suffix counts as unset.
    #[must_use]
    pub fn get(&self, field: WriterField) -> Option<ConfigValue> {
        let unsigned = |value: Option<u64>| {
            value.map(|number| {
                i64::try_from(number).map_or_else(
                    |_| ConfigValue::Text(number.to_string()),
                    ConfigValue::Integer,
                )
            })
        };
        match field {
            WriterField::OutputDir => self
                .output_dir
                .as_ref()
                .map(|path| ConfigValue::Text(path.to_string())),
            WriterField::Input => self.input.clone().map(ConfigValue::Text),
            WriterField::Suffix => {
                (!self.suffix.is_empty()).then(|| ConfigValue::Text(self.suffix.clone()))
            }
            WriterField::Id => self.id.map(ConfigValue::Integer),
            WriterField::MaxEvtsPerFile => unsigned(self.max_evts_per_file),
            WriterField::EvtsPerTile => unsigned(self.evts_per_tile),
            WriterField::NumCompThreads => unsigned(self.num_comp_threads),
            WriterField::MaxCompMem => unsigned(self.max_comp_mem),
            WriterField::MaxFileSize => unsigned(self.max_file_size),
            WriterField::CompBlockSize => unsigned(self.comp_block_size),
            WriterField::HeadFlushInter => unsigned(self.head_flush_inter),
            WriterField::CompScheme => self
                .comp_scheme
                .map(|scheme| ConfigValue::Text(scheme.to_string())),
            WriterField::Loop => Some(ConfigValue::Flag(self.loop_forever)),
            WriterField::RunNumberInSuffix => Some(ConfigValue::Flag(self.run_number_in_suffix)),
        }
    }

    /// Renders the writer's command-line arguments.
    ///
    /// Flags appear only when true; every other set field appears as
    /// `--name value`. The order follows [`WriterField`] declaration order.
    #[must_use]
    pub fn render_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for field in WriterField::iter().filter(|field| field.is_rendered()) {
            match self.get(field) {
                Some(ConfigValue::Flag(true)) => args.push(format!("--{field}")),
                Some(ConfigValue::Flag(false)) | None => {}
                Some(value) => {
                    args.push(format!("--{field}"));
                    args.push(value.to_string());
                }
            }
        }
        args
    }

    /// Parses a writer command line back into a configuration.
    ///
    /// Parsing starts from [`WriterConfig::blank`], so flags absent from the
    /// arguments are false.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownArgument`] for tokens that are not
    /// rendered writer flags, [`ConfigError::MissingValue`] when a valued
    /// flag ends the list, or the error raised while setting the value.
    pub fn parse_args<S: AsRef<str>>(args: &[S]) -> Result<Self, ConfigError> {
        let mut config = Self::blank();
        let mut tokens = args.iter().map(AsRef::as_ref);
        while let Some(token) = tokens.next() {
            let field = token
                .strip_prefix("--")
                .and_then(|name| WriterField::from_str(name).ok())
                .filter(|field| field.is_rendered())
                .ok_or_else(|| ConfigError::UnknownArgument {
                    argument: token.to_owned(),
                })?;
            if field.kind() == FieldKind::Flag {
                config.set(field, ConfigValue::Flag(true))?;
                continue;
            }
            let raw = tokens
                .next()
                .ok_or(ConfigError::MissingValue { field })?;
            config.set(field, ConfigValue::Text(raw.to_owned()))?;
        }
        Ok(config)
    }

    /// Rewrites the suffix as `run_<n>` when `run_number_in_suffix` is on.
    ///
    /// Returns whether the suffix was rewritten. Repeating a run number
    /// leaves the configuration unchanged.
    pub fn update_run_number(&mut self, run_number: u32) -> bool {
        if !self.run_number_in_suffix {
            return false;
        }
        self.suffix = format!("run_{run_number}");
        true
    }

    /// Checks that every required field is set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] naming the first unset
    /// required field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        WriterField::iter()
            .filter(|field| field.is_required())
            .find(|field| self.get(*field).is_none())
            .map_or(Ok(()), |field| Err(ConfigError::MissingRequired { field }))
    }

    /// Destination directory.
    #[must_use]
    pub fn output_dir(&self) -> Option<&Utf8PathBuf> {
        self.output_dir.as_ref()
    }

    /// Input stream address.
    #[must_use]
    pub fn input(&self) -> Option<&str> {
        self.input.as_deref()
    }

    /// Load-balancing identifier.
    #[must_use]
    pub const fn id(&self) -> Option<i64> {
        self.id
    }

    /// Compression scheme.
    #[must_use]
    pub const fn comp_scheme(&self) -> Option<CompressionScheme> {
        self.comp_scheme
    }

    /// Whether the writer loops after a run stops.
    #[must_use]
    pub const fn loops(&self) -> bool {
        self.loop_forever
    }

    /// Filename suffix.
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Whether run numbers rewrite the suffix.
    #[must_use]
    pub const fn run_number_in_suffix(&self) -> bool {
        self.run_number_in_suffix
    }
}

fn text_value(field: WriterField, value: ConfigValue) -> Result<String, ConfigError> {
    match value {
        ConfigValue::Text(text) => Ok(text),
        ConfigValue::Integer(number) => Ok(number.to_string()),
        other @ ConfigValue::Flag(_) => Err(mismatch(field, "text", &other)),
    }
}

fn signed_value(field: WriterField, value: ConfigValue) -> Result<i64, ConfigError> {
    match value {
        ConfigValue::Integer(number) => Ok(number),
        ConfigValue::Text(text) => text.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field,
            value: text,
            reason: "expected an integer".to_owned(),
        }),
        other @ ConfigValue::Flag(_) => Err(mismatch(field, "integer", &other)),
    }
}

fn unsigned_value(field: WriterField, value: ConfigValue) -> Result<u64, ConfigError> {
    let number = signed_value(field, value)?;
    u64::try_from(number).map_err(|_| ConfigError::InvalidValue {
        field,
        value: number.to_string(),
        reason: "must not be negative".to_owned(),
    })
}

fn scheme_value(field: WriterField, value: ConfigValue) -> Result<CompressionScheme, ConfigError> {
    let text = match value {
        ConfigValue::Text(text) => text,
        other => return Err(mismatch(field, "text", &other)),
    };
    CompressionScheme::from_str(text.trim()).map_err(|_| ConfigError::InvalidValue {
        field,
        value: text,
        reason: "unknown compression scheme".to_owned(),
    })
}

fn flag_value(field: WriterField, value: ConfigValue) -> Result<bool, ConfigError> {
    match value {
        ConfigValue::Flag(flag) => Ok(flag),
        other => Err(mismatch(field, "flag", &other)),
    }
}

fn mismatch(field: WriterField, expected: &'static str, found: &ConfigValue) -> ConfigError {
    ConfigError::TypeMismatch {
        field,
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests;
