use std::time::Duration;

use thiserror::Error;
use ufab_types::{make_error_msg, ConfigCode, Result, Status, StatusCode};

use crate::component::{Component, TlSelector};
use crate::md::MemoryDomain;

/// Value type tag for a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigType {
    Uint,
    Bool,
    Duration,
    String,
}

/// One entry of a configuration schema.
///
/// Schemas are static, ordered tables; they drive fill, introspection and
/// mutation without per-option custom code.
#[derive(Debug, Clone, Copy)]
pub struct ConfigField {
    /// Option name, conventionally upper-case (e.g. `"RKEY_BACKED"`).
    pub name: &'static str,
    /// Default textual value, parsed according to `ty`.
    pub default: &'static str,
    /// Human-readable description.
    pub doc: &'static str,
    /// Value type.
    pub ty: ConfigType,
}

/// A parsed configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Uint(u64),
    Bool(bool),
    Duration(Duration),
    String(String),
}

impl ConfigValue {
    fn render(&self) -> String {
        match self {
            ConfigValue::Uint(v) => v.to_string(),
            ConfigValue::Bool(v) => if *v { "y" } else { "n" }.to_string(),
            ConfigValue::Duration(v) => format_duration(*v),
            ConfigValue::String(v) => v.clone(),
        }
    }
}

/// Errors from parsing textual option values.
#[derive(Debug, Error)]
pub enum ConfigParseError {
    #[error("unknown option '{0}'")]
    UnknownKey(String),

    #[error("invalid boolean '{value}' for option {name}")]
    InvalidBool { name: String, value: String },

    #[error("invalid unsigned integer '{value}' for option {name}")]
    InvalidUint { name: String, value: String },

    #[error("invalid duration '{value}' for option {name} (expected e.g. 90ns, 10ms, 1s)")]
    InvalidDuration { name: String, value: String },
}

impl From<ConfigParseError> for Status {
    fn from(err: ConfigParseError) -> Self {
        let code = match &err {
            ConfigParseError::UnknownKey(_) => ConfigCode::KEY_NOT_FOUND,
            _ => ConfigCode::INVALID_VALUE,
        };
        Status::with_message(code, err.to_string())
    }
}

fn parse_bool(name: &str, value: &str) -> std::result::Result<bool, ConfigParseError> {
    match value.to_ascii_lowercase().as_str() {
        "y" | "yes" | "on" | "true" | "1" => Ok(true),
        "n" | "no" | "off" | "false" | "0" => Ok(false),
        _ => Err(ConfigParseError::InvalidBool {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_uint(name: &str, value: &str) -> std::result::Result<u64, ConfigParseError> {
    value.parse::<u64>().map_err(|_| ConfigParseError::InvalidUint {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_duration(name: &str, value: &str) -> std::result::Result<Duration, ConfigParseError> {
    let err = || ConfigParseError::InvalidDuration {
        name: name.to_string(),
        value: value.to_string(),
    };

    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) if pos > 0 => value.split_at(pos),
        _ => return Err(err()),
    };
    let amount: u64 = digits.parse().map_err(|_| err())?;

    match unit {
        "ns" => Ok(Duration::from_nanos(amount)),
        "us" => Ok(Duration::from_micros(amount)),
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        _ => Err(err()),
    }
}

fn parse_value(field: &ConfigField, value: &str) -> std::result::Result<ConfigValue, ConfigParseError> {
    match field.ty {
        ConfigType::Uint => parse_uint(field.name, value).map(ConfigValue::Uint),
        ConfigType::Bool => parse_bool(field.name, value).map(ConfigValue::Bool),
        ConfigType::Duration => parse_duration(field.name, value).map(ConfigValue::Duration),
        ConfigType::String => Ok(ConfigValue::String(value.to_string())),
    }
}

fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos % 1_000_000_000 == 0 {
        format!("{}s", nanos / 1_000_000_000)
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!("{}us", nanos / 1_000)
    } else {
        format!("{}ns", nanos)
    }
}

/// A filled configuration bundle: one schema-described options block plus
/// the name prefix it was filled with.
///
/// Owns its values; release is `Drop`, and move semantics make releasing
/// twice or reading after release unrepresentable.
#[derive(Debug)]
pub struct ConfigBundle {
    schema: &'static [ConfigField],
    prefix: String,
    values: Vec<(&'static str, ConfigValue)>,
}

impl ConfigBundle {
    /// The schema this bundle was filled from.
    pub fn schema(&self) -> &'static [ConfigField] {
        self.schema
    }

    /// The name prefix used during fill.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn field(&self, name: &str) -> Option<(&ConfigField, &ConfigValue)> {
        let field = self.schema.iter().find(|f| f.name == name)?;
        let value = self
            .values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)?;
        Some((field, value))
    }

    /// Render the value of an option as text.
    pub fn get(&self, name: &str) -> Result<String> {
        match self.field(name) {
            Some((_, value)) => Ok(value.render()),
            None => make_error_msg(
                ConfigCode::KEY_NOT_FOUND,
                format!("unknown option '{}'", name),
            ),
        }
    }

    pub fn get_uint(&self, name: &str) -> Result<u64> {
        match self.field(name) {
            Some((_, ConfigValue::Uint(v))) => Ok(*v),
            Some(_) => make_error_msg(
                ConfigCode::INVALID_TYPE,
                format!("option '{}' is not an unsigned integer", name),
            ),
            None => make_error_msg(
                ConfigCode::KEY_NOT_FOUND,
                format!("unknown option '{}'", name),
            ),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.field(name) {
            Some((_, ConfigValue::Bool(v))) => Ok(*v),
            Some(_) => make_error_msg(
                ConfigCode::INVALID_TYPE,
                format!("option '{}' is not a boolean", name),
            ),
            None => make_error_msg(
                ConfigCode::KEY_NOT_FOUND,
                format!("unknown option '{}'", name),
            ),
        }
    }

    pub fn get_duration(&self, name: &str) -> Result<Duration> {
        match self.field(name) {
            Some((_, ConfigValue::Duration(v))) => Ok(*v),
            Some(_) => make_error_msg(
                ConfigCode::INVALID_TYPE,
                format!("option '{}' is not a duration", name),
            ),
            None => make_error_msg(
                ConfigCode::KEY_NOT_FOUND,
                format!("unknown option '{}'", name),
            ),
        }
    }

    pub fn get_str(&self, name: &str) -> Result<&str> {
        match self.field(name) {
            Some((_, ConfigValue::String(v))) => Ok(v),
            Some(_) => make_error_msg(
                ConfigCode::INVALID_TYPE,
                format!("option '{}' is not a string", name),
            ),
            None => make_error_msg(
                ConfigCode::KEY_NOT_FOUND,
                format!("unknown option '{}'", name),
            ),
        }
    }

    /// Replace the value of an option from its textual form.
    ///
    /// An unknown name reports `KEY_NOT_FOUND`; a value that does not parse
    /// for the field's type reports `INVALID_VALUE`.
    pub fn modify(&mut self, name: &str, value: &str) -> Result<()> {
        let field = match self.schema.iter().find(|f| f.name == name) {
            Some(field) => field,
            None => {
                return Err(ConfigParseError::UnknownKey(name.to_string()).into());
            }
        };

        let parsed = parse_value(field, value).map_err(Status::from)?;
        for entry in &mut self.values {
            if entry.0 == name {
                entry.1 = parsed;
                return Ok(());
            }
        }
        unreachable!("bundle holds one value per schema field");
    }
}

/// Fill a configuration bundle from a schema.
///
/// Every field is looked up in the environment under
/// `{env_prefix}{cfg_prefix}{NAME}` and falls back to its schema default.
/// Any parse failure aborts the read; no partially-filled bundle escapes.
pub fn config_read(
    schema: &'static [ConfigField],
    env_prefix: &str,
    cfg_prefix: &str,
) -> Result<ConfigBundle> {
    let mut values = Vec::with_capacity(schema.len());

    for field in schema {
        let env_key = format!("{}{}{}", env_prefix, cfg_prefix, field.name);
        let text = std::env::var(&env_key).unwrap_or_else(|_| field.default.to_string());
        let value = parse_value(field, &text).map_err(Status::from)?;
        values.push((field.name, value));
    }

    Ok(ConfigBundle {
        schema,
        prefix: cfg_prefix.to_string(),
        values,
    })
}

/// Read a component's memory-domain configuration.
pub fn md_config_read(component: &dyn Component, env_prefix: &str) -> Result<ConfigBundle> {
    config_read(component.md_config_schema(), env_prefix, component.config_prefix()).map_err(
        |status| {
            tracing::error!(component = component.name(), %status, "failed to read MD config");
            status
        },
    )
}

/// Read the interface configuration of a transport registered under the
/// MD's component.
///
/// With `tl_name` set, the transport is selected by exact name; without
/// it, the first sockaddr-capable transport is used. A missing transport
/// reports `NO_DEVICE`.
pub fn iface_config_read(
    md: &MemoryDomain,
    tl_name: Option<&str>,
    env_prefix: &str,
) -> Result<ConfigBundle> {
    // Surface MD query failures the same way interface opening does.
    md.query()?;

    let selector = match tl_name {
        Some(name) => TlSelector::Name(name),
        None => TlSelector::Sockaddr,
    };
    let tl = match md.component().find_tl(selector) {
        Some(tl) => tl,
        None => {
            return match tl_name {
                Some(name) => {
                    tracing::error!(tl = name, "transport does not exist");
                    make_error_msg(
                        StatusCode::NO_DEVICE,
                        format!("transport '{}' does not exist", name),
                    )
                }
                None => {
                    tracing::error!("no sockaddr transport registered on the md");
                    make_error_msg(
                        StatusCode::NO_DEVICE,
                        "no sockaddr transport registered on the md",
                    )
                }
            };
        }
    };

    config_read(tl.iface_config_schema(), env_prefix, tl.config_prefix())
}
