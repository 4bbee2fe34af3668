//! Config loading: `leakwatch.toml` layered under environment variables
//! layered under CLI flags (see `DESIGN.md` for the layering rationale).

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use leakwatch_protocol::{CoreOptions, FillOptions};
use serde_json::{json, Value as Json};
use thiserror::Error;

use crate::cli::AuditArgs;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("`fill.maxFields` must be greater than 0")]
    MaxFieldsZero,
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

const DEFAULT_CONFIG_PATH: &str = "leakwatch.toml";

/// Loads `CoreOptions` from defaults, an optional TOML file, `LEAKWATCH_*`
/// env vars, and finally this run's CLI flags, in increasing priority order.
pub fn load(config_path: Option<&Path>, args: &AuditArgs) -> Result<CoreOptions, ConfigError> {
    let mut figment = Figment::new().merge(Serialized::defaults(CoreOptions::default()));

    let resolved_path = config_path
        .map(PathBuf::from)
        .or_else(|| {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            default.exists().then(|| default.to_path_buf())
        });
    if let Some(path) = resolved_path {
        if !path.exists() {
            return Err(ConfigError::Read {
                path,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
            });
        }
        figment = figment.merge(Toml::file(&path));
    }

    figment = figment.merge(Env::prefixed("LEAKWATCH_").split("__"));
    figment = figment.merge(Serialized::defaults(cli_overrides(args)));

    let options: CoreOptions = figment.extract()?;
    validate(&options)?;
    Ok(options)
}

/// Builds the subset of `CoreOptions`-shaped JSON that this run's CLI flags
/// actually set, so unset flags never clobber the file/env layers beneath
/// them.
fn cli_overrides(args: &AuditArgs) -> Json {
    let mut fill = serde_json::Map::new();
    if let Some(email) = &args.email {
        fill.insert("email".into(), json!(email));
    }
    if let Some(password) = &args.password {
        fill.insert("password".into(), json!(password));
    }
    if let Some(submit) = args.submit {
        fill.insert("submit".into(), json!(submit));
    }
    if let Some(max_fields) = args.max_fields {
        fill.insert("maxFields".into(), json!(max_fields));
    }

    let mut root = serde_json::Map::new();
    if !fill.is_empty() {
        root.insert("fill".into(), Json::Object(fill));
    }
    if let Some(max_links) = args.max_links {
        root.insert("maxLinks".into(), json!(max_links));
    }
    if let Some(skip_external) = args.skip_external {
        root.insert(
            "skipExternal".into(),
            json!(leakwatch_protocol::SkipExternal::from(skip_external)),
        );
    }
    Json::Object(root)
}

fn validate(options: &CoreOptions) -> Result<(), ConfigError> {
    if options.fill.max_fields == 0 {
        return Err(ConfigError::MaxFieldsZero);
    }
    if options.fill.email.trim().is_empty() {
        return Err(ConfigError::Invalid("`fill.email` must not be empty".into()));
    }
    Ok(())
}

/// The `FillOptions` used when a minimal config (no file, no overrides) is
/// exercised directly, e.g. from tests.
#[cfg(test)]
pub fn default_fill() -> FillOptions {
    FillOptions::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_max_fields() {
        let mut options = CoreOptions::default();
        options.fill.max_fields = 0;
        assert!(matches!(validate(&options), Err(ConfigError::MaxFieldsZero)));
    }

    #[test]
    fn rejects_empty_email() {
        let mut options = CoreOptions::default();
        options.fill.email = "  ".into();
        assert!(validate(&options).is_err());
    }

    #[test]
    fn default_options_pass_validation() {
        assert!(validate(&CoreOptions::default()).is_ok());
    }
}
