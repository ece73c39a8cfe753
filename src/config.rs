//! Capability flags and file/environment configuration (§6.3).
//!
//! [`Env`] gates every operation the SQL adapter performs; callers build one
//! per connection and pass it down rather than threading individual booleans.
//! [`SldgFileConfig`] loads the adapter's connection string and table prefix
//! from a `toml` file, overridable by `SLDG_`-prefixed environment
//! variables, the way `knhk_config` layers env over file over defaults.

use crate::error::{Result, SldgError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Capability flags gating SQL-adapter operations (§6.3).
///
/// `allow_delete ⇒ !read_only` and `!allow_commit ⇒ !allow_rollback` are
/// enforced at construction; there is no way to build an `Env` that violates
/// either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Env {
    table_prefix: String,
    read_only: bool,
    allow_delete: bool,
    allow_commit: bool,
    allow_rollback: bool,
}

impl Env {
    pub fn new(
        table_prefix: impl Into<String>,
        read_only: bool,
        allow_delete: bool,
        allow_commit: bool,
        allow_rollback: bool,
    ) -> Result<Self> {
        if allow_delete && read_only {
            return Err(SldgError::config(
                "allow_delete requires read_only to be false",
            ));
        }
        if allow_rollback && !allow_commit {
            return Err(SldgError::config(
                "allow_rollback requires allow_commit to be true",
            ));
        }
        let table_prefix = table_prefix.into();
        if table_prefix.is_empty() {
            return Err(SldgError::config("table_prefix must not be empty"));
        }
        Ok(Self {
            table_prefix,
            read_only,
            allow_delete,
            allow_commit,
            allow_rollback,
        })
    }

    /// A read-only environment with no write capabilities at all.
    pub fn read_only(table_prefix: impl Into<String>) -> Result<Self> {
        Self::new(table_prefix, true, false, false, false)
    }

    /// Full read/write/commit/rollback capability, no soft-deletes.
    pub fn read_write(table_prefix: impl Into<String>) -> Result<Self> {
        Self::new(table_prefix, false, false, true, true)
    }

    pub fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn allow_delete(&self) -> bool {
        self.allow_delete
    }

    pub fn allow_commit(&self) -> bool {
        self.allow_commit
    }

    pub fn allow_rollback(&self) -> bool {
        self.allow_rollback
    }

    /// `Unsupported` unless this env permits appending/updating rows.
    pub fn require_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(SldgError::unsupported("operation forbidden: env is read-only"));
        }
        Ok(())
    }

    /// `Unsupported` unless this env permits soft-deletes.
    pub fn require_delete(&self) -> Result<()> {
        self.require_writable()?;
        if !self.allow_delete {
            return Err(SldgError::unsupported(
                "operation forbidden: env does not allow delete",
            ));
        }
        Ok(())
    }

    /// `Unsupported` unless this env permits skip-table commit (append).
    pub fn require_commit(&self) -> Result<()> {
        if !self.allow_commit {
            return Err(SldgError::unsupported(
                "operation forbidden: env does not allow commit",
            ));
        }
        Ok(())
    }

    /// `Unsupported` unless this env permits skip-table rollback (trim).
    pub fn require_rollback(&self) -> Result<()> {
        if !self.allow_rollback {
            return Err(SldgError::unsupported(
                "operation forbidden: env does not allow rollback",
            ));
        }
        Ok(())
    }
}

/// SQL-adapter connection settings, loadable from a `toml` file and
/// overridable by environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SldgFileConfig {
    /// `sqlx` connection string, e.g. `sqlite://ledger.db`.
    pub database_url: String,
    pub table_prefix: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub allow_delete: bool,
    #[serde(default = "default_true")]
    pub allow_commit: bool,
    #[serde(default = "default_true")]
    pub allow_rollback: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SldgFileConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://sldg.db".to_string(),
            table_prefix: "sldg".to_string(),
            read_only: false,
            allow_delete: false,
            allow_commit: true,
            allow_rollback: true,
        }
    }
}

impl SldgFileConfig {
    /// Loads from `path`, parsing as `toml`.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SldgError::config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| SldgError::config(format!("parsing config: {e}")))
    }

    /// Default config-file location: `$HOME/.sldg/config.toml` (or
    /// `%APPDATA%\sldg\config.toml` on Windows), mirroring `knhk_config`'s
    /// platform-specific default path.
    pub fn default_path() -> Result<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .map_err(|_| SldgError::config("APPDATA not set"))?;
            let mut path = PathBuf::from(appdata);
            path.push("sldg");
            path.push("config.toml");
            Ok(path)
        }
        #[cfg(not(target_os = "windows"))]
        {
            let home = std::env::var("HOME").map_err(|_| SldgError::config("HOME not set"))?;
            let mut path = PathBuf::from(home);
            path.push(".sldg");
            path.push("config.toml");
            Ok(path)
        }
    }

    /// Loads from [`Self::default_path`] if it exists, falling back to
    /// defaults, then applies `SLDG_`-prefixed environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path() {
            Ok(path) if path.exists() => Self::load_from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Overrides fields from `SLDG_DATABASE_URL`, `SLDG_TABLE_PREFIX`,
    /// `SLDG_READ_ONLY`, `SLDG_ALLOW_DELETE`, `SLDG_ALLOW_COMMIT`,
    /// `SLDG_ALLOW_ROLLBACK`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("SLDG_DATABASE_URL") {
            self.database_url = v;
        }
        if let Ok(v) = std::env::var("SLDG_TABLE_PREFIX") {
            self.table_prefix = v;
        }
        if let Ok(v) = std::env::var("SLDG_READ_ONLY") {
            self.read_only = parse_bool(&v)?;
        }
        if let Ok(v) = std::env::var("SLDG_ALLOW_DELETE") {
            self.allow_delete = parse_bool(&v)?;
        }
        if let Ok(v) = std::env::var("SLDG_ALLOW_COMMIT") {
            self.allow_commit = parse_bool(&v)?;
        }
        if let Ok(v) = std::env::var("SLDG_ALLOW_ROLLBACK") {
            self.allow_rollback = parse_bool(&v)?;
        }
        Ok(())
    }

    /// Builds the [`Env`] this config describes.
    pub fn to_env(&self) -> Result<Env> {
        Env::new(
            self.table_prefix.clone(),
            self.read_only,
            self.allow_delete,
            self.allow_commit,
            self.allow_rollback,
        )
    }
}

fn parse_bool(v: &str) -> Result<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SldgError::config(format!(
            "expected a boolean env value, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn allow_delete_requires_writable() {
        assert!(Env::new("sldg", true, true, false, false).is_err());
        assert!(Env::new("sldg", false, true, false, false).is_ok());
    }

    #[test]
    fn allow_rollback_requires_commit() {
        assert!(Env::new("sldg", false, false, false, true).is_err());
        assert!(Env::new("sldg", false, false, true, true).is_ok());
    }

    #[test]
    fn rejects_empty_table_prefix() {
        assert!(Env::new("", false, false, true, true).is_err());
    }

    #[test]
    fn require_writable_rejects_on_read_only_env() {
        let env = Env::read_only("sldg").unwrap();
        assert!(env.require_writable().is_err());
        assert!(env.require_commit().is_err());
    }

    #[test]
    fn read_write_env_permits_commit_and_rollback() {
        let env = Env::read_write("sldg").unwrap();
        assert!(env.require_writable().is_ok());
        assert!(env.require_commit().is_ok());
        assert!(env.require_rollback().is_ok());
        assert!(env.require_delete().is_err());
    }

    #[test]
    fn file_config_has_sane_defaults() {
        let config = SldgFileConfig::default();
        assert_eq!(config.table_prefix, "sldg");
        assert!(config.to_env().is_ok());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("YES").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
