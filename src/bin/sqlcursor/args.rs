use std::fs;
use std::path::PathBuf;

use clap::Parser;
use sql_cursor::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run SQL through sql-cursor and print rows as JSON lines")]
pub(crate) struct Args {
    /// Database path or URI; overrides the config file.
    pub(crate) database: Option<String>,
    /// JSON file with connection options.
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Statement to execute; may be repeated.
    #[arg(short, long = "execute")]
    pub(crate) execute: Vec<String>,
    /// Script file run before any `--execute` statements.
    #[arg(long)]
    pub(crate) script: Option<PathBuf>,
    #[arg(long)]
    pub(crate) timeout_ms: Option<u64>,
    #[arg(long, value_enum)]
    pub(crate) text_policy: Option<TextPolicy>,
    /// Convert columns by declared type.
    #[arg(long)]
    pub(crate) decltypes: bool,
    /// Convert columns by `[tag]` in the column alias.
    #[arg(long)]
    pub(crate) colnames: bool,
    /// Disable implicit transactions.
    #[arg(long)]
    pub(crate) manual_transactions: bool,
}

impl Args {
    /// Connection options from the config file (if any) with command-line overrides applied.
    pub(crate) fn connect_options(&self) -> Result<ConnectOptions, Box<dyn std::error::Error>> {
        let mut opts = match &self.config {
            Some(path) => ConnectOptions::from_json_str(&fs::read_to_string(path)?)?,
            None => ConnectOptions::default(),
        };
        if let Some(database) = &self.database {
            opts.database.clone_from(database);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            opts.timeout_ms = timeout_ms;
        }
        if let Some(policy) = self.text_policy {
            opts.text_policy = policy;
        }
        if self.decltypes {
            opts.detect_types |= DetectTypes::DECLTYPES;
        }
        if self.colnames {
            opts.detect_types |= DetectTypes::COLNAMES;
        }
        if self.manual_transactions {
            opts.implicit_begin = false;
        }
        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn flags_override_the_config_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut config = tempfile::NamedTempFile::new()?;
        write!(
            config,
            r#"{{"database": "from_config.db", "timeout_ms": 100, "text_policy": "raw", "detect_types": "COLNAMES"}}"#
        )?;
        let path = config.path().to_string_lossy().into_owned();
        let args = Args::try_parse_from([
            "sqlcursor",
            "--config",
            &path,
            "--timeout-ms",
            "250",
            "--decltypes",
            "--manual-transactions",
            "-e",
            "SELECT 1",
        ])?;
        let opts = args.connect_options()?;
        assert_eq!(opts.database, "from_config.db");
        assert_eq!(opts.timeout_ms, 250);
        assert_eq!(opts.text_policy, TextPolicy::Raw);
        assert_eq!(opts.detect_types, DetectTypes::COLNAMES | DetectTypes::DECLTYPES);
        assert!(!opts.implicit_begin);
        assert_eq!(args.execute, ["SELECT 1"]);
        Ok(())
    }

    #[test]
    fn positional_database_without_config() -> Result<(), Box<dyn std::error::Error>> {
        let args = Args::try_parse_from(["sqlcursor", "app.db", "--text-policy", "optimized-ascii"])?;
        let opts = args.connect_options()?;
        assert_eq!(opts.database, "app.db");
        assert_eq!(opts.text_policy, TextPolicy::OptimizedAscii);
        assert_eq!(opts.timeout_ms, 5000);
        assert!(opts.implicit_begin);
        assert!(opts.detect_types.is_empty());
        Ok(())
    }

    #[test]
    fn unreadable_config_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let args = Args::try_parse_from(["sqlcursor", "--config", "/nonexistent/options.json"])?;
        assert!(args.connect_options().is_err());
        Ok(())
    }
}
