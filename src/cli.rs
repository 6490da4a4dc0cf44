//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and turning arguments into a report request.

use crate::models::{GeoFilter, Period, ReportKind, ReportRequest, Requester, RequestStatus};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// tourstat - consent-aware tourism statistics reports
///
/// Aggregates consented platform records and upstream analytics for a
/// period, checks the minimum-disclosure threshold, and delivers a
/// narrative report and a data export.
///
/// Examples:
///   tourstat --request-id req-1 --from 2025-01-01 --to 2025-03-31 \
///            --requester-name "Fundtur" --requester-email stats@fundtur.example
///   tourstat --request-id req-2 --from 2025-01-01 --to 2025-01-31 --state MS --kind export ...
///   tourstat --request-id req-3 --from 2025-01-01 --to 2025-01-31 --check ...
///   tourstat --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Identifier of the report request
    #[arg(long, value_name = "ID", required_unless_present = "init_config")]
    pub request_id: Option<String>,

    /// First day of the period (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", required_unless_present = "init_config")]
    pub from: Option<NaiveDate>,

    /// Last day of the period, inclusive (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", required_unless_present = "init_config")]
    pub to: Option<NaiveDate>,

    /// Which deliverables to produce
    #[arg(short, long, default_value = "both", value_name = "KIND")]
    pub kind: ReportKind,

    /// Name of the requesting organisation or person
    #[arg(long, value_name = "NAME", required_unless_present = "init_config")]
    pub requester_name: Option<String>,

    /// Contact email of the requester
    #[arg(long, value_name = "EMAIL", required_unless_present = "init_config")]
    pub requester_email: Option<String>,

    /// City of the requester
    #[arg(long, value_name = "CITY")]
    pub requester_city: Option<String>,

    /// Restrict to subjects from this state
    #[arg(long, value_name = "STATE")]
    pub state: Option<String>,

    /// Restrict to subjects from this city
    #[arg(long, value_name = "CITY")]
    pub city: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .tourstat.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Minimum aggregated records required for publication
    #[arg(long, value_name = "COUNT")]
    pub threshold: Option<u64>,

    /// Whole-run timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Read data from a JSON snapshot instead of the configured store
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<PathBuf>,

    /// Store artifacts in this local directory
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Also write the outcome JSON to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Only check whether enough data is available; render nothing
    #[arg(long)]
    pub check: bool,

    /// Service key of the data store
    #[arg(long, env = "TOURSTAT_STORE_KEY", hide_env_values = true)]
    pub store_key: Option<String>,

    /// API key of the upstream analytics provider
    #[arg(long, env = "TOURSTAT_ANALYTICS_KEY", hide_env_values = true)]
    pub analytics_key: Option<String>,

    /// Key for remote artifact storage
    #[arg(long, env = "TOURSTAT_BLOB_KEY", hide_env_values = true)]
    pub blob_key: Option<String>,

    /// Generate a default .tourstat.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.request_id.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err("Request id must not be empty".to_string());
        }

        if let (Some(from), Some(to)) = (self.from, self.to) {
            if to < from {
                return Err(format!("Period end {} is before start {}", to, from));
            }
        }

        if let Some(ref email) = self.requester_email {
            if !email.contains('@') {
                return Err(format!("Invalid requester email: {}", email));
            }
        }

        if self.threshold == Some(0) {
            return Err("Threshold must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let Some(ref snapshot) = self.snapshot {
            if !snapshot.is_file() {
                return Err(format!("Snapshot file does not exist: {}", snapshot.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Build the report request described by the arguments.
    pub fn to_request(&self) -> Result<ReportRequest, String> {
        let (Some(from), Some(to)) = (self.from, self.to) else {
            return Err("Both --from and --to are required".to_string());
        };
        let period = Period::new(from, to).map_err(|e| e.to_string())?;

        let geo = GeoFilter {
            state: non_blank(&self.state),
            city: non_blank(&self.city),
        };

        Ok(ReportRequest {
            id: non_blank(&self.request_id).ok_or("--request-id is required")?,
            requester: Requester {
                name: non_blank(&self.requester_name).ok_or("--requester-name is required")?,
                email: non_blank(&self.requester_email).ok_or("--requester-email is required")?,
                city: non_blank(&self.requester_city),
            },
            kind: self.kind,
            period,
            geo: if geo.is_empty() { None } else { Some(geo) },
            status: RequestStatus::Pending,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            request_id: Some("req-1".to_string()),
            from: NaiveDate::from_ymd_opt(2025, 1, 1),
            to: NaiveDate::from_ymd_opt(2025, 1, 31),
            kind: ReportKind::Both,
            requester_name: Some("Fundtur".to_string()),
            requester_email: Some("stats@fundtur.example".to_string()),
            requester_city: None,
            state: None,
            city: None,
            config: None,
            verbose: false,
            quiet: false,
            threshold: None,
            timeout: None,
            snapshot: None,
            output_dir: None,
            output: None,
            check: false,
            store_key: None,
            analytics_key: None,
            blob_key: None,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_minimal_invocation() {
        let args = Args::try_parse_from([
            "tourstat",
            "--request-id",
            "req-9",
            "--from",
            "2025-02-01",
            "--to",
            "2025-02-28",
            "--requester-name",
            "Prefeitura",
            "--requester-email",
            "dados@prefeitura.example",
            "--kind",
            "export",
        ])
        .unwrap();

        assert_eq!(args.kind, ReportKind::Export);
        assert_eq!(args.from, NaiveDate::from_ymd_opt(2025, 2, 1));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_init_config_needs_nothing_else() {
        let args = Args::try_parse_from(["tourstat", "--init-config"]).unwrap();
        assert!(args.init_config);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_inverted_period() {
        let mut args = make_args();
        args.from = NaiveDate::from_ymd_opt(2025, 2, 1);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_threshold() {
        let mut args = make_args();
        args.threshold = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_to_request() {
        let mut args = make_args();
        args.state = Some(" MS ".to_string());
        args.city = Some("  ".to_string());

        let request = args.to_request().unwrap();
        assert_eq!(request.id, "req-1");
        assert_eq!(request.period.days(), 31);
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(
            request.geo,
            Some(GeoFilter {
                state: Some("MS".to_string()),
                city: None,
            })
        );

        args.state = None;
        assert!(args.to_request().unwrap().geo.is_none());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
