//! CLI argument parsing

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Main CLI application structure
#[derive(Parser, Debug)]
#[command(
    name = "bmlt",
    version,
    about = "Query a BMLT Root Server from the command line",
    long_about = "Bootstraps a session against a BMLT Root Server, then runs one command.\n\
                  The root URI must use https; plain http is only accepted for loopback\n\
                  hosts when the configuration enables `gateway.tls.allow_loopback_http`."
)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Root Server URI, such as https://example.org/main_server
    #[arg(long, short = 'r', global = true, env = "BMLT_ROOT_URI")]
    pub root_uri: Option<String>,

    /// Session configuration file (TOML, YAML or JSON)
    #[arg(long, short = 'c', global = true, env = "BMLT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, value_enum, default_value = "human")]
    pub format: OutputFormat,

    /// Shorthand for `--format json`; also switches log lines to JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl Cli {
    /// Output format after applying `--json`
    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        if self.json { OutputFormat::Json } else { self.format }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Bootstrap and print the server's capabilities
    Validate,

    /// List formats
    Formats {
        /// Only formats used by at least one published meeting
        #[arg(long)]
        used: bool,

        /// Language code; defaults to the server's native language
        #[arg(long, short = 'l')]
        language: Option<String>,
    },

    /// Print the service body hierarchy
    ServiceBodies,

    /// Search for meetings
    Search(SearchArgs),

    /// List meeting change history (requires admin credentials)
    Changes(ChangeArgs),
}

/// Search criteria
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct SearchArgs {
    /// Free text to look for
    #[arg(long, short = 't')]
    pub text: Option<String>,

    /// Weekday, 1 = Sunday through 7 = Saturday (repeatable)
    #[arg(long = "weekday", short = 'w', value_parser = clap::value_parser!(u8).range(1..=7))]
    pub weekdays: Vec<u8>,

    /// Service body id (repeatable)
    #[arg(long = "service-body", short = 's')]
    pub service_bodies: Vec<u64>,

    /// Format id (repeatable)
    #[arg(long = "format-id")]
    pub formats: Vec<u64>,

    /// Latitude of the search center
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Longitude of the search center
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Radius around the center, in the server's distance units
    #[arg(long, requires = "lat", conflicts_with = "count")]
    pub radius: Option<f64>,

    /// Widen the circle until it holds about this many meetings
    #[arg(long, requires = "lat")]
    pub count: Option<u32>,
}

/// Change history filter and admin credentials
#[derive(Args, Debug, Clone, PartialEq)]
pub struct ChangeArgs {
    /// Only this meeting
    #[arg(long)]
    pub meeting: Option<u64>,

    /// Only meetings of this service body
    #[arg(long = "service-body")]
    pub service_body: Option<u64>,

    /// First day, YYYY-MM-DD
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day, YYYY-MM-DD
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Admin login
    #[arg(long, short = 'u', env = "BMLT_ADMIN_USER")]
    pub user: String,

    /// Admin password
    #[arg(long, short = 'p', env = "BMLT_ADMIN_PASSWORD", hide_env_values = true)]
    pub password: String,
}

/// Output formats
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable with colors
    Human,
    /// Table format
    Table,
    /// JSON output
    Json,
    /// Compact JSON (no pretty print)
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_search_filters() {
        let cli = Cli::try_parse_from([
            "bmlt",
            "--root-uri",
            "https://example.org/main_server",
            "search",
            "-w",
            "2",
            "-w",
            "5",
            "--service-body",
            "3",
            "--lat",
            "40.7",
            "--lon",
            "-73.9",
            "--radius",
            "5",
        ])
        .unwrap();

        let Commands::Search(args) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(args.weekdays, vec![2, 5]);
        assert_eq!(args.service_bodies, vec![3]);
        assert_eq!(args.lon, Some(-73.9));
        assert_eq!(args.radius, Some(5.0));
    }

    #[test]
    fn rejects_out_of_range_weekday() {
        assert!(Cli::try_parse_from(["bmlt", "search", "-w", "8"]).is_err());
    }

    #[test]
    fn radius_needs_a_center() {
        assert!(Cli::try_parse_from(["bmlt", "search", "--radius", "5"]).is_err());
        assert!(
            Cli::try_parse_from([
                "bmlt", "search", "--lat", "1", "--lon", "2", "--radius", "5", "--count", "10"
            ])
            .is_err()
        );
    }

    #[test]
    fn json_flag_overrides_format() {
        let cli = Cli::try_parse_from(["bmlt", "--json", "-f", "table", "validate"]).unwrap();
        assert_eq!(cli.output_format(), OutputFormat::Json);
    }

    #[test]
    fn changes_parse_dates() {
        let cli = Cli::try_parse_from([
            "bmlt", "changes", "--from", "2024-01-31", "-u", "admin", "-p", "secret",
        ])
        .unwrap();
        let Commands::Changes(args) = cli.command else {
            panic!("expected changes");
        };
        assert_eq!(args.from, NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(args.to, None);
    }
}
