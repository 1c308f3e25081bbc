use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use posbindu_core::Gender;

#[derive(Parser)]
#[command(name = "posbindu")]
#[command(about = "Register patients and record screenings, online or offline")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for remote configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Treat the remote as unreachable; every write goes to the sync queue
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register and browse patients
    Patient {
        #[command(subcommand)]
        command: PatientCommands,
    },
    /// Record and browse health examinations
    #[command(alias = "examination")]
    Exam {
        #[command(subcommand)]
        command: ExamCommands,
    },
    /// Show pending sync queue items
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show local sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one sync pass now: push queued items, then pull patients
    Sync,
    /// Watch connectivity and sync whenever the remote comes back
    Watch {
        /// Seconds between reachability checks
        #[arg(long, default_value = "5", value_name = "SECS")]
        interval: u64,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage the bearer credential for a profile
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum GenderArg {
    #[value(alias = "l")]
    Male,
    #[value(alias = "p")]
    Female,
}

impl From<GenderArg> for Gender {
    fn from(value: GenderArg) -> Self {
        match value {
            GenderArg::Male => Self::Male,
            GenderArg::Female => Self::Female,
        }
    }
}

#[derive(Subcommand)]
pub enum PatientCommands {
    /// Register a new patient
    #[command(alias = "new")]
    Add {
        /// National identity number (16 digits)
        #[arg(long)]
        nik: String,
        /// Full name
        #[arg(long)]
        name: String,
        /// Birth date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        birth_date: NaiveDate,
        #[arg(long, value_enum)]
        gender: GenderArg,
        #[arg(long)]
        address: String,
        /// Health insurance (BPJS) number
        #[arg(long, value_name = "NUMBER")]
        bpjs: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently registered patients
    List {
        /// Number of patients to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one patient with recent examinations
    Show {
        /// Patient code
        code: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ExamCommands {
    /// Record an examination for a patient
    #[command(alias = "new")]
    Add {
        /// Patient code
        code: String,
        /// When the examination happened (RFC 3339), defaults to now
        #[arg(long, value_name = "TIMESTAMP")]
        examined_at: Option<String>,
        #[arg(long, value_name = "CM")]
        height: Option<f64>,
        #[arg(long, value_name = "KG")]
        weight: Option<f64>,
        #[arg(long, value_name = "MMHG")]
        systolic: Option<u16>,
        #[arg(long, value_name = "MMHG")]
        diastolic: Option<u16>,
        /// Fasting blood glucose (mg/dL)
        #[arg(long, value_name = "MG_DL")]
        fasting_glucose: Option<f64>,
        /// Random blood glucose (mg/dL)
        #[arg(long, value_name = "MG_DL")]
        random_glucose: Option<f64>,
        /// Two-hour post-load glucose (mg/dL)
        #[arg(long, value_name = "MG_DL")]
        two_hour_glucose: Option<f64>,
        /// Total cholesterol (mg/dL)
        #[arg(long, value_name = "MG_DL")]
        cholesterol: Option<f64>,
        /// Uric acid (mg/dL)
        #[arg(long, value_name = "MG_DL")]
        uric_acid: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List examinations for a patient
    List {
        /// Patient code
        code: String,
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Remote API base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Remote request timeout in seconds
        #[arg(long, value_name = "SECS")]
        request_timeout_secs: Option<u64>,
        /// Attempts before a queued item is given up
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,
        /// Prefix for generated patient codes
        #[arg(long, value_name = "PREFIX")]
        code_prefix: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the effective configuration for a profile
    Show {
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store a bearer token for the profile in the keychain
    Login {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Bearer token (read from stdin when omitted)
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
    },
    /// Show whether a token is stored for the profile
    Status {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
    /// Remove the stored token
    Logout {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
