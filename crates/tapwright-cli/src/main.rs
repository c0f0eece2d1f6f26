//! CLI for running tapwright flows against an Appium session.
//!
//! # Usage
//!
//! ```bash
//! # List connected Android devices
//! tapwright devices
//!
//! # Read or toggle wifi on the first (or a named) device
//! tapwright wifi status
//! tapwright wifi off -d emulator-5554
//!
//! # Query a locator once on a live session
//! tapwright -c config/dev_caps.json probe ui-automator 'new UiSelector().clickable(true)'
//!
//! # Wait up to 5s for an element
//! tapwright probe accessibility-id login-button --wait 5000
//!
//! # Run a flow (credentials come from TEST_EMAIL / TEST_PASSWORD)
//! tapwright flow login
//! tapwright -f json flow chat-send --message "Hi AI, test"
//! ```
//!
//! Exit codes: `0` passed or skipped, `1` flow failed, `2` session error,
//! `3` config error, `4` adb error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tapwright_core::adb::{Adb, AdbError};
use tapwright_core::config::HarnessConfig;
use tapwright_core::finder::Finder;
use tapwright_core::flows::{Credentials, FlowReport, Verdict};
use tapwright_core::locator::{Locator, Strategy};
use tapwright_core::session::Harness;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Mobile UI test automation over Appium.
#[derive(Parser)]
#[command(name = "tapwright")]
#[command(about = "Probe locators and run tapwright flows against an Appium session")]
#[command(version)]
struct Cli {
    /// Harness config file (JSON)
    #[arg(short, long, env = "TAPWRIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Also write logs to ~/.tapwright/logs
    #[arg(long)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List connected Android devices
    Devices,

    /// Read or toggle wifi through adb
    Wifi {
        action: WifiAction,
        /// Device serial (defaults to adb's single device)
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Query a locator on a live session and print the matches
    Probe {
        strategy: StrategyArg,
        selector: String,
        /// Wait up to this many milliseconds for a first match
        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Run one flow on a live session
    Flow {
        flow: FlowName,
        #[command(flatten)]
        inputs: FlowInputs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum WifiAction {
    On,
    Off,
    Status,
    /// Open the system wifi settings screen
    Settings,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    UiAutomator,
    AccessibilityId,
    ClassName,
    Id,
    #[value(name = "xpath")]
    XPath,
    IosPredicate,
    IosClassChain,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::UiAutomator => Strategy::UiAutomator,
            StrategyArg::AccessibilityId => Strategy::AccessibilityId,
            StrategyArg::ClassName => Strategy::ClassName,
            StrategyArg::Id => Strategy::Id,
            StrategyArg::XPath => Strategy::XPath,
            StrategyArg::IosPredicate => Strategy::IosPredicate,
            StrategyArg::IosClassChain => Strategy::IosClassChain,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum FlowName {
    Login,
    LoginRejected,
    EmptyFields,
    Biometric,
    GoogleOauth,
    ChatSend,
    ChatReport,
}

#[derive(Args, Clone)]
struct FlowInputs {
    /// Account email
    #[arg(long, env = "TEST_EMAIL", default_value = "user@castalk.com")]
    email: String,

    /// Account password
    #[arg(long, env = "TEST_PASSWORD", default_value = "Password123", hide_env_values = true)]
    password: String,

    /// Password expected to be rejected
    #[arg(
        long,
        env = "TEST_WRONG_PASSWORD",
        default_value = "WrongPass123",
        hide_env_values = true
    )]
    wrong_password: String,

    /// Error text expected after a rejected sign-in
    #[arg(
        long,
        default_value = "Incorrect email address or password. Please try again."
    )]
    expected_error: String,

    /// Message sent by the chat flow
    #[arg(long, env = "TEST_AI_MESSAGE", default_value = "Hi AI, test")]
    message: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn logs_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tapwright")
        .join("logs")
}

/// Human-readable logs on stderr, plus a daily JSON log file when asked.
fn init_tracing(log_file: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let dir = logs_dir();
    if log_file && std::fs::create_dir_all(&dir).is_ok() {
        let appender = tracing_appender::rolling::daily(&dir, "tapwright.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_ansi(false),
            )
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        None
    }
}

#[derive(Debug)]
enum CliError {
    FlowFailed(String),
    Session(String),
    Config(String),
    Shell(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::FlowFailed(_) => ExitCode::from(1),
            CliError::Session(_) => ExitCode::from(2),
            CliError::Config(_) => ExitCode::from(3),
            CliError::Shell(_) => ExitCode::from(4),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::FlowFailed(msg) => write!(f, "Flow failed: {}", msg),
            CliError::Session(msg) => write!(f, "Session error: {}", msg),
            CliError::Config(msg) => write!(f, "Config error: {}", msg),
            CliError::Shell(msg) => write!(f, "adb error: {}", msg),
        }
    }
}

impl From<AdbError> for CliError {
    fn from(e: AdbError) -> Self {
        CliError::Shell(e.to_string())
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Devices => list_devices(cli.format).await,
        Command::Wifi { action, ref device } => wifi(cli.format, action, device.clone()).await,
        Command::Probe {
            strategy,
            ref selector,
            wait,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let locator = Locator::new(strategy.into(), selector.clone());
            probe(cli.format, config, locator, wait.map(Duration::from_millis)).await
        }
        Command::Flow { flow, ref inputs } => {
            let config = load_config(cli.config.as_deref())?;
            run_flow(cli.format, config, flow, inputs.clone()).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<HarnessConfig, CliError> {
    match path {
        Some(path) => HarnessConfig::from_file(path)
            .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e))),
        None => Ok(HarnessConfig::default()),
    }
}

async fn connect(config: HarnessConfig) -> Result<Harness, CliError> {
    let server = config.server_url.clone();
    let harness = Harness::connect(config)
        .await
        .map_err(|e| CliError::Session(format!("Failed to open session on {}: {}", server, e)))?;
    info!(run_id = %harness.run_id(), "session opened");
    Ok(harness)
}

/// Runs a blocking adb call off the async runtime.
async fn adb<T, F>(call: F) -> Result<T, CliError>
where
    F: FnOnce() -> Result<T, AdbError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| CliError::Shell(e.to_string()))?
        .map_err(CliError::from)
}

async fn list_devices(format: OutputFormat) -> Result<(), CliError> {
    let devices = adb(Adb::list_devices).await?;
    if format == OutputFormat::Json {
        println!(
            "{}",
            serde_json::to_string_pretty(&devices).map_err(|e| CliError::Shell(e.to_string()))?
        );
    } else if devices.is_empty() {
        eprintln!("No Android devices found");
    } else {
        for device in &devices {
            println!("{} -- {}", device.serial, device.state);
        }
    }
    Ok(())
}

async fn wifi(
    format: OutputFormat,
    action: WifiAction,
    device: Option<String>,
) -> Result<(), CliError> {
    let enabled = match action {
        WifiAction::On | WifiAction::Off => {
            let enable = matches!(action, WifiAction::On);
            adb(move || Adb::set_wifi(device.as_deref(), enable)).await?;
            Some(enable)
        }
        WifiAction::Status => adb(move || Adb::wifi_state(device.as_deref())).await?,
        WifiAction::Settings => {
            adb(move || Adb::open_wifi_settings(device.as_deref())).await?;
            return Ok(());
        }
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::json!({ "wifi": enabled }));
    } else {
        match enabled {
            Some(true) => println!("wifi on"),
            Some(false) => println!("wifi off"),
            None => println!("wifi unknown"),
        }
    }
    Ok(())
}

async fn probe(
    format: OutputFormat,
    config: HarnessConfig,
    locator: Locator,
    wait: Option<Duration>,
) -> Result<(), CliError> {
    let harness = connect(config).await?;

    let hits = harness
        .run(|harness| async move {
            let finder = Finder::new(harness.session().clone(), harness.poller());
            let found = match wait {
                Some(timeout) => match finder.wait(&locator, timeout).await {
                    Ok(element) => vec![element],
                    Err(e) => return Err(CliError::FlowFailed(e.to_string())),
                },
                None => finder.probe_all(&locator).await,
            };

            let mut hits = Vec::with_capacity(found.len());
            for element in found {
                let text = harness.session().text(&element).await.ok();
                let frame = harness.session().bounds(&element).await.ok();
                hits.push(serde_json::json!({
                    "id": element.id(),
                    "text": text,
                    "frame": frame,
                }));
            }
            Ok(hits)
        })
        .await?;

    if format == OutputFormat::Json {
        println!(
            "{}",
            serde_json::to_string_pretty(&hits).map_err(|e| CliError::Session(e.to_string()))?
        );
    } else if hits.is_empty() {
        eprintln!("No elements matched");
    } else {
        for hit in &hits {
            let text = hit["text"].as_str().unwrap_or("");
            println!("{} {:?}", hit["id"].as_str().unwrap_or("?"), text);
        }
    }
    Ok(())
}

async fn run_flow(
    format: OutputFormat,
    config: HarnessConfig,
    flow: FlowName,
    inputs: FlowInputs,
) -> Result<(), CliError> {
    let harness = connect(config).await?;

    let report: FlowReport = harness
        .run(|harness| async move {
            let creds = Credentials::new(inputs.email.as_str(), inputs.password.as_str());
            match flow {
                FlowName::Login => harness.auth().login(&creds).await,
                FlowName::LoginRejected => {
                    let wrong = Credentials::new(inputs.email, inputs.wrong_password);
                    harness
                        .auth()
                        .login_rejected(&wrong, &inputs.expected_error)
                        .await
                }
                FlowName::EmptyFields => harness.auth().validate_empty_fields(&creds).await,
                FlowName::Biometric => harness.auth().biometric_login().await,
                FlowName::GoogleOauth => harness.auth().google_oauth_starts().await,
                FlowName::ChatSend => harness.chat().send_flow(&inputs.message).await,
                FlowName::ChatReport => harness.chat().report_flow().await,
            }
        })
        .await;

    if format == OutputFormat::Json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).map_err(|e| CliError::Session(e.to_string()))?
        );
    } else {
        print!("{}", report);
    }

    match report.verdict() {
        Verdict::Passed => Ok(()),
        Verdict::Skipped => {
            if let Some(step) = report.stopped_at() {
                eprintln!("Skipped at step '{}'", step.name);
            }
            Ok(())
        }
        Verdict::Failed => Err(CliError::FlowFailed(
            report
                .stopped_at()
                .map(|step| step.name.clone())
                .unwrap_or_else(|| report.flow.clone()),
        )),
    }
}
