//! dosewatch-cli: command-line client for a running Dosewatch server
//!
//! # Subcommands
//! - `status`                                     — liveness probe
//! - `alarm`                                      — one alarm poll
//! - `watch [--interval <secs>]`                  — poll until interrupted
//! - `remind --token <t> --medicine <m> --time <HH:MM> [--dosage <d>] [--daily]`

use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:5001";
const DEFAULT_INTERVAL_SECS: u64 = 30;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "dosewatch-cli", version, about = "Dosewatch medicine reminder client")]
struct Cli {
    /// Dosewatch server URL (overrides DOSEWATCH_HTTP_URL env var)
    #[arg(long, env = "DOSEWATCH_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check that the server is up
    Status,

    /// Ask once whether a reminder is due right now
    Alarm,

    /// Poll the alarm endpoint until interrupted
    Watch {
        /// Seconds between polls
        #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
        interval: u64,
    },

    /// Submit a reminder
    Remind {
        /// Firebase ID token of the signed-in user
        #[arg(long, env = "DOSEWATCH_ID_TOKEN")]
        token: String,

        #[arg(long)]
        medicine: String,

        #[arg(long, default_value = "")]
        dosage: String,

        /// Local time of day, HH:MM (24-hour)
        #[arg(long)]
        time: String,

        /// Repeat every day
        #[arg(long)]
        daily: bool,
    },
}

// ============================================================================
// Wire types and pure helpers
// ============================================================================

/// Body of `GET /alarm_status`
#[derive(Debug, Deserialize, PartialEq)]
pub struct AlarmStatus {
    pub alarm: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Form fields for `POST /set_reminder`. `daily` is sent only when set, the
/// way a browser submits an unticked checkbox.
pub fn reminder_form(token: &str, medicine: &str, dosage: &str, time: &str, daily: bool) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("idToken", token.to_string()),
        ("medicine", medicine.to_string()),
        ("dosage", dosage.to_string()),
        ("time", time.to_string()),
    ];
    if daily {
        fields.push(("daily", "on".to_string()));
    }
    fields
}

/// Line to print for a poll result, or `None` when nothing new is due.
/// A reminder stays due for its whole minute, so a repeat of the previous
/// message is suppressed.
pub fn announcement(status: &AlarmStatus, previous: Option<&str>) -> Option<String> {
    if !status.alarm {
        return None;
    }
    let message = status.message.as_deref().unwrap_or("");
    if previous == Some(message) {
        return None;
    }
    Some(format!("⏰ {}", message))
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn fetch_alarm(client: &reqwest::blocking::Client, server: &str) -> anyhow::Result<AlarmStatus> {
    let url = format!("{}/alarm_status", server);
    let resp = client.get(&url).send()?;
    if !resp.status().is_success() {
        anyhow::bail!("server returned {} for {}", resp.status(), url);
    }
    Ok(resp.json()?)
}

fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    match client(10)?.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            println!("Dosewatch server: {}", r.text().unwrap_or_default().trim());
        }
        Ok(r) => {
            eprintln!("dosewatch-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("dosewatch-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn do_alarm(server: &str) -> anyhow::Result<()> {
    let status = fetch_alarm(&client(10)?, server)?;
    match announcement(&status, None) {
        Some(line) => println!("{}", line),
        None => println!("No alarm"),
    }
    Ok(())
}

fn do_watch(server: &str, interval: u64) -> anyhow::Result<()> {
    let client = client(10)?;
    let mut previous: Option<String> = None;
    eprintln!("Watching {} every {}s (Ctrl+C to stop)", server, interval);

    loop {
        match fetch_alarm(&client, server) {
            Ok(status) => {
                if let Some(line) = announcement(&status, previous.as_deref()) {
                    println!("{}", line);
                }
                previous = if status.alarm { status.message } else { None };
            }
            // Keep polling through transient outages.
            Err(e) => eprintln!("dosewatch-cli: poll failed: {}", e),
        }
        thread::sleep(Duration::from_secs(interval.max(1)));
    }
}

fn do_remind(server: &str, form: Vec<(&'static str, String)>) -> anyhow::Result<()> {
    let url = format!("{}/set_reminder", server);
    let resp = match client(30)?.post(&url).form(&form).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("dosewatch-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("dosewatch-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    println!("✅ Reminder saved");
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Status => do_status(&server),
        Commands::Alarm => do_alarm(&server),
        Commands::Watch { interval } => do_watch(&server, interval),
        Commands::Remind {
            token,
            medicine,
            dosage,
            time,
            daily,
        } => do_remind(&server, reminder_form(&token, &medicine, &dosage, &time, daily)),
    };

    if let Err(e) = result {
        eprintln!("dosewatch-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
