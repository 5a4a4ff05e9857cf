use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use tokio::time::sleep;

use crate::{
    config::{self, AppConfig, Profile},
    paths,
    state::{Health, Status, StatusSnapshot},
    supervisor::{Supervisor, probe_profile},
};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(
    name = "tunvisor",
    version,
    about = "Failover supervisor for frp-style tunnel clients"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Command::Run(args) => run(args).await,
            Command::Check(args) => check(args).await,
            Command::Profiles(args) => profiles(args),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Supervise the tunnel client in the foreground
    Run(RunArgs),
    /// Probe the health of one profile and exit
    Check(CheckArgs),
    /// List configured profiles
    Profiles(ProfilesArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the tunvisor config file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
    /// Disable automatic failover between profiles
    #[arg(long)]
    pub no_auto: bool,
    /// Emit status transitions as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the tunvisor config file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
    /// Profile to probe; defaults to the active profile, then the first
    /// enabled one
    #[arg(long, short = 'p')]
    pub profile: Option<String>,
}

#[derive(Args, Debug)]
pub struct ProfilesArgs {
    /// Path to the tunvisor config file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
    /// Emit the profile list as JSON
    #[arg(long)]
    pub json: bool,
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let path = path.unwrap_or_else(paths::default_config_path);
    config::load_from_path(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config)?;
    if args.no_auto {
        config.auto_switch = false;
    }

    let supervisor = Supervisor::new(config);
    supervisor.start();

    let mut last_rendered = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                supervisor.stop();
                render(&supervisor.snapshot(), args.json, &mut last_rendered)?;
                return Ok(());
            }
            _ = sleep(POLL_INTERVAL) => {
                render(&supervisor.snapshot(), args.json, &mut last_rendered)?;
            }
        }
    }
}

type RenderKey = (
    Status,
    Option<String>,
    Health,
    Option<String>,
    Option<String>,
);

/// Prints one line per observable transition; quiet while nothing
/// changes.
fn render(snapshot: &StatusSnapshot, json: bool, last: &mut Option<RenderKey>) -> Result<()> {
    let key = (
        snapshot.status,
        snapshot.profile.clone(),
        snapshot.health,
        snapshot.last_error.clone(),
        snapshot.health_error.clone(),
    );
    if last.as_ref() == Some(&key) {
        return Ok(());
    }
    *last = Some(key);

    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }

    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut line = format!(
        "{timestamp} | {status:<8} | {profile} | health={health}",
        status = snapshot.status.label(),
        profile = snapshot.profile.as_deref().unwrap_or("-"),
        health = snapshot.health.label(),
    );
    if let Some(error) = &snapshot.last_error {
        line.push_str(" | ");
        line.push_str(error);
    }
    println!("{line}");
    Ok(())
}

async fn check(args: CheckArgs) -> Result<()> {
    let config = load_config(args.config)?;
    let profile = select_profile(&config, args.profile.as_deref())?;
    match probe_profile(profile).await {
        Ok(()) => {
            println!("{}: ok", profile.name);
            Ok(())
        }
        Err(err) => bail!("{}: {err}", profile.name),
    }
}

fn select_profile<'a>(config: &'a AppConfig, requested: Option<&str>) -> Result<&'a Profile> {
    if let Some(name) = requested {
        return config
            .profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| anyhow!("profile '{name}' not found"));
    }

    if let Some(active) = config.active_profile.as_deref() {
        if let Some(profile) = config.profiles.iter().find(|p| p.name == active) {
            return Ok(profile);
        }
    }

    config
        .profiles
        .iter()
        .find(|p| p.enabled)
        .ok_or_else(|| anyhow!("no enabled profiles"))
}

fn profiles(args: ProfilesArgs) -> Result<()> {
    let config = load_config(args.config)?;

    if args.json {
        let rows: Vec<_> = config
            .profiles
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "enabled": p.enabled,
                    "server": p.server_endpoint().map(|(addr, port)| format!("{addr}:{port}")),
                    "require_status": p.require_status,
                    "active": config.active_profile.as_deref() == Some(p.name.as_str()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if config.profiles.is_empty() {
        println!("no profiles configured");
        return Ok(());
    }

    for profile in &config.profiles {
        let marker = if config.active_profile.as_deref() == Some(profile.name.as_str()) {
            "*"
        } else {
            " "
        };
        let enabled = if profile.enabled { "enabled" } else { "disabled" };
        let server = profile
            .server_endpoint()
            .map(|(addr, port)| format!("{addr}:{port}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{marker} {name:<20} {enabled:<8} {server}",
            name = profile.name
        );
    }
    Ok(())
}
