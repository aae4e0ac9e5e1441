//! adwarden-ctl - command-line client for adwardend

mod render;

use adwarden_api::{Command, ResponsePayload, RunState, SettingPatch};
use adwarden_config::{parse_days, parse_hour, RawDays, RawHour};
use adwarden_ipc::IpcClient;
use adwarden_util::{default_socket_path, EntityId, ShiftWindow};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "adwarden-ctl", version, about = "Inspect and configure adwardend")]
struct Cli {
    /// Socket path (or set ADWARDEN_SOCKET env var)
    #[arg(short, long, env = "ADWARDEN_SOCKET", default_value_os_t = default_socket_path())]
    socket: PathBuf,

    /// Name recorded in the audit log for changes
    #[arg(short, long, env = "USER", default_value = "unknown")]
    user: String,

    /// Print raw JSON payloads
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Entities with their schedule and budget evaluation
    Status {
        /// Fetch from the platform even if a recent result is cached
        #[arg(long)]
        refresh: bool,
    },
    /// List stored entity settings
    Settings,
    /// List shifts
    Shifts,
    /// Change one entity's setting
    Set {
        entity_id: String,
        /// Comma-separated shift names, replacing the current assignment
        #[arg(long, value_delimiter = ',')]
        shifts: Option<Vec<String>>,
        /// Spend limit as a percentage of the daily budget
        #[arg(long)]
        limit: Option<f64>,
        #[arg(long, conflicts_with = "unfreeze")]
        freeze: bool,
        #[arg(long)]
        unfreeze: bool,
        /// Free-text note for the audit log
        #[arg(long)]
        note: Option<String>,
    },
    /// Set the spend limit of several entities at once
    BulkLimit {
        #[arg(required = true)]
        entity_ids: Vec<String>,
        #[arg(long)]
        limit: f64,
    },
    /// Clear the frozen flag on every entity
    ClearFrozen,
    /// Replace a shift's window
    Shift {
        name: String,
        /// "weekdays", "weekends", "all", day names or indices (0 = Monday)
        #[arg(long)]
        days: String,
        /// Start hour, "HH:MM" or fractional
        #[arg(long)]
        start: String,
        /// End hour (exclusive), "HH:MM" or fractional
        #[arg(long)]
        end: String,
    },
    /// Flip the automation master switch
    Toggle,
    /// Start or pause entities right now (the next tick may undo it)
    Run {
        state: StateArg,
        #[arg(required = true)]
        entity_ids: Vec<String>,
    },
    /// Start or pause entities once at a later time
    Schedule {
        state: StateArg,
        #[arg(required = true)]
        entity_ids: Vec<String>,
        /// RFC 3339 time, e.g. 2025-12-30T20:00:00-06:00
        #[arg(long)]
        at: String,
    },
    /// Recent audit log entries
    Audit {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Service health
    Health,
    /// Print events as they arrive
    Watch,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StateArg {
    Running,
    Paused,
}

impl From<StateArg> for RunState {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::Running => RunState::Running,
            StateArg::Paused => RunState::Paused,
        }
    }
}

fn days_arg(days: &str) -> Result<RawDays> {
    let parts: Vec<String> = days.split(',').map(|d| d.trim().to_string()).collect();
    if parts.len() == 1 && parts[0].parse::<u8>().is_err() {
        return Ok(RawDays::Preset(parts[0].clone()));
    }
    if parts.iter().all(|p| p.parse::<u8>().is_ok()) {
        let indices = parts.iter().filter_map(|p| p.parse().ok()).collect();
        return Ok(RawDays::Indices(indices));
    }
    Ok(RawDays::List(parts))
}

fn hour_arg(hour: &str) -> RawHour {
    match hour.parse::<f64>() {
        Ok(h) => RawHour::Fractional(h),
        Err(_) => RawHour::Clock(hour.to_string()),
    }
}

fn shift_window(days: &str, start: &str, end: &str) -> Result<ShiftWindow> {
    let days = parse_days(&days_arg(days)?).map_err(anyhow::Error::msg)?;
    let start = parse_hour(&hour_arg(start)).map_err(anyhow::Error::msg)?;
    let end = parse_hour(&hour_arg(end)).map_err(anyhow::Error::msg)?;
    ShiftWindow::new(days, start, end).map_err(anyhow::Error::msg)
}

fn execute_at(at: &str) -> Result<DateTime<Utc>> {
    let at = DateTime::parse_from_rfc3339(at)
        .with_context(|| format!("Invalid time {:?}, expected RFC 3339", at))?;
    Ok(at.with_timezone(&Utc))
}

fn ids_arg(ids: Vec<String>) -> Vec<EntityId> {
    ids.into_iter().map(EntityId::new).collect()
}

fn to_command(command: Commands, user: String) -> Result<Command> {
    Ok(match command {
        Commands::Status { refresh } => Command::GetSnapshot { refresh },
        Commands::Settings => Command::ListSettings,
        Commands::Shifts => Command::ListShifts,
        Commands::Set {
            entity_id,
            shifts,
            limit,
            freeze,
            unfreeze,
            note,
        } => {
            let frozen = match (freeze, unfreeze) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let patch = SettingPatch {
                assigned_shifts: shifts,
                spend_limit_percent: limit,
                frozen,
            };
            if patch.is_empty() {
                bail!("Nothing to change: pass --shifts, --limit, --freeze or --unfreeze");
            }
            Command::UpdateSetting {
                entity_id: EntityId::new(entity_id),
                patch,
                user,
                note,
            }
        }
        Commands::BulkLimit { entity_ids, limit } => Command::BulkUpdateSettings {
            entity_ids: ids_arg(entity_ids),
            patch: SettingPatch {
                spend_limit_percent: Some(limit),
                ..Default::default()
            },
            user,
        },
        Commands::ClearFrozen => Command::ClearFrozen { user },
        Commands::Shift {
            name,
            days,
            start,
            end,
        } => Command::UpdateShift {
            name,
            window: shift_window(&days, &start, &end)?,
            user,
        },
        Commands::Toggle => Command::ToggleAutomation { user },
        Commands::Run { state, entity_ids } => Command::SetRunState {
            entity_ids: ids_arg(entity_ids),
            state: state.into(),
            user,
        },
        Commands::Schedule {
            state,
            entity_ids,
            at,
        } => Command::ScheduleRunState {
            entity_ids: ids_arg(entity_ids),
            state: state.into(),
            execute_at: execute_at(&at)?,
            user,
        },
        Commands::Audit { limit } => Command::GetAudit { limit },
        Commands::Health => Command::GetHealth,
        Commands::Watch => Command::SubscribeEvents,
    })
}

async fn watch(client: IpcClient, json: bool) -> Result<()> {
    let mut events = client.subscribe().await.context("Failed to subscribe")?;
    loop {
        let event = events.next().await?;
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("{}", render::event_line(&event));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut client = IpcClient::connect(&cli.socket)
        .await
        .with_context(|| format!("Failed to connect to adwardend at {:?}", cli.socket))?;

    if matches!(cli.command, Commands::Watch) {
        return watch(client, cli.json).await;
    }

    let command = to_command(cli.command, cli.user)?;
    let payload: ResponsePayload = client.request(command).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print!("{}", render::payload(&payload));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use adwarden_util::DaysOfWeek;

    #[test]
    fn shift_arguments_accept_presets_and_clock_times() {
        let window = shift_window("weekdays", "06:30", "13").unwrap();
        assert_eq!(window.days, DaysOfWeek::WEEKDAYS);
        assert_eq!(window.start_hour, 6.5);
        assert_eq!(window.end_hour, 13.0);

        let window = shift_window("5,6", "8", "14").unwrap();
        assert_eq!(window.days, DaysOfWeek::WEEKENDS);

        let window = shift_window("sat,sun", "8", "14").unwrap();
        assert_eq!(window.days, DaysOfWeek::WEEKENDS);

        assert!(shift_window("weekdays", "14", "9").is_err());
        assert!(shift_window("someday", "8", "9").is_err());
    }

    #[test]
    fn set_requires_a_change() {
        let cli = Cli::parse_from(["adwarden-ctl", "set", "123"]);
        assert!(to_command(cli.command, "ops".into()).is_err());

        let cli = Cli::parse_from([
            "adwarden-ctl",
            "set",
            "123",
            "--shifts",
            "morning,weekend",
            "--freeze",
        ]);
        match to_command(cli.command, "ops".into()).unwrap() {
            Command::UpdateSetting { patch, .. } => {
                assert_eq!(
                    patch.assigned_shifts,
                    Some(vec!["morning".into(), "weekend".into()])
                );
                assert_eq!(patch.frozen, Some(true));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn run_maps_state_and_ids() {
        let cli = Cli::parse_from(["adwarden-ctl", "run", "paused", "123", "456"]);
        match to_command(cli.command, "ops".into()).unwrap() {
            Command::SetRunState { entity_ids, state, .. } => {
                assert_eq!(state, RunState::Paused);
                assert_eq!(entity_ids, vec![EntityId::new("123"), EntityId::new("456")]);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["adwarden-ctl", "run", "paused"]).is_err());
    }

    #[test]
    fn schedule_takes_an_offset_time() {
        let cli = Cli::parse_from([
            "adwarden-ctl",
            "schedule",
            "running",
            "123",
            "--at",
            "2025-12-30T20:00:00-06:00",
        ]);
        match to_command(cli.command, "ops".into()).unwrap() {
            Command::ScheduleRunState { execute_at, state, .. } => {
                assert_eq!(state, RunState::Running);
                assert_eq!(execute_at.to_rfc3339(), "2025-12-31T02:00:00+00:00");
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::parse_from(["adwarden-ctl", "schedule", "paused", "123", "--at", "8pm"]);
        assert!(to_command(cli.command, "ops".into()).is_err());
    }
}
