use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use prettytable::{Table, row};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use hey_jack::api::{self, AppState};
use hey_jack::community::birthdays::upcoming_birthdays;
use hey_jack::community::dashboard::{load_dashboard, members_of};
use hey_jack::community::events::activate_upcoming;
use hey_jack::community::import::import_members_csv;
use hey_jack::community::models::{Community, CommunityStatus};
use hey_jack::community::sync::{diagnose, repair_member_links, sync_contributors};
use hey_jack::config::Config;
use hey_jack::notify::{Dispatcher, mailer_from_config};
use hey_jack::session::SessionKeys;
use hey_jack::store::{Store, Table as StoreTable};

#[derive(Parser)]
#[command(name = "heyjack", version, about = "Hey Jack server and maintenance tools")]
struct Cli {
    /// Also append log lines to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve,
    /// Row counts per table.
    Status,
    /// Birthdays inside the look-ahead window.
    Upcoming {
        #[arg(long)]
        community: Option<String>,
        #[arg(long)]
        days: Option<i64>,
    },
    /// Print one community's dashboard.
    Dashboard { community: String },
    /// Import members from a roster CSV.
    Seed { community: String, csv: PathBuf },
    /// Bring contributor rows in line with the member table.
    Sync {
        #[arg(long)]
        community: Option<String>,
    },
    /// Link contributors without a member by email or name.
    RepairLinks,
    /// Report contributor inconsistencies without changing anything.
    Diagnose,
    /// Open a collection for every upcoming birthday.
    ActivateUpcoming,
    /// Send reminders for one collection.
    Notify {
        #[command(subcommand)]
        channel: NotifyChannel,
    },
}

#[derive(Subcommand)]
enum NotifyChannel {
    Email {
        active_event: String,
        /// Contributor ids; defaults to everyone still pending.
        #[arg(long = "to")]
        to: Vec<String>,
        /// Resend to contributors already notified.
        #[arg(long)]
        force: bool,
    },
    Whatsapp {
        active_event: String,
        #[arg(long = "to")]
        to: Vec<String>,
    },
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file: File = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hey_jack=info,tower_http=info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let result = run(cli.command).await;
    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "command failed");
    }
    result
}

async fn run(command: Command) -> Result<()> {
    let cfg = Config::load()?;
    let store = Store::connect(&cfg).await?;

    match command {
        Command::Serve => {
            let sessions = SessionKeys::from_config(&cfg)?;
            let dispatcher = Dispatcher::new(store.clone(), mailer_from_config(&cfg.smtp)?);
            let state = AppState {
                store,
                cfg: Arc::new(cfg),
                sessions,
                dispatcher,
            };
            api::serve(state).await?;
        }
        Command::Status => {
            let mut table = Table::new();
            table.add_row(row!["table", "rows"]);
            for t in StoreTable::ALL {
                let rows = store.count(t).await?;
                table.add_row(row![t.as_str(), rows]);
            }
            table.printstd();
        }
        Command::Upcoming { community, days } => {
            let days = days.unwrap_or(cfg.birthday_window_days);
            let communities: Vec<Community> = match community {
                Some(id) => vec![
                    store
                        .get(&id)
                        .await?
                        .with_context(|| format!("community {id} not found"))?,
                ],
                None => store.all().await?,
            };
            let today = Utc::now().date_naive();
            let mut table = Table::new();
            table.add_row(row!["community", "child", "parent", "birthday", "days", "turning"]);
            for c in communities.iter().filter(|c| c.status == CommunityStatus::Active) {
                let members = members_of(&store, &c.id).await?;
                for b in upcoming_birthdays(&members, today, days) {
                    table.add_row(row![
                        c.id,
                        b.child_name,
                        b.parent_name,
                        b.next_birthday,
                        b.days_remaining,
                        b.turning
                    ]);
                }
            }
            table.printstd();
        }
        Command::Dashboard { community } => {
            let view = load_dashboard(
                &store,
                &community,
                Utc::now().date_naive(),
                cfg.birthday_window_days,
            )
            .await?;
            println!(
                "{} ({} members, {} per person)",
                view.community.name, view.member_count, view.community.contribution_amount
            );

            let mut birthdays = Table::new();
            birthdays.add_row(row!["child", "birthday", "days"]);
            for b in &view.upcoming_birthdays {
                birthdays.add_row(row![b.child_name, b.next_birthday, b.days_remaining]);
            }
            birthdays.printstd();

            let mut events = Table::new();
            events.add_row(row!["collection", "child", "date", "raised", "target", "%", "paid", "pending"]);
            for e in &view.events {
                events.add_row(row![
                    e.active_event.id,
                    e.active_event.child_name,
                    e.active_event.event_date,
                    e.summary.total_raised,
                    e.summary.target_amount,
                    e.summary.progress,
                    e.summary.paid_count,
                    e.summary.pending_count
                ]);
            }
            events.printstd();
        }
        Command::Seed { community, csv } => {
            let file = File::open(&csv).with_context(|| format!("cannot open {}", csv.display()))?;
            let report = import_members_csv(&store, &community, file, Utc::now()).await?;
            println!(
                "imported {}, skipped {} duplicates, {} rejected",
                report.imported,
                report.skipped_duplicates,
                report.errors.len()
            );
            for error in &report.errors {
                println!("  {error}");
            }
        }
        Command::Sync { community } => {
            let report = sync_contributors(&store, community.as_deref()).await?;
            println!(
                "created {}, updated {}, unchanged {}",
                report.created, report.updated, report.unchanged
            );
        }
        Command::RepairLinks => {
            let report = repair_member_links(&store, cfg.name_match_threshold).await?;
            println!(
                "linked {} by email, {} by name, {} unresolved",
                report.linked_by_email,
                report.linked_by_name,
                report.unresolved.len()
            );
            for id in &report.unresolved {
                println!("  unresolved: {id}");
            }
        }
        Command::Diagnose => {
            let report = diagnose(&store).await?;
            if report.is_clean() {
                println!("no issues found");
                return Ok(());
            }
            let mut table = Table::new();
            table.add_row(row!["issue", "detail"]);
            for id in &report.missing_member_link {
                table.add_row(row!["missing member link", id]);
            }
            for id in &report.orphan_links {
                table.add_row(row!["orphan link", id]);
            }
            for d in &report.drifted {
                table.add_row(row![
                    "drift",
                    format!("{} vs member {}: {}", d.contributor_id, d.member_id, d.fields.join(", "))
                ]);
            }
            for d in &report.duplicates {
                table.add_row(row![
                    "duplicate",
                    format!("{} on {}: {}", d.email, d.active_event_id, d.contributor_ids.join(", "))
                ]);
            }
            for g in &report.coverage_gaps {
                table.add_row(row![
                    "coverage gap",
                    format!("member {} missing from {}", g.member_id, g.active_event_id)
                ]);
            }
            table.printstd();
        }
        Command::ActivateUpcoming => {
            let now = Utc::now();
            let activated =
                activate_upcoming(&store, now.date_naive(), cfg.birthday_window_days, now).await?;
            let mut table = Table::new();
            table.add_row(row!["collection", "child", "date", "target", "contributors"]);
            for a in &activated {
                table.add_row(row![
                    a.active_event.id,
                    a.active_event.child_name,
                    a.active_event.event_date,
                    a.active_event.target_amount,
                    a.sync.created + a.sync.updated + a.sync.unchanged
                ]);
            }
            table.printstd();
        }
        Command::Notify { channel } => {
            let dispatcher = Dispatcher::new(store, mailer_from_config(&cfg.smtp)?);
            match channel {
                NotifyChannel::Email {
                    active_event,
                    to,
                    force,
                } => {
                    let report = dispatcher
                        .send_email_reminders(&active_event, &to, force, Utc::now())
                        .await?;
                    println!(
                        "sent {}, skipped {}, failed {}",
                        report.sent.len(),
                        report.skipped.len(),
                        report.failed.len()
                    );
                    for s in &report.skipped {
                        println!("  skipped {}: {}", s.contributor_id, s.reason);
                    }
                    for f in &report.failed {
                        println!("  failed {}: {}", f.contributor_id, f.error);
                    }
                }
                NotifyChannel::Whatsapp { active_event, to } => {
                    let links = dispatcher
                        .whatsapp_links(&active_event, &to, true, Utc::now())
                        .await?;
                    let pause = Duration::from_secs(cfg.whatsapp_pause_secs);
                    for (i, link) in links.iter().enumerate() {
                        if i > 0 {
                            tokio::time::sleep(pause).await;
                        }
                        match &link.url {
                            Some(url) => println!("{}: {url}", link.parent_name),
                            None => println!("{}: no WhatsApp number", link.parent_name),
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
