use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollcall::attendance::AttendanceService;
use rollcall::audit::AuditTrail;
use rollcall::card::CardPolicy;
use rollcall::config::Config;
use rollcall::driver::SchedulerDriver;
use rollcall::materializer::Materializer;
use rollcall::models::{ActorId, EventSeries, ParticipationAction};
use rollcall::recurrence::Recurrence;
use rollcall::storage::{InstanceRepository, SeriesRepository, SharedStore, SqliteStore};
use rollcall::transport::{
    AdminDirectory, AnnouncementPublisher, AttendanceFormatter, DefaultFormatter,
    DisabledTransport, WebhookConfig, WebhookTransport,
};

#[derive(Parser)]
#[command(
    name = "rollcall",
    version,
    about = "Recurring event materialization and attendance tracking for group chats",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler loop until interrupted
    Serve,

    /// Run one materialization pass and exit
    Materialize,

    /// Publish the announcement for an unannounced instance
    Announce {
        /// Instance id
        instance_id: String,
    },

    /// Manage event series
    Series {
        #[command(subcommand)]
        command: SeriesCommands,
    },

    /// Record a vote on an instance
    Vote {
        /// Instance id
        instance_id: String,

        /// Acting user id
        #[arg(short, long)]
        actor: i64,

        /// Action to record (JOIN, PLUS_ONE, LEAVE)
        #[arg(short = 'A', long)]
        action: String,
    },

    /// Admin interventions
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand)]
enum SeriesCommands {
    /// List active series with their upcoming instances
    List {
        /// Restrict to one tenant
        #[arg(short, long)]
        tenant: Option<String>,
    },

    /// Create a new series
    Create {
        /// Owning tenant id
        #[arg(short, long)]
        tenant: String,

        /// Event title
        #[arg(long)]
        title: String,

        /// Recurrence rule, e.g. FREQ=WEEKLY;BYDAY=MO;DTSTART=20240101T180000Z
        #[arg(short, long)]
        rule: String,

        /// Announcement chat id
        #[arg(long)]
        chat_id: Option<i64>,

        /// Topic inside the chat
        #[arg(long)]
        topic_id: Option<i64>,

        /// Participant limit (0 = unlimited)
        #[arg(long)]
        limit: Option<u32>,

        /// Event duration in minutes
        #[arg(long)]
        duration: Option<u32>,

        /// Timezone label shown to users
        #[arg(long, default_value = "Europe/Helsinki")]
        timezone: String,
    },

    /// Deactivate a series (soft delete)
    Deactivate {
        /// Series id
        series_id: String,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Add a participant on their behalf
    Add {
        instance_id: String,
        #[arg(short, long)]
        actor: i64,
        #[arg(long)]
        admin: String,
    },

    /// Remove a participant on their behalf
    Remove {
        instance_id: String,
        #[arg(short, long)]
        actor: i64,
        #[arg(long)]
        admin: String,
    },

    /// Close registration ahead of the cutoff
    CloseRegistration {
        instance_id: String,
        #[arg(long)]
        admin: String,
    },

    /// Hold registration open past the cutoff
    ExtendRegistration {
        instance_id: String,
        #[arg(long)]
        admin: String,
    },

    /// Show the audit history of an instance
    History {
        instance_id: String,

        /// Entries to show (0 = all)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

struct Components {
    store: SharedStore,
    publisher: Arc<dyn AnnouncementPublisher>,
    admins: Arc<dyn AdminDirectory>,
    formatter: Arc<dyn AttendanceFormatter>,
    config: Config,
}

fn build_components() -> Result<Components> {
    let config = Config::from_env()?;
    config.validate()?;

    let store: SharedStore = Arc::new(SqliteStore::new(&config.database.sqlite_path)?);

    let (publisher, admins): (Arc<dyn AnnouncementPublisher>, Arc<dyn AdminDirectory>) =
        match &config.transport.webhook_url {
            Some(url) => {
                let mut webhook_config = WebhookConfig::new(url)
                    .with_timeout(config.transport.timeout_secs)
                    .with_max_retries(config.transport.max_retries);
                if let Some(token) = &config.transport.webhook_token {
                    webhook_config = webhook_config.with_auth_token(token);
                }
                let transport = Arc::new(WebhookTransport::new(webhook_config)?);
                (transport.clone(), transport)
            }
            None => {
                tracing::warn!("no webhook URL configured, outbound delivery disabled");
                let transport = Arc::new(DisabledTransport);
                (transport.clone(), transport)
            }
        };

    Ok(Components {
        store,
        publisher,
        admins,
        formatter: Arc::new(DefaultFormatter),
        config,
    })
}

fn build_materializer(c: &Components) -> Arc<Materializer> {
    Arc::new(Materializer::new(
        c.store.clone(),
        c.publisher.clone(),
        c.admins.clone(),
        c.formatter.clone(),
        c.config.horizon(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    match cli.command {
        Commands::Serve => serve().await?,
        Commands::Materialize => materialize().await?,
        Commands::Announce { instance_id } => announce(&instance_id).await?,
        Commands::Series { command } => series(command).await?,
        Commands::Vote {
            instance_id,
            actor,
            action,
        } => vote(&instance_id, actor, &action).await?,
        Commands::Admin { command } => admin(command).await?,
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("rollcall=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("rollcall=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn serve() -> Result<()> {
    let components = build_components()?;
    let materializer = build_materializer(&components);
    let driver = SchedulerDriver::new(materializer, components.config.interval());

    tracing::info!("rollcall scheduler starting");
    let runner = driver.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    driver.stop();
    handle.await?;

    let status = driver.status();
    tracing::info!(
        runs = status.runs_completed,
        skipped = status.ticks_skipped,
        "scheduler stopped"
    );
    Ok(())
}

async fn materialize() -> Result<()> {
    let components = build_components()?;
    let materializer = build_materializer(&components);
    let report = materializer.run().await?;
    println!("Materialization complete: {report}");
    for (series_id, error) in &report.failures {
        println!("  failed: {series_id}: {error}");
    }
    Ok(())
}

async fn announce(instance_id: &str) -> Result<()> {
    let components = build_components()?;
    let materializer = build_materializer(&components);
    let handle = materializer.announce_instance(instance_id).await?;
    println!(
        "Announced instance {instance_id} as message {} in chat {}",
        handle.message_id, handle.chat_id
    );
    Ok(())
}

async fn series(command: SeriesCommands) -> Result<()> {
    let components = build_components()?;
    let store = &components.store;

    match command {
        SeriesCommands::List { tenant } => {
            let list = match tenant {
                Some(tenant) => store.list_active_series_for_tenant(&tenant)?,
                None => store.list_active_series()?,
            };
            if list.is_empty() {
                println!("No active series.");
                return Ok(());
            }
            for series in list {
                println!(
                    "{}  {}  [{}]  {}",
                    series.id,
                    series.title,
                    series.tenant_id,
                    series.recurrence.to_rule_string()
                );
                let upcoming = store.upcoming_instances(&series.id, Utc::now(), 3)?;
                for instance in upcoming {
                    let marker = if instance.is_announced() { "*" } else { " " };
                    println!("  {marker} {}  {}", instance.id, instance.start_time);
                }
            }
        }

        SeriesCommands::Create {
            tenant,
            title,
            rule,
            chat_id,
            topic_id,
            limit,
            duration,
            timezone,
        } => {
            let recurrence = Recurrence::parse(&rule, Utc::now())?;
            let mut series =
                EventSeries::new(tenant, title, recurrence).with_timezone(timezone);
            if let Some(chat_id) = chat_id {
                series = series.with_channel(chat_id, topic_id);
            }
            series.max_participants = limit;
            series.duration_minutes = duration;
            store.create_series(&series)?;
            println!("Created series {}", series.id);
        }

        SeriesCommands::Deactivate { series_id } => {
            if store.set_series_active(&series_id, false)? {
                println!("Deactivated series {series_id}");
            } else {
                println!("Series {series_id} not found");
            }
        }
    }
    Ok(())
}

async fn vote(instance_id: &str, actor: i64, action: &str) -> Result<()> {
    let components = build_components()?;
    let action: ParticipationAction = action.parse()?;
    let service = AttendanceService::new(
        components.store.clone(),
        components.publisher.clone(),
        components.formatter.clone(),
        CardPolicy {
            registration_lead_hours: components.config.scheduler.registration_lead_hours,
        },
    );

    service.cast_vote(instance_id, ActorId(actor), action).await?;
    let participants = service.participants(instance_id)?;
    println!(
        "Recorded {} for actor {actor}; {} now going",
        action.as_str(),
        participants.len()
    );
    Ok(())
}

async fn admin(command: AdminCommands) -> Result<()> {
    let components = build_components()?;
    let trail = AuditTrail::new(components.store.clone());
    let service = AttendanceService::new(
        components.store.clone(),
        components.publisher.clone(),
        components.formatter.clone(),
        CardPolicy {
            registration_lead_hours: components.config.scheduler.registration_lead_hours,
        },
    );

    match command {
        AdminCommands::Add {
            instance_id,
            actor,
            admin,
        } => {
            trail.add_participant(&instance_id, ActorId(actor), &admin)?;
            service.refresh_announcement(&instance_id).await;
            println!("Added actor {actor} to instance {instance_id}");
        }

        AdminCommands::Remove {
            instance_id,
            actor,
            admin,
        } => {
            trail.remove_participant(&instance_id, ActorId(actor), &admin)?;
            service.refresh_announcement(&instance_id).await;
            println!("Removed actor {actor} from instance {instance_id}");
        }

        AdminCommands::CloseRegistration { instance_id, admin } => {
            trail.close_registration(&instance_id, &admin)?;
            println!("Registration closed for instance {instance_id}");
        }

        AdminCommands::ExtendRegistration { instance_id, admin } => {
            trail.extend_registration(&instance_id, &admin)?;
            println!("Registration extended for instance {instance_id}");
        }

        AdminCommands::History { instance_id, limit } => {
            let page = trail.history(&instance_id, limit)?;
            if page.records.is_empty() {
                println!("No audit entries for instance {instance_id}");
                return Ok(());
            }
            for record in &page.records {
                println!("{}", AuditTrail::format_entry(record));
            }
            if page.has_more {
                println!("... {} of {} entries shown", page.records.len(), page.total);
            }
        }
    }
    Ok(())
}
