//! socialbar-probe: exercise the user-data bridge from several UI threads.
//!
//! Each simulated UI thread gets its own observer from a shared registry,
//! logs in, queries everything, optionally receives a push from the
//! simulated service, and prints its cache snapshot as JSON.
//!
//!   socialbar-probe --threads 3 --latency-ms 200 --push friends
//!
//! Set SOCIALBAR_LOG_JSON=1 for JSON logs. RUST_LOG adds filter directives on
//! top of the `socialbar_core=info` baseline.

use std::path::PathBuf;
use std::sync::{mpsc, Arc, Barrier};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use socialbar_core::{BridgeConfig, Registry, UserDataObserver, ViewChange};
use socialbar_session::memory::MemoryService;
use socialbar_session::{ChangeNotification, Counter, Friend, SessionEvent, UserData};

#[derive(Parser)]
#[command(name = "socialbar-probe", about = "Exercise the socialbar user-data bridge")]
struct Args {
    /// Number of simulated UI threads
    #[arg(long, default_value_t = 2)]
    threads: usize,

    /// Artificial latency of every session call, in milliseconds
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    /// Bridge config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Push a change notification once every thread has its data
    #[arg(long, value_enum)]
    push: Option<PushKind>,

    /// Make the service answer the first N user lookups with an empty record
    #[arg(long, default_value_t = 0)]
    empty_user: u32,
}

#[derive(Clone, Copy, ValueEnum)]
enum PushKind {
    Friends,
    Counts,
    User,
    Login,
    Language,
}

impl PushKind {
    fn event(self) -> SessionEvent {
        match self {
            PushKind::Friends => SessionEvent::DataChanged(ChangeNotification::Friends),
            PushKind::Counts => SessionEvent::DataChanged(ChangeNotification::Counts),
            PushKind::User => SessionEvent::DataChanged(ChangeNotification::LoggedInUser),
            PushKind::Login => SessionEvent::DataChanged(ChangeNotification::LoginState),
            PushKind::Language => SessionEvent::LanguageChanged,
        }
    }
}

fn main() -> Result<()> {
    socialbar_core::logging::init()?;
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    tracing::info!(threads = args.threads, ?config, "starting probe");

    let service = demo_service();
    service.set_latency(Duration::from_millis(args.latency_ms));
    service.return_empty_user(args.empty_user);

    let registry = Arc::new(Registry::new(service.factory(), config));
    let wait = registry.config().wait_timeout();
    // Every UI thread plus main meets here twice: once when data is loaded,
    // once after the push went out.
    let barrier = Arc::new(Barrier::new(args.threads + 1));
    let expect_push = args.push.is_some();

    let handles: Vec<_> = (0..args.threads)
        .map(|index| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            std::thread::Builder::new()
                .name(format!("ui-{index}"))
                .spawn(move || ui_thread(index, &registry, &barrier, expect_push, wait))
        })
        .collect::<Result<_, _>>()
        .context("spawning UI threads")?;

    barrier.wait();
    if let Some(kind) = args.push {
        if matches!(kind, PushKind::Friends) {
            service.set_friends(vec![friend(4, "dana", true)]);
        }
        tracing::info!("pushing change notification");
        service.push(kind.event());
    }
    barrier.wait();

    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("ui thread failed: {e:#}"),
            Err(_) => tracing::error!("ui thread panicked"),
        }
    }

    registry.clear_instances();
    Ok(())
}

fn ui_thread(
    index: usize,
    registry: &Registry,
    barrier: &Barrier,
    expect_push: bool,
    wait: Duration,
) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let loaded = registry.get_instance().map_err(anyhow::Error::from).and_then(|observer| {
        observer.subscribe(move |change: ViewChange| {
            let _ = tx.send(change);
        })?;
        load_everything(&observer)?;
        Ok(observer)
    });
    // Reach both meeting points even on failure so main never hangs.
    barrier.wait();
    barrier.wait();
    let observer = loaded?;

    if expect_push {
        match rx.recv_timeout(wait * 4) {
            Ok(change) => tracing::info!(index, ?change, "view change received"),
            Err(_) => tracing::warn!(index, "no view change before timeout"),
        }
    }

    let snapshot = observer.snapshot()?;
    let report = serde_json::json!({
        "thread": index,
        "snapshot": snapshot,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    registry.release_instance();
    Ok(())
}

fn load_everything(observer: &UserDataObserver) -> Result<()> {
    observer.login(true)?;
    observer.can_change_status(true)?;
    for counter in Counter::ALL {
        observer.count(counter, true)?;
    }
    observer.friends(true)?;
    let user = observer.logged_in_user(true)?;
    if user.is_empty() {
        tracing::warn!("logged-in user is still empty after retry");
    }
    Ok(())
}

fn friend(uid: u64, name: &str, online: bool) -> Friend {
    Friend {
        uid,
        name: name.to_string(),
        status: None,
        online,
        picture_url: None,
    }
}

fn demo_service() -> MemoryService {
    let service = MemoryService::new();
    service.set_can_change_status(true);
    service.set_count(Counter::Pokes, 1);
    service.set_count(Counter::Messages, 3);
    service.set_count(Counter::Requests, 2);
    service.set_count(Counter::Events, 0);
    service.set_count(Counter::GroupInvites, 1);
    service.set_friends(vec![
        friend(1, "alice", true),
        friend(2, "bob", false),
        friend(3, "carol", true),
    ]);
    service.set_user(UserData {
        uid: 42,
        name: "probe user".to_string(),
        status: Some("testing the toolbar".to_string()),
        picture_url: None,
    });
    service
}
