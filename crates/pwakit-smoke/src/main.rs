//! PWAKit Smoke Harness
//!
//! Drives a worker scope through its full event sequence with a scripted
//! page set: install, activate, offline fetches under both strategies,
//! page messaging, push and notification clicks. Prints a JSON verdict
//! and exits non-zero when any check fails.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};
use url::Url;

use pwakit_common::{init_logging, LogConfig};
use pwakit_sw::{
    FetchRequest, FetchResponse, FetchStrategy, MessageEvent, NetworkBackend, NotificationClick,
    OutboundMessage, PushConfig, ServiceWorkerError, ServiceWorkerScope, WorkerConfig, WorkerEvent,
    WorkerState,
};
use pwakit_sw::notifications::{PushData, PushNotification, PushPayload};

/// Performance timing collector for tracking operation durations.
struct PerfTiming {
    timings: RefCell<HashMap<&'static str, Vec<Duration>>>,
}

impl PerfTiming {
    fn new() -> Self {
        Self {
            timings: RefCell::new(HashMap::new()),
        }
    }

    fn record(&self, operation: &'static str, duration: Duration) {
        self.timings
            .borrow_mut()
            .entry(operation)
            .or_insert_with(Vec::new)
            .push(duration);
    }

    fn summary(&self) -> serde_json::Value {
        let timings = self.timings.borrow();
        let mut summary = serde_json::Map::new();

        for (op, durations) in timings.iter() {
            if durations.is_empty() {
                continue;
            }

            let count = durations.len();
            let total_ms: f64 = durations.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
            let avg_ms = total_ms / count as f64;

            summary.insert(
                op.to_string(),
                json!({
                    "count": count,
                    "total_ms": (total_ms * 100.0).round() / 100.0,
                    "avg_ms": (avg_ms * 100.0).round() / 100.0,
                }),
            );
        }

        serde_json::Value::Object(summary)
    }
}

/// Parse command line arguments
struct Args {
    strategy: FetchStrategy,
    data_dir: Option<String>,
    verbose: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut strategy = FetchStrategy::CacheFirst;
        let mut data_dir = None;
        let mut verbose = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--strategy" => {
                    if let Some(val) = args.next() {
                        strategy = match val.as_str() {
                            "network-first" => FetchStrategy::NetworkFirst,
                            _ => FetchStrategy::CacheFirst,
                        };
                    }
                }
                "--data-dir" => {
                    data_dir = args.next();
                }
                "--verbose" => {
                    verbose = true;
                }
                _ => {}
            }
        }

        Self {
            strategy,
            data_dir,
            verbose,
        }
    }
}

/// Scripted in-process network with an offline switch. The harness avoids
/// real network dependency.
struct StaticBackend {
    pages: HashMap<String, Vec<u8>>,
    offline: AtomicBool,
}

impl StaticBackend {
    fn new() -> Self {
        let pages = [
            ("/", "<!doctype html><h1>PWAKit</h1>"),
            ("/index.html", "<!doctype html><h1>PWAKit</h1>"),
            ("/news", "<!doctype html><h1>News</h1>"),
        ];
        Self {
            pages: pages
                .iter()
                .map(|(path, body)| (path.to_string(), body.as_bytes().to_vec()))
                .collect(),
            offline: AtomicBool::new(false),
        }
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl NetworkBackend for StaticBackend {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<FetchResponse, ServiceWorkerError>> {
        Box::pin(async move {
            if self.offline.load(Ordering::SeqCst) {
                return Err(ServiceWorkerError::NetworkError(
                    "offline (scripted)".to_string(),
                ));
            }
            match self.pages.get(request.url.path()) {
                Some(body) => Ok(FetchResponse::ok(body.clone())),
                None => {
                    let mut response = FetchResponse::ok(Vec::new());
                    response.status = 404;
                    response.status_text = "Not Found".to_string();
                    Ok(response)
                }
            }
        })
    }
}

fn record_check(
    checks: &mut serde_json::Map<String, serde_json::Value>,
    passed: &mut bool,
    name: &str,
    ok: bool,
) {
    if !ok {
        error!(check = name, "smoke check failed");
    }
    *passed &= ok;
    checks.insert(name.to_string(), json!(ok));
}

async fn run_fetch(scope: &ServiceWorkerScope, request: FetchRequest) -> Option<FetchResponse> {
    match scope.handle_event(WorkerEvent::Fetch(request)).await {
        Ok(outcome) => outcome.fetch().and_then(|f| f.response().cloned()),
        Err(e) => {
            error!(error = %e, "fetch failed");
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(if args.verbose {
        LogConfig::debug()
    } else {
        LogConfig::default()
    });

    info!(
        strategy = args.strategy.as_str(),
        data_dir = ?args.data_dir,
        "Starting PWAKit Smoke Harness"
    );

    let origin = Url::parse("https://smoke.pwakit.app").expect("Failed to parse origin");
    let config = WorkerConfig::new("pwakit-smoke-v1", origin.clone(), &["/", "/index.html"])
        .with_strategy(args.strategy)
        .with_announcement("Service worker is active and ready")
        .with_push(PushConfig {
            sender_id: "smoke-sender".to_string(),
        });

    let backend = Arc::new(StaticBackend::new());
    let scope = match &args.data_dir {
        Some(dir) => ServiceWorkerScope::with_disk(config, backend.clone(), dir.clone())
            .await
            .expect("Failed to create worker scope"),
        None => ServiceWorkerScope::new(config, backend.clone())
            .expect("Failed to create worker scope"),
    };

    let perf = PerfTiming::new();
    let mut checks = serde_json::Map::new();
    let mut passed = true;
    let start = Instant::now();

    // A page connects before activation so claim and broadcast have a
    // target.
    let root = origin.join("/").expect("Failed to resolve root");
    let (_page, mut page_messages) = scope.connect_client(root).await;

    // Install: seed the cache generation from the manifest.
    let step = Instant::now();
    let install_ok = scope.handle_event(WorkerEvent::Install).await.is_ok()
        && scope.state().await == WorkerState::Installed
        && scope.has_cached("/index.html").await.unwrap_or(false);
    perf.record("install", step.elapsed());
    record_check(&mut checks, &mut passed, "install", install_ok);

    // Activate: sweep, claim, announce.
    let step = Instant::now();
    let activate_ok = scope.handle_event(WorkerEvent::Activate).await.is_ok()
        && scope.is_active().await;
    perf.record("activate", step.elapsed());
    record_check(&mut checks, &mut passed, "activate", activate_ok);

    let announced = matches!(
        page_messages.try_recv(),
        Ok(OutboundMessage::Activated { .. })
    );
    record_check(&mut checks, &mut passed, "activation_announced", announced);

    // Precached document is served with the network down.
    backend.set_offline(true);
    let step = Instant::now();
    let offline_nav = run_fetch(
        &scope,
        FetchRequest::navigation(origin.join("/").expect("Failed to resolve path")),
    )
    .await;
    perf.record("offline_fetch", step.elapsed());
    let offline_ok = offline_nav.map(|r| r.from_cache).unwrap_or(false);
    record_check(&mut checks, &mut passed, "offline_precached", offline_ok);
    backend.set_offline(false);

    // An uncached page is fetched once, then survives going offline.
    let news = origin.join("/news").expect("Failed to resolve path");
    let step = Instant::now();
    let first = run_fetch(&scope, FetchRequest::get(news.clone())).await;
    perf.record("runtime_fetch", step.elapsed());
    let fetched_ok = first.map(|r| !r.from_cache && r.status == 200).unwrap_or(false);
    record_check(&mut checks, &mut passed, "runtime_fetch", fetched_ok);

    backend.set_offline(true);
    let second = run_fetch(&scope, FetchRequest::get(news.clone())).await;
    let cached_ok = second.map(|r| r.from_cache).unwrap_or(false);
    record_check(&mut checks, &mut passed, "runtime_cached", cached_ok);
    backend.set_offline(false);

    // Status round trip over the message channel.
    let step = Instant::now();
    let (tx, rx) = oneshot::channel();
    let message = MessageEvent::with_reply(json!({"type": "CHECK_STATUS"}), tx);
    let sent = scope.handle_event(WorkerEvent::Message(message)).await.is_ok();
    let status_ok = sent
        && rx
            .await
            .map(|reply| reply.active && reply.ready)
            .unwrap_or(false);
    perf.record("check_status", step.elapsed());
    record_check(&mut checks, &mut passed, "check_status", status_ok);

    // Push payload becomes a visible notification.
    let step = Instant::now();
    let payload = PushPayload {
        notification: Some(PushNotification {
            title: Some("Deployment complete".to_string()),
            body: Some("New version cached".to_string()),
        }),
        data: Some(PushData {
            url: Some("/news".to_string()),
        }),
    };
    let push_ok = scope.handle_event(WorkerEvent::Push(payload)).await.is_ok()
        && scope.visible_notifications().await.len() == 1;
    perf.record("push", step.elapsed());
    record_check(&mut checks, &mut passed, "push_notification", push_ok);

    // Clicking the notification closes it and opens a page at its URL.
    let step = Instant::now();
    let click_ok = match scope.visible_notifications().await.first() {
        Some(notification) => {
            let click = NotificationClick::from_notification(notification);
            scope
                .handle_event(WorkerEvent::NotificationClick(click))
                .await
                .is_ok()
                && scope.visible_notifications().await.is_empty()
                && scope.find_client(&news).await.is_some()
        }
        None => false,
    };
    perf.record("notification_click", step.elapsed());
    record_check(&mut checks, &mut passed, "notification_click", click_ok);

    // Background work registered by the fetch steps must settle cleanly.
    let step = Instant::now();
    scope.settle().await;
    perf.record("settle", step.elapsed());
    record_check(&mut checks, &mut passed, "settle", true);

    let result = json!({
        "status": if passed { "pass" } else { "fail" },
        "strategy": scope.config().strategy.as_str(),
        "elapsed_ms": start.elapsed().as_millis(),
        "checks": serde_json::Value::Object(checks),
        "perf": perf.summary(),
    });
    println!("{}", result);

    if !passed {
        std::process::exit(1);
    }
}
