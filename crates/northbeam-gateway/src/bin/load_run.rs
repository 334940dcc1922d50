//! Load run: submits forms concurrently against a running gateway.
//! 10 concurrent visitors, 5 submissions each, spread over the contact, careers and newsletter forms.
//! Run with the gateway up: cargo run --bin load_run [BASE_URL]

use std::collections::BTreeMap;
use std::time::Instant;

use reqwest::Client;
use serde_json::json;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const CONCURRENT_VISITORS: usize = 10;
const SUBMISSIONS_PER_VISITOR: usize = 5;

const NAMES: &[&str] = &["Ada Lovelace", "Grace Hopper", "Alan Kay", "Barbara Liskov", "Ken Thompson"];
const SERVICES: &[&str] = &["Cloud migration", "Data platform", "Security review", "Team augmentation"];

fn submission(visitor: usize, n: usize) -> (&'static str, serde_json::Value) {
    let name = NAMES[(visitor + n) % NAMES.len()];
    let email = format!("visitor{}.{}@example.com", visitor, n);
    match (visitor + n) % 3 {
        0 => (
            "/api/v1/contact",
            json!({
                "name": name,
                "email": email,
                "message": format!("We are interested in {}.", SERVICES[n % SERVICES.len()]),
                "service": SERVICES[n % SERVICES.len()],
            }),
        ),
        1 => (
            "/api/v1/careers",
            json!({
                "name": name,
                "email": email,
                "position": "Senior Engineer",
                "message": "I have ten years of experience shipping distributed systems.",
            }),
        ),
        _ => ("/api/v1/newsletter", json!({ "email": email })),
    }
}

/// Outcome of one POST: which form, whether it was accepted, how long it took.
struct Outcome {
    path: &'static str,
    accepted: bool,
    elapsed_ms: u64,
}

/// Per-form tally.
#[derive(Default)]
struct EndpointStats {
    accepted: u32,
    rejected: u32,
    latency_ms: Vec<u64>,
}

impl EndpointStats {
    fn record(&mut self, outcome: &Outcome) {
        if outcome.accepted {
            self.accepted += 1;
            self.latency_ms.push(outcome.elapsed_ms);
        } else {
            self.rejected += 1;
        }
    }

    fn mean_latency(&self) -> f64 {
        if self.latency_ms.is_empty() {
            return 0.0;
        }
        self.latency_ms.iter().sum::<u64>() as f64 / self.latency_ms.len() as f64
    }

    fn max_latency(&self) -> u64 {
        self.latency_ms.iter().copied().max().unwrap_or(0)
    }
}

async fn visit(client: Client, base_url: String, visitor: usize) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(SUBMISSIONS_PER_VISITOR);
    for n in 0..SUBMISSIONS_PER_VISITOR {
        let (path, body) = submission(visitor, n);
        let start = Instant::now();
        let accepted = client
            .post(format!("{}{}", base_url, path))
            .json(&body)
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false);
        outcomes.push(Outcome {
            path,
            accepted,
            elapsed_ms: start.elapsed().as_millis() as u64,
        });
    }
    outcomes
}

#[tokio::main]
async fn main() {
    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    println!(
        "[LOAD] {} visitors x {} submissions against {}",
        CONCURRENT_VISITORS, SUBMISSIONS_PER_VISITOR, base_url
    );

    let client = Client::new();
    let mut tasks = tokio::task::JoinSet::new();
    for visitor in 0..CONCURRENT_VISITORS {
        tasks.spawn(visit(client.clone(), base_url.clone(), visitor));
    }

    let mut by_path: BTreeMap<&'static str, EndpointStats> = BTreeMap::new();
    let mut lost_visitors = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcomes) => {
                for outcome in &outcomes {
                    by_path.entry(outcome.path).or_default().record(outcome);
                }
            }
            Err(e) => {
                lost_visitors += 1;
                eprintln!("[LOAD] visitor task failed: {}", e);
            }
        }
    }

    for (path, stats) in &by_path {
        println!(
            "[LOAD] {:<20} accepted {:>3} | rejected {:>3} | mean {:>5.0}ms | max {:>5}ms",
            path,
            stats.accepted,
            stats.rejected,
            stats.mean_latency(),
            stats.max_latency()
        );
    }
    let accepted: u32 = by_path.values().map(|s| s.accepted).sum();
    println!(
        "[LOAD] {} of {} submissions stored; GET /admin/submissions should list exactly that many more.",
        accepted,
        CONCURRENT_VISITORS * SUBMISSIONS_PER_VISITOR
    );
    if lost_visitors > 0 {
        println!("[LOAD] {} visitor task(s) did not finish", lost_visitors);
    }
}
