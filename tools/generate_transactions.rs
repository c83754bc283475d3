//! Test Transaction Generator
//!
//! Writes random expense transactions as JSON lines to stdout, for piping
//! into the anomaly engine.

use chrono::{Duration, Local, NaiveDate};
use rand::Rng;
use serde_json::{json, Value};
use std::io::{self, BufWriter, Write};
use tracing::info;

/// Typical spend range per category
const CATEGORIES: &[(&str, f64, f64)] = &[
    ("Rent", 800.0, 2500.0),
    ("Groceries", 20.0, 300.0),
    ("Entertainment", 10.0, 200.0),
    ("Utilities", 40.0, 250.0),
    ("Transportation", 5.0, 120.0),
    ("Miscellaneous", 5.0, 150.0),
];

/// Transaction generator for testing
struct TransactionGenerator {
    rng: rand::rngs::ThreadRng,
    today: NaiveDate,
}

impl TransactionGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            today: Local::now().date_naive(),
        }
    }

    /// Amount within the category's usual range, dated in the last 90 days
    fn generate_normal(&mut self) -> Value {
        let (category, low, high) = CATEGORIES[self.rng.gen_range(0..CATEGORIES.len())];
        let amount = self.rng.gen_range(low.max(55.0)..high.max(60.0));
        self.record(amount, category)
    }

    /// Tiny, huge, above-ceiling or off-pattern transactions
    fn generate_suspicious(&mut self) -> Value {
        let (category, _, high) = CATEGORIES[self.rng.gen_range(0..CATEGORIES.len())];
        let amount = match self.rng.gen_range(0..4) {
            0 => self.rng.gen_range(1.0..50.0),         // Below minimum
            1 => self.rng.gen_range(10_001.0..50_000.0), // Above maximum
            2 => high * self.rng.gen_range(3.0..8.0),   // Far outside the usual range
            _ => self.rng.gen_range(5_000.0..10_000.0),
        };
        let category = if self.rng.gen_bool(0.2) {
            "Travel" // Not in the training vocabulary
        } else {
            category
        };
        self.record(amount, category)
    }

    fn record(&mut self, amount: f64, category: &str) -> Value {
        let date = self.today - Duration::days(self.rng.gen_range(0..90));
        let amount = (amount * 100.0).round() / 100.0;

        // Mix the key casings and amount encodings the engine accepts
        match self.rng.gen_range(0..3) {
            0 => json!({"amount": amount, "category": category, "date": date.to_string()}),
            1 => json!({"Amount": amount, "Category": category, "Date": date.to_string()}),
            _ => json!({"amount": format!("{:.2}", amount), "category": category}),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_transactions=info".parse()?),
        )
        .with_writer(io::stderr)
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let count: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(100);
    let suspicious_rate = args
        .get(2)
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.1)
        .clamp(0.0, 1.0);

    info!(count = count, suspicious_rate = suspicious_rate, "Generating transactions");

    let mut generator = TransactionGenerator::new();
    let mut rng = rand::thread_rng();
    let mut out = BufWriter::new(io::stdout().lock());

    let mut normal_count = 0;
    let mut suspicious_count = 0;

    for _ in 0..count {
        let transaction = if rng.gen_bool(suspicious_rate) {
            suspicious_count += 1;
            generator.generate_suspicious()
        } else {
            normal_count += 1;
            generator.generate_normal()
        };

        serde_json::to_writer(&mut out, &transaction)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    info!(
        "Completed! Generated {} transactions ({} normal, {} suspicious)",
        count, normal_count, suspicious_count
    );

    Ok(())
}
