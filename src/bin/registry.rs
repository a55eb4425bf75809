use anyhow::Context;
use clap::Parser;
use molecule_ledger::clock::{Clock, SystemClock};
use molecule_ledger::config::{load_config, Config, ConfigFormat};
use molecule_ledger::fhe::simulated::SimulatedEngine;
use molecule_ledger::identity::SessionIdentity;
use molecule_ledger::ledger::memory::InMemoryLedger;
use molecule_ledger::search::RecordQuery;
use molecule_ledger::types::Address;
use molecule_ledger::{RecordDraft, Registry};
use rand::Rng;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const NAMES: &[&str] = &[
    "Aspirin",
    "Ibuprofen",
    "Paracetamol",
    "Naproxen",
    "Celecoxib",
    "Diclofenac",
    "Ketoprofen",
];

#[derive(Parser, Debug)]
#[command(
    name = "registry",
    version,
    about = "Drive the molecule registry against simulated ledger and encryption collaborators"
)]
struct Args {
    /// Path to configuration file (TOML or YAML). Uses built-in sample when absent.
    #[arg(long, env = "MOLECULE_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Explicit configuration format override.
    #[arg(long, value_enum, default_value_t = ConfigFormat::Auto)]
    config_format: ConfigFormat,

    /// Number of molecules to create.
    #[arg(long, default_value_t = 5)]
    molecules: usize,

    /// Number of created molecules to verify on-chain.
    #[arg(long, default_value_t = 2)]
    verify: usize,

    /// Let a concurrent verifier win the last verification.
    #[arg(long)]
    race: bool,

    /// Case-insensitive search over name and creator.
    #[arg(long, default_value = "")]
    search: String,

    #[arg(long)]
    verified_only: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn random_address() -> Address {
    let bytes: [u8; 20] = rand::thread_rng().gen();
    Address(format!("0x{}", hex::encode(bytes)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = match &args.config {
        Some(path) => load_config(path, args.config_format)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::sample(),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let contract = config
        .registry
        .contract_address
        .clone()
        .unwrap_or_else(random_address);
    let ledger = Arc::new(InMemoryLedger::new(contract, clock.clone()));
    let engine = Arc::new(SimulatedEngine::new());
    let identity = Arc::new(SessionIdentity::connected(random_address()));

    let registry = Registry::new(config, ledger.clone(), engine, identity).with_clock(clock);
    registry.start_session().await?;

    let mut created = Vec::with_capacity(args.molecules);
    for i in 0..args.molecules {
        let (toxicity, efficacy) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(1..=9u64), rng.gen_range(1..=10u64))
        };
        let draft = RecordDraft::from_form(
            NAMES[i % NAMES.len()],
            &toxicity.to_string(),
            &efficacy.to_string(),
        );
        created.push(registry.create_record(draft).await?);
        // Keys are minted from the millisecond clock.
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let to_verify = args.verify.min(created.len());
    for (i, key) in created.iter().take(to_verify).enumerate() {
        if args.race && i + 1 == to_verify {
            ledger.race_next_verification(rand::thread_rng().gen_range(1..=10));
        }
        registry.toggle_local_decryption(key).await?;
    }

    let query = RecordQuery::new(args.search, args.verified_only);
    let records: Vec<_> = registry
        .search(&query)
        .into_iter()
        .map(|record| {
            let key = record.molecule_id.clone();
            json!({
                "record": record,
                "sensitive": registry.sensitive_value(&key),
                "analysis": registry.analysis(&key),
            })
        })
        .collect();

    let report = json!({
        "status": registry.status().current(),
        "stats": registry.stats(),
        "records": records,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
