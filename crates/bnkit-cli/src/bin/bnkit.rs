//! bnkit CLI - query, sample and convert discrete Bayesian networks
//!
//! Usage:
//!   bnkit <file>                                  # Validate and print all marginals
//!   bnkit <file> --evidence age=<15 --query gender
//!   bnkit <file> --sample 1000 --strategy multinomial --seed 7 -o json
//!   bnkit <file> --export bif                     # Convert to another format

use std::collections::BTreeMap;
use std::process;
use std::sync::Arc;

use bnkit_core::{
    BnError, BnResult, EliminationEngine, InferenceCounters, InferenceEngine, Network, RecursiveConditioningEngine,
    RemainderStrategy, SimpleConditioningEngine, StratifiedConfig, StratifiedSampler, Stratum,
};
use bnkit_io::Format;
use clap::{Parser, ValueEnum};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bnkit")]
#[command(version)]
#[command(about = "bnkit - discrete Bayesian network toolkit")]
#[command(long_about = "Exact inference, stratified sampling and format conversion for discrete Bayesian networks")]
struct Cli {
    /// Input network in XMLBIF format
    #[arg(value_name = "FILE")]
    file: String,

    /// Inference engine
    #[arg(short, long, value_enum, default_value = "elimination")]
    engine: EngineKind,

    /// Observed value, as VAR=VALUE (repeatable)
    #[arg(long = "evidence", value_name = "VAR=VALUE")]
    evidence: Vec<String>,

    /// Variable to query (all variables when omitted)
    #[arg(short, long, value_name = "VAR")]
    query: Option<String>,

    /// Generate a population of N individuals consistent with the evidence
    #[arg(short, long, value_name = "N")]
    sample: Option<u64>,

    /// How rounding remainders are distributed while sampling
    #[arg(long, value_enum, default_value = "round")]
    strategy: StrategyKind,

    /// Sampler seed
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Print the network in another format and exit
    #[arg(short = 'x', long, value_enum, value_name = "FORMAT")]
    export: Option<ExportKind>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    output: OutputKind,

    /// Print inference counters after the run
    #[arg(long)]
    stats: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum EngineKind {
    Elimination,
    Rc,
    Simple,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyKind {
    Round,
    Multinomial,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportKind {
    Xml,
    Bif,
    Net,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputKind {
    Summary,
    Json,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let network = match bnkit_io::read_xml_file(&cli.file) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("Error reading network '{}': {}", cli.file, e);
            process::exit(1);
        }
    };

    if let Some(kind) = cli.export {
        let format = match kind {
            ExportKind::Xml => Format::Xml,
            ExportKind::Bif => Format::Bif,
            ExportKind::Net => Format::Net,
        };
        print!("{}", bnkit_io::export(&network, format));
        return;
    }

    let network = Arc::new(network);
    let result = match cli.engine {
        EngineKind::Elimination => EliminationEngine::new(network).and_then(|e| run(e, &cli)),
        EngineKind::Rc => RecursiveConditioningEngine::new(network).and_then(|e| run(e, &cli)),
        EngineKind::Simple => SimpleConditioningEngine::new(network).and_then(|e| run(e, &cli)),
    };

    match result {
        Ok(report) => match cli.output {
            OutputKind::Json => match serde_json::to_string_pretty(&report.to_json()) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error serializing to JSON: {}", e);
                    process::exit(1);
                }
            },
            OutputKind::Summary => report.print_summary(),
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

struct Report {
    network: String,
    evidence: BTreeMap<String, String>,
    evidence_probability: f64,
    marginals: Vec<(String, Vec<(String, f64)>)>,
    population: Vec<(BTreeMap<String, String>, u64)>,
    counters: Option<InferenceCounters>,
}

fn run<E: InferenceEngine>(mut engine: E, cli: &Cli) -> BnResult<Report> {
    for entry in &cli.evidence {
        let Some((var, value)) = entry.split_once('=') else {
            return Err(BnError::InvalidConfig(format!(
                "evidence '{}' is not VAR=VALUE",
                entry
            )));
        };
        engine.add_evidence(var.trim(), value.trim())?;
    }

    let network: &Network = engine.network();
    let evidence: BTreeMap<String, String> = engine
        .evidence()
        .iter()
        .filter_map(|(var, value)| {
            let variable = network.get(var)?;
            Some((variable.name().to_string(), variable.label(value)?.to_string()))
        })
        .collect();
    let queried: Vec<String> = match &cli.query {
        Some(name) => vec![name.clone()],
        None => network.variables().iter().map(|v| v.name().to_string()).collect(),
    };
    let name = network.name().to_string();

    let evidence_probability = engine.probability_of_evidence()?;
    let mut marginals = Vec::with_capacity(queried.len());
    for var in queried {
        let posterior = engine.marginal(&var)?;
        let id = engine.network().variable_id(&var)?;
        let labelled: Vec<(String, f64)> = engine
            .network()
            .variable(id)
            .domain()
            .iter()
            .zip(posterior.iter())
            .map(|(label, p)| (label.to_string(), *p))
            .collect();
        marginals.push((var, labelled));
    }

    let mut population = Vec::new();
    let counters = if let Some(total) = cli.sample {
        let config = StratifiedConfig {
            strategy: match cli.strategy {
                StrategyKind::Round => RemainderStrategy::RoundAndSample,
                StrategyKind::Multinomial => RemainderStrategy::Multinomial,
            },
            seed: cli.seed,
        };
        let mut sampler = StratifiedSampler::new(engine, total, config)?;
        let strata = sampler.by_ref().collect::<BnResult<Vec<Stratum>>>()?;
        let network = sampler.engine().network();
        population = strata
            .into_iter()
            .map(|(assignment, count)| (network.assignment_to_row(&assignment), count))
            .collect();
        sampler.engine().counters()
    } else {
        engine.counters()
    };
    let counters = cli.stats.then_some(counters);

    Ok(Report {
        network: name,
        evidence,
        evidence_probability,
        marginals,
        population,
        counters,
    })
}

impl Report {
    fn print_summary(&self) {
        println!("✓ Network '{}' loaded", self.network);
        if !self.evidence.is_empty() {
            println!("\nEvidence ({}):", self.evidence.len());
            for (var, value) in &self.evidence {
                println!("  {} = {}", var, value);
            }
            println!("  P(evidence) = {:.6}", self.evidence_probability);
        }

        println!("\nMarginals ({}):", self.marginals.len());
        for (var, posterior) in &self.marginals {
            println!("  {}:", var);
            for (label, p) in posterior {
                println!("    {:<16} {:.6}", label, p);
            }
        }

        if !self.population.is_empty() {
            let total: u64 = self.population.iter().map(|(_, n)| n).sum();
            println!("\nPopulation ({} individuals, {} strata):", total, self.population.len());
            for (row, count) in &self.population {
                let cells: Vec<String> = row.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                println!("  {:>8}  {}", count, cells.join(" "));
            }
        }

        if let Some(counters) = &self.counters {
            println!("\nCounters: {:?}", counters);
        }
    }

    fn to_json(&self) -> serde_json::Value {
        let marginals: BTreeMap<&str, BTreeMap<&str, f64>> = self
            .marginals
            .iter()
            .map(|(var, posterior)| {
                (
                    var.as_str(),
                    posterior.iter().map(|(label, p)| (label.as_str(), *p)).collect(),
                )
            })
            .collect();
        let population: Vec<serde_json::Value> = self
            .population
            .iter()
            .map(|(row, count)| json!({ "assignment": row, "count": count }))
            .collect();
        json!({
            "network": self.network,
            "evidence": self.evidence,
            "evidence_probability": self.evidence_probability,
            "marginals": marginals,
            "population": population,
            "counters": self.counters,
        })
    }
}
