//! gost-tpm
//!
//! Command-line access to a GOST-capable TPM 2.0 module.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tpm_client::flows::{self, capability};
use tpm_client::{Config, Device, Tpm, Transport};
use tpm_protocol::{AlgorithmId, EccCurve};
use tpm_simulator::SimulatorChannel;

/// gost-tpm - drive a TPM 2.0 module with GOST algorithms.
#[derive(Parser, Debug)]
#[command(name = "gost-tpm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Module device node (overrides the configuration)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub device: Option<PathBuf>,

    /// Use the in-process simulator instead of a device
    #[arg(long, global = true, conflicts_with = "device")]
    pub simulator: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List the algorithms the module implements
    Algorithms {
        /// First algorithm identifier to list (decimal or 0x-prefixed)
        #[arg(long, default_value = "0", value_parser = parse_u16)]
        start: u16,

        /// Maximum number of entries
        #[arg(long, default_value = "64")]
        count: u32,
    },

    /// Check whether the module implements one algorithm
    HasAlgorithm {
        /// Algorithm name (e.g. streebog256) or identifier (e.g. 0x0093)
        algorithm: AlgorithmId,
    },

    /// Hash a file or standard input inside the module
    Hash {
        /// Hash algorithm
        #[arg(short, long, default_value = "streebog256")]
        algorithm: AlgorithmId,

        /// Input file (reads standard input when omitted)
        input: Option<PathBuf>,

        /// Use a suspendable hash sequence with the configured chunk size
        #[arg(long)]
        chunked: bool,
    },

    /// Read random bytes from the module
    Random {
        /// Number of bytes
        bytes: usize,
    },

    /// Run every flow once and report the outcome
    SelfTest,
}

fn parse_u16(value: &str) -> Result<u16, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid identifier {value:?}: {e}"))
}

#[derive(Debug, Serialize)]
struct AlgorithmEntry {
    id: String,
    name: Option<String>,
    properties: String,
}

#[derive(Debug, Serialize)]
struct HashOutput {
    algorithm: String,
    digest: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    check: String,
    passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };
    config.apply_env_overrides();
    if let Some(device) = &cli.device {
        config.device.path = device.clone();
    }
    config.validate()?;

    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.log_level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if cli.simulator {
        tracing::debug!("Using in-process simulator");
        let tpm = Tpm::with_max_response_size(
            SimulatorChannel::default(),
            config.device.max_response_size,
        );
        run(&tpm, &cli, &config)
    } else {
        let path = &config.device.path;
        tracing::debug!("Opening module device {:?}", path);
        let device = Device::open(path)
            .with_context(|| format!("Failed to open module device: {}", path.display()))?;
        let tpm = Tpm::with_max_response_size(device, config.device.max_response_size);
        run(&tpm, &cli, &config)
    }
}

fn run<T: Transport>(tpm: &Tpm<T>, cli: &Cli, config: &Config) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Algorithms { start, count } => {
            let entries: Vec<AlgorithmEntry> = capability::algorithms(tpm, *start, *count)
                .context("Failed to query algorithms")?
                .into_iter()
                .map(|entry| AlgorithmEntry {
                    id: format!("0x{:04x}", entry.id),
                    name: entry.algorithm().map(|alg| alg.to_string()),
                    properties: format!("0x{:08x}", entry.properties.0),
                })
                .collect();

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No algorithms at or after 0x{start:04x}");
            } else {
                for entry in &entries {
                    let name = entry.name.as_deref().unwrap_or("unknown");
                    println!("{}  {:<14} {}", entry.id, name, entry.properties);
                }
            }
        }

        Commands::HasAlgorithm { algorithm } => {
            let present = capability::has_algorithm(tpm, *algorithm)
                .with_context(|| format!("Failed to query {algorithm}"))?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "algorithm": algorithm.to_string(), "present": present })
                );
            } else if present {
                println!("{algorithm}: supported");
            } else {
                println!("{algorithm}: not supported");
            }
        }

        Commands::Hash {
            algorithm,
            input,
            chunked,
        } => {
            let data = read_input(input.as_ref())?;
            let digest = if *chunked {
                flows::hash_chunked(tpm, *algorithm, &data, config.hashing.chunk_size)
            } else {
                flows::hash(tpm, *algorithm, &data)
            }
            .with_context(|| format!("Failed to hash with {algorithm}"))?;

            let output = HashOutput {
                algorithm: algorithm.to_string(),
                digest: hex::encode(digest.as_bytes()),
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", output.digest);
            }
        }

        Commands::Random { bytes } => {
            let random = capability::get_random(tpm, *bytes).context("Failed to read random bytes")?;
            if cli.json {
                println!("{}", serde_json::json!({ "random": hex::encode(&random) }));
            } else {
                println!("{}", hex::encode(&random));
            }
        }

        Commands::SelfTest => {
            let results = self_test(tpm, config);
            let failed = results.iter().filter(|result| !result.passed).count();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for result in &results {
                    let status = if result.passed { "ok" } else { "FAILED" };
                    match &result.error {
                        Some(error) => println!("{:<40} {status}: {error}", result.check),
                        None => println!("{:<40} {status}", result.check),
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} self-test checks failed", results.len());
            }
        }
    }
    Ok(())
}

fn read_input(input: Option<&PathBuf>) -> anyhow::Result<Vec<u8>> {
    match input {
        Some(path) => {
            fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))
        }
        None => {
            let mut data = Vec::new();
            io::stdin()
                .read_to_end(&mut data)
                .context("Failed to read standard input")?;
            Ok(data)
        }
    }
}

fn check(name: String, outcome: tpm_client::Result<bool>) -> CheckResult {
    match outcome {
        Ok(passed) => CheckResult {
            check: name,
            passed,
            error: (!passed).then(|| "unexpected result".to_string()),
        },
        Err(err) => CheckResult {
            check: name,
            passed: false,
            error: Some(err.to_string()),
        },
    }
}

fn self_test<T: Transport>(tpm: &Tpm<T>, config: &Config) -> Vec<CheckResult> {
    let mut results = Vec::new();
    let plaintext: Vec<u8> = (0..100u8).collect();

    for cipher in [AlgorithmId::Magma, AlgorithmId::Grasshopper] {
        for mode in [AlgorithmId::Cbc, AlgorithmId::Ctr] {
            let outcome = flows::random_iv(cipher).and_then(|iv| {
                let input = if mode.is_block_mode() {
                    flows::pkcs7_pad(&plaintext, iv.len())
                } else {
                    plaintext.clone()
                };
                let result = flows::round_trip(tpm, cipher, mode, &iv, &input)?;
                Ok(result.recovered == input && result.ciphertext != input)
            });
            results.push(check(format!("{cipher}/{mode} round trip"), outcome));
        }
    }

    for algorithm in [AlgorithmId::Gost3411_256, AlgorithmId::Gost3411_512] {
        let outcome = flows::hash(tpm, algorithm, &plaintext).and_then(|whole| {
            let chunk = config.hashing.chunk_size.min(plaintext.len() / 3).max(1);
            Ok(flows::hash_chunked(tpm, algorithm, &plaintext, chunk)? == whole)
        });
        results.push(check(format!("{algorithm} chunked hash"), outcome));
    }

    for curve in [EccCurve::Gost256A, EccCurve::Gost512A] {
        let digest = vec![0x5A; curve.coordinate_size()];
        let outcome = flows::sign_and_verify(tpm, curve, &digest).map(|_| true);
        results.push(check(format!("{curve:?} sign/verify"), outcome));
    }

    results
}
