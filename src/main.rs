use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cert_anchor::config::IssuerConfig;
use cert_anchor::document::{without_proof, Batch, CanonicalJson};
use cert_anchor::error::{AnchorError, Result};
use cert_anchor::issuer::BatchIssuer;
use cert_anchor::proof::{attach_proof, verify_document, verify_receipt, DocumentProof, Proof};
use cert_anchor::telemetry;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "cert-anchor")]
#[command(about = "Anchor batches of credentials to a blockchain with Merkle inclusion proofs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Anchor a batch of JSON documents and write them back with proofs
    Issue {
        /// Issuer configuration file (JSON)
        #[arg(long)]
        config: PathBuf,
        /// Directory for the issued documents
        #[arg(long)]
        out: PathBuf,
        /// Documents to anchor, one leaf each, in this order
        #[arg(required = true)]
        documents: Vec<PathBuf>,
    },
    /// Check an issued document, or a bare receipt, against its Merkle root
    VerifyProof {
        /// Issued document or receipt (JSON)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Issue {
            config,
            out,
            documents,
        } => issue(&config, &out, &documents).await,
        Commands::VerifyProof { file } => verify(&file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "cert-anchor failed");
            ExitCode::FAILURE
        }
    }
}

async fn issue(config_path: &Path, out: &Path, paths: &[PathBuf]) -> Result<()> {
    let config = IssuerConfig::from_file(config_path)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling");
            on_signal.cancel();
        }
    });

    let targets = output_paths(out, paths)?;
    let mut batch = Batch::new();
    let mut documents = Vec::with_capacity(paths.len());
    for (path, target) in paths.iter().zip(targets) {
        let document: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let uid = document_uid(path, &document);
        batch.insert_json(uid.clone(), &without_proof(&document), &CanonicalJson)?;
        documents.push((uid, target, document));
    }

    let mut issuer = BatchIssuer::from_config(&config, cancel)?;
    let issued = issuer.issue(&batch).await?;

    std::fs::create_dir_all(out)?;
    let created = chrono::Utc::now();
    for ((uid, target, mut document), (proof_uid, receipt)) in documents.into_iter().zip(issued.proofs) {
        debug_assert_eq!(uid, proof_uid);
        let proof = DocumentProof::from_receipt(&receipt, &config.verification_method, created)?;
        attach_proof(&mut document, &proof)?;

        std::fs::write(&target, serde_json::to_vec_pretty(&document)?)?;
        info!(uid = %uid, path = %target.display(), "Wrote issued document");
    }

    println!("{}", issued.tx_id);
    Ok(())
}

/// Where each issued document is written: `out/<file name>`.
///
/// Rejects inputs that would land on the same output file, before
/// anything is anchored.
fn output_paths(out: &Path, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::with_capacity(paths.len());
    paths
        .iter()
        .map(|path| {
            let file_name = path
                .file_name()
                .ok_or_else(|| AnchorError::Config(format!("{} is not a file", path.display())))?;
            if !seen.insert(file_name) {
                return Err(AnchorError::Config(format!(
                    "more than one input is named {}; outputs in {} would overwrite each other",
                    file_name.to_string_lossy(),
                    out.display()
                )));
            }
            Ok(out.join(file_name))
        })
        .collect()
}

/// The document's `id` when present, otherwise its file name.
fn document_uid(path: &Path, document: &Value) -> String {
    document
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

fn verify(path: &Path) -> Result<()> {
    let value: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;

    let receipts = if value.get("proof").is_some() {
        verify_document(&value, &CanonicalJson)?
    } else {
        let receipt: Proof = serde_json::from_value(value)?;
        if !verify_receipt(&receipt) {
            return Err(AnchorError::InvalidProof(format!(
                "{} path does not lead to root {}",
                receipt.id,
                hex::encode(receipt.root)
            )));
        }
        vec![receipt]
    };

    for receipt in receipts {
        println!(
            "valid: root {} anchored on {} in {}",
            hex::encode(receipt.root),
            receipt.anchor.chain,
            receipt.anchor.transaction_id
        );
    }
    Ok(())
}
