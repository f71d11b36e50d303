use anyhow::{Context, Result};
use clap::Parser;
use plumise_agent_kernel::proof::ProofRecord;
use plumise_agent_kernel::report::recover_report_signer;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a report JSON body as POSTed to the Oracle
    report: PathBuf,

    /// Fail unless the report was signed by this address
    #[arg(long)]
    expect_agent: Option<String>,
}

#[derive(Serialize, Debug)]
struct ProofCheck {
    proof_hash: String,
    digest_valid: bool,
    signature_valid: bool,
    agent_matches: bool,
}

#[derive(Serialize, Debug)]
struct Verification {
    agent: String,
    signer: String,
    signature_valid: bool,
    proofs: Vec<ProofCheck>,
    valid: bool,
}

fn verify_report(body: &Value) -> Result<Verification> {
    let agent = body
        .get("agent")
        .and_then(Value::as_str)
        .context("report has no `agent` field")?
        .to_string();

    let signer = recover_report_signer(body)
        .map_err(|e| anyhow::anyhow!("signature recovery failed: {e}"))?
        .to_checksum(None);
    let signature_valid = signer.eq_ignore_ascii_case(&agent);

    let proofs: Vec<ProofRecord> = match body.get("proofs") {
        Some(p) => serde_json::from_value(p.clone()).context("malformed `proofs` array")?,
        None => Vec::new(),
    };

    let proofs: Vec<ProofCheck> = proofs
        .iter()
        .map(|p| ProofCheck {
            proof_hash: p.digest.to_string(),
            digest_valid: p.digest_matches(),
            signature_valid: p.signature_matches().unwrap_or(false),
            agent_matches: p.agent_address.to_checksum(None).eq_ignore_ascii_case(&agent),
        })
        .collect();

    let valid = signature_valid
        && proofs
            .iter()
            .all(|p| p.digest_valid && p.signature_valid && p.agent_matches);

    Ok(Verification {
        agent,
        signer,
        signature_valid,
        proofs,
        valid,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    eprintln!("Plumise Report Verifier v0.1.0");

    let raw = fs::read_to_string(&args.report).context("Failed to read report file")?;
    let body: Value = serde_json::from_str(&raw).context("Report is not valid JSON")?;

    let verification = verify_report(&body)?;
    println!("{}", serde_json::to_string_pretty(&verification)?);

    if let Some(expected) = &args.expect_agent {
        if !verification.signer.eq_ignore_ascii_case(expected) {
            anyhow::bail!("report signed by {}, expected {}", verification.signer, expected);
        }
    }
    if !verification.valid {
        anyhow::bail!("report failed verification");
    }
    Ok(())
}
