// Corpus loading and fingerprinting
use anyhow::{bail, Context, Result};
use nestfind_core::Listing;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::info;

/// Load listings from a JSON array or a JSON Lines file.
///
/// Every listing is validated; the first malformed record aborts the load.
pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<Vec<Listing>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read corpus {}", path.display()))?;
    let listings = parse_corpus(&text)
        .with_context(|| format!("malformed corpus {}", path.display()))?;
    info!("Loaded {} listings from {}", listings.len(), path.display());
    Ok(listings)
}

pub fn parse_corpus(text: &str) -> Result<Vec<Listing>> {
    let listings: Vec<Listing> = if text.trim_start().starts_with('[') {
        serde_json::from_str(text).context("invalid JSON array")?
    } else {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).with_context(|| format!("invalid listing on line {}", n + 1))
            })
            .collect::<Result<_>>()?
    };

    for listing in &listings {
        if let Err(e) = listing.validate() {
            bail!("{}", e);
        }
    }
    Ok(listings)
}

/// SHA-256 over the canonical JSON encoding of the listings, hex encoded.
/// Identical content yields the same fingerprint whatever the file format.
pub fn corpus_fingerprint(listings: &[Listing]) -> Result<String> {
    let mut hasher = Sha256::new();
    for listing in listings {
        hasher.update(serde_json::to_vec(listing)?);
        hasher.update(b"\n");
    }
    Ok(format!("{:x}", hasher.finalize()))
}
