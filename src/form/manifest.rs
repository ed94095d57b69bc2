#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Tamper-evident record of the randomly picked fields a student was shown.

use hmac::{Hmac, Mac};
use itertools::Itertools;
use rand::{Rng, distr::Alphanumeric, seq::index};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::{schema::ExerciseSchema, submission::Submission, traversal::Selection};
use crate::{
    config::Secret,
    constants::{
        CHECKSUM_KEY, NONCE_KEY, NONCE_LENGTH, SAMPLE_GROUP_SEPARATOR, SAMPLE_INDEX_SEPARATOR,
        SAMPLE_KEY,
    },
    error::{GraderError, Result},
};

/// HMAC-SHA256 keyed with the exercise secret.
type HmacSha256 = Hmac<Sha256>;

/// Nonce, encoded sample and the checksum binding them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleManifest {
    /// Random per-render token.
    pub nonce:    String,
    /// Slash separated per-group, dash separated field index lists.
    pub sample:   String,
    /// Hex HMAC of `nonce + sample`.
    pub checksum: String,
}

/// Builds the keyed MAC over `nonce + sample`.
fn mac_for(secret: &Secret, nonce: &str, sample: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GraderError::config(format!("Unusable manifest secret: {e}")))?;
    mac.update(nonce.as_bytes());
    mac.update(sample.as_bytes());
    Ok(mac)
}

/// Draws a fresh ASCII nonce.
fn random_nonce<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.sample_iter(Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

impl SampleManifest {
    /// Signs `nonce` and `sample` with `secret`.
    pub fn sign(nonce: impl Into<String>, sample: impl Into<String>, secret: &Secret) -> Result<Self> {
        let nonce = nonce.into();
        let sample = sample.into();
        let checksum = hex::encode(mac_for(secret, &nonce, &sample)?.finalize().into_bytes());
        Ok(Self {
            nonce,
            sample,
            checksum,
        })
    }

    /// Draws a random subset for every group that picks randomly.
    ///
    /// Returns the selection to render together with the manifest that
    /// records it. No manifest is produced when no group picks randomly.
    pub fn generate<R: Rng + ?Sized>(
        schema: &ExerciseSchema,
        secret: &Secret,
        rng: &mut R,
    ) -> Result<(Option<Self>, Selection)> {
        let mut groups = Vec::with_capacity(schema.groups.len());
        let mut tokens = Vec::new();

        for group in &schema.groups {
            match group.pick_randomly {
                Some(k) => {
                    if k > group.fields.len() {
                        return Err(GraderError::config(format!(
                            "Cannot pick {k} of {} fields at random",
                            group.fields.len()
                        )));
                    }
                    let picked = index::sample(rng, group.fields.len(), k).into_vec();
                    tokens.push(picked.iter().join(&SAMPLE_INDEX_SEPARATOR.to_string()));
                    groups.push(picked);
                }
                None => groups.push((0..group.fields.len()).collect()),
            }
        }

        if tokens.is_empty() {
            return Ok((None, Selection::from_groups(groups)));
        }

        let sample = tokens.iter().join(&SAMPLE_GROUP_SEPARATOR.to_string());
        let manifest = Self::sign(random_nonce(rng), sample, secret)?;
        tracing::debug!("Generated sample {}", manifest.sample);
        Ok((Some(manifest), Selection::from_groups(groups)))
    }

    /// Recomputes the checksum and compares it in constant time.
    ///
    /// Only the lowercase hex form [`SampleManifest::sign`] produces is
    /// accepted.
    pub fn verify(&self, secret: &Secret) -> bool {
        if self.checksum.bytes().any(|b| b.is_ascii_uppercase()) {
            return false;
        }
        let Ok(expected) = hex::decode(&self.checksum) else {
            return false;
        };
        match mac_for(secret, &self.nonce, &self.sample) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }

    /// Re-derives the selection an encoded `sample` describes.
    ///
    /// Does not check the checksum; call [`SampleManifest::verify`] first.
    pub fn apply(schema: &ExerciseSchema, sample: &str) -> Result<Selection> {
        let picking = schema
            .groups
            .iter()
            .filter(|g| g.pick_randomly.is_some())
            .count();
        let mut tokens = sample.split(SAMPLE_GROUP_SEPARATOR);
        let token_count = sample.split(SAMPLE_GROUP_SEPARATOR).count();
        if token_count != picking {
            return Err(GraderError::Validation(format!(
                "Sample has {token_count} groups, the exercise picks randomly in {picking}"
            )));
        }

        let mut groups = Vec::with_capacity(schema.groups.len());
        for (g, group) in schema.groups.iter().enumerate() {
            let Some(k) = group.pick_randomly else {
                groups.push((0..group.fields.len()).collect());
                continue;
            };
            let token = tokens.next().unwrap_or_default();
            let picked = parse_token(token, group.fields.len())
                .map_err(|e| GraderError::Validation(format!("group {g}: {e}")))?;
            if picked.len() != k {
                return Err(GraderError::Validation(format!(
                    "group {g}: expected {k} indices, found {}",
                    picked.len()
                )));
            }
            groups.push(picked);
        }
        Ok(Selection::from_groups(groups))
    }

    /// Reads the manifest fields carried in a submission.
    ///
    /// Returns `None` when the nonce or the sample is missing or empty,
    /// meaning the submission is not gated by a manifest.
    pub fn from_submission(submission: &Submission) -> Option<Self> {
        let nonce = submission.text(NONCE_KEY);
        let sample = submission.text(SAMPLE_KEY);
        if nonce.is_empty() || sample.is_empty() {
            return None;
        }
        Some(Self {
            nonce:    nonce.to_string(),
            sample:   sample.to_string(),
            checksum: submission.text(CHECKSUM_KEY).to_string(),
        })
    }

    /// Verifies the manifest and applies it, refusing tampered samples.
    pub fn verified_selection(&self, schema: &ExerciseSchema, secret: &Secret) -> Result<Selection> {
        if !self.verify(secret) {
            tracing::warn!("Rejected sample manifest with invalid checksum");
            return Err(GraderError::Permission("Invalid checksum".to_string()));
        }
        Self::apply(schema, &self.sample)
    }
}

/// Parses one dash separated index list against a group of `len` fields.
fn parse_token(token: &str, len: usize) -> std::result::Result<Vec<usize>, String> {
    if token.is_empty() {
        return Ok(Vec::new());
    }
    let mut picked = Vec::new();
    for part in token.split(SAMPLE_INDEX_SEPARATOR) {
        let index: usize = part
            .parse()
            .map_err(|_| format!("`{part}` is not a field index"))?;
        if index >= len {
            return Err(format!("index {index} is out of range for {len} fields"));
        }
        if picked.contains(&index) {
            return Err(format!("index {index} is repeated"));
        }
        picked.push(index);
    }
    Ok(picked)
}
