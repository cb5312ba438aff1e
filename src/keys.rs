//! Key material for every cipher role, held only by the client.
//!
//! A [`KeySet`] serializes to one JSON object with a sub-object per role and
//! must be stored out of band. Losing it makes stored data unrecoverable;
//! leaking it voids every confidentiality property.
use crate::cipher::{ElGamalKeys, PaillierKeys, SymmetricKey};
use crate::client::Role;
use crate::config::Config;
use crate::ore::OreKey;
use crate::{Error, Result};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySet {
    #[serde(rename = "static")]
    pub symmetric: SymmetricKey,
    #[serde(rename = "index")]
    pub ore: OreKey,
    #[serde(rename = "h_add", default, skip_serializing_if = "Option::is_none")]
    pub additive: Option<PaillierKeys>,
    #[serde(rename = "h_mul", default, skip_serializing_if = "Option::is_none")]
    pub multiplicative: Option<ElGamalKeys>,
}

impl KeySet {
    /// Generates keys for every role the configuration uses. The homomorphic
    /// keypairs are skipped when no field needs them.
    pub fn generate<R: RngCore + CryptoRng>(config: &Config, rng: &mut R) -> Result<Self> {
        let roles: BTreeSet<Role> = config.fields.values().flatten().copied().collect();

        let additive = if roles.contains(&Role::Additive) {
            info!(bits = config.paillier_bits, "generating Paillier keypair");
            Some(PaillierKeys::generate(config.paillier_bits, rng)?)
        } else {
            None
        };
        let multiplicative = if roles.contains(&Role::Multiplicative) {
            info!(bits = config.elgamal_bits, "generating ElGamal keypair");
            let mut keys = ElGamalKeys::generate(config.elgamal_bits, rng)?;
            if config.elgamal_deterministic {
                keys.set_deterministic(rng);
            }
            Some(keys)
        } else {
            None
        };

        Ok(Self {
            symmetric: SymmetricKey::generate(rng),
            ore: OreKey::generate(rng),
            additive,
            multiplicative,
        })
    }

    pub fn has(&self, role: Role) -> bool {
        match role {
            Role::Static | Role::Index | Role::Passthrough => true,
            Role::Additive => self.additive.is_some(),
            Role::Multiplicative => self.multiplicative.is_some(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}
