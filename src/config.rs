use crate::client::Role;
use crate::ore::OreParams;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// How numeric index values are mapped into ORE plaintexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexEncoding {
    /// Non-negative integers below `2^nbits`, used as is.
    #[default]
    Unsigned,
    /// Any `i64`, shifted into `u64` order. Needs 64 bit plaintexts.
    Signed,
    /// Any finite number, through its order-preserving float mapping.
    /// Needs 64 bit plaintexts.
    Float,
}

fn default_paillier_bits() -> u64 {
    1024
}

fn default_elgamal_bits() -> u64 {
    1024
}

fn default_elgamal_table() -> (i64, i64) {
    (0, 1000)
}

fn default_chunk_size() -> usize {
    1000
}

fn default_insert_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub ore: OreParams,
    #[serde(default)]
    pub index_encoding: IndexEncoding,
    #[serde(default = "default_paillier_bits")]
    pub paillier_bits: u64,
    #[serde(default = "default_elgamal_bits")]
    pub elgamal_bits: u64,
    #[serde(default)]
    pub elgamal_exponential: bool,
    #[serde(default)]
    pub elgamal_deterministic: bool,
    /// Exponent range decryptable in exponential mode.
    #[serde(default = "default_elgamal_table")]
    pub elgamal_table: (i64, i64),
    #[serde(default = "default_chunk_size")]
    pub load_chunk_size: usize,
    #[serde(default = "default_insert_retries")]
    pub insert_retries: u32,
    /// Dotted field path to its roles.
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<Role>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ore: OreParams::default(),
            index_encoding: IndexEncoding::default(),
            paillier_bits: default_paillier_bits(),
            elgamal_bits: default_elgamal_bits(),
            elgamal_exponential: false,
            elgamal_deterministic: false,
            elgamal_table: default_elgamal_table(),
            load_chunk_size: default_chunk_size(),
            insert_retries: default_insert_retries(),
            fields: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Adds a role to a field.
    pub fn field(mut self, path: &str, role: Role) -> Self {
        let roles = self.fields.entry(path.to_string()).or_default();
        if !roles.contains(&role) {
            roles.push(role);
        }
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.index_encoding != IndexEncoding::Unsigned && self.ore.nbits() != 64 {
            return Err(Error::Config(format!(
                "{:?} index encoding needs 64 bit ORE plaintexts, not {}",
                self.index_encoding,
                self.ore.nbits()
            )));
        }
        if self.load_chunk_size == 0 {
            return Err(Error::Config("load_chunk_size must be positive".into()));
        }
        if self.elgamal_table.0 > self.elgamal_table.1 {
            return Err(Error::Config("elgamal_table range is empty".into()));
        }
        Ok(())
    }
}
