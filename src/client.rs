//! Attribute dispatcher.
//!
//! The client owns every key. It maps each document field to the roles it
//! was classified with and runs the matching cipher per role, nesting the
//! results under the field name:
//!
//! ```text
//! {"age": 35}  ->  {"age": {"index": <OreRight>, "static": "<hex>", "h_add": "<decimal>"}}
//! ```
//!
//! Fields classified `index` always get a `static` ciphertext too, so a
//! located document can be read back. The ORE right ciphertext is kept in the
//! document for reference while the left half is returned to the caller in
//! [`EncryptedDocument::index_entries`] for building the index.
use crate::cipher::{
    ElGamal, ElGamalCiphertext, Paillier, PaillierCiphertext, PaillierPublicKey,
    SymmetricCipher,
};
use crate::config::{Config, IndexEncoding};
use crate::convert::ToOrderedInteger;
use crate::keys::KeySet;
use crate::ore::{OreCiphertext, OreCipher, OreLeft, OreParams};
use crate::query::UpdateOperator;
use crate::store::{Document, ID_FIELD, VERSION_FIELD};
use crate::{Error, Result};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Cryptographic capability assigned to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    /// Randomized AES-CBC, readable only by the key holder.
    Static,
    /// ORE, searchable through the encrypted index.
    Index,
    /// Paillier, supports `$inc` and `$dec`.
    Additive,
    /// ElGamal, multiplicative (or additive in exponential mode).
    Multiplicative,
    /// Stored in the clear.
    Passthrough,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Static,
        Role::Index,
        Role::Additive,
        Role::Multiplicative,
        Role::Passthrough,
    ];

    /// Key under which this role's ciphertext is stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Static => "static",
            Role::Index => "index",
            Role::Additive => "h_add",
            Role::Multiplicative => "h_mul",
            Role::Passthrough => "do_nothing",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "static" => Ok(Role::Static),
            "index" => Ok(Role::Index),
            "h_add" | "additive" => Ok(Role::Additive),
            "h_mul" | "multiplicative" => Ok(Role::Multiplicative),
            "do_nothing" | "passthrough" => Ok(Role::Passthrough),
            other => Err(Error::UnknownRole(other.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> String {
        role.as_str().to_string()
    }
}

/// Purpose of an encryption, which decides the roles that are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptKind {
    /// Every role. `index` fields also get a `static` ciphertext.
    Store,
    /// Only ORE left tokens for `index` fields.
    Search,
    /// Every role except `index`, for update deltas and replacements.
    Update,
}

/// An ORE ciphertext produced while encrypting a document for storage.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub attribute: String,
    /// Encoded plaintext, used by the loader to sort before bulk building.
    pub plaintext: u64,
    pub ciphertext: OreCiphertext,
}

#[derive(Debug, Clone, Default)]
pub struct EncryptedDocument {
    pub body: Document,
    pub index_entries: Vec<IndexEntry>,
}

pub struct Client {
    roles: BTreeMap<String, Vec<Role>>,
    encoding: IndexEncoding,
    symmetric: SymmetricCipher,
    ore: OreCipher,
    additive: Option<Paillier>,
    multiplicative: Option<ElGamal>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("roles", &self.roles)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Builds the ciphers from `keys` and registers the configured roles.
    /// Fails if a configured role has no key material.
    pub fn new(config: &Config, keys: &KeySet) -> Result<Self> {
        config.validate()?;
        let multiplicative = keys.multiplicative.as_ref().map(|k| {
            if config.elgamal_exponential {
                let (lo, hi) = config.elgamal_table;
                ElGamal::exponential(k, lo, hi)
            } else {
                ElGamal::new(k)
            }
        });

        let mut client = Self {
            roles: BTreeMap::new(),
            encoding: config.index_encoding,
            symmetric: SymmetricCipher::new(&keys.symmetric),
            ore: OreCipher::init(&keys.ore, config.ore)?,
            additive: keys.additive.as_ref().map(Paillier::new),
            multiplicative,
        };
        for (field, roles) in &config.fields {
            for role in roles {
                client.classify(field, *role)?;
            }
        }
        Ok(client)
    }

    /// Registers `role` for the field at the dotted path `field`.
    pub fn classify(&mut self, field: &str, role: Role) -> Result<()> {
        let available = match role {
            Role::Additive => self.additive.is_some(),
            Role::Multiplicative => self.multiplicative.is_some(),
            _ => true,
        };
        if !available {
            return Err(Error::MissingKey(role));
        }
        let roles = self.roles.entry(field.to_string()).or_default();
        if !roles.contains(&role) {
            roles.push(role);
        }
        Ok(())
    }

    pub fn roles(&self, field: &str) -> &[Role] {
        self.roles.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has_role(&self, field: &str, role: Role) -> bool {
        self.roles(field).contains(&role)
    }

    /// Fields classified `index`.
    pub fn indexed_fields(&self) -> impl Iterator<Item = &str> {
        self.roles
            .iter()
            .filter(|(_, roles)| roles.contains(&Role::Index))
            .map(|(field, _)| field.as_str())
    }

    pub fn ore_params(&self) -> OreParams {
        self.ore.params()
    }

    /// Public half of the additive key, needed by the server to apply updates.
    pub fn additive_public(&self) -> Option<&PaillierPublicKey> {
        self.additive.as_ref().map(Paillier::public)
    }

    /// Encrypts a document for storage with the thread-local generator.
    pub fn encrypt(&self, doc: &Document) -> Result<EncryptedDocument> {
        self.encrypt_for(doc, EncryptKind::Store, &mut rand::thread_rng())
    }

    pub fn encrypt_for<R: RngCore + CryptoRng>(
        &self,
        doc: &Document,
        kind: EncryptKind,
        rng: &mut R,
    ) -> Result<EncryptedDocument> {
        let mut out = EncryptedDocument::default();
        let mut body = Map::new();
        for (key, value) in doc {
            if key == ID_FIELD || key == VERSION_FIELD {
                body.insert(key.clone(), value.clone());
                continue;
            }
            if let Some(encrypted) = self.encrypt_value(key, value, kind, rng, &mut out)? {
                body.insert(key.clone(), encrypted);
            }
        }
        out.body = body;
        Ok(out)
    }

    /// Encrypts an update document such as `{"$inc": {"age": 20}}`.
    ///
    /// Operator bodies come out keyed by dotted field path, each holding the
    /// ciphertext bundle produced with [`EncryptKind::Update`]. Indexed
    /// fields cannot be replaced since the index would go stale.
    pub fn encrypt_update<R: RngCore + CryptoRng>(
        &self,
        update: &Document,
        rng: &mut R,
    ) -> Result<Document> {
        let mut out = Map::new();
        for (op, body) in update {
            let operator: UpdateOperator = op.parse()?;
            let fields = body.as_object().ok_or_else(|| Error::UnsupportedValue {
                field: op.clone(),
                reason: "operator body must be an object".into(),
            })?;

            let mut leaves = Vec::new();
            self.leaves("", fields, &mut leaves);
            let mut encrypted = Map::new();
            for (path, value) in leaves {
                match operator {
                    UpdateOperator::Inc | UpdateOperator::Dec
                        if !self.has_role(&path, Role::Additive) =>
                    {
                        return Err(Error::UnsupportedValue {
                            field: path,
                            reason: format!("{} needs the {} role", op, Role::Additive),
                        });
                    }
                    UpdateOperator::Set if self.has_role(&path, Role::Index) => {
                        return Err(Error::IndexedFieldUpdate(path));
                    }
                    _ => {}
                }
                let mut scratch = EncryptedDocument::default();
                if let Some(bundle) =
                    self.encrypt_value(&path, value, EncryptKind::Update, rng, &mut scratch)?
                {
                    encrypted.insert(path, bundle);
                }
            }
            out.insert(op.clone(), Value::Object(encrypted));
        }
        Ok(out)
    }

    /// Flattens `fields` down to the paths that carry roles.
    fn leaves<'v>(&self, prefix: &str, fields: &'v Document, out: &mut Vec<(String, &'v Value)>) {
        for (key, value) in fields {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            match value {
                Value::Object(nested) if self.roles(&path).is_empty() => {
                    self.leaves(&path, nested, out)
                }
                _ => out.push((path, value)),
            }
        }
    }

    /// Left ORE token for `value`, usable as a search bound on `field`.
    pub fn query_token(&self, field: &str, value: &Value) -> Result<OreLeft> {
        let plaintext = self.index_plaintext(field, value)?;
        Ok(self.ore.encrypt_left(plaintext)?)
    }

    /// Encrypts an additive delta for `field`.
    pub fn encrypt_delta<R: RngCore + CryptoRng>(
        &self,
        field: &str,
        delta: i64,
        rng: &mut R,
    ) -> Result<PaillierCiphertext> {
        if !self.has_role(field, Role::Additive) {
            return Err(Error::UnsupportedValue {
                field: field.to_string(),
                reason: format!("needs the {} role", Role::Additive),
            });
        }
        Ok(self.paillier()?.encrypt(delta, rng)?)
    }

    /// Reverses [`Client::encrypt`]. Fields with only an `index` ciphertext
    /// cannot be recovered and are left out.
    pub fn decrypt(&self, doc: &Document) -> Result<Document> {
        self.decrypt_object(doc, "")
    }

    /// Maps a field value to its ORE plaintext under the configured encoding.
    /// Short strings pack their UTF-8 bytes big endian, padded on the right.
    pub fn index_plaintext(&self, field: &str, value: &Value) -> Result<u64> {
        let params = self.ore.params();
        let unsupported = |reason: String| Error::UnsupportedValue {
            field: field.to_string(),
            reason,
        };

        if let Value::String(s) = value {
            let width = (params.nbits() / 8) as usize;
            if params.nbits() % 8 != 0 || s.len() > width {
                return Err(unsupported(format!(
                    "strings of {} bytes do not fit {} bit plaintexts",
                    s.len(),
                    params.nbits()
                )));
            }
            let packed = s
                .bytes()
                .chain(std::iter::repeat(0))
                .take(width)
                .fold(0u64, |acc, b| acc << 8 | b as u64);
            return Ok(packed);
        }

        let plaintext = match self.encoding {
            IndexEncoding::Unsigned => value
                .as_u64()
                .ok_or_else(|| unsupported(format!("{} is not a non-negative integer", value)))?,
            IndexEncoding::Signed => value
                .as_i64()
                .ok_or_else(|| unsupported(format!("{} is not an integer", value)))?
                .map_to(),
            IndexEncoding::Float => {
                let f = value
                    .as_f64()
                    .ok_or_else(|| unsupported(format!("{} is not a number", value)))?;
                if !f.is_finite() {
                    return Err(unsupported("not a finite number".into()));
                }
                // -0.0 and 0.0 are the same value and must share a plaintext
                let f = if f == 0.0 { 0.0 } else { f };
                f.map_to()
            }
        };
        params
            .check(plaintext)
            .map_err(|e| unsupported(e.to_string()))?;
        Ok(plaintext)
    }

    fn paillier(&self) -> Result<&Paillier> {
        self.additive.as_ref().ok_or(Error::MissingKey(Role::Additive))
    }

    fn elgamal(&self) -> Result<&ElGamal> {
        self.multiplicative
            .as_ref()
            .ok_or(Error::MissingKey(Role::Multiplicative))
    }

    fn encrypt_value<R: RngCore + CryptoRng>(
        &self,
        path: &str,
        value: &Value,
        kind: EncryptKind,
        rng: &mut R,
        out: &mut EncryptedDocument,
    ) -> Result<Option<Value>> {
        let roles = self.roles(path);
        if roles.is_empty() {
            return match value {
                Value::Object(fields) => {
                    let mut nested = Map::new();
                    for (key, child) in fields {
                        let child_path = format!("{}.{}", path, key);
                        if let Some(encrypted) =
                            self.encrypt_value(&child_path, child, kind, rng, out)?
                        {
                            nested.insert(key.clone(), encrypted);
                        }
                    }
                    Ok(Some(Value::Object(nested)))
                }
                _ => Err(Error::UnclassifiedField(path.to_string())),
            };
        }

        let mut bundle = Map::new();
        for role in roles {
            match (kind, role) {
                (EncryptKind::Search, Role::Index) => {
                    let token = self.query_token(path, value)?;
                    bundle.insert(role.to_string(), serde_json::to_value(token)?);
                }
                (EncryptKind::Search, _) | (EncryptKind::Update, Role::Index) => {}
                (EncryptKind::Store, Role::Index) => {
                    let plaintext = self.index_plaintext(path, value)?;
                    let ciphertext = self.ore.encrypt(plaintext, rng)?;
                    bundle.insert(role.to_string(), serde_json::to_value(&ciphertext.right)?);
                    if !roles.contains(&Role::Static) {
                        bundle.insert(
                            Role::Static.to_string(),
                            self.encrypt_static(value, rng)?,
                        );
                    }
                    out.index_entries.push(IndexEntry {
                        attribute: path.to_string(),
                        plaintext,
                        ciphertext,
                    });
                }
                (_, Role::Static) => {
                    bundle.insert(role.to_string(), self.encrypt_static(value, rng)?);
                }
                (_, Role::Additive) => {
                    let m = self.integer(path, value)?;
                    let ct = self.paillier()?.encrypt(m, rng)?;
                    bundle.insert(role.to_string(), serde_json::to_value(ct)?);
                }
                (_, Role::Multiplicative) => {
                    let m = self.integer(path, value)?;
                    let ct = self.elgamal()?.encrypt(m, rng)?;
                    bundle.insert(role.to_string(), serde_json::to_value(ct)?);
                }
                (_, Role::Passthrough) => {
                    bundle.insert(role.to_string(), value.clone());
                }
            }
        }

        if bundle.is_empty() {
            return Ok(None);
        }
        Ok(Some(Value::Object(bundle)))
    }

    fn encrypt_static<R: RngCore + CryptoRng>(&self, value: &Value, rng: &mut R) -> Result<Value> {
        let json = serde_json::to_vec(value)?;
        Ok(Value::String(self.symmetric.encrypt(&json, rng)))
    }

    fn integer(&self, path: &str, value: &Value) -> Result<i64> {
        value.as_i64().ok_or_else(|| Error::UnsupportedValue {
            field: path.to_string(),
            reason: format!("{} is not an integer", value),
        })
    }

    fn decrypt_object(&self, doc: &Document, prefix: &str) -> Result<Document> {
        let mut out = Map::new();
        for (key, value) in doc {
            if prefix.is_empty() && (key == ID_FIELD || key == VERSION_FIELD) {
                out.insert(key.clone(), value.clone());
                continue;
            }
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };

            if !self.roles(&path).is_empty() {
                let bundle = value.as_object().ok_or_else(|| Error::UnsupportedValue {
                    field: path.clone(),
                    reason: "encrypted field is not a ciphertext bundle".into(),
                })?;
                if let Some(plain) = self.decrypt_bundle(&path, bundle)? {
                    out.insert(key.clone(), plain);
                }
            } else if let Value::Object(nested) = value {
                out.insert(key.clone(), Value::Object(self.decrypt_object(nested, &path)?));
            } else {
                return Err(Error::UnclassifiedField(path));
            }
        }
        Ok(out)
    }

    /// Homomorphic ciphertexts take precedence because updates only touch them.
    fn decrypt_bundle(&self, path: &str, bundle: &Map<String, Value>) -> Result<Option<Value>> {
        if let Some(ct) = bundle.get(Role::Additive.as_str()) {
            let ct: PaillierCiphertext = serde_json::from_value(ct.clone())?;
            return Ok(Some(self.paillier()?.decrypt_i64(&ct)?.into()));
        }
        if let Some(ct) = bundle.get(Role::Multiplicative.as_str()) {
            let ct: ElGamalCiphertext = serde_json::from_value(ct.clone())?;
            return Ok(Some(self.elgamal()?.decrypt(&ct)?.into()));
        }
        if let Some(Value::String(ct)) = bundle.get(Role::Static.as_str()) {
            let json = self.symmetric.decrypt(ct)?;
            return Ok(Some(serde_json::from_slice(&json)?));
        }
        if let Some(value) = bundle.get(Role::Passthrough.as_str()) {
            return Ok(Some(value.clone()));
        }
        debug!(field = path, "field has no decryptable ciphertext");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use serde_json::json;
    use std::cmp::Ordering;
    use std::sync::OnceLock;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn keys() -> &'static KeySet {
        static KEYS: OnceLock<KeySet> = OnceLock::new();
        KEYS.get_or_init(|| {
            let config = Config {
                paillier_bits: 256,
                elgamal_bits: 128,
                ..Config::default()
            }
            .field("a", Role::Additive)
            .field("m", Role::Multiplicative);
            KeySet::generate(&config, &mut ChaCha20Rng::seed_from_u64(7)).unwrap()
        })
    }

    fn client() -> Client {
        let mut config = Config::default()
            .field("name", Role::Static)
            .field("age", Role::Index)
            .field("age", Role::Additive)
            .field("house", Role::Index)
            .field("region", Role::Passthrough)
            .field("stats.kills", Role::Multiplicative)
            .field("stats.allies", Role::Static);
        config.ore = OreParams::new(64, 8).unwrap();
        Client::new(&config, keys()).unwrap()
    }

    fn sample() -> Document {
        doc(json!({
            "_id": 4,
            "name": "Arya Stark",
            "age": 18,
            "house": "Stark",
            "region": "North",
            "stats": {"kills": 12, "allies": ["Gendry", "Hot Pie"]}
        }))
    }

    #[test]
    fn role_names() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("additive".parse::<Role>().unwrap(), Role::Additive);
        assert!(matches!("ore".parse::<Role>(), Err(Error::UnknownRole(_))));
        assert_eq!(serde_json::to_value(Role::Passthrough).unwrap(), json!("do_nothing"));
    }

    #[test]
    fn store_layout() {
        let client = client();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let enc = client
            .encrypt_for(&sample(), EncryptKind::Store, &mut rng)
            .unwrap();

        assert_eq!(enc.body["_id"], json!(4));
        let age = enc.body["age"].as_object().unwrap();
        assert!(age.contains_key("index"));
        assert!(age.contains_key("static"));
        assert!(age.contains_key("h_add"));
        assert_eq!(enc.body["region"], json!({"do_nothing": "North"}));
        assert!(enc.body["stats"]["kills"].get("h_mul").is_some());

        let attributes: Vec<_> = enc.index_entries.iter().map(|e| e.attribute.as_str()).collect();
        assert_eq!(attributes, vec!["age", "house"]);
        assert_eq!(enc.index_entries[0].plaintext, 18);
    }

    #[test]
    fn decrypt_roundtrip() {
        let client = client();
        let original = sample();
        let enc = client.encrypt(&original).unwrap();
        assert_eq!(client.decrypt(&enc.body).unwrap(), original);
    }

    #[test]
    fn index_only_field_is_recoverable_through_static() {
        let config = Config::default().field("age", Role::Index);
        let client = Client::new(&config, keys()).unwrap();
        let enc = client.encrypt(&doc(json!({"age": 40}))).unwrap();
        let age = enc.body["age"].as_object().unwrap();
        assert_eq!(age.len(), 2);
        assert_eq!(client.decrypt(&enc.body).unwrap(), doc(json!({"age": 40})));

        let mut bare = enc.body.clone();
        bare.insert("age".into(), json!({"index": age["index"].clone()}));
        assert_eq!(client.decrypt(&bare).unwrap(), Document::new());
    }

    #[test]
    fn search_emits_only_tokens() {
        let client = client();
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let enc = client
            .encrypt_for(
                &doc(json!({"age": 35, "name": "Jon"})),
                EncryptKind::Search,
                &mut rng,
            )
            .unwrap();
        assert_eq!(enc.body.len(), 1);
        let token: OreLeft = serde_json::from_value(enc.body["age"]["index"].clone()).unwrap();
        assert_eq!(token, client.query_token("age", &json!(35)).unwrap());
        assert!(enc.index_entries.is_empty());
    }

    #[test]
    fn update_skips_index() {
        let client = client();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let update = client
            .encrypt_update(&doc(json!({"$inc": {"age": 20}})), &mut rng)
            .unwrap();
        let age = update["$inc"]["age"].as_object().unwrap();
        assert_eq!(age.keys().collect::<Vec<_>>(), vec!["h_add"]);

        assert!(matches!(
            client.encrypt_update(&doc(json!({"$mul": {"age": 2}})), &mut rng),
            Err(Error::UnsupportedOperator(_))
        ));
        assert!(matches!(
            client.encrypt_update(&doc(json!({"$inc": {"name": 2}})), &mut rng),
            Err(Error::UnsupportedValue { .. })
        ));
        assert!(matches!(
            client.encrypt_update(&doc(json!({"$set": {"house": "Snow"}})), &mut rng),
            Err(Error::IndexedFieldUpdate(f)) if f == "house"
        ));

        let nested = client
            .encrypt_update(&doc(json!({"$set": {"stats": {"allies": ["Nymeria"]}}})), &mut rng)
            .unwrap();
        assert!(nested["$set"]["stats.allies"].get("static").is_some());
    }

    #[test]
    fn token_orders_against_stored() {
        let client = client();
        let enc = client.encrypt(&doc(json!({"age": 35}))).unwrap();
        let stored = &enc.index_entries[0].ciphertext.right;
        let cmp = |v: u64| client.query_token("age", &json!(v)).unwrap().compare(stored).unwrap();
        assert_eq!(cmp(34), Ordering::Less);
        assert_eq!(cmp(35), Ordering::Equal);
        assert_eq!(cmp(201), Ordering::Greater);
    }

    #[test]
    fn string_plaintexts_keep_order() {
        let client = client();
        let a = client.index_plaintext("house", &json!("Ab")).unwrap();
        let b = client.index_plaintext("house", &json!("Abc")).unwrap();
        let c = client.index_plaintext("house", &json!("B")).unwrap();
        assert!(a < b && b < c);
        assert!(client.index_plaintext("house", &json!("Lannister")).is_err());
    }

    #[test]
    fn signed_and_float_encodings() {
        let mut config = Config::default().field("t", Role::Index);
        config.ore = OreParams::new(64, 8).unwrap();
        config.index_encoding = IndexEncoding::Signed;
        let signed = Client::new(&config, keys()).unwrap();
        assert!(
            signed.index_plaintext("t", &json!(-5)).unwrap()
                < signed.index_plaintext("t", &json!(3)).unwrap()
        );

        config.index_encoding = IndexEncoding::Float;
        let float = Client::new(&config, keys()).unwrap();
        assert!(
            float.index_plaintext("t", &json!(-0.5)).unwrap()
                < float.index_plaintext("t", &json!(0.25)).unwrap()
        );

        let unsigned = client();
        assert!(unsigned.index_plaintext("age", &json!(-1)).is_err());
    }

    #[test]
    fn negative_zero_indexes_as_zero() {
        let mut config = Config::default().field("t", Role::Index);
        config.ore = OreParams::new(64, 8).unwrap();
        config.index_encoding = IndexEncoding::Float;
        let float = Client::new(&config, keys()).unwrap();
        let zero = float.index_plaintext("t", &json!(0.0)).unwrap();
        assert_eq!(float.index_plaintext("t", &json!(-0.0)).unwrap(), zero);
        assert!(float.index_plaintext("t", &json!(-1e-300)).unwrap() < zero);
    }

    #[test]
    fn errors() {
        let client = client();
        assert!(matches!(
            client.encrypt(&doc(json!({"unknown": 1}))),
            Err(Error::UnclassifiedField(f)) if f == "unknown"
        ));
        assert!(matches!(
            client.encrypt(&doc(json!({"age": "old"}))),
            Err(Error::UnsupportedValue { .. })
        ));

        let without_paillier = KeySet {
            additive: None,
            ..keys().clone()
        };
        let config = Config::default().field("age", Role::Additive);
        assert!(matches!(
            Client::new(&config, &without_paillier),
            Err(Error::MissingKey(Role::Additive))
        ));
    }

    #[test]
    fn delta_combines() {
        let client = client();
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let enc = client.encrypt(&doc(json!({"age": 35}))).unwrap();
        let stored: PaillierCiphertext =
            serde_json::from_value(enc.body["age"]["h_add"].clone()).unwrap();
        let delta = client.encrypt_delta("age", 20, &mut rng).unwrap();
        let sum = client.additive_public().unwrap().combine(&stored, &delta).unwrap();

        let mut body = enc.body.clone();
        body["age"]["h_add"] = serde_json::to_value(sum).unwrap();
        assert_eq!(client.decrypt(&body).unwrap()["age"], json!(55));
    }
}
