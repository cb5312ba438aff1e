use ore_store::query::BulkInsertReport;
use ore_store::{
    CancelToken, Client, Condition, Config, Document, EncryptedCollection, Error, KeySet, Loader,
    MemoryStore, Predicate, Relation, Role, Selection,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

const CHARACTERS: [(&str, &str, i64); 13] = [
    ("Arya", "Stark", 18),
    ("Jon", "Snow", 40),
    ("Tyrion", "Lannister", 34),
    ("Sansa", "Stark", 20),
    ("Bran", "Stark", 12),
    ("Rickon", "Stark", 16),
    ("Daenerys", "Targaryen", 19),
    ("Cersei", "Lannister", 55),
    ("Jaime", "Lannister", 35),
    ("Theon", "Greyjoy", 35),
    ("Petyr", "Baelish", 41),
    ("Gendry", "Baratheon", 17),
    ("Drogon", "Targaryen", 201),
];

fn config() -> Config {
    let mut config = Config {
        paillier_bits: 256,
        ..Config::default()
    }
    .field("name", Role::Static)
    .field("name", Role::Index)
    .field("house", Role::Static)
    .field("age", Role::Index)
    .field("age", Role::Additive);
    config.ore = ore_store::OreParams::new(64, 8).unwrap();
    config
}

fn keys() -> &'static KeySet {
    static KEYS: OnceLock<KeySet> = OnceLock::new();
    KEYS.get_or_init(|| KeySet::generate(&config(), &mut ChaCha20Rng::seed_from_u64(41)).unwrap())
}

fn documents() -> Vec<Document> {
    CHARACTERS
        .iter()
        .map(|(name, house, age)| {
            let doc = json!({"name": name, "house": house, "age": age});
            doc.as_object().cloned().unwrap()
        })
        .collect()
}

fn loaded() -> (Client, EncryptedCollection<MemoryStore>) {
    let client = Client::new(&config(), keys()).unwrap();
    let collection = EncryptedCollection::new(MemoryStore::new(), "got")
        .with_additive_key(client.additive_public().unwrap().clone());
    let report = Loader::new(&client, &collection)
        .chunk_size(5)
        .load(documents(), &CancelToken::new())
        .unwrap();
    assert!(report.outcome.is_complete());
    (client, collection)
}

fn names(client: &Client, docs: &[Document]) -> Vec<String> {
    let mut names: Vec<String> = docs
        .iter()
        .map(|doc| client.decrypt(doc).unwrap()["name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    names
}

fn ages_by_name(client: &Client, collection: &EncryptedCollection<MemoryStore>) -> BTreeMap<String, i64> {
    collection
        .find_all(None)
        .unwrap()
        .iter()
        .map(|doc| {
            let plain = client.decrypt(doc).unwrap();
            (
                plain["name"].as_str().unwrap().to_string(),
                plain["age"].as_i64().unwrap(),
            )
        })
        .collect()
}

#[test]
fn store_holds_no_plaintext() {
    let (_, collection) = loaded();
    for doc in collection.find_all(None).unwrap() {
        let text = Value::Object(doc).to_string();
        for (name, house, _) in CHARACTERS {
            for word in [name, house].into_iter().filter(|w| w.len() >= 6) {
                assert!(!text.contains(word), "{} leaked", word);
            }
        }
    }
}

#[test]
fn equality_and_inequality() {
    let (client, collection) = loaded();
    let cancel = CancelToken::new();
    let token = client.query_token("age", &json!(35)).unwrap();

    let equal = collection
        .find("age", &token, Relation::Equal, None, &cancel)
        .unwrap();
    assert_eq!(names(&client, &equal), vec!["Jaime", "Theon"]);

    let older = collection
        .find("age", &token, Relation::Greater, None, &cancel)
        .unwrap();
    let mut ages: Vec<i64> = older
        .iter()
        .map(|doc| client.decrypt(doc).unwrap()["age"].as_i64().unwrap())
        .collect();
    ages.sort();
    assert_eq!(ages, vec![40, 41, 55, 201]);

    let bran = client.query_token("name", &json!("Bran")).unwrap();
    let found = collection
        .find("name", &bran, Relation::Equal, None, &cancel)
        .unwrap();
    assert_eq!(names(&client, &found), vec!["Bran"]);
    assert_eq!(client.decrypt(&found[0]).unwrap()["house"], json!("Stark"));

    // Short strings order like their bytes.
    let before_c = client.query_token("name", &json!("C")).unwrap();
    let found = collection
        .find("name", &before_c, Relation::Less, None, &cancel)
        .unwrap();
    assert_eq!(names(&client, &found), vec!["Arya", "Bran"]);
}

#[test]
fn range_query() {
    let (client, collection) = loaded();
    let low = client.query_token("age", &json!(17)).unwrap();
    let high = client.query_token("age", &json!(20)).unwrap();
    let found = collection
        .find_range("age", &low, &high, None, &CancelToken::new())
        .unwrap();
    assert_eq!(names(&client, &found), vec!["Arya", "Daenerys", "Gendry", "Sansa"]);
}

#[test]
fn nested_conditions_intersect() {
    let (client, collection) = loaded();
    let cancel = CancelToken::new();
    let early = Condition::new(
        "name",
        Predicate::Less(client.query_token("name", &json!("C")).unwrap()),
    );
    let adult = Condition::new(
        "age",
        Predicate::Greater(client.query_token("age", &json!(17)).unwrap()),
    );

    let both = collection
        .find_nested_ids(&[early.clone(), adult.clone()], &cancel)
        .unwrap();
    let each: Vec<_> = [&early, &adult]
        .iter()
        .map(|c| collection.find_ids(c, &cancel).unwrap())
        .collect();
    let expected: std::collections::BTreeSet<_> = each[0].intersection(&each[1]).copied().collect();
    assert_eq!(both, expected);

    let docs = collection.find_nested(&[early, adult], None, &cancel).unwrap();
    assert_eq!(names(&client, &docs), vec!["Arya"]);

    assert!(matches!(
        collection.find_nested(&[], None, &cancel),
        Err(Error::Index(_))
    ));
}

#[test]
fn equality_and_range_intersect() {
    let (client, collection) = loaded();
    let cancel = CancelToken::new();
    let range = Predicate::Range(
        client.query_token("age", &json!(10)).unwrap(),
        client.query_token("age", &json!(20)).unwrap(),
    );
    for name in ["Arya", "Jon", "Bran"] {
        let conditions = [
            Condition::new(
                "name",
                Predicate::Equal(client.query_token("name", &json!(name)).unwrap()),
            ),
            Condition::new("age", range.clone()),
        ];
        let both = collection.find_nested_ids(&conditions, &cancel).unwrap();
        let by_name = collection.find_ids(&conditions[0], &cancel).unwrap();
        let by_age = collection.find_ids(&conditions[1], &cancel).unwrap();
        let expected: std::collections::BTreeSet<_> = by_name.intersection(&by_age).copied().collect();
        assert_eq!(both, expected, "{}", name);
        assert_eq!(both.len(), usize::from(name != "Jon"));
    }
}

#[test]
fn homomorphic_increment() {
    let (client, collection) = loaded();
    let before = ages_by_name(&client, &collection);
    let mut rng = ChaCha20Rng::seed_from_u64(42);

    let young = Selection::Where(vec![Condition::new(
        "age",
        Predicate::Less(client.query_token("age", &json!(18)).unwrap()),
    )]);
    let update: Document = serde_json::from_value(json!({"$inc": {"age": 20}})).unwrap();
    let update = client.encrypt_update(&update, &mut rng).unwrap();
    let modified = collection
        .update(&young, &update, &CancelToken::new())
        .unwrap();
    assert_eq!(modified, 3);

    let after = ages_by_name(&client, &collection);
    for (name, age) in &before {
        let expected = if *age < 18 { age + 20 } else { *age };
        assert_eq!(after[name], expected, "{}", name);
    }
}

#[test]
fn homomorphic_decrement_everyone() {
    let (client, collection) = loaded();
    let before = ages_by_name(&client, &collection);
    let mut rng = ChaCha20Rng::seed_from_u64(43);

    let update: Document = serde_json::from_value(json!({"$dec": {"age": 2}})).unwrap();
    let update = client.encrypt_update(&update, &mut rng).unwrap();
    let modified = collection
        .update(&Selection::All, &update, &CancelToken::new())
        .unwrap();
    assert_eq!(modified, CHARACTERS.len());

    let after = ages_by_name(&client, &collection);
    for (name, age) in before {
        assert_eq!(after[&name], age - 2);
    }
}

#[test]
fn set_replaces_unindexed_fields_only() {
    let (client, collection) = loaded();
    let mut rng = ChaCha20Rng::seed_from_u64(44);
    let cancel = CancelToken::new();
    let token = client.query_token("age", &json!(201)).unwrap();
    let ids = collection
        .find_ids(&Condition::new("age", Predicate::Equal(token)), &cancel)
        .unwrap();

    let rehouse: Document = serde_json::from_value(json!({"$set": {"house": "Dragons"}})).unwrap();
    let rehouse = client.encrypt_update(&rehouse, &mut rng).unwrap();
    assert_eq!(collection.update(&Selection::Ids(ids), &rehouse, &cancel).unwrap(), 1);

    let houses: Vec<Value> = collection
        .find_all(None)
        .unwrap()
        .iter()
        .map(|doc| client.decrypt(doc).unwrap()["house"].clone())
        .collect();
    assert_eq!(houses.iter().filter(|h| **h == json!("Dragons")).count(), 1);
    assert_eq!(houses.iter().filter(|h| **h == json!("Targaryen")).count(), 1);

    let rename: Document = serde_json::from_value(json!({"$set": {"name": "Drogo"}})).unwrap();
    assert!(matches!(
        client.encrypt_update(&rename, &mut rng),
        Err(Error::IndexedFieldUpdate(_))
    ));
}

#[test]
fn incremental_inserts_after_load() {
    let (client, collection) = loaded();
    let cancel = CancelToken::new();
    let doc: Document = serde_json::from_value(json!({"name": "Hodor", "house": "Stark", "age": 35})).unwrap();
    collection.insert(client.encrypt(&doc).unwrap(), &cancel).unwrap();

    collection.index().check_invariants("age").unwrap();
    let token = client.query_token("age", &json!(35)).unwrap();
    let equal = collection
        .find("age", &token, Relation::Equal, None, &cancel)
        .unwrap();
    assert_eq!(names(&client, &equal), vec!["Hodor", "Jaime", "Theon"]);
}

#[test]
fn bulk_insert_report() {
    let client = Client::new(&config(), keys()).unwrap();
    let collection = EncryptedCollection::new(MemoryStore::new(), "got");
    let encrypted = documents()
        .iter()
        .map(|doc| client.encrypt(doc).unwrap())
        .collect();
    let report: BulkInsertReport = collection.insert_many(encrypted, &CancelToken::new());
    assert!(report.is_complete());
    assert_eq!(report.stored.len(), CHARACTERS.len());
    assert_eq!(collection.index().attributes().unwrap(), vec!["age", "name"]);
}

#[test]
fn keys_survive_serialization() {
    let json = keys().to_json().unwrap();
    let restored = KeySet::from_json(&json).unwrap();
    let (client, collection) = loaded();
    let other = Client::new(&config(), &restored).unwrap();

    let token = other.query_token("age", &json!(12)).unwrap();
    let found = collection
        .find("age", &token, Relation::Equal, None, &CancelToken::new())
        .unwrap();
    assert_eq!(names(&client, &found), vec!["Bran"]);
    assert_eq!(names(&other, &found), vec!["Bran"]);
}

#[test]
fn drop_removes_everything() {
    let (_, collection) = loaded();
    collection.drop().unwrap();
    assert!(collection.find_all(None).unwrap().is_empty());
    assert!(collection.index().attributes().unwrap().is_empty());
}
