use ore_store::{
    CancelToken, Client, Condition, Config, Document, EncryptedCollection, KeySet, Loader, MemoryStore,
    Predicate, Relation, Role, Selection,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

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

fn main() -> ore_store::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::default()
            .field("name", Role::Static)
            .field("house", Role::Static)
            .field("age", Role::Index)
            .field("age", Role::Additive),
    };
    let keys = KeySet::generate(&config, &mut rand::thread_rng())?;
    let client = Client::new(&config, &keys)?;

    let mut people = EncryptedCollection::new(MemoryStore::new(), "people")
        .with_retries(config.insert_retries);
    if let Some(key) = client.additive_public() {
        people = people.with_additive_key(key.clone());
    }

    let cancel = CancelToken::new();
    let documents = CHARACTERS.iter().map(|(name, house, age)| {
        let doc = json!({"name": name, "house": house, "age": age});
        doc.as_object().cloned().unwrap_or_default()
    });
    let report = Loader::new(&client, &people)
        .chunk_size(config.load_chunk_size)
        .load(documents, &cancel)?;
    println!(
        "loaded {} documents, {} failed",
        report.outcome.stored.len(),
        report.outcome.failed.len()
    );
    if let Some(reason) = report.interrupted {
        println!("load stopped early: {}", reason);
    }

    let age = |v: i64| client.query_token("age", &json!(v));
    let show = |title: &str, docs: Vec<Document>| -> ore_store::Result<()> {
        println!("{}:", title);
        for doc in docs {
            let plain = client.decrypt(&doc)?;
            println!("  {}", Value::Object(plain));
        }
        Ok(())
    };

    show(
        "age = 35",
        people.find("age", &age(35)?, Relation::Equal, None, &cancel)?,
    )?;
    show(
        "age > 35",
        people.find("age", &age(35)?, Relation::Greater, None, &cancel)?,
    )?;
    show(
        "16 <= age <= 20",
        people.find_range("age", &age(16)?, &age(20)?, None, &cancel)?,
    )?;

    let young = Selection::Where(vec![Condition::new("age", Predicate::Less(age(18)?))]);
    let update: Document = serde_json::from_value(json!({"$inc": {"age": 20}}))?;
    let update = client.encrypt_update(&update, &mut rand::thread_rng())?;
    let modified = people.update(&young, &update, &cancel)?;
    println!("aged {} characters by 20 years", modified);

    // The index still holds the original ages.
    show(
        "age < 18 after the update",
        people.find("age", &age(18)?, Relation::Less, None, &cancel)?,
    )?;
    Ok(())
}
