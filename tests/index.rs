use ore_store::index::{intersect, BuildReport, EncryptedIndex, IndexError, Relation};
use ore_store::ore::{OreCipher, OreCiphertext, OreKey, OreParams};
use ore_store::{CancelToken, DocId, MemoryStore};
use quickcheck::quickcheck;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::collections::BTreeSet;

const AGES: [u64; 13] = [18, 40, 34, 20, 12, 16, 19, 55, 35, 35, 41, 17, 201];

fn ore() -> OreCipher {
    let mut rng = ChaCha20Rng::seed_from_u64(31);
    OreCipher::init(&OreKey::generate(&mut rng), OreParams::new(16, 8).unwrap()).unwrap()
}

fn sorted_entries(ore: &OreCipher, values: &[u64]) -> Vec<(OreCiphertext, DocId)> {
    let mut rng = ChaCha20Rng::seed_from_u64(32);
    let mut entries: Vec<(u64, DocId)> = values
        .iter()
        .enumerate()
        .map(|(doc, v)| (*v, doc as DocId))
        .collect();
    entries.sort();
    entries
        .into_iter()
        .map(|(v, doc)| (ore.encrypt(v, &mut rng).unwrap(), doc))
        .collect()
}

fn matching(values: &[u64], pred: impl Fn(u64) -> bool) -> BTreeSet<DocId> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| pred(**v))
        .map(|(doc, _)| doc as DocId)
        .collect()
}

#[test]
fn got_ages_incremental() {
    let ore = ore();
    let mut rng = ChaCha20Rng::seed_from_u64(33);
    let index = EncryptedIndex::new(MemoryStore::new(), "got");
    let cancel = CancelToken::new();
    for (doc, age) in AGES.iter().enumerate() {
        let ct = ore.encrypt(*age, &mut rng).unwrap();
        index.insert("age", &ct, doc as DocId, &cancel).unwrap();
    }
    index.check_invariants("age").unwrap();
    assert_eq!(index.nodes("age").unwrap().len(), 12);

    let token = ore.encrypt_left(35).unwrap();
    let equal = index.search("age", &token, Relation::Equal, &cancel).unwrap();
    assert_eq!(equal, BTreeSet::from([8, 9]));

    let greater = index.search("age", &token, Relation::Greater, &cancel).unwrap();
    let ages: BTreeSet<u64> = greater.iter().map(|doc| AGES[*doc as usize]).collect();
    assert_eq!(ages, BTreeSet::from([40, 41, 55, 201]));

    let less = index.search("age", &token, Relation::Less, &cancel).unwrap();
    assert_eq!(less, matching(&AGES, |v| v < 35));
}

#[test]
fn got_ages_bulk() {
    let ore = ore();
    let index = EncryptedIndex::new(MemoryStore::new(), "got");
    let cancel = CancelToken::new();
    let report = index
        .bulk_build("age", &sorted_entries(&ore, &AGES), &cancel)
        .unwrap();
    assert_eq!(
        report,
        BuildReport {
            nodes: 12,
            references: 13,
            height: 4
        }
    );
    index.check_invariants("age").unwrap();

    let low = ore.encrypt_left(17).unwrap();
    let high = ore.encrypt_left(35).unwrap();
    assert_eq!(
        index.search_range("age", &low, &high, &cancel).unwrap(),
        matching(&AGES, |v| (17..=35).contains(&v))
    );
}

#[test]
fn bulk_then_incremental() {
    let ore = ore();
    let mut rng = ChaCha20Rng::seed_from_u64(34);
    let index = EncryptedIndex::new(MemoryStore::new(), "got");
    let cancel = CancelToken::new();
    index
        .bulk_build("age", &sorted_entries(&ore, &AGES), &cancel)
        .unwrap();
    assert!(matches!(
        index.bulk_build("age", &sorted_entries(&ore, &[1]), &cancel),
        Err(IndexError::AlreadyBuilt(_))
    ));

    for (i, age) in [1u64, 2, 3, 35, 300].iter().enumerate() {
        let ct = ore.encrypt(*age, &mut rng).unwrap();
        index.insert("age", &ct, 100 + i as DocId, &cancel).unwrap();
    }
    index.check_invariants("age").unwrap();
    let token = ore.encrypt_left(35).unwrap();
    assert_eq!(
        index.search("age", &token, Relation::Equal, &cancel).unwrap(),
        BTreeSet::from([8, 9, 103])
    );
}

#[test]
fn conjunction_by_intersection() {
    let ore = ore();
    let cancel = CancelToken::new();
    let index = EncryptedIndex::new(MemoryStore::new(), "got");
    index
        .bulk_build("age", &sorted_entries(&ore, &AGES), &cancel)
        .unwrap();

    let above = index
        .search("age", &ore.encrypt_left(16).unwrap(), Relation::Greater, &cancel)
        .unwrap();
    let below = index
        .search("age", &ore.encrypt_left(35).unwrap(), Relation::Less, &cancel)
        .unwrap();
    assert_eq!(
        intersect(vec![above.clone(), below.clone()]).unwrap(),
        matching(&AGES, |v| 16 < v && v < 35)
    );
    assert_eq!(intersect(vec![above.clone()]).unwrap(), above);
}

quickcheck! {
    fn bulk_matches_incremental(values: Vec<u8>, needle: u8) -> bool {
        let ore = ore();
        let values: Vec<u64> = values.into_iter().map(u64::from).collect();
        let cancel = CancelToken::new();

        let bulk = EncryptedIndex::new(MemoryStore::new(), "b");
        bulk.bulk_build("v", &sorted_entries(&ore, &values), &cancel).unwrap();

        let incremental = EncryptedIndex::new(MemoryStore::new(), "i");
        let mut rng = ChaCha20Rng::seed_from_u64(35);
        for (doc, v) in values.iter().enumerate() {
            let ct = ore.encrypt(*v, &mut rng).unwrap();
            incremental.insert("v", &ct, doc as DocId, &cancel).unwrap();
        }

        let token = ore.encrypt_left(needle as u64).unwrap();
        let needle = needle as u64;
        [Relation::Equal, Relation::Greater, Relation::Less].iter().all(|relation| {
            let expected = matching(&values, |v| match relation {
                Relation::Equal => v == needle,
                Relation::Greater => v > needle,
                Relation::Less => v < needle,
            });
            bulk.search("v", &token, *relation, &cancel).unwrap() == expected
                && incremental.search("v", &token, *relation, &cancel).unwrap() == expected
        }) && bulk.check_invariants("v").is_ok()
            && incremental.check_invariants("v").is_ok()
    }
}
