//! Integration test: sled-backed Local Store.
//!
//! Verifies that:
//! 1. The collection survives closing and reopening the database.
//! 2. The persisted blob is the documented `{ id, createdAt, type, data, status }` array.
//! 3. Count tracks appends minus removals across reopen.
//! 4. A blob that is not valid UTF-8 loads as an empty collection.

use northbeam_core::{
    apply_filter, KindFilter, Payload, SledBackend, StorageBackend, SubmissionKind,
    SubmissionStatus, SubmissionStore,
};

fn payload(pairs: &[(&str, &str)]) -> Payload {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn collection_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (lead, sub) = {
        let store = SubmissionStore::open(Some(dir.path()), "site").unwrap();
        let lead = store.append(
            SubmissionKind::Lead,
            payload(&[("name", "A"), ("email", "a@x.com")]),
        );
        let sub = store.append(SubmissionKind::Subscriber, payload(&[("email", "b@x.com")]));
        store.set_status(&lead.id, SubmissionStatus::Processed);
        (lead, sub)
    };

    let store = SubmissionStore::open(Some(dir.path()), "site").unwrap();
    let all = store.list_all();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0], sub);
    assert_eq!(all[1].id, lead.id);
    assert_eq!(all[1].status, SubmissionStatus::Processed);

    assert_eq!(apply_filter(&all, KindFilter::Only(SubmissionKind::Lead), "").len(), 1);
    assert_eq!(apply_filter(&all, KindFilter::All, "B@X")[0].id, sub.id);
}

#[test]
fn persisted_blob_layout() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = SubmissionStore::open(Some(dir.path()), "site").unwrap();
        store.append(SubmissionKind::Applicant, payload(&[("position", "Engineer")]));
    }

    let backend = SledBackend::open(Some(dir.path())).unwrap();
    let raw = backend.read("site").unwrap().expect("collection key should exist");
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let first = &json.as_array().expect("collection is an array")[0];
    assert_eq!(first["type"], "applicant");
    assert_eq!(first["status"], "new");
    assert_eq!(first["data"]["position"], "Engineer");
    assert!(first["id"].is_string());
    assert!(first["createdAt"].is_string());
}

#[test]
fn count_tracks_appends_minus_removals() {
    let dir = tempfile::tempdir().unwrap();
    let store = SubmissionStore::open(Some(dir.path()), "site").unwrap();
    let ids: Vec<String> = (0..6)
        .map(|i| {
            let n = i.to_string();
            store
                .append(SubmissionKind::Subscriber, payload(&[("n", n.as_str())]))
                .id
        })
        .collect();
    store.remove(&ids[1]);
    store.remove(&ids[4]);
    store.remove(&ids[4]);

    let all = store.list_all();
    assert_eq!(all.len(), 4);
    let order: Vec<&str> = all.iter().map(|r| r.payload["n"].as_str()).collect();
    assert_eq!(order, vec!["5", "3", "2", "0"]);

    store.clear();
    assert!(store.list_all().is_empty());
}

#[test]
fn non_utf8_blob_loads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = sled::open(dir.path()).unwrap();
        db.insert("site", &b"[{\"id\":\"\xff\"}]"[..]).unwrap();
        db.flush().unwrap();
    }
    let backend = SledBackend::open(Some(dir.path())).unwrap();
    assert!(backend.read("site").is_err());
    let store = SubmissionStore::new(backend, "site");
    assert!(store.list_all().is_empty());
    store.append(SubmissionKind::Subscriber, payload(&[("email", "c@x.com")]));
    assert_eq!(store.list_all().len(), 1);
}
