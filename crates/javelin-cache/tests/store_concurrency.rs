use javelin_cache::{
    BincodeSerializer, CacheDirectory, ContentKey, ContentKeySerializer, IndexedStore, LockPolicy,
    PersistentIndexedStore,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn open_store(
    root: &std::path::Path,
) -> (CacheDirectory, PersistentIndexedStore<ContentKey, Vec<String>>) {
    // A patient budget keeps heavy intra-test contention from exhausting the
    // retry limit; production callers use the default.
    let dir = CacheDirectory::new(root.join("compile"), "compile cache").with_lock_policy(
        LockPolicy {
            max_attempts: 1000,
            initial_backoff: Duration::from_micros(100),
            max_backoff: Duration::from_millis(2),
        },
    );
    dir.open().unwrap();
    let store = dir
        .create_store(
            "class-analysis",
            Box::new(ContentKeySerializer),
            Box::new(BincodeSerializer::new()),
        )
        .unwrap();
    (dir, store)
}

#[test]
fn concurrent_writers_to_distinct_keys_all_land() {
    let tmp = TempDir::new().unwrap();
    let (_dir, store) = open_store(tmp.path());
    let store = Arc::new(store);

    let threads = 16;
    let mut handles = Vec::with_capacity(threads);
    for i in 0..threads {
        let store = store.clone();
        handles.push(thread::spawn(move || {
            let key = ContentKey::from_bytes(format!("com/example/Foo{i}.class").as_bytes());
            let value = vec![format!("com.example.Dep{i}")];
            store.put(&key, &value).unwrap();
            (key, value)
        }));
    }

    let mut expected = Vec::with_capacity(threads);
    for handle in handles {
        expected.push(handle.join().unwrap());
    }

    for (key, value) in expected {
        assert_eq!(store.get(&key).unwrap(), Some(value));
    }
}

#[test]
fn concurrent_writers_to_the_same_key_leave_one_complete_value() {
    let tmp = TempDir::new().unwrap();
    let (_dir, store) = open_store(tmp.path());
    let store = Arc::new(store);

    let key = ContentKey::from_bytes(b"com/example/Contended.class");
    let threads = 8;
    let mut handles = Vec::with_capacity(threads);
    for i in 0..threads {
        let store = store.clone();
        handles.push(thread::spawn(move || {
            store.put(&key, &vec![format!("writer-{i}")]).unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Last writer wins; the surviving value is one of the written ones,
    // never a torn mix.
    let value = store.get(&key).unwrap().expect("entry must exist");
    assert_eq!(value.len(), 1);
    assert!(value[0].starts_with("writer-"));
}

#[test]
fn values_survive_reopening_the_directory() {
    let tmp = TempDir::new().unwrap();
    let key = ContentKey::from_bytes(b"com/example/Warm.class");
    let value = vec!["com.example.Dep".to_string()];

    {
        let (dir, store) = open_store(tmp.path());
        store.put(&key, &value).unwrap();
        dir.close();
    }

    let (_dir, store) = open_store(tmp.path());
    assert_eq!(store.get(&key).unwrap(), Some(value));
}
