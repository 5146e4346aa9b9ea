use lantern_cache::{CacheEntry, CacheError, CacheStore, DiskStore, RequestKey};
use url::Url;

fn entry(url: &str, body: &str) -> CacheEntry {
    CacheEntry {
        url: url.to_string(),
        method: "GET".to_string(),
        status: 200,
        headers: [("content-type".to_string(), "text/html".to_string())]
            .into_iter()
            .collect(),
        body: body.as_bytes().to_vec(),
        cached_at: 1,
    }
}

fn key(url: &str) -> RequestKey {
    RequestKey::get(&Url::parse(url).unwrap())
}

#[tokio::test]
async fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://site.test/index.html";

    {
        let store = DiskStore::open(dir.path(), None).await.unwrap();
        store.put("tutorial-precache-v1", entry(url, "<h1>Home</h1>")).await.unwrap();
    }

    let store = DiskStore::open(dir.path(), None).await.unwrap();
    let found = store
        .match_in("tutorial-precache-v1", &key(url))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.body, b"<h1>Home</h1>");
    assert_eq!(found.headers.get("content-type").map(String::as_str), Some("text/html"));
    assert_eq!(store.keys().await.unwrap(), vec!["tutorial-precache-v1"]);
}

#[tokio::test]
async fn open_delete_and_has() {
    let dir = tempfile::tempdir().unwrap();
    let store = DiskStore::open(dir.path().join("nested"), None).await.unwrap();

    store.open("tutorial-runtime-v1").await.unwrap();
    assert!(store.has("tutorial-runtime-v1").await.unwrap());
    assert!(store.entries("tutorial-runtime-v1").await.unwrap().is_empty());

    assert!(store.delete("tutorial-runtime-v1").await.unwrap());
    assert!(!store.delete("tutorial-runtime-v1").await.unwrap());
    assert!(!store.has("tutorial-runtime-v1").await.unwrap());
}

#[tokio::test]
async fn overwrite_keeps_one_entry_per_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = DiskStore::open(dir.path(), None).await.unwrap();
    let url = "https://site.test/book.css";

    store.put("runtime", entry(url, "old")).await.unwrap();
    store.put("runtime", entry(url, "new")).await.unwrap();

    assert_eq!(store.entries("runtime").await.unwrap().len(), 1);
    let found = store.match_any(&key(url)).await.unwrap().unwrap();
    assert_eq!(found.body, b"new");
}

#[tokio::test]
async fn quota_is_enforced_across_generations() {
    let dir = tempfile::tempdir().unwrap();
    let store = DiskStore::open(dir.path(), Some(8)).await.unwrap();

    store.put("a", entry("https://site.test/1", "12345")).await.unwrap();
    let err = store
        .put("b", entry("https://site.test/2", "6789"))
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::QuotaExceeded { needed: 4, available: 3 }));
    assert!(!store.has("b").await.unwrap());
}

#[tokio::test]
async fn corrupt_generation_files_are_listed_and_deletable() {
    let dir = tempfile::tempdir().unwrap();
    let store = DiskStore::open(dir.path(), None).await.unwrap();
    store.put("good", entry("https://site.test/a", "a")).await.unwrap();
    std::fs::write(dir.path().join("broken.json"), b"{ not json").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    assert_eq!(store.keys().await.unwrap(), vec!["broken", "good"]);
    assert!(store.has("broken").await.unwrap());
    assert!(store.match_any(&key("https://site.test/a")).await.unwrap().is_some());

    assert!(store.delete("broken").await.unwrap());
    assert!(!dir.path().join("broken.json").exists());
    assert_eq!(store.keys().await.unwrap(), vec!["good"]);
}

#[tokio::test]
async fn generation_names_are_escaped_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = DiskStore::open(dir.path(), None).await.unwrap();

    store.open("odd/name v1").await.unwrap();

    assert!(store.has("odd/name v1").await.unwrap());
    assert_eq!(store.keys().await.unwrap(), vec!["odd/name v1"]);
    assert!(dir.path().join("odd%2Fname%20v1.json").exists());
}
