#[cfg(test)]
mod test {
    use std::sync::Arc;

    use futures::future::join_all;
    use serde_json::json;

    use crate::history::{HistoryQuery, HistoryStore, NewHistoryEntry};

    fn entry(template_id: &str, app_id: Option<&str>) -> NewHistoryEntry {
        NewHistoryEntry {
            template_id: Some(template_id.to_owned()),
            app_id: app_id.map(str::to_owned),
            ..NewHistoryEntry::default()
        }
    }

    #[tokio::test]
    async fn entries_are_listed_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("nested/history.json"));

        let first = store.append(entry("t1", None)).await.unwrap();
        let second = store.append(entry("t2", None)).await.unwrap();

        let items = store.list(&HistoryQuery::default()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], json!(second.id));
        assert_eq!(items[1]["id"], json!(first.id));
        assert_eq!(items[0]["app_id"], "app1");
        assert_eq!(items[0]["upstream_status"], "unknown");
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn filters_and_limit_apply() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));

        for (template_id, app_id) in [("t1", "a"), ("t2", "a"), ("t1", "b"), ("t1", "a")] {
            store.append(entry(template_id, Some(app_id))).await.unwrap();
        }

        let query = HistoryQuery {
            template_id: Some("t1".to_owned()),
            app_id: Some("a".to_owned()),
            limit: None,
        };
        assert_eq!(store.list(&query).await.len(), 2);

        let query = HistoryQuery {
            limit: Some(3),
            ..HistoryQuery::default()
        };
        assert_eq!(store.list(&query).await.len(), 3);

        let query = HistoryQuery {
            limit: Some(1_000_000),
            ..HistoryQuery::default()
        };
        assert_eq!(store.list(&query).await.len(), 4);
    }

    #[tokio::test]
    async fn missing_template_id_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));

        assert!(store.append(NewHistoryEntry::default()).await.is_err());
        assert!(store.append(entry("  ", None)).await.is_err());
        assert!(store.list(&HistoryQuery::default()).await.is_empty());
    }

    fn backups_in(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().contains("history.json.corrupt-"))
            .collect()
    }

    #[tokio::test]
    async fn corrupt_file_is_set_aside_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = HistoryStore::new(&path);

        assert!(store.list(&HistoryQuery::default()).await.is_empty());

        store.append(entry("t1", None)).await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(1));

        let backups = backups_in(dir.path());
        assert_eq!(backups.len(), 1);
        assert_eq!(std::fs::read_to_string(&backups[0]).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn non_array_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let original = r#"{"entries":[{"template_id":"t0"}]}"#;
        std::fs::write(&path, original).unwrap();
        let store = HistoryStore::new(&path);

        store.append(entry("t1", None)).await.unwrap();

        let backups = backups_in(dir.path());
        assert_eq!(backups.len(), 1);
        assert_eq!(std::fs::read_to_string(&backups[0]).unwrap(), original);
        assert_eq!(store.list(&HistoryQuery::default()).await.len(), 1);
    }

    #[tokio::test]
    async fn entries_in_older_formats_survive_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let legacy = json!([{
            "id": "abc",
            "app_id": "app1",
            "template_id": "t0",
            "timestamp": "2024-01-01T00:00:00Z",
            "zoho_request_id": "r-1",
            "zoho_status": "sent",
        }]);
        std::fs::write(&path, legacy.to_string()).unwrap();
        let store = HistoryStore::new(&path);

        let listed = store.list(&HistoryQuery::default()).await;
        assert_eq!(listed, legacy.as_array().unwrap().clone());

        store.append(entry("t1", None)).await.unwrap();

        let items = store.list(&HistoryQuery::default()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["template_id"], "t1");
        assert_eq!(items[1], legacy[0]);

        let query = HistoryQuery {
            template_id: Some("t0".to_owned()),
            ..HistoryQuery::default()
        };
        assert_eq!(store.list(&query).await.len(), 1);

        let on_disk: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk[1]["zoho_status"], "sent");
        assert!(backups_in(dir.path()).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(HistoryStore::new(dir.path().join("history.json")));

        let writers = (0..20).map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.append(entry(&format!("t{}", i), None)).await })
        });
        for result in join_all(writers).await {
            result.unwrap().unwrap();
        }

        assert_eq!(store.list(&HistoryQuery::default()).await.len(), 20);
    }

    #[test]
    fn reply_fields_are_extracted() {
        let reply = json!({ "status": "success", "requests": { "request_id": 12345 } });
        let new_entry = NewHistoryEntry::from_reply("t1", Some("NDA".into()), 200, json!({}), Some(&reply), "");
        assert_eq!(new_entry.upstream_request_id.as_deref(), Some("12345"));
        assert_eq!(new_entry.upstream_status.as_deref(), Some("success"));

        let new_entry = NewHistoryEntry::from_reply("t1", None, 502, json!({}), None, "bad gateway");
        assert_eq!(new_entry.upstream_status.as_deref(), Some("502"));
        assert_eq!(new_entry.upstream_response, Some(json!("bad gateway")));
    }

    #[tokio::test]
    async fn posted_entry_takes_missing_fields_from_response() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));

        let posted: NewHistoryEntry = serde_json::from_value(json!({
            "template_id": "t1",
            "upstream_response": { "request_id": "r-7", "status": "sent" },
        }))
        .unwrap();
        let stored = store.append(posted).await.unwrap();
        assert_eq!(stored.upstream_request_id.as_deref(), Some("r-7"));
        assert_eq!(stored.upstream_status, "sent");

        // explicit values win over the response
        let posted: NewHistoryEntry = serde_json::from_value(json!({
            "template_id": "t1",
            "zoho_status": "draft",
            "zoho_response": { "requests": { "request_id": 99, "request_status": "inprogress" } },
        }))
        .unwrap();
        let stored = store.append(posted).await.unwrap();
        assert_eq!(stored.upstream_request_id.as_deref(), Some("99"));
        assert_eq!(stored.upstream_status, "draft");
    }
}
