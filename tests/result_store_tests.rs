// Result store: write, overwrite, read back and list

use checkengine::models::{
    CycleReport, CycleState, MergedHostData, Section, SourceKind, SourceOutcome, SourceReport, State,
};
use checkengine::result_store::ResultStore;
use tempfile::TempDir;

async fn store(dir: &TempDir) -> ResultStore {
    let path = dir.path().join("nested").join("results.db");
    let store = ResultStore::connect(path.to_str().unwrap()).await.unwrap();
    store.init().await.unwrap();
    store
}

fn report(host: &str, host_state: State) -> CycleReport {
    let mut report = CycleReport::new(host, false, 1_700_000_000_000);
    report.transition(CycleState::Fetching);
    report.transition(CycleState::Merging);
    report.transition(CycleState::Done);
    report.host_state = host_state;
    let mut source = SourceReport::new(SourceKind::Agent, 10, SourceOutcome::Fetched);
    source.sections = vec!["mem".into()];
    report.sources.push(source);
    report
}

fn sections(value: &str) -> MergedHostData {
    MergedHostData::from_sections(vec![
        Section::new("mem", SourceKind::Agent)
            .with_rows(vec![vec!["MemTotal:".into(), value.into(), "kB".into()]]),
        Section::new("snmp_info", SourceKind::Snmp)
            .with_separator(Some(9))
            .with_rows(vec![vec![".1.3.6.1.2.1.1.5.0".into(), String::new()]])
            .mark_cached(),
    ])
}

#[tokio::test]
async fn test_write_then_read() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir).await;
    let data = sections("1000");
    let report = report("web01", State::Warn);
    store.write("web01", &data, &report).await.unwrap();

    let stored = store.read("web01").await.unwrap().unwrap();
    assert_eq!(stored.host, "web01");
    assert_eq!(stored.state, State::Warn);
    assert_eq!(stored.sections, data);
    assert_eq!(stored.report, report);
    assert!(stored.written_at_ms > 0);
}

#[tokio::test]
async fn test_unknown_host_reads_none() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir).await;
    assert!(store.read("nope").await.unwrap().is_none());
    assert!(store.hosts().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_write_replaces_previous_result() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir).await;
    store
        .write("web01", &sections("1000"), &report("web01", State::Ok))
        .await
        .unwrap();
    store
        .write("web01", &sections("2000"), &report("web01", State::Crit))
        .await
        .unwrap();

    let stored = store.read("web01").await.unwrap().unwrap();
    assert_eq!(stored.state, State::Crit);
    assert_eq!(stored.sections.get("mem").unwrap().rows[0][1], "2000");
    assert_eq!(store.hosts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_hosts_listing_is_sorted() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir).await;
    for (host, state) in [("web02", State::Ok), ("db01", State::Unknown), ("web01", State::Warn)] {
        store
            .write(host, &sections("1"), &report(host, state))
            .await
            .unwrap();
    }

    let hosts = store.hosts().await.unwrap();
    let names: Vec<&str> = hosts.iter().map(|h| h.host.as_str()).collect();
    assert_eq!(names, vec!["db01", "web01", "web02"]);
    assert_eq!(hosts[0].state, State::Unknown);
    assert_eq!(hosts[0].section_count, 2);
}

#[tokio::test]
async fn test_data_survives_reconnect() {
    let dir = TempDir::new().unwrap();
    {
        let store = store(&dir).await;
        store
            .write("web01", &sections("1000"), &report("web01", State::Ok))
            .await
            .unwrap();
    }
    let store = store(&dir).await;
    assert!(store.read("web01").await.unwrap().is_some());
}
