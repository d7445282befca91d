// Query API routes via axum-test

mod common;

use axum_test::TestServer;
use checkengine::routes::app;
use common::*;

#[tokio::test]
async fn test_root_and_version() {
    let env = TestEnv::new();
    let server = TestServer::new(app(env.store().await));

    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("checkengine query API");

    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["name"], "checkengine");
    assert!(json["version"].as_str().is_some());
}

#[tokio::test]
async fn test_hosts_empty_and_missing_host() {
    let env = TestEnv::new();
    let server = TestServer::new(app(env.store().await));

    let response = server.get("/api/hosts").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json, serde_json::json!([]));

    let response = server.get("/api/hosts/web01").await;
    response.assert_status_not_found();
    let json: serde_json::Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("web01"));
}

#[tokio::test]
async fn test_host_data_after_cycle() {
    let env = TestEnv::new();
    let port = fake_agent(AGENT_OUTPUT).await;
    let (runner, store) = env.runner(&agent_host("web01", port)).await;
    runner.run_cycle("web01", false).await.unwrap();
    let server = TestServer::new(app(store));

    let response = server.get("/api/hosts").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json[0]["host"], "web01");
    assert_eq!(json[0]["state"], "OK");
    assert_eq!(json[0]["sectionCount"], 4);

    let response = server.get("/api/hosts/web01").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["sections"]["mem"]["source"], "agent");
    assert_eq!(json["report"]["state"], "done");

    let response = server.get("/api/hosts/web01/report").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["hostState"], "OK");
    assert_eq!(json["sources"][0]["outcome"], "fetched");
    assert_eq!(json["missingSections"], serde_json::json!(["snmp_info"]));

    let response = server.get("/api/hosts/web01/sections/df").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["name"], "df");
    assert_eq!(json["rows"][0][6], "/");

    let response = server.get("/api/hosts/web01/sections/lnx_if").await;
    response.assert_status_not_found();
}
