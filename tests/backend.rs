use std::io::Write;
use std::time::Duration;

use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use mork_playground::client::{DataFormat, MorkClient};
use mork_playground::commands::{
    bind, BusywaitRequest, ClearRequest, CommandKind, CopyRequest, CountRequest, TransformRequest,
    UploadRequest,
};
use mork_playground::config::{ApiDialect, PlaygroundConfig};
use mork_playground::lifecycle::{LifecycleController, PollSettings};
use mork_playground::panels::{CommandForm, NotificationLevel, PanelAction};
use mork_playground::shell::Shell;
use mork_playground::stream::{status_stream, LogLevel, StreamSettings};
use futures::StreamExt;
use serde_json::json;
use tokio::runtime::Handle;

fn config_for(server: &MockServer) -> PlaygroundConfig {
    PlaygroundConfig {
        server_url: server.base_url(),
        poll_interval: Duration::from_millis(40),
        max_poll_duration: Some(Duration::from_secs(5)),
        request_timeout: Duration::from_secs(5),
        stream_interval: Duration::from_millis(40),
        stream_max_duration: Duration::from_millis(300),
        ..PlaygroundConfig::default()
    }
}

fn controller_for(config: &PlaygroundConfig) -> LifecycleController {
    LifecycleController::new(Handle::current(), PollSettings::from_config(config))
}

#[tokio::test]
async fn clear_returns_backend_text() {
    let server = MockServer::start_async().await;
    let clear_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/clear/$x");
            then.status(200).body("ok");
        })
        .await;

    let config = config_for(&server);
    let client = MorkClient::new(&config).unwrap();
    let mut controller = controller_for(&config);
    controller
        .submit(bind(
            &client,
            ClearRequest {
                sub_expr: "$x".to_string(),
            },
        ))
        .unwrap();

    let result = controller.wait_settled().await.expect("settled");
    assert!(result.is_success());
    assert_eq!(result.payload(), Some(&json!("ok")));
    assert_eq!(
        result.message(),
        Some("Data under sub expression $x cleared successfully")
    );
    clear_mock.assert_calls(1);
}

#[tokio::test]
async fn json_body_dialect_posts_copy_parameters() {
    let server = MockServer::start_async().await;
    let copy_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/copy")
                .json_body(json!({"pattern": "$x", "template": "$x"}));
            then.status(200).json_body(json!({"started": true}));
        })
        .await;
    let status_mock = server
        .mock_async(|when, then| {
            when.method(GET).path_includes("/status/copy-");
            then.status(200)
                .json_body(json!({"status": "completed", "result": ["(r 1)"]}));
        })
        .await;

    let config = PlaygroundConfig {
        dialect: ApiDialect::JsonBody,
        ..config_for(&server)
    };
    let client = MorkClient::new(&config).unwrap();
    let mut controller = controller_for(&config);
    controller
        .submit(bind(
            &client,
            CopyRequest {
                pattern: "$x".to_string(),
                template: "$x".to_string(),
            },
        ))
        .unwrap();

    let result = controller.wait_settled().await.expect("settled");
    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.payload(), Some(&json!(["(r 1)"])));
    copy_mock.assert_calls(1);
    status_mock.assert_calls(1);
}

#[tokio::test]
async fn server_error_on_copy_settles_without_polling() {
    let server = MockServer::start_async().await;
    let copy_mock = server
        .mock_async(|when, then| {
            when.method(GET).path_includes("/copy/");
            then.status(500).body("internal error");
        })
        .await;
    let status_mock = server
        .mock_async(|when, then| {
            when.method(GET).path_includes("/status/");
            then.status(200).json_body(json!({"status": "completed"}));
        })
        .await;

    let config = config_for(&server);
    let client = MorkClient::new(&config).unwrap();
    let mut controller = controller_for(&config);
    controller
        .submit(bind(
            &client,
            CopyRequest {
                pattern: "(test (data $v) _)".to_string(),
                template: "(result $v)".to_string(),
            },
        ))
        .unwrap();

    let result = controller.wait_settled().await.expect("settled");
    assert!(!result.is_success());
    assert_eq!(result.message(), Some("Status (500): internal error"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    copy_mock.assert_calls(1);
    status_mock.assert_calls(0);
}

#[tokio::test]
async fn transform_polls_status_until_the_path_clears() {
    let server = MockServer::start_async().await;
    let transform_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/transform/").body("(Node)");
            then.status(200).body("");
        })
        .await;
    let status_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/status/(Node)");
            then.status(200).body("pathClear");
        })
        .await;

    let config = config_for(&server);
    let client = MorkClient::new(&config).unwrap();
    let mut controller = controller_for(&config);
    controller
        .submit(bind(
            &client,
            TransformRequest {
                expr: "(Node)".to_string(),
            },
        ))
        .unwrap();

    let result = controller.wait_settled().await.expect("settled");
    assert!(result.is_success());
    assert_eq!(result.message(), Some("Successfully transformed the space"));

    // No further status queries once settled.
    tokio::time::sleep(Duration::from_millis(300)).await;
    transform_mock.assert_calls(1);
    status_mock.assert_calls(1);
}

#[tokio::test]
async fn busy_backend_hits_the_polling_deadline() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/transform/");
            then.status(200).body("$");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/status/(Node)");
            then.status(200).json_body(json!({"status": "busy"}));
        })
        .await;

    let config = PlaygroundConfig {
        max_poll_duration: Some(Duration::from_millis(250)),
        ..config_for(&server)
    };
    let client = MorkClient::new(&config).unwrap();
    let mut controller = controller_for(&config);
    controller
        .submit(bind(
            &client,
            TransformRequest {
                expr: "(Node)".to_string(),
            },
        ))
        .unwrap();

    let result = controller.wait_settled().await.expect("settled");
    assert!(!result.is_success());
    assert!(result
        .message()
        .unwrap_or_default()
        .starts_with("Polling timed out"));
}

#[tokio::test]
async fn count_requires_a_numeric_count() {
    let server = MockServer::start_async().await;
    let good = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/count")
                .json_body(json!({"pattern": "(test (data $v) _)"}));
            then.status(200).json_body(json!({"count": 3}));
        })
        .await;

    let config = config_for(&server);
    let client = MorkClient::new(&config).unwrap();
    let mut controller = controller_for(&config);
    controller
        .submit(bind(
            &client,
            CountRequest {
                pattern: "(test (data $v) _)".to_string(),
            },
        ))
        .unwrap();
    let result = controller.wait_settled().await.expect("settled");
    assert_eq!(result.message(), Some("Found 3 matching items"));
    good.assert_calls(1);

    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/count")
                .json_body(json!({"pattern": "$x"}));
            then.status(200).body("three");
        })
        .await;
    let malformed = client.count("$x").await;
    assert!(!malformed.is_success());
    assert!(malformed
        .message()
        .unwrap_or_default()
        .starts_with("malformed response"));
}

#[tokio::test]
async fn upload_without_a_file_makes_no_request() {
    let server = MockServer::start_async().await;
    let upload_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/upload");
            then.status(200).body("{}");
        })
        .await;

    let mut shell = Shell::new(config_for(&server), Handle::current()).unwrap();
    shell.select(CommandKind::Upload);
    let panel = shell.panel_mut();

    assert!(!panel.submit(PanelAction::Run));
    let notifications = panel.take_notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, NotificationLevel::Error);
    assert_eq!(notifications[0].message, "Please select a file to upload");

    tokio::time::sleep(Duration::from_millis(100)).await;
    upload_mock.assert_calls(0);
}

#[tokio::test]
async fn upload_waits_for_ingestion_and_keeps_the_file_echo() {
    let server = MockServer::start_async().await;
    let upload_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/upload")
                .body_includes("(edge a b)");
            then.status(200).json_body(json!({"stored": true}));
        })
        .await;
    let status_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/status/space.metta");
            then.status(200).json_body(json!({"isClear": true}));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("space.metta");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "(edge a b)").unwrap();

    let config = config_for(&server);
    let client = MorkClient::new(&config).unwrap();
    let mut controller = controller_for(&config);
    controller
        .submit(bind(&client, UploadRequest { file: Some(path) }))
        .unwrap();

    let result = controller.wait_settled().await.expect("settled");
    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.message(), Some("Upload completed"));
    let payload = result.payload().unwrap();
    assert_eq!(payload["filename"], json!("space.metta"));
    assert_eq!(payload["type"], json!("text/plain"));
    assert_eq!(payload["stored"], json!(true));
    upload_mock.assert_calls(1);
    status_mock.assert_calls(1);
}

#[tokio::test]
async fn neo4j_panel_loads_only_after_connecting() {
    let server = MockServer::start_async().await;
    let connect_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/neo4j/connect").json_body(json!({
                "uri": "bolt://localhost:7687",
                "user": "neo4j",
                "password": "secret"
            }));
            then.status(200).json_body(json!({"connected": true}));
        })
        .await;
    let load_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/neo4j/load")
                .json_body(json!({"load_type": "labels"}));
            then.status(200).json_body(json!({"loaded": 12}));
        })
        .await;

    let mut shell = Shell::new(config_for(&server), Handle::current()).unwrap();
    shell.select(CommandKind::Neo4j);
    let panel = shell.panel_mut();
    if let CommandForm::Neo4j(form) = panel.form_mut() {
        form.connect.password = "secret".to_string();
        form.load.load_type = "labels".parse().unwrap();
    }

    assert!(!panel.submit(PanelAction::Load));
    assert_eq!(panel.take_notifications()[0].title, "Connection Required");
    load_mock.assert_calls(0);

    assert!(panel.submit(PanelAction::Connect));
    let connected = panel.wait().await.expect("connect settled");
    assert!(connected.is_success());
    assert!(panel.neo4j_connected());

    assert!(panel.submit(PanelAction::Load));
    let loaded = panel.wait().await.expect("load settled");
    assert_eq!(loaded.message(), Some("Successfully loaded data as labels"));
    assert_eq!(loaded.payload().unwrap()["loaded"], json!(12));

    let titles: Vec<_> = panel
        .take_notifications()
        .into_iter()
        .map(|n| n.title)
        .collect();
    assert_eq!(titles, vec!["Connection Successful", "Data Loaded"]);
    connect_mock.assert_calls(1);
    load_mock.assert_calls(1);
}

#[tokio::test]
async fn navigating_away_tears_down_the_running_command() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/transform/");
            then.status(200).body("$");
        })
        .await;
    let status_mock = server
        .mock_async(|when, then| {
            when.method(GET).path_includes("/status/");
            then.status(200).json_body(json!({"status": "busy"}));
        })
        .await;

    let mut shell = Shell::new(config_for(&server), Handle::current()).unwrap();
    assert_eq!(shell.selected(), CommandKind::Transform);
    if let CommandForm::Transform(request) = shell.panel_mut().form_mut() {
        request.expr = "(Node)".to_string();
    }
    assert!(shell.panel_mut().submit(PanelAction::Run));
    tokio::time::sleep(Duration::from_millis(150)).await;

    shell.select(CommandKind::Status);
    assert!(!shell.panel().is_busy());
    let polled = status_mock.calls_async().await;
    assert!(polled >= 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    status_mock.assert_calls(polled);
}

#[tokio::test]
async fn status_stream_logs_each_poll_until_the_limit() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/status");
            then.status(200).json_body(json!({"status": "running"}));
        })
        .await;

    let config = config_for(&server);
    let client = MorkClient::new(&config).unwrap();
    let entries: Vec<_> = status_stream(
        client,
        "/status".to_string(),
        StreamSettings::from_config(&config),
    )
    .collect()
    .await;

    assert!(entries.len() >= 4, "{entries:?}");
    assert_eq!(entries.first().unwrap().level, LogLevel::Info);
    assert_eq!(entries.last().unwrap().message, "Status stream has been stopped");
    assert!(entries[1..entries.len() - 1]
        .iter()
        .all(|entry| entry.level == LogLevel::Success && entry.message == "System status: running"));
}

#[tokio::test]
async fn failure_keeps_the_last_good_output() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/count")
                .json_body(json!({"pattern": "(good $x)"}));
            then.status(200).json_body(json!({"count": 7}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/count")
                .json_body(json!({"pattern": "(bad $x)"}));
            then.status(500).body("internal error");
        })
        .await;

    let mut shell = Shell::new(config_for(&server), Handle::current()).unwrap();
    shell.select(CommandKind::Count);
    let panel = shell.panel_mut();

    if let CommandForm::Count(request) = panel.form_mut() {
        request.pattern = "(good $x)".to_string();
    }
    assert!(panel.submit(PanelAction::Run));
    panel.wait().await.expect("settled");
    assert_eq!(panel.output().unwrap().message(), Some("Found 7 matching items"));

    if let CommandForm::Count(request) = panel.form_mut() {
        request.pattern = "(bad $x)".to_string();
    }
    assert!(panel.submit(PanelAction::Run));
    let failed = panel.wait().await.expect("settled");
    assert!(!failed.is_success());
    assert_eq!(panel.last_error(), Some("Status (500): internal error"));
    assert_eq!(panel.output().unwrap().message(), Some("Found 7 matching items"));

    let levels: Vec<_> = panel
        .take_notifications()
        .into_iter()
        .map(|n| (n.level, n.title))
        .collect();
    assert_eq!(
        levels,
        vec![
            (NotificationLevel::Success, "Success".to_string()),
            (NotificationLevel::Error, "Error".to_string())
        ]
    );
}

#[tokio::test]
async fn json_body_dialect_clears_everything() {
    let server = MockServer::start_async().await;
    let clear_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/clear");
            then.status(200).body("ok");
        })
        .await;

    let config = PlaygroundConfig {
        dialect: ApiDialect::JsonBody,
        ..config_for(&server)
    };
    let client = MorkClient::new(&config).unwrap();
    let result = client.clear("$x").await;

    assert!(result.is_success());
    assert_eq!(result.payload(), Some(&json!("ok")));
    assert_eq!(result.message(), Some("All data cleared successfully"));
    clear_mock.assert_calls(1);
}

#[tokio::test]
async fn export_puts_destination_and_format_in_the_query() {
    let server = MockServer::start_async().await;
    let to_file = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/export/$x/$x/")
                .query_param("uri", "file:///tmp/out.metta")
                .query_param("format", "metta");
            then.status(200).body("(a 1)");
        })
        .await;
    let to_memory = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/export/$x/$x/")
                .query_param_missing("uri")
                .query_param("format", "json");
            then.status(200).body("[\"(a 1)\"]");
        })
        .await;

    let client = MorkClient::new(&config_for(&server)).unwrap();

    let result = client
        .export("$x", "$x", Some("file:///tmp/out.metta"), DataFormat::Metta)
        .await;
    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.payload(), Some(&json!("(a 1)")));
    assert_eq!(
        result.message(),
        Some("Data exported successfully to file:///tmp/out.metta")
    );

    let result = client.export("$x", "$x", Some("  "), DataFormat::Json).await;
    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.message(), Some("Data exported successfully to memory"));

    to_file.assert_calls(1);
    to_memory.assert_calls(1);
}

#[tokio::test]
async fn json_body_dialect_posts_export_and_import_settings() {
    let server = MockServer::start_async().await;
    let export_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/export")
                .json_body(json!({"uri": "file:///tmp/out.csv", "format": "csv"}));
            then.status(200).body("exported");
        })
        .await;
    let import_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/import")
                .json_body(json!({"uri": "https://example.org/data.json", "format": "json"}));
            then.status(200).body("queued");
        })
        .await;

    let config = PlaygroundConfig {
        dialect: ApiDialect::JsonBody,
        ..config_for(&server)
    };
    let client = MorkClient::new(&config).unwrap();

    let exported = client
        .export("$x", "$x", Some("file:///tmp/out.csv"), DataFormat::Csv)
        .await;
    assert!(exported.is_success(), "{exported:?}");

    let imported = client
        .import("$x", "$x", "https://example.org/data.json", DataFormat::Json)
        .await;
    assert!(imported.is_success(), "{imported:?}");
    assert_eq!(
        imported.message(),
        Some("Import request for https://example.org/data.json has successfully been sent")
    );

    export_mock.assert_calls(1);
    import_mock.assert_calls(1);
}

#[tokio::test]
async fn import_sends_the_source_uri_as_a_query() {
    let server = MockServer::start_async().await;
    let import_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/import/$x/$x")
                .query_param("uri", "https://example.org/data.metta");
            then.status(200).body("ack");
        })
        .await;

    let client = MorkClient::new(&config_for(&server)).unwrap();
    let result = client
        .import("$x", "$x", " https://example.org/data.metta ", DataFormat::Metta)
        .await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.payload(), Some(&json!("ack")));
    assert_eq!(
        result.message(),
        Some("Import request for https://example.org/data.metta has successfully been sent")
    );
    import_mock.assert_calls(1);
}

#[tokio::test]
async fn metta_thread_and_suspend_post_the_location() {
    let server = MockServer::start_async().await;
    let thread_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/metta-thread").json_body(json!({
                "location": "worker",
                "expression": "(exec (+ 1 2 3))"
            }));
            then.status(200).json_body(json!({"thread": "started"}));
        })
        .await;
    let suspend_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/suspend")
                .json_body(json!({"location": "worker"}));
            then.status(200).json_body(json!({}));
        })
        .await;

    let client = MorkClient::new(&config_for(&server)).unwrap();

    let started = client.metta_thread("worker", "(exec (+ 1 2 3))").await;
    assert!(started.is_success(), "{started:?}");
    assert_eq!(started.message(), Some("MeTTa expression executed in thread worker"));
    let payload = started.payload().unwrap();
    assert_eq!(payload["location"], json!("worker"));
    assert_eq!(payload["thread"], json!("started"));

    let suspended = client.suspend("worker").await;
    assert!(suspended.is_success(), "{suspended:?}");
    assert_eq!(
        suspended.message(),
        Some("Thread at location worker has been suspended")
    );
    assert_eq!(suspended.payload().unwrap()["location"], json!("worker"));

    thread_mock.assert_calls(1);
    suspend_mock.assert_calls(1);
}

#[tokio::test]
async fn busywait_polls_until_the_server_reports_completion() {
    let server = MockServer::start_async().await;
    let busywait_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/busywait")
                .json_body(json!({"millis": 1000, "lock_expr": false}));
            then.status(200).json_body(json!({"accepted": true}));
        })
        .await;
    let status_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/status/busywait-1000-false");
            then.status(200)
                .json_body(json!({"status": "completed", "result": "waited"}));
        })
        .await;

    let config = config_for(&server);
    let client = MorkClient::new(&config).unwrap();

    let started = client.busywait(1000, false).await;
    assert_eq!(started.message(), Some("Busywait started for 1000ms"));
    assert_eq!(started.payload().unwrap()["accepted"], json!(true));

    let mut controller = controller_for(&config);
    controller
        .submit(bind(
            &client,
            BusywaitRequest {
                millis: 1000,
                lock_expr: false,
            },
        ))
        .unwrap();
    let result = controller.wait_settled().await.expect("settled");

    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.payload(), Some(&json!("waited")));
    assert_eq!(result.message(), Some("Busywait completed after 1000ms"));
    busywait_mock.assert_calls(2);
    status_mock.assert_calls(1);
}

#[tokio::test]
async fn stop_and_status_are_single_requests() {
    let server = MockServer::start_async().await;
    let stop_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/stop")
                .json_body(json!({"wait_for_idle": true}));
            then.status(200).json_body(json!({"stopped": true}));
        })
        .await;
    let status_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/status");
            then.status(200).json_body(json!({"status": "idle"}));
        })
        .await;

    let client = MorkClient::new(&config_for(&server)).unwrap();

    let stopped = client.stop(true).await;
    assert!(stopped.is_success(), "{stopped:?}");
    assert_eq!(
        stopped.message(),
        Some("Server operations stopped after waiting for idle")
    );
    assert_eq!(stopped.payload().unwrap()["wait_for_idle"], json!(true));
    assert_eq!(stopped.payload().unwrap()["stopped"], json!(true));

    let status = client.status("/status").await;
    assert!(status.is_success(), "{status:?}");
    assert_eq!(status.payload(), Some(&json!({"status": "idle"})));
    assert_eq!(
        status.message(),
        Some("Server status information retrieved successfully")
    );

    stop_mock.assert_calls(1);
    status_mock.assert_calls(1);
}

#[tokio::test]
async fn late_refresh_still_announces_the_polled_command() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/transform/");
            then.status(200).body("$");
        })
        .await;
    let status_mock = server
        .mock_async(|when, then| {
            when.method(GET).path_includes("/status/");
            then.status(200).json_body(json!({"isClear": false}));
        })
        .await;

    let mut shell = Shell::new(config_for(&server), Handle::current()).unwrap();
    let panel = shell.panel_mut();
    assert!(panel.submit(PanelAction::Run));

    // Several ticks pass before the first refresh.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(status_mock.calls_async().await >= 2);
    assert!(panel.is_busy());
    assert!(panel.refresh());

    let titles: Vec<_> = panel
        .take_notifications()
        .into_iter()
        .map(|n| (n.level, n.title))
        .collect();
    assert_eq!(
        titles,
        vec![(NotificationLevel::Info, "Transform Initiated".to_string())]
    );

    // Later ticks in the same lifecycle stay quiet.
    tokio::time::sleep(Duration::from_millis(100)).await;
    panel.refresh();
    assert!(panel.notifications().is_empty());
    assert!(panel.cancel());
}
