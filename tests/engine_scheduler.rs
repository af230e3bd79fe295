//! Engine behaviour against a scripted transport: ordering, window bounds,
//! delivery modes, probe classification and early termination.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use batchfetch_core::engine::MIN_WINDOW_SIZE;
use batchfetch_core::{
    BatchResult, Completion, EngineConfig, EngineError, ExecuteOutcome, Method, OptionOverrides,
    ProcessParams, ProxySettings, Request, RequestEngine, StaticProxySource, Transport, callback,
};
use serde_json::json;

mod support;
use support::scripted::{Script, ScriptedTransport, host_of};

fn engine_with(transport: &Arc<ScriptedTransport>) -> RequestEngine {
    RequestEngine::new(
        EngineConfig::default(),
        Arc::clone(transport) as Arc<dyn Transport>,
        Arc::new(StaticProxySource::none()),
    )
}

fn url(host: &str) -> String {
    format!("http://{host}/")
}

fn bodies(batch: &BatchResult) -> Vec<(usize, String)> {
    batch
        .outcomes()
        .iter()
        .map(|(index, outcome)| {
            let record = outcome.as_response().expect("response outcome");
            (*index, record.output.text().unwrap_or_default())
        })
        .collect()
}

async fn run(engine: &mut RequestEngine, window: Option<usize>, probe: bool) -> BatchResult {
    engine
        .execute(window, probe)
        .await
        .expect("execute")
        .into_batch()
        .expect("batch")
}

#[tokio::test]
async fn test_scenario_a_ordered_despite_completion_order() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .route("a.test", Script::ok("outputA"))
            .route("b.test", Script::ok("outputB"))
            .route("c.test", Script::ok("outputC"))
            .finish_order(&["c.test", "a.test", "b.test"]),
    );
    let mut engine = engine_with(&transport);
    for host in ["a.test", "b.test", "c.test"] {
        engine.get(url(host), Vec::new(), None);
    }

    let batch = run(&mut engine, Some(3), false).await;

    assert!(batch.is_complete());
    assert_eq!(
        bodies(&batch),
        vec![
            (0, "outputA".to_string()),
            (1, "outputB".to_string()),
            (2, "outputC".to_string()),
        ]
    );
    assert_eq!(engine.pending(), 0);
}

#[tokio::test]
async fn test_window_two_refills_slot_with_next_request() {
    // B finishes first, so C takes its slot while A is still open.
    let transport = Arc::new(
        ScriptedTransport::new()
            .route("a.test", Script::ok("outputA"))
            .route("b.test", Script::ok("outputB"))
            .route("c.test", Script::ok("outputC"))
            .finish_order(&["b.test", "c.test", "a.test"]),
    );
    let mut engine = engine_with(&transport);
    for host in ["a.test", "b.test", "c.test"] {
        engine.get(url(host), Vec::new(), None);
    }

    let batch = run(&mut engine, Some(2), false).await;

    assert_eq!(
        bodies(&batch),
        vec![
            (0, "outputA".to_string()),
            (1, "outputB".to_string()),
            (2, "outputC".to_string()),
        ]
    );
    assert_eq!(transport.launched_hosts(), vec!["a.test", "b.test", "c.test"]);
    assert_eq!(transport.max_in_flight(), 2);
}

#[tokio::test]
async fn test_larger_batch_keys_are_ascending() {
    let hosts = ["h0.test", "h1.test", "h2.test", "h3.test", "h4.test", "h5.test"];
    let transport = Arc::new(ScriptedTransport::new().finish_order(&[
        "h2.test", "h1.test", "h0.test", "h5.test", "h4.test", "h3.test",
    ]));
    let mut engine = engine_with(&transport);
    for host in hosts {
        engine.get(url(host), Vec::new(), None);
    }

    let batch = run(&mut engine, Some(3), false).await;

    let keys: Vec<usize> = batch.outcomes().keys().copied().collect();
    assert_eq!(keys, (0..hosts.len()).collect::<Vec<_>>());
    for (index, body) in bodies(&batch) {
        assert_eq!(body, hosts[index]);
    }
}

#[tokio::test]
async fn test_in_flight_never_exceeds_window() {
    let transport = Arc::new(ScriptedTransport::new().delay(Duration::from_millis(5)));
    let mut engine = engine_with(&transport);
    for i in 0..10 {
        engine.get(url(&format!("n{i}.test")), Vec::new(), None);
    }

    let batch = run(&mut engine, Some(3), false).await;

    assert_eq!(batch.len(), 10);
    assert_eq!(transport.max_in_flight(), 3);
    // Launch order is strict FIFO.
    let launched = transport.launched_hosts();
    let expected: Vec<String> = (0..10).map(|i| format!("n{i}.test")).collect();
    assert_eq!(launched, expected);
}

#[tokio::test]
async fn test_default_window_clamped_to_queue() {
    let transport = Arc::new(ScriptedTransport::new().delay(Duration::from_millis(5)));
    let mut engine = engine_with(&transport);
    for host in ["a.test", "b.test", "c.test"] {
        engine.get(url(host), Vec::new(), None);
    }

    let batch = run(&mut engine, None, false).await;

    assert_eq!(batch.len(), 3);
    assert_eq!(transport.max_in_flight(), 3);
}

#[tokio::test]
async fn test_window_below_minimum_is_rejected_and_queue_kept() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_with(&transport);
    for host in ["a.test", "b.test", "c.test"] {
        engine.get(url(host), Vec::new(), None);
    }

    let err = engine.execute(Some(1), false).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidWindow {
            window: 1,
            queued: 3
        }
    ));
    assert!(err.to_string().contains(&MIN_WINDOW_SIZE.to_string()));
    assert_eq!(engine.pending(), 3);
    assert!(transport.calls().is_empty());

    let batch = run(&mut engine, Some(2), false).await;
    assert_eq!(batch.len(), 3);
}

#[tokio::test]
async fn test_zero_window_falls_back_to_default() {
    let transport = Arc::new(ScriptedTransport::new().delay(Duration::from_millis(5)));
    let mut engine = engine_with(&transport);
    engine.config_mut().window_size = 2;
    for i in 0..4 {
        engine.get(url(&format!("z{i}.test")), Vec::new(), None);
    }

    let batch = run(&mut engine, Some(0), false).await;

    assert_eq!(batch.len(), 4);
    assert_eq!(transport.max_in_flight(), 2);

    // A default below the minimum still fails.
    engine.config_mut().window_size = 1;
    engine
        .get(url("a.test"), Vec::new(), None)
        .get(url("b.test"), Vec::new(), None);
    assert!(matches!(
        engine.execute(Some(0), false).await,
        Err(EngineError::InvalidWindow { window: 1, .. })
    ));
    assert_eq!(engine.pending(), 2);
}

#[tokio::test]
async fn test_single_request_ignores_window() {
    let transport = Arc::new(ScriptedTransport::new().route("a.test", Script::ok("solo")));
    let mut engine = engine_with(&transport);
    engine.get(url("a.test"), Vec::new(), None);

    let batch = run(&mut engine, Some(1), false).await;

    assert_eq!(bodies(&batch), vec![(0, "solo".to_string())]);
}

#[tokio::test]
async fn test_empty_queue_is_no_work() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_with(&transport);

    let outcome = engine.execute(Some(5), false).await.unwrap();

    assert!(matches!(outcome, ExecuteOutcome::NoWork));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_single_path_matches_windowed_path() {
    let request = Request::get(url("a.test")).with_headers(["X-Trace: 7"]);

    let single = Arc::new(ScriptedTransport::new().route("a.test", Script::ok("same")));
    let mut engine = engine_with(&single);
    engine.add(request.clone());
    let single_batch = run(&mut engine, None, false).await;

    let windowed = Arc::new(ScriptedTransport::new().route("a.test", Script::ok("same")));
    let mut engine = engine_with(&windowed);
    engine.add(request).get(url("b.test"), Vec::new(), None);
    let windowed_batch = run(&mut engine, Some(2), false).await;

    let one = single_batch.get(0).unwrap().as_response().unwrap();
    let other = windowed_batch.get(0).unwrap().as_response().unwrap();
    assert_eq!(one.output.text(), other.output.text());
    assert_eq!(one.metadata.status, other.metadata.status);
    assert_eq!(one.metadata.url, other.metadata.url);
    assert_eq!(single.calls()[0], windowed.calls()[0]);
}

#[tokio::test]
async fn test_callback_receives_outputs_and_collection_is_empty() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .route("b.test", Script::Refuse)
            .finish_order(&["b.test", "a.test", "c.test"]),
    );
    let mut engine = engine_with(&transport);
    let seen: Arc<Mutex<Vec<(String, bool)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    engine.set_callback(callback(move |output, metadata, request| {
        assert_eq!(metadata.url, request.url());
        sink.lock()
            .unwrap()
            .push((host_of(request.url()), output.is_failed()));
    }));
    for host in ["a.test", "b.test", "c.test"] {
        engine.get(url(host), Vec::new(), None);
    }

    let batch = run(&mut engine, Some(3), false).await;

    assert!(batch.is_empty());
    assert!(batch.is_complete());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("b.test".to_string(), true),
            ("a.test".to_string(), false),
            ("c.test".to_string(), false),
        ]
    );
}

#[tokio::test]
async fn test_callback_on_single_path() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_with(&transport);
    let calls = Arc::new(Mutex::new(0_usize));
    let counter = Arc::clone(&calls);
    engine.set_callback(callback(move |_, _, _| *counter.lock().unwrap() += 1));
    engine.get(url("a.test"), Vec::new(), None);

    let batch = run(&mut engine, None, false).await;

    assert!(batch.is_empty());
    assert_eq!(*calls.lock().unwrap(), 1);

    engine.clear_callback().get(url("a.test"), Vec::new(), None);
    let batch = run(&mut engine, None, false).await;
    assert_eq!(batch.len(), 1);
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_transport_failure_is_recorded_and_batch_continues() {
    let transport = Arc::new(ScriptedTransport::new().route("down.test", Script::Refuse));
    let mut engine = engine_with(&transport);
    for host in ["ok.test", "down.test", "ok2.test"] {
        engine.get(url(host), Vec::new(), None);
    }

    let batch = run(&mut engine, Some(2), false).await;

    assert!(batch.is_complete());
    assert_eq!(batch.len(), 3);
    assert_eq!(batch.failures(), 1);
    let failed = batch.get(1).unwrap().as_response().unwrap();
    assert!(failed.output.is_failed());
    assert_eq!(failed.metadata.status, None);
}

#[tokio::test]
async fn test_invalid_url_surfaces_as_transport_failure() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_with(&transport);
    engine
        .get("not a url", Vec::new(), None)
        .get(url("ok.test"), Vec::new(), None);

    let batch = run(&mut engine, Some(2), false).await;

    let first = batch.get(0).unwrap().as_response().unwrap();
    assert!(first.output.is_failed());
    assert_eq!(first.metadata.url, "not a url");
    assert!(!batch.get(1).unwrap().is_failure());
}

#[tokio::test]
async fn test_probe_status_boundaries() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .route("s199.test", Script::status(199))
            .route("s200.test", Script::status(200))
            .route("s399.test", Script::status(399))
            .route("s400.test", Script::status(400))
            .route("gone.test", Script::Refuse),
    );
    let mut engine = engine_with(&transport);
    let urls: Vec<String> = ["s199.test", "s200.test", "s399.test", "s400.test", "gone.test"]
        .into_iter()
        .map(url)
        .collect();

    let available = engine.is_available(&urls).await.unwrap();

    assert_eq!(available, vec![false, true, true, false, false]);
}

#[tokio::test]
async fn test_probe_overrides_apply_to_every_launch() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_with(&transport);
    for i in 0..5 {
        engine.get(url(&format!("p{i}.test")), Vec::new(), None);
    }

    let batch = run(&mut engine, Some(2), true).await;

    assert_eq!(batch.availability(5), vec![true; 5]);
    let calls = transport.calls();
    assert_eq!(calls.len(), 5);
    for options in calls {
        assert!(options.no_body);
        assert_eq!(options.timeout, Duration::from_millis(1200));
        assert_eq!(options.connect_timeout, Duration::from_millis(500));
    }
}

#[tokio::test]
async fn test_scenario_b_is_available() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .route("ok.example", Script::status(200))
            .route("down.example", Script::Refuse),
    );
    let mut engine = engine_with(&transport);

    let available = engine
        .is_available(&[
            "http://ok.example".to_string(),
            "http://down.example".to_string(),
        ])
        .await
        .unwrap();

    assert_eq!(available, vec![true, false]);
}

#[tokio::test]
async fn test_is_available_leaves_earlier_queue_alone() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_with(&transport);
    engine.get(url("queued.test"), Vec::new(), None);

    let available = engine.is_available(&[url("probe.test")]).await.unwrap();

    assert_eq!(available, vec![true]);
    assert_eq!(engine.pending(), 1);
    assert_eq!(transport.launched_hosts(), vec!["probe.test"]);
}

#[tokio::test]
async fn test_is_available_with_no_urls() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_with(&transport);
    assert!(engine.is_available(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scenario_c_process_json_post() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_with(&transport);

    let outcome = engine
        .process(
            &["http://x".to_string()],
            ProcessParams {
                method: Method::Post,
                data: Some(json!({"a": 1})),
                as_json: true,
                ..ProcessParams::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.batch().unwrap().len(), 1);
    let calls = transport.calls();
    let options = &calls[0];
    assert_eq!(options.method, Method::Post);
    assert_eq!(options.body.as_deref(), Some(br#"{"a":1}"#.as_slice()));
    assert!(
        options
            .headers
            .contains(&"Content-Type: application/json".to_string())
    );
    assert!(options.headers.contains(&"Content-Length: 7".to_string()));
    assert!(options.headers.contains(&"Expect:".to_string()));
}

#[tokio::test]
async fn test_process_applies_shared_settings_to_engine() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_with(&transport);
    let seen = Arc::new(Mutex::new(0_usize));
    let counter = Arc::clone(&seen);

    let outcome = engine
        .process(
            &[url("a.test"), url("b.test")],
            ProcessParams {
                method: Method::Post,
                data: Some(json!({"k": "v w"})),
                auth: Some("user:pw".to_string()),
                timeout: Some(Duration::from_secs(9)),
                callback: Some(callback(move |_, _, _| *counter.lock().unwrap() += 1)),
                ..ProcessParams::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.batch().unwrap().is_empty());
    assert_eq!(*seen.lock().unwrap(), 2);
    for options in transport.calls() {
        assert_eq!(options.body.as_deref(), Some(b"k=v+w".as_slice()));
        assert_eq!(options.basic_auth.as_deref(), Some("user:pw"));
        assert_eq!(options.timeout, Duration::from_secs(9));
        assert!(
            options
                .headers
                .contains(&"Content-Type: application/x-www-form-urlencoded".to_string())
        );
    }
    // Settings persist for later runs.
    assert_eq!(engine.config().timeout(), Duration::from_secs(9));
}

#[tokio::test]
async fn test_process_get_without_data() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_with(&transport);

    let batch = engine
        .process(&[url("a.test"), url("b.test")], ProcessParams::default())
        .await
        .unwrap()
        .into_batch()
        .unwrap();

    assert_eq!(batch.len(), 2);
    for options in transport.calls() {
        assert_eq!(options.method, Method::Get);
        assert!(options.body.is_none());
    }
}

#[tokio::test]
async fn test_process_get_drops_shared_data() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_with(&transport);

    engine
        .process(
            &[url("a.test")],
            ProcessParams {
                method: Method::Get,
                data: Some(json!({"a": 1})),
                ..ProcessParams::default()
            },
        )
        .await
        .unwrap();
    engine
        .process(
            &[url("b.test")],
            ProcessParams {
                method: Method::Get,
                data: Some(json!({"a": 1})),
                as_json: true,
                ..ProcessParams::default()
            },
        )
        .await
        .unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    for options in &calls {
        assert_eq!(options.method, Method::Get);
        assert!(options.body.is_none());
        assert!(
            !options
                .headers
                .iter()
                .any(|line| line.starts_with("Content-Length"))
        );
    }
}

#[tokio::test]
async fn test_process_put_keeps_method_and_payload() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_with(&transport);

    engine
        .process(
            &[url("a.test")],
            ProcessParams {
                method: Method::Put,
                data: Some(json!("raw")),
                ..ProcessParams::default()
            },
        )
        .await
        .unwrap();

    let options = &transport.calls()[0];
    assert_eq!(options.method, Method::Put);
    assert_eq!(options.body.as_deref(), Some(b"raw".as_slice()));
}

#[tokio::test]
async fn test_proxy_injection_by_destination() {
    let transport = Arc::new(ScriptedTransport::new());
    let proxy = StaticProxySource::new(
        Some(ProxySettings {
            address: "proxy.corp.net".to_string(),
            port: 3128,
            username: Some("fog".to_string()),
            password: Some("pw".to_string()),
        }),
        vec!["storage.local".to_string()],
    );
    let mut engine = RequestEngine::new(
        EngineConfig::default(),
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(proxy),
    );
    engine
        .get("http://updates.example.org/", Vec::new(), None)
        .get("http://node1.storage.local/", Vec::new(), None);

    run(&mut engine, Some(2), false).await;

    let calls = transport.calls();
    let external = calls[0].proxy.as_ref().expect("external goes through proxy");
    assert_eq!(external.address, "proxy.corp.net");
    assert_eq!(external.port, 3128);
    assert_eq!(external.credentials.as_deref(), Some("fog:pw"));
    assert!(calls[1].proxy.is_none());
}

#[tokio::test]
async fn test_per_request_overrides_reach_transport() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_with(&transport);
    engine.get(
        url("a.test"),
        vec!["Accept: text/plain".to_string()],
        Some(OptionOverrides {
            timeout: Some(Duration::from_secs(4)),
            verify_tls: Some(true),
            ..OptionOverrides::default()
        }),
    );

    run(&mut engine, None, false).await;

    let options = &transport.calls()[0];
    assert_eq!(options.timeout, Duration::from_secs(4));
    assert!(options.verify_tls);
    assert_eq!(options.headers, vec!["Accept: text/plain".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_poll_timeout_returns_partial_batch() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .route("ok.test", Script::ok("done"))
            .route("stuck.test", Script::Hang),
    );
    let mut engine = engine_with(&transport);
    engine.config_mut().merge_options(&OptionOverrides {
        timeout: Some(Duration::from_secs(2)),
        connect_timeout: Some(Duration::from_secs(1)),
        ..OptionOverrides::default()
    });
    engine
        .get(url("ok.test"), Vec::new(), None)
        .get(url("stuck.test"), Vec::new(), None)
        .get(url("ok.test"), Vec::new(), None);

    let batch = run(&mut engine, Some(2), false).await;

    assert!(matches!(batch.completion(), Completion::Aborted { .. }));
    assert!(!batch.is_complete());
    let keys: Vec<usize> = batch.outcomes().keys().copied().collect();
    assert_eq!(keys, vec![0, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_aborted_probe_reports_missing_as_unavailable() {
    let transport = Arc::new(ScriptedTransport::new().route("stuck.test", Script::Hang));
    let mut engine = engine_with(&transport);

    let available = engine
        .is_available(&[url("ok.test"), url("stuck.test")])
        .await
        .unwrap();

    assert_eq!(available, vec![true, false]);
}

#[tokio::test]
async fn test_task_panic_aborts_batch() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .route("boom.test", Script::Panic)
            .finish_order(&["ok.test", "boom.test"]),
    );
    let mut engine = engine_with(&transport);
    engine
        .get(url("ok.test"), Vec::new(), None)
        .get(url("boom.test"), Vec::new(), None);

    let batch = run(&mut engine, Some(2), false).await;

    match batch.completion() {
        Completion::Aborted { reason } => assert!(reason.contains("transport task failed")),
        Completion::Complete => panic!("expected aborted batch"),
    }
    assert_eq!(batch.len(), 1);
    assert!(batch.get(0).is_some());
}
