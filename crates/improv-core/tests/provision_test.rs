#![allow(clippy::unwrap_used)]
// End-to-end tests for `Provisioner` with a scripted network stack and a
// wiremock captive portal.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use improv_core::{
    AccessPointConfig, AdapterPicker, CleanupRegistry, CommandStatus, CoreError,
    InterfaceSelector, MacAddress, NetworkAdapter, NetworkStack, ProgressEvent, ProvisionConfig,
    ProvisionOutcome, Provisioner, RetryBudget, Security, Stage, Timing, WifiCredentials,
};

// ── Fakes ───────────────────────────────────────────────────────────

struct FakeStack {
    adapters: Vec<NetworkAdapter>,
    install_status: i32,
    join_status: i32,
    remove_status: i32,
    /// Successive answers of `ipv4_address`; the last one repeats.
    addresses: Mutex<VecDeque<Option<Ipv4Addr>>>,
    calls: Mutex<Vec<String>>,
}

impl Default for FakeStack {
    fn default() -> Self {
        Self {
            adapters: vec![
                adapter("Ethernet", "11-22-33-44-55-66"),
                adapter("Wi-Fi", "AA-BB-CC-DD-EE-FF"),
            ],
            install_status: 0,
            join_status: 0,
            remove_status: 0,
            addresses: Mutex::new(VecDeque::from([Some(Ipv4Addr::new(192, 168, 4, 2))])),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeStack {
    fn with_addresses(addresses: impl IntoIterator<Item = Option<Ipv4Addr>>) -> Self {
        Self {
            addresses: Mutex::new(addresses.into_iter().collect()),
            ..Self::default()
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn installed_then_removed(&self, ssid: &str) -> bool {
        let calls = self.calls();
        let install = calls.iter().position(|c| c == "install");
        let remove = calls.iter().position(|c| *c == format!("remove {ssid}"));
        matches!((install, remove), (Some(i), Some(r)) if i < r)
    }
}

impl NetworkStack for FakeStack {
    async fn list_adapters(&self) -> Result<Vec<NetworkAdapter>, CoreError> {
        self.record("list".into());
        Ok(self.adapters.clone())
    }

    async fn install_profile(&self, path: &Path) -> Result<CommandStatus, CoreError> {
        assert!(path.exists(), "profile file must exist during install");
        self.record("install".into());
        Ok(CommandStatus(self.install_status))
    }

    async fn remove_profile(&self, ssid: &str) -> Result<CommandStatus, CoreError> {
        self.record(format!("remove {ssid}"));
        Ok(CommandStatus(self.remove_status))
    }

    async fn join(&self, adapter: &str, ssid: &str) -> Result<CommandStatus, CoreError> {
        self.record(format!("join {adapter} {ssid}"));
        Ok(CommandStatus(self.join_status))
    }

    async fn ipv4_address(&self, _adapter: &str) -> Result<Option<Ipv4Addr>, CoreError> {
        let mut queue = self.addresses.lock().unwrap();
        let next = if queue.len() > 1 {
            queue.pop_front().flatten()
        } else {
            queue.front().copied().flatten()
        };
        Ok(next)
    }
}

/// `asked` is shared so a test can read it after the provisioner owns the picker.
#[derive(Default)]
struct FakePicker {
    choice: Option<MacAddress>,
    asked: Arc<AtomicUsize>,
}

impl AdapterPicker for FakePicker {
    async fn pick(&self, _adapters: &[NetworkAdapter]) -> Result<Option<MacAddress>, CoreError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.choice.clone())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn adapter(name: &str, mac: &str) -> NetworkAdapter {
    NetworkAdapter {
        name: name.into(),
        description: format!("{name} controller"),
        status: "Up".into(),
        mac: MacAddress::new(mac),
    }
}

fn secret(s: &str) -> SecretString {
    SecretString::from(s.to_owned())
}

fn config(interface: InterfaceSelector) -> ProvisionConfig {
    ProvisionConfig {
        ap: AccessPointConfig::new("esp-setup", Some(secret("setup-pass")), None).unwrap(),
        wifi: WifiCredentials {
            ssid: "home net".into(),
            password: secret("s3cret&more"),
        },
        interface,
        timing: Timing {
            ip_budget: RetryBudget::new(Duration::from_secs(2), Duration::from_millis(10)),
            portal_budget: RetryBudget::new(Duration::from_secs(2), Duration::from_millis(20)),
            probe_timeout: Duration::from_millis(500),
            submit_timeout: Duration::from_secs(1),
        },
    }
}

fn wifi_selector() -> InterfaceSelector {
    InterfaceSelector::Name("Wi-Fi".into())
}

struct Harness {
    stack: Arc<FakeStack>,
    registry: CleanupRegistry,
    events: mpsc::UnboundedReceiver<ProgressEvent>,
    provisioner: Provisioner<FakeStack, FakePicker>,
}

fn harness(stack: FakeStack, picker: FakePicker, portal: Option<&MockServer>) -> Harness {
    let stack = Arc::new(stack);
    let registry = CleanupRegistry::new();
    let (tx, events) = mpsc::unbounded_channel();

    let mut provisioner = Provisioner::new(Arc::clone(&stack), picker, registry.clone())
        .unwrap()
        .with_progress(Arc::new(tx));
    if let Some(server) = portal {
        provisioner = provisioner.with_portal_url(Url::parse(&server.uri()).unwrap());
    }

    Harness {
        stack,
        registry,
        events,
        provisioner,
    }
}

async fn mount_ready_portal(server: &MockServer, submit_status: u16) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wifisave"))
        .and(query_param("ssid", "home net"))
        .and(query_param("psk", "s3cret&more"))
        .respond_with(ResponseTemplate::new(submit_status).insert_header("Location", "/"))
        .expect(1)
        .mount(server)
        .await;
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn terminal_events(events: &[ProgressEvent]) -> Vec<&ProgressEvent> {
    events.iter().filter(|e| e.is_terminal()).collect()
}

// ── Successful runs ─────────────────────────────────────────────────

#[tokio::test]
async fn test_provisions_device_and_removes_profile() {
    let server = MockServer::start().await;
    mount_ready_portal(&server, 302).await;
    let mut h = harness(FakeStack::default(), FakePicker::default(), Some(&server));

    let outcome = h
        .provisioner
        .run(&config(wifi_selector()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ProvisionOutcome::Provisioned {
            adapter: "Wi-Fi".into()
        }
    );
    assert_eq!(
        h.stack.calls(),
        vec![
            "list".to_owned(),
            "install".to_owned(),
            "join Wi-Fi esp-setup".to_owned(),
            "remove esp-setup".to_owned(),
        ]
    );
    assert_eq!(h.registry.pending(), 0);

    let events = drain(&mut h.events);
    let succeeded: Vec<Stage> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::StageSucceeded { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        succeeded,
        vec![
            Stage::AdapterResolution,
            Stage::ProfileInstall,
            Stage::ApJoin,
            Stage::IpAcquired,
            Stage::PortalReady,
            Stage::CredentialSubmit,
        ]
    );
    assert_eq!(terminal_events(&events), vec![&ProgressEvent::Provisioned]);
}

#[tokio::test]
async fn test_explicit_mac_selects_adapter_without_asking() {
    let server = MockServer::start().await;
    mount_ready_portal(&server, 302).await;
    let picker = FakePicker::default();
    let asked = Arc::clone(&picker.asked);
    let h = harness(FakeStack::default(), picker, Some(&server));
    // Case and separator differ from what the stack reports.
    let selector = InterfaceSelector::Mac(MacAddress::new("aa:bb:cc:dd:ee:ff"));

    let outcome = h
        .provisioner
        .run(&config(selector), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ProvisionOutcome::Provisioned {
            adapter: "Wi-Fi".into()
        }
    );
    assert_eq!(asked.load(Ordering::SeqCst), 0);
    assert!(h.stack.calls().contains(&"join Wi-Fi esp-setup".to_owned()));
    assert!(h.stack.installed_then_removed("esp-setup"));
    assert_eq!(h.registry.pending(), 0);
}

#[tokio::test]
async fn test_link_local_address_does_not_count_as_acquired() {
    let server = MockServer::start().await;
    mount_ready_portal(&server, 200).await;
    let stack = FakeStack::with_addresses([
        None,
        Some(Ipv4Addr::new(169, 254, 3, 7)),
        Some(Ipv4Addr::new(192, 168, 4, 2)),
    ]);
    let mut h = harness(stack, FakePicker::default(), Some(&server));

    h.provisioner
        .run(&config(wifi_selector()), &CancellationToken::new())
        .await
        .unwrap();

    let acquired = drain(&mut h.events).into_iter().find_map(|e| match e {
        ProgressEvent::StageSucceeded {
            stage: Stage::IpAcquired,
            detail,
        } => detail,
        _ => None,
    });
    assert_eq!(acquired.as_deref(), Some("192.168.4.2"));
}

#[tokio::test]
async fn test_cleanup_failure_does_not_change_outcome() {
    let server = MockServer::start().await;
    mount_ready_portal(&server, 302).await;
    let stack = FakeStack {
        remove_status: 1,
        ..FakeStack::default()
    };
    let h = harness(stack, FakePicker::default(), Some(&server));

    let outcome = h
        .provisioner
        .run(&config(wifi_selector()), &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, ProvisionOutcome::Provisioned { .. }));
    assert!(h.stack.installed_then_removed("esp-setup"));
}

// ── Device answers ──────────────────────────────────────────────────

#[tokio::test]
async fn test_rejected_submission_is_an_outcome_not_an_error() {
    let server = MockServer::start().await;
    mount_ready_portal(&server, 404).await;
    let mut h = harness(FakeStack::default(), FakePicker::default(), Some(&server));

    let outcome = h
        .provisioner
        .run(&config(wifi_selector()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ProvisionOutcome::Rejected { status: 404 });
    assert!(h.stack.installed_then_removed("esp-setup"));
    assert_eq!(
        terminal_events(&drain(&mut h.events)),
        vec![&ProgressEvent::ProvisioningFailed { status: 404 }]
    );
}

// ── Aborted runs ────────────────────────────────────────────────────

#[tokio::test]
async fn test_join_failure_aborts_and_removes_profile() {
    let stack = FakeStack {
        join_status: 1,
        ..FakeStack::default()
    };
    let mut h = harness(stack, FakePicker::default(), None);

    let failure = h
        .provisioner
        .run(&config(wifi_selector()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::ApJoin);
    assert!(
        matches!(failure.error, CoreError::JoinFailed { status: 1, .. }),
        "got {:?}",
        failure.error
    );
    assert!(failure.is_setup_failure());
    assert!(h.stack.installed_then_removed("esp-setup"));

    let events = drain(&mut h.events);
    let terminal = terminal_events(&events);
    assert_eq!(terminal.len(), 1);
    assert!(matches!(
        terminal[0],
        ProgressEvent::Aborted {
            stage: Stage::ApJoin,
            ..
        }
    ));
}

#[tokio::test]
async fn test_failed_profile_install_aborts_without_join() {
    let stack = FakeStack {
        install_status: 2,
        ..FakeStack::default()
    };
    let h = harness(stack, FakePicker::default(), None);

    let failure = h
        .provisioner
        .run(&config(wifi_selector()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::ProfileInstall);
    assert!(matches!(
        failure.error,
        CoreError::ProfileInstallFailed { status: 2, .. }
    ));
    assert_eq!(h.stack.calls(), vec!["list".to_owned(), "install".to_owned()]);
}

#[tokio::test]
async fn test_invalid_security_fails_before_touching_the_os() {
    let mut h = harness(FakeStack::default(), FakePicker::default(), None);
    let mut cfg = config(wifi_selector());
    cfg.ap = AccessPointConfig {
        ssid: "esp-setup".into(),
        password: None,
        security: Security::Wpa2Psk,
    };

    let failure = h
        .provisioner
        .run(&cfg, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::ProfileInstall);
    assert!(matches!(
        failure.error,
        CoreError::InvalidSecurityConfig { .. }
    ));
    assert!(h.stack.calls().is_empty());

    let events = drain(&mut h.events);
    assert_eq!(events.len(), 3, "{events:?}");
    assert_eq!(
        events[0],
        ProgressEvent::StageStarted {
            stage: Stage::ProfileInstall
        }
    );
    assert!(matches!(
        &events[1],
        ProgressEvent::StageFailed {
            stage: Stage::ProfileInstall,
            ..
        }
    ));
    assert!(matches!(
        &events[2],
        ProgressEvent::Aborted {
            stage: Stage::ProfileInstall,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_ip_timeout_aborts_and_removes_profile() {
    let stack = FakeStack::with_addresses([None]);
    let h = harness(stack, FakePicker::default(), None);

    let failure = h
        .provisioner
        .run(&config(wifi_selector()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::IpAcquired);
    assert!(failure.error.is_timeout(), "got {:?}", failure.error);
    let CoreError::Timeout {
        last_error: Some(last),
        ..
    } = &failure.error
    else {
        panic!("expected a timeout with a last error, got {:?}", failure.error);
    };
    assert_eq!(last, "no IPv4 address yet");
    assert!(h.stack.installed_then_removed("esp-setup"));
}

#[tokio::test(start_paused = true)]
async fn test_link_local_only_timeout_names_the_address() {
    let stack = FakeStack::with_addresses([Some(Ipv4Addr::new(169, 254, 3, 7))]);
    let h = harness(stack, FakePicker::default(), None);

    let failure = h
        .provisioner
        .run(&config(wifi_selector()), &CancellationToken::new())
        .await
        .unwrap_err();

    let CoreError::Timeout {
        last_error: Some(last),
        ..
    } = &failure.error
    else {
        panic!("expected a timeout with a last error, got {:?}", failure.error);
    };
    assert_eq!(last, "only 169.254.3.7 assigned so far");
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_still_removes_profile() {
    let h = harness(FakeStack::with_addresses([None]), FakePicker::default(), None);
    let cancel = CancellationToken::new();
    let cfg = config(wifi_selector());

    let (result, ()) = tokio::join!(h.provisioner.run(&cfg, &cancel), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let failure = result.unwrap_err();

    assert_eq!(failure.stage, Stage::IpAcquired);
    assert!(matches!(failure.error, CoreError::Cancelled));
    assert!(h.stack.installed_then_removed("esp-setup"));
    assert_eq!(h.registry.pending(), 0);
}

#[tokio::test]
async fn test_cancelled_before_install_touches_nothing_more() {
    let h = harness(FakeStack::default(), FakePicker::default(), None);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let failure = h
        .provisioner
        .run(&config(wifi_selector()), &cancel)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::ProfileInstall);
    assert!(matches!(failure.error, CoreError::Cancelled));
    assert_eq!(h.stack.calls(), vec!["list".to_owned()]);
    assert_eq!(h.registry.pending(), 0);
}

// ── Adapter selection ───────────────────────────────────────────────

#[tokio::test]
async fn test_unmatched_selector_falls_back_to_picker() {
    let stack = FakeStack {
        join_status: 1,
        ..FakeStack::default()
    };
    let picker = FakePicker {
        choice: Some(MacAddress::new("aa:bb:cc:dd:ee:ff")),
        ..FakePicker::default()
    };
    let asked = Arc::clone(&picker.asked);
    let h = harness(stack, picker, None);
    let selector = InterfaceSelector::Mac(MacAddress::new("00:00:00:00:00:01"));

    let failure = h
        .provisioner
        .run(&config(selector), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(failure.stage, Stage::ApJoin);
    assert!(
        matches!(&failure.error, CoreError::JoinFailed { adapter, .. } if adapter == "Wi-Fi"),
        "got {:?}",
        failure.error
    );
    assert!(h.stack.calls().contains(&"join Wi-Fi esp-setup".to_owned()));
}

#[tokio::test]
async fn test_declined_picker_aborts_before_install() {
    let h = harness(FakeStack::default(), FakePicker::default(), None);

    let failure = h
        .provisioner
        .run(&config(InterfaceSelector::Any), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::AdapterResolution);
    assert!(matches!(failure.error, CoreError::NoAdapterSelected));
    assert_eq!(h.stack.calls(), vec!["list".to_owned()]);
}
