//! End-to-end tests for importing control-plane kubeconfigs into an
//! aggregate kubeconfig on disk, using the in-memory bundle store.

use std::sync::Arc;
use std::time::Duration;

use kflex_core::ControlPlaneIdentity;
use kflex_kubeconfig::{
    codec, AggregateStore, Cluster, Context, CredentialDocument, InMemoryBundleStore,
    KubeconfigError, KubeconfigLoader, WaitOptions,
};
use tempfile::TempDir;

const VCLUSTER_KUBECONFIG: &str = r"
apiVersion: v1
kind: Config
clusters:
- name: my-vcluster
  cluster:
    server: https://cp1.example.com:443
    certificate-authority-data: Q0EtREFUQQ==
contexts:
- name: my-vcluster
  context:
    cluster: my-vcluster
    user: my-vcluster
current-context: my-vcluster
users:
- name: my-vcluster
  user:
    client-certificate-data: Q0VSVA==
    client-key-data: S0VZ
";

const K8S_KUBECONFIG: &str = r"
apiVersion: v1
kind: Config
clusters:
- name: cp2-cluster
  cluster:
    server: https://cp2.example.com:6443
contexts:
- name: cp2
  context:
    cluster: cp2-cluster
    user: cp2-admin
current-context: cp2
users:
- name: cp2-admin
  user:
    token: cp2-token
";

const EXISTING_AGGREGATE: &str = r"
apiVersion: v1
kind: Config
clusters:
- name: kind-dev
  cluster:
    server: https://127.0.0.1:40000
contexts:
- name: kind-dev
  context:
    cluster: kind-dev
    user: kind-dev
    namespace: default
current-context: kind-dev
users:
- name: kind-dev
  user:
    token: dev-token
";

struct Fixture {
    loader: KubeconfigLoader<InMemoryBundleStore>,
    _dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let aggregate = AggregateStore::new(dir.path().join(".kube").join("config"));
        Self {
            loader: KubeconfigLoader::new(InMemoryBundleStore::new(), aggregate),
            _dir: dir,
        }
    }

    fn with_aggregate(contents: &str) -> Self {
        let fixture = Self::new();
        let path = fixture.loader.aggregate().path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
        fixture
    }

    fn store(&self) -> &InMemoryBundleStore {
        self.loader.store()
    }

    fn publish_vcluster(&self, name: &str, kubeconfig: &str) {
        self.store().insert_bundle(
            &format!("{name}-system"),
            "vc-vcluster",
            [("config", kubeconfig)],
        );
    }

    fn on_disk(&self) -> CredentialDocument {
        self.loader.aggregate().load().unwrap()
    }
}

fn vcluster(name: &str) -> ControlPlaneIdentity {
    ControlPlaneIdentity::parse(name, "vcluster").unwrap()
}

#[tokio::test]
async fn vcluster_credentials_are_renamed_and_selected() {
    let fx = Fixture::new();
    fx.publish_vcluster("cp1", VCLUSTER_KUBECONFIG);

    let merged = fx.loader.load_and_merge(&vcluster("cp1")).await.unwrap();

    assert_eq!(merged, fx.on_disk());
    assert_eq!(merged.current_context, "cp1");

    let cluster = &merged.clusters["cp1-cluster"];
    assert_eq!(cluster.server.as_deref(), Some("https://cp1.example.com:443"));
    assert_eq!(cluster.certificate_authority_data.as_deref(), Some("Q0EtREFUQQ=="));

    let user = &merged.auth_infos["cp1-admin"];
    assert_eq!(user.client_certificate_data.as_deref(), Some("Q0VSVA=="));

    assert_eq!(merged.contexts["cp1"], Context::new("cp1-cluster", "cp1-admin"));

    assert!(!merged.clusters.contains_key("my-vcluster"));
    assert!(!merged.auth_infos.contains_key("my-vcluster"));
    assert!(!merged.contexts.contains_key("my-vcluster"));
    assert!(merged.dangling_references().is_empty());
}

#[tokio::test]
async fn foreign_entries_are_preserved() {
    let fx = Fixture::with_aggregate(EXISTING_AGGREGATE);
    fx.publish_vcluster("cp1", VCLUSTER_KUBECONFIG);

    let merged = fx.loader.load_and_merge(&vcluster("cp1")).await.unwrap();

    assert_eq!(
        merged.clusters.keys().collect::<Vec<_>>(),
        vec!["cp1-cluster", "kind-dev"]
    );
    assert_eq!(
        merged.contexts["kind-dev"].namespace.as_deref(),
        Some("default")
    );
    assert_eq!(merged.auth_infos["kind-dev"].token.as_deref(), Some("dev-token"));
    assert_eq!(merged.current_context, "cp1");
}

#[tokio::test]
async fn stale_entries_are_overwritten() {
    let fx = Fixture::new();
    let mut stale = CredentialDocument::default();
    stale.clusters.insert(
        "cp1-cluster".into(),
        Cluster {
            server: Some("https://old.example.com".into()),
            ..Cluster::default()
        },
    );
    fx.loader.aggregate().persist(&stale).unwrap();
    fx.publish_vcluster("cp1", VCLUSTER_KUBECONFIG);

    let merged = fx.loader.load_and_merge(&vcluster("cp1")).await.unwrap();

    assert_eq!(merged.clusters.len(), 1);
    assert_eq!(
        merged.clusters["cp1-cluster"].server.as_deref(),
        Some("https://cp1.example.com:443")
    );
}

#[tokio::test]
async fn merging_another_control_plane_switches_context() {
    let fx = Fixture::new();
    fx.publish_vcluster("cp1", VCLUSTER_KUBECONFIG);
    fx.store()
        .insert_bundle("cp2-system", "admin-kubeconfig", [("kubeconfig", K8S_KUBECONFIG)]);

    fx.loader.load_and_merge(&vcluster("cp1")).await.unwrap();
    let cp2 = ControlPlaneIdentity::parse("cp2", "k8s").unwrap();
    let merged = fx.loader.load_and_merge(&cp2).await.unwrap();

    assert_eq!(merged.current_context, "cp2");
    assert_eq!(
        merged.contexts.keys().collect::<Vec<_>>(),
        vec!["cp1", "cp2"]
    );
    assert_eq!(merged.auth_infos["cp2-admin"].token.as_deref(), Some("cp2-token"));
}

#[tokio::test]
async fn re_merging_is_idempotent() {
    let fx = Fixture::with_aggregate(EXISTING_AGGREGATE);
    fx.publish_vcluster("cp1", VCLUSTER_KUBECONFIG);

    let first = fx.loader.load_and_merge(&vcluster("cp1")).await.unwrap();
    let bytes = std::fs::read(fx.loader.aggregate().path()).unwrap();
    let second = fx.loader.load_and_merge(&vcluster("cp1")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(bytes, std::fs::read(fx.loader.aggregate().path()).unwrap());
}

#[tokio::test]
async fn failed_fetch_leaves_aggregate_untouched() {
    let fx = Fixture::with_aggregate(EXISTING_AGGREGATE);
    let before = std::fs::read(fx.loader.aggregate().path()).unwrap();

    let err = fx.loader.load_and_merge(&vcluster("cp1")).await.unwrap_err();
    assert!(err.is_not_found());

    fx.store().insert_bundle("cp1-system", "vc-vcluster", [("config", "{not yaml")]);
    let err = fx.loader.load_and_merge(&vcluster("cp1")).await.unwrap_err();
    assert!(matches!(err, KubeconfigError::Decode(_)));

    assert_eq!(before, std::fs::read(fx.loader.aggregate().path()).unwrap());
}

#[test]
fn unwritable_aggregate_is_a_persist_error() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "").unwrap();

    let aggregate = AggregateStore::new(blocker.join("config"));
    let err = aggregate.persist(&CredentialDocument::default()).unwrap_err();

    assert!(matches!(err, KubeconfigError::Persist(_)));
    assert!(!err.is_retriable());
}

#[tokio::test]
async fn dry_run_does_not_touch_disk() {
    let fx = Fixture::with_aggregate(EXISTING_AGGREGATE);
    let before = std::fs::read(fx.loader.aggregate().path()).unwrap();
    fx.publish_vcluster("cp1", VCLUSTER_KUBECONFIG);

    let mut aggregate = fx.loader.aggregate().load_or_default().unwrap();
    fx.loader
        .load_and_merge_no_write(&vcluster("cp1"), &mut aggregate)
        .await
        .unwrap();

    assert_eq!(aggregate.current_context, "cp1");
    assert!(aggregate.contexts.contains_key("kind-dev"));
    assert_eq!(before, std::fs::read(fx.loader.aggregate().path()).unwrap());

    let rendered = codec::decode(&codec::encode(&aggregate).unwrap()).unwrap();
    assert_eq!(rendered, aggregate);
}

#[tokio::test]
async fn wait_then_merge_once_bundle_is_published() {
    let fx = Arc::new(Fixture::new());

    let waiter = {
        let fx = Arc::clone(&fx);
        tokio::spawn(async move {
            let identity = vcluster("cp1");
            let options = WaitOptions::with_timeout(Some(Duration::from_secs(5)));
            fx.loader.wait_for_bundle(&identity, options).await?;
            fx.loader.load_and_merge(&identity).await
        })
    };

    while fx.store().active_subscriptions() == 0 {
        tokio::task::yield_now().await;
    }
    fx.store().insert_bundle("cp1-system", "unrelated", [("config", "x")]);
    fx.publish_vcluster("cp1", VCLUSTER_KUBECONFIG);

    let merged = waiter.await.unwrap().unwrap();
    assert_eq!(merged.current_context, "cp1");
    assert_eq!(fx.store().active_subscriptions(), 0);
}

#[tokio::test]
async fn wait_times_out_without_bundle() {
    let fx = Fixture::new();

    let err = fx
        .loader
        .wait_for_bundle(
            &vcluster("cp1"),
            WaitOptions::with_timeout(Some(Duration::from_millis(20))),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, KubeconfigError::TimedOut(_)));
    assert!(err.is_retriable());
    assert!(!fx.loader.aggregate().path().exists());
}
