//! Kubernetes pod log backend.
//!
//! The query `type` picks how pods are found:
//!
//! | type contains          | pods                                         |
//! |------------------------|----------------------------------------------|
//! | `kubernetespod`        | by name (`id`) and label selector            |
//! | `kubernetesnode`       | every pod scheduled on node `id`             |
//! | `kubernetesdeployment` | pods selected by deployment `id`             |
//! | `kubernetesservice`    | pods selected by service `id`                |
//!
//! Logs of every init container and container of each pod are tailed and
//! split into one result per line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::SecondsFormat;
use loghub_core::{
    merge_labels, BackendError, BackendFuture, BackendKind, Labels, LogBackend, RouteSet,
    SearchParams, SearchResult, SearchResults,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::KubernetesConfig;
use crate::error::{ConfigError, Result};
use crate::http::{self, TlsOptions};

const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
/// Namespace used for deployment and service lookups that name none.
const DEFAULT_NAMESPACE: &str = "default";

/// How pods are located for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Pod,
    Node,
    Deployment,
    Service,
}

impl Strategy {
    fn from_type(log_type: &str) -> Option<Self> {
        let log_type = log_type.to_lowercase();
        if log_type.contains("kubernetespod") {
            Some(Self::Pod)
        } else if log_type.contains("kubernetesnode") {
            Some(Self::Node)
        } else if log_type.contains("kubernetesdeployment") {
            Some(Self::Deployment)
        } else if log_type.contains("kubernetesservice") {
            Some(Self::Service)
        } else {
            None
        }
    }
}

/// Reads container logs through the Kubernetes API.
#[derive(Debug)]
pub struct KubernetesBackend {
    name: String,
    routes: RouteSet,
    labels: Labels,
    timeout: Option<Duration>,
    client: reqwest::Client,
    api_server: String,
    base_url: url::Url,
    token: Option<String>,
    namespace: Option<String>,
}

impl KubernetesBackend {
    /// Builds the backend, falling back to the in-cluster service account
    /// when no API server is configured.
    ///
    /// # Errors
    ///
    /// Returns an error when no API server can be determined, the token file
    /// cannot be read, or the HTTP client cannot be built.
    pub fn from_config(config: KubernetesConfig, index: usize) -> Result<Self> {
        Self::with_env(config, index, |key| std::env::var(key).ok())
    }

    /// Like [`from_config`](Self::from_config), reading the in-cluster
    /// environment through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`from_config`](Self::from_config).
    pub fn with_env<F>(config: KubernetesConfig, index: usize, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let kind = BackendKind::Kubernetes;
        let configured = config.api_server.as_deref().filter(|s| !s.trim().is_empty());
        let (api_server, in_cluster) = match configured {
            Some(raw) => (http::parse_base_url(kind, "apiServer", raw)?, false),
            None => {
                let url = in_cluster_url(&lookup).ok_or_else(|| ConfigError::missing(kind, "apiServer"))?;
                (http::parse_base_url(kind, "apiServer", &url)?, true)
            }
        };

        let token = match (config.token.filter(|t| !t.trim().is_empty()), &config.token_file) {
            (Some(token), _) => Some(token.trim().to_string()),
            (None, Some(path)) => Some(read_token(path)?),
            (None, None) if in_cluster => read_token(Path::new(SERVICE_ACCOUNT_TOKEN)).ok(),
            (None, None) => None,
        };

        let in_cluster_ca = PathBuf::from(SERVICE_ACCOUNT_CA);
        let ca_file = config
            .ca_file
            .as_deref()
            .or_else(|| (in_cluster && in_cluster_ca.exists()).then_some(in_cluster_ca.as_path()));
        let client = http::build_client(
            kind,
            &TlsOptions {
                ca_file,
                insecure_skip_verify: config.insecure_skip_tls_verify,
            },
        )?;

        let base_url = url::Url::parse(&api_server).map_err(|e| ConfigError::invalid(kind, "apiServer", e))?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::invalid(kind, "apiServer", "not a base URL"));
        }

        debug!(%api_server, in_cluster, "kubernetes backend configured");
        Ok(Self {
            name: config.common.resolved_name(kind, index),
            timeout: config.common.timeout(),
            routes: config.common.routes.normalized(),
            labels: config.common.labels,
            client,
            api_server,
            base_url,
            token,
            namespace: config.namespace.filter(|ns| !ns.trim().is_empty()),
        })
    }

    /// The API server base URL.
    #[must_use]
    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str], query: &[(&str, String)]) -> loghub_core::Result<T> {
        let response = self.send(segments, query).await?;
        http::read_json(response).await
    }

    /// Sends a GET to the API path built from `segments`, each one
    /// percent-encoded on its own.
    async fn send(&self, segments: &[&str], query: &[(&str, String)]) -> loghub_core::Result<reqwest::Response> {
        let url = self.endpoint(segments)?;
        let request = self.client.get(url).query(query);
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request.send().await.map_err(|e| http::request_error(&e))
    }

    fn endpoint(&self, segments: &[&str]) -> loghub_core::Result<url::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::Request(format!("{} cannot carry a path", self.api_server)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        field_selector: Option<String>,
        label_selector: &Labels,
    ) -> loghub_core::Result<Vec<Pod>> {
        let path = match namespace {
            Some(ns) => vec!["api", "v1", "namespaces", ns, "pods"],
            None => vec!["api", "v1", "pods"],
        };
        let mut query = Vec::new();
        if let Some(fields) = field_selector {
            query.push(("fieldSelector", fields));
        }
        if !label_selector.is_empty() {
            query.push(("labelSelector", selector_string(label_selector)));
        }

        let pods: List<Pod> = self.get(&path, &query).await?;
        Ok(pods.items)
    }

    async fn do_search(&self, params: &SearchParams) -> loghub_core::Result<SearchResults> {
        let Some(strategy) = Strategy::from_type(&params.log_type) else {
            debug!(backend = %self.name, log_type = %params.log_type, "no kubernetes strategy for type");
            return Ok(SearchResults::default());
        };

        let (id_namespace, name) = params.namespaced_id();
        let mut selector = params.labels.clone();
        let label_namespace = selector.remove("namespace");
        let namespace = id_namespace
            .map(str::to_string)
            .or(label_namespace)
            .or_else(|| self.namespace.clone());
        let name = name.trim();

        let mut owner = Labels::new();
        let pods = match strategy {
            Strategy::Pod => {
                let field = (!name.is_empty()).then(|| format!("metadata.name={name}"));
                self.list_pods(namespace.as_deref(), field, &selector).await?
            }
            Strategy::Node => {
                let field = (!name.is_empty()).then(|| format!("spec.nodeName={name}"));
                self.list_pods(namespace.as_deref(), field, &selector).await?
            }
            Strategy::Deployment => {
                let ns = namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
                let path = ["apis", "apps", "v1", "namespaces", ns, "deployments", required(name, "deployment")?];
                let deployment: Deployment = self.get(&path, &[]).await?;
                owner.insert("deployment".to_string(), name.to_string());
                let mut combined = deployment.spec.selector.match_labels;
                combined.extend(selector);
                self.list_pods(Some(ns), None, &combined).await?
            }
            Strategy::Service => {
                let ns = namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
                let path = ["api", "v1", "namespaces", ns, "services", required(name, "service")?];
                let service: Service = self.get(&path, &[]).await?;
                owner.insert("service".to_string(), name.to_string());
                if service.spec.selector.is_empty() {
                    debug!(backend = %self.name, service = name, "service has no selector");
                    return Ok(SearchResults::default());
                }
                let mut combined = service.spec.selector;
                combined.extend(selector);
                self.list_pods(Some(ns), None, &combined).await?
            }
        };

        debug!(backend = %self.name, ?strategy, pods = pods.len(), "fetching container logs");
        let mut results = Vec::new();
        for pod in &pods {
            for container in pod.spec.init_containers.iter().chain(&pod.spec.containers) {
                match self.container_logs(pod, &container.name, params).await {
                    Ok(text) => results.extend(self.to_results(pod, &container.name, &owner, &text)),
                    Err(e) => warn!(
                        backend = %self.name,
                        pod = %pod.metadata.name,
                        container = %container.name,
                        error = %e,
                        "failed to fetch container logs"
                    ),
                }
            }
        }

        let total = results.len() as u64;
        results.truncate(usize::try_from(params.limit).unwrap_or(usize::MAX));
        Ok(SearchResults::from_results(results).with_total(total))
    }

    async fn container_logs(&self, pod: &Pod, container: &str, params: &SearchParams) -> loghub_core::Result<String> {
        let tail_lines = if params.limit_per_item > 0 { params.limit_per_item } else { params.limit };
        let limit_bytes = if params.limit_bytes_per_item > 0 {
            params.limit_bytes_per_item
        } else {
            params.limit_bytes
        };

        let mut query = vec![
            ("container", container.to_string()),
            ("timestamps", "true".to_string()),
        ];
        if tail_lines > 0 {
            query.push(("tailLines", tail_lines.to_string()));
        }
        if limit_bytes > 0 {
            query.push(("limitBytes", limit_bytes.to_string()));
        }
        if let Some(since) = params.start_instant() {
            query.push(("sinceTime", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }

        let path = [
            "api",
            "v1",
            "namespaces",
            pod.metadata.namespace.as_str(),
            "pods",
            pod.metadata.name.as_str(),
            "log",
        ];
        let response = self.send(&path, &query).await?;
        http::read_text(response).await
    }

    fn to_results(&self, pod: &Pod, container: &str, owner: &Labels, text: &str) -> Vec<SearchResult> {
        let mut derived = Labels::new();
        derived.insert("pod".to_string(), pod.metadata.name.clone());
        derived.insert("container".to_string(), container.to_string());
        derived.insert("node".to_string(), pod.spec.node_name.clone());
        derived.insert("namespace".to_string(), pod.metadata.namespace.clone());
        derived.extend(owner.clone());
        let labels = merge_labels(&self.labels, derived);

        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                SearchResult::from_timestamped_line(line)
                    .with_id(pod.metadata.name.clone())
                    .with_labels(labels.clone())
            })
            .collect()
    }

    async fn do_ping(&self) -> loghub_core::Result<()> {
        let response = self.send(&["version"], &[]).await?;
        http::check_status(response).await.map(|_| ())
    }
}

impl LogBackend for KubernetesBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Kubernetes
    }

    fn routes(&self) -> &RouteSet {
        &self.routes
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn search<'a>(&'a self, params: &'a SearchParams) -> BackendFuture<'a, SearchResults> {
        Box::pin(self.do_search(params))
    }

    fn ping(&self) -> BackendFuture<'_, ()> {
        Box::pin(self.do_ping())
    }
}

fn in_cluster_url<F: Fn(&str) -> Option<String>>(lookup: &F) -> Option<String> {
    let host = lookup("KUBERNETES_SERVICE_HOST").filter(|h| !h.is_empty())?;
    let port = lookup("KUBERNETES_SERVICE_PORT").filter(|p| !p.is_empty())?;
    if host.contains(':') {
        Some(format!("https://[{host}]:{port}"))
    } else {
        Some(format!("https://{host}:{port}"))
    }
}

fn read_token(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|token| token.trim().to_string())
        .map_err(|e| ConfigError::invalid(BackendKind::Kubernetes, "tokenFile", format!("{}: {e}", path.display())))
}

fn required<'a>(name: &'a str, what: &str) -> loghub_core::Result<&'a str> {
    if name.is_empty() {
        return Err(BackendError::QueryFailed(format!("a {what} name is required")));
    }
    Ok(name)
}

fn selector_string(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Deserialize)]
struct List<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: PodSpec,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    namespace: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PodSpec {
    node_name: String,
    init_containers: Vec<Container>,
    containers: Vec<Container>,
}

#[derive(Debug, Deserialize)]
struct Container {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Deployment {
    spec: DeploymentSpec,
}

#[derive(Debug, Deserialize)]
struct DeploymentSpec {
    #[serde(default)]
    selector: LabelSelector,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LabelSelector {
    match_labels: Labels,
}

#[derive(Debug, Deserialize)]
struct Service {
    #[serde(default)]
    spec: ServiceSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceSpec {
    selector: Labels,
}

#[cfg(test)]
mod tests {
    use super::*;
    use loghub_core::{CommonBackend, SearchRoute};
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn config(server: &Server) -> KubernetesConfig {
        KubernetesConfig {
            common: CommonBackend {
                routes: RouteSet::new(vec![SearchRoute::new()]),
                labels: [("cluster".to_string(), "dev".to_string())].into_iter().collect(),
                ..CommonBackend::default()
            },
            api_server: Some(server.url()),
            token: Some("t0k3n".to_string()),
            ..KubernetesConfig::default()
        }
    }

    fn backend(server: &Server) -> KubernetesBackend {
        KubernetesBackend::with_env(config(server), 0, |_| None).unwrap()
    }

    fn pod(name: &str, namespace: &str, node: &str, containers: &[&str], init: &[&str]) -> serde_json::Value {
        let names = |list: &[&str]| list.iter().map(|c| json!({"name": c})).collect::<Vec<_>>();
        json!({
            "metadata": {"name": name, "namespace": namespace},
            "spec": {"nodeName": node, "containers": names(containers), "initContainers": names(init)}
        })
    }

    fn pod_list(pods: Vec<serde_json::Value>) -> String {
        json!({"kind": "PodList", "items": pods}).to_string()
    }

    fn query(pairs: &[(&str, &str)]) -> Matcher {
        Matcher::AllOf(
            pairs
                .iter()
                .map(|(k, v)| Matcher::UrlEncoded((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    async fn mock_logs(server: &mut Server, ns: &str, pod: &str, container: &str, body: &str) -> mockito::Mock {
        server
            .mock("GET", format!("/api/v1/namespaces/{ns}/pods/{pod}/log").as_str())
            .match_query(query(&[("container", container), ("timestamps", "true")]))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await
    }

    // ===================================================================
    // Strategies
    // ===================================================================

    #[tokio::test]
    async fn pod_by_namespaced_id() {
        let mut server = Server::new_async().await;
        let list = server
            .mock("GET", "/api/v1/namespaces/prod/pods")
            .match_query(query(&[("fieldSelector", "metadata.name=web-1"), ("labelSelector", "app=web")]))
            .match_header("authorization", "Bearer t0k3n")
            .with_status(200)
            .with_body(pod_list(vec![pod("web-1", "prod", "node-a", &["app"], &["migrate"])]))
            .create_async()
            .await;
        let _init = mock_logs(&mut server, "prod", "web-1", "migrate", "2024-05-01T10:00:00.5Z migrated\n").await;
        let _app = mock_logs(
            &mut server,
            "prod",
            "web-1",
            "app",
            "2024-05-01T10:00:01Z listening\nno timestamp here\n",
        )
        .await;

        let params = SearchParams::new()
            .with_type("KubernetesPod")
            .with_id("prod/web-1")
            .with_label("app", "web")
            .resolve();
        let results = backend(&server).search(&params).await.unwrap();

        list.assert_async().await;
        let messages: Vec<&str> = results.results.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["migrated", "listening", "no timestamp here"]);
        assert_eq!(results.total, 3);

        let first = &results.results[0];
        assert_eq!(first.id.as_deref(), Some("web-1"));
        assert_eq!(first.time.as_deref(), Some("2024-05-01T10:00:00.5Z"));
        assert_eq!(first.labels.get("container").map(String::as_str), Some("migrate"));
        assert_eq!(first.labels.get("node").map(String::as_str), Some("node-a"));
        assert_eq!(first.labels.get("namespace").map(String::as_str), Some("prod"));
        assert_eq!(first.labels.get("cluster").map(String::as_str), Some("dev"));
        assert_eq!(results.results[2].time, None);
    }

    #[tokio::test]
    async fn namespace_label_is_not_a_selector() {
        let mut server = Server::new_async().await;
        let list = server
            .mock("GET", "/api/v1/namespaces/staging/pods")
            .match_query(Matcher::UrlEncoded("labelSelector".into(), "app=api".into()))
            .with_status(200)
            .with_body(pod_list(vec![]))
            .create_async()
            .await;

        let params = SearchParams::new()
            .with_type("KubernetesPod")
            .with_label("namespace", "staging")
            .with_label("app", "api")
            .resolve();
        let results = backend(&server).search(&params).await.unwrap();

        list.assert_async().await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn node_lists_pods_across_namespaces() {
        let mut server = Server::new_async().await;
        let list = server
            .mock("GET", "/api/v1/pods")
            .match_query(Matcher::UrlEncoded("fieldSelector".into(), "spec.nodeName=node-a".into()))
            .with_status(200)
            .with_body(pod_list(vec![pod("db-0", "data", "node-a", &["postgres"], &[])]))
            .create_async()
            .await;
        let _logs = mock_logs(&mut server, "data", "db-0", "postgres", "ready\n").await;

        let params = SearchParams::new().with_type("KubernetesNode").with_id("node-a").resolve();
        let results = backend(&server).search(&params).await.unwrap();

        list.assert_async().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results.results[0].labels.get("namespace").map(String::as_str), Some("data"));
    }

    #[tokio::test]
    async fn deployment_uses_its_selector() {
        let mut server = Server::new_async().await;
        let _deployment = server
            .mock("GET", "/apis/apps/v1/namespaces/default/deployments/api")
            .with_status(200)
            .with_body(json!({"spec": {"selector": {"matchLabels": {"app": "api"}}}}).to_string())
            .create_async()
            .await;
        let list = server
            .mock("GET", "/api/v1/namespaces/default/pods")
            .match_query(Matcher::UrlEncoded("labelSelector".into(), "app=api".into()))
            .with_status(200)
            .with_body(pod_list(vec![pod("api-7f9", "default", "node-b", &["api"], &[])]))
            .create_async()
            .await;
        let _logs = mock_logs(&mut server, "default", "api-7f9", "api", "started\n").await;

        let params = SearchParams::new().with_type("KubernetesDeployment").with_id("api").resolve();
        let results = backend(&server).search(&params).await.unwrap();

        list.assert_async().await;
        assert_eq!(results.results[0].labels.get("deployment").map(String::as_str), Some("api"));
    }

    #[tokio::test]
    async fn service_without_selector_is_empty() {
        let mut server = Server::new_async().await;
        let _service = server
            .mock("GET", "/api/v1/namespaces/edge/services/ingress")
            .with_status(200)
            .with_body(json!({"spec": {"type": "ExternalName"}}).to_string())
            .create_async()
            .await;

        let params = SearchParams::new().with_type("KubernetesService").with_id("edge/ingress").resolve();
        assert!(backend(&server).search(&params).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn names_are_encoded_as_single_path_segments() {
        let mut server = Server::new_async().await;
        let service = server
            .mock("GET", "/api/v1/namespaces/edge/services/in%23gress%2F..%2Fsecrets")
            .with_status(200)
            .with_body(json!({"spec": {}}).to_string())
            .create_async()
            .await;

        let params = SearchParams::new()
            .with_type("KubernetesService")
            .with_id("edge/in#gress/../secrets")
            .resolve();
        assert!(backend(&server).search(&params).await.unwrap().is_empty());
        service.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_type_makes_no_requests() {
        let mut server = Server::new_async().await;
        let never = server.mock("GET", Matcher::Any).expect(0).create_async().await;

        let params = SearchParams::new().with_type("Elastic").resolve();
        assert!(backend(&server).search(&params).await.unwrap().is_empty());
        never.assert_async().await;
    }

    #[tokio::test]
    async fn failed_container_is_skipped() {
        let mut server = Server::new_async().await;
        let _list = server
            .mock("GET", "/api/v1/namespaces/prod/pods")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(pod_list(vec![pod("web-1", "prod", "node-a", &["app", "sidecar"], &[])]))
            .create_async()
            .await;
        let _app = mock_logs(&mut server, "prod", "web-1", "app", "ok\n").await;
        let _sidecar = server
            .mock("GET", "/api/v1/namespaces/prod/pods/web-1/log")
            .match_query(Matcher::UrlEncoded("container".into(), "sidecar".into()))
            .with_status(500)
            .create_async()
            .await;

        let params = SearchParams::new().with_type("KubernetesPod").with_id("prod/web-1").resolve();
        let results = backend(&server).search(&params).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results.results[0].message, "ok");
    }

    #[tokio::test]
    async fn results_are_capped_at_limit() {
        let mut server = Server::new_async().await;
        let _list = server
            .mock("GET", "/api/v1/namespaces/prod/pods")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(pod_list(vec![pod("web-1", "prod", "node-a", &["app"], &[])]))
            .create_async()
            .await;
        let _app = mock_logs(&mut server, "prod", "web-1", "app", "1\n2\n3\n4\n").await;

        let params = SearchParams::new()
            .with_type("KubernetesPod")
            .with_id("prod/web-1")
            .with_limit(2)
            .resolve();
        let results = backend(&server).search(&params).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results.total, 4);
    }

    #[tokio::test]
    async fn list_failure_is_backend_error() {
        let mut server = Server::new_async().await;
        let _list = server
            .mock("GET", "/api/v1/namespaces/prod/pods")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let params = SearchParams::new().with_type("KubernetesPod").with_id("prod/web-1").resolve();
        let err = backend(&server).search(&params).await.unwrap_err();
        assert!(matches!(err, BackendError::Response(_)));
    }

    // ===================================================================
    // Construction
    // ===================================================================

    #[test]
    fn strategy_by_type_substring() {
        assert_eq!(Strategy::from_type("KubernetesPod"), Some(Strategy::Pod));
        assert_eq!(Strategy::from_type("kubernetesnode"), Some(Strategy::Node));
        assert_eq!(Strategy::from_type("MyKubernetesDeployment"), Some(Strategy::Deployment));
        assert_eq!(Strategy::from_type("KubernetesService"), Some(Strategy::Service));
        assert_eq!(Strategy::from_type("Kubernetes"), None);
    }

    #[test]
    fn in_cluster_environment() {
        let config = KubernetesConfig::default();
        let backend = KubernetesBackend::with_env(config, 0, |key| match key {
            "KUBERNETES_SERVICE_HOST" => Some("10.96.0.1".to_string()),
            "KUBERNETES_SERVICE_PORT" => Some("443".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(backend.api_server(), "https://10.96.0.1");
    }

    #[test]
    fn in_cluster_ipv6_host() {
        let url = in_cluster_url(&|key: &str| match key {
            "KUBERNETES_SERVICE_HOST" => Some("fd00::1".to_string()),
            "KUBERNETES_SERVICE_PORT" => Some("6443".to_string()),
            _ => None,
        });
        assert_eq!(url.as_deref(), Some("https://[fd00::1]:6443"));
    }

    #[test]
    fn missing_api_server() {
        let err = KubernetesBackend::with_env(KubernetesConfig::default(), 0, |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "apiServer", .. }));
    }

    #[test]
    fn token_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"from-file\n").unwrap();

        let config = KubernetesConfig {
            api_server: Some("https://k8s.local:6443".to_string()),
            token_file: Some(file.path().to_path_buf()),
            ..KubernetesConfig::default()
        };
        let backend = KubernetesBackend::with_env(config, 2, |_| None).unwrap();
        assert_eq!(backend.token.as_deref(), Some("from-file"));
        assert_eq!(backend.name(), "kubernetes-2");

        let config = KubernetesConfig {
            api_server: Some("https://k8s.local:6443".to_string()),
            token_file: Some(PathBuf::from("/nonexistent/token")),
            ..KubernetesConfig::default()
        };
        let err = KubernetesBackend::with_env(config, 0, |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "tokenFile", .. }));
    }

    #[test]
    fn selector_is_comma_joined() {
        let labels: Labels = [("app", "web"), ("tier", "front")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(selector_string(&labels), "app=web,tier=front");
    }
}
