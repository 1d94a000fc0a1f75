//! Generic CRUD/list/watch/patch handlers over [`crate::view::View`], shared by both
//! the Node (cluster-scoped) and Pod (namespaced) route tables (spec.md §4.5).

use std::pin::Pin;

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::state::AppState;
use crate::api::status::error_response;
use crate::core::common::KubeObject;
use crate::core::node::Node;
use crate::core::patch::PatchKind;
use crate::core::pod::{Binding, Pod};
use crate::core::selector::LabelSelector;
use crate::core::store::{MatchCriteria, WatchEvent};
use crate::errors::{ApiError, StoreError};
use crate::view::View;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub watch: Option<String>,
    #[serde(rename = "labelSelector", default)]
    pub label_selector: Option<String>,
    #[serde(rename = "resourceVersion", default)]
    pub resource_version: Option<i64>,
}

impl ListQuery {
    fn is_watch(&self) -> bool {
        matches!(self.watch.as_deref(), Some("true") | Some("1"))
    }

    fn selector(&self) -> Result<LabelSelector, ApiError> {
        match &self.label_selector {
            Some(raw) => LabelSelector::parse(raw).map_err(ApiError::Store),
            None => Ok(LabelSelector::everything()),
        }
    }
}

fn watch_event_kind(kind: crate::core::store::WatchEventKind) -> &'static str {
    use crate::core::store::WatchEventKind::*;
    match kind {
        Added => "ADDED",
        Modified => "MODIFIED",
        Deleted => "DELETED",
    }
}

/// Frames one watch event as the chunked-response line format spec.md §4.5 mandates:
/// `{"type":"ADDED|MODIFIED|DELETED","object":...}\n`.
fn frame_watch_event<T: Serialize>(event: WatchEvent<T>) -> Bytes {
    let line = serde_json::json!({"type": watch_event_kind(event.kind), "object": event.object});
    let mut buf = serde_json::to_vec(&line).unwrap_or_default();
    buf.push(b'\n');
    Bytes::from(buf)
}

fn streaming_response<T>(stream: Pin<Box<dyn Stream<Item = Result<WatchEvent<T>, StoreError>> + Send>>) -> HttpResponse
where
    T: Serialize + Send + 'static,
{
    let body = stream.map(|item| match item {
        Ok(event) => Ok(frame_watch_event(event)),
        Err(e) => Err(actix_web::error::ErrorGone(e.to_string())),
    });
    HttpResponse::Ok()
        .content_type("application/json")
        .insert_header(("Transfer-Encoding", "chunked"))
        .streaming(body)
}

fn resolve(state: &AppState, view: &str) -> Result<std::sync::Arc<dyn View>, ApiError> {
    state.resolve(view)
}

fn path_view(req: &HttpRequest) -> String {
    req.match_info().get("view").unwrap_or_default().to_string()
}

// ---- Nodes (cluster-scoped) ----

pub async fn create_node(req: HttpRequest, state: web::Data<AppState>, body: web::Json<Node>) -> HttpResponse {
    let handle = || -> Result<Node, ApiError> {
        let view = resolve(&state, &path_view(&req))?;
        Ok(view.store_node(body.into_inner())?)
    };
    match handle() {
        Ok(node) => HttpResponse::Created().json(node),
        Err(e) => error_response(e),
    }
}

pub async fn list_or_watch_nodes(req: HttpRequest, state: web::Data<AppState>, query: web::Query<ListQuery>) -> HttpResponse {
    let view = match resolve(&state, &path_view(&req)) {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };
    let selector = match query.selector() {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };
    if query.is_watch() {
        let stream = view.watch_nodes(query.resource_version.unwrap_or(0), selector, state.watch_timeout);
        return streaming_response(stream);
    }
    match view.list_nodes() {
        Ok((nodes, rv)) => {
            let filtered: Vec<&Node> = nodes.iter().filter(|n| selector.matches(n.labels())).collect();
            HttpResponse::Ok().json(serde_json::json!({"items": filtered, "resourceVersion": rv}))
        }
        Err(e) => error_response(e.into()),
    }
}

pub async fn get_node(req: HttpRequest, state: web::Data<AppState>, name: web::Path<String>) -> HttpResponse {
    let handle = || -> Result<Node, ApiError> {
        let view = resolve(&state, &path_view(&req))?;
        Ok(view.get_node(&name)?)
    };
    match handle() {
        Ok(n) => HttpResponse::Ok().json(n),
        Err(e) => error_response(e),
    }
}

pub async fn update_node(req: HttpRequest, state: web::Data<AppState>, body: web::Json<Node>) -> HttpResponse {
    let handle = || -> Result<Node, ApiError> {
        let view = resolve(&state, &path_view(&req))?;
        Ok(view.update_node(body.into_inner())?)
    };
    match handle() {
        Ok(n) => HttpResponse::Ok().json(n),
        Err(e) => error_response(e),
    }
}

pub async fn delete_node(req: HttpRequest, state: web::Data<AppState>, name: web::Path<String>) -> HttpResponse {
    let handle = || -> Result<Node, ApiError> {
        let view = resolve(&state, &path_view(&req))?;
        Ok(view.delete_node(&name)?)
    };
    match handle() {
        Ok(n) => HttpResponse::Ok().json(n),
        Err(e) => error_response(e),
    }
}

async fn do_patch_node(req: HttpRequest, state: web::Data<AppState>, name: &str, status_only: bool, body: web::Bytes) -> HttpResponse {
    let handle = || -> Result<Node, ApiError> {
        let content_type = req.headers().get("content-type").and_then(|v| v.to_str().ok()).unwrap_or_default();
        let kind = PatchKind::from_content_type(content_type)?;
        let patch: Value = serde_json::from_slice(&body).map_err(|e| ApiError::PatchParse(e.to_string()))?;
        let view = resolve(&state, &path_view(&req))?;
        Ok(view.patch_node(name, kind, &patch, status_only)?)
    };
    match handle() {
        Ok(n) => HttpResponse::Ok().json(n),
        Err(e) => error_response(e),
    }
}

pub async fn patch_node(req: HttpRequest, state: web::Data<AppState>, name: web::Path<String>, body: web::Bytes) -> HttpResponse {
    do_patch_node(req.clone(), state, &name, false, body).await
}

pub async fn patch_node_status(req: HttpRequest, state: web::Data<AppState>, name: web::Path<String>, body: web::Bytes) -> HttpResponse {
    do_patch_node(req.clone(), state, &name, true, body).await
}

// ---- Pods (namespaced) ----

pub async fn create_pod(req: HttpRequest, state: web::Data<AppState>, ns: web::Path<String>, body: web::Json<Pod>) -> HttpResponse {
    let handle = || -> Result<Pod, ApiError> {
        let view = resolve(&state, &path_view(&req))?;
        let mut pod = body.into_inner();
        pod.metadata.namespace = ns.into_inner();
        Ok(view.store_pod(pod)?)
    };
    match handle() {
        Ok(p) => HttpResponse::Created().json(p),
        Err(e) => error_response(e),
    }
}

pub async fn list_or_watch_pods(req: HttpRequest, state: web::Data<AppState>, ns: web::Path<String>, query: web::Query<ListQuery>) -> HttpResponse {
    let view = match resolve(&state, &path_view(&req)) {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };
    let selector = match query.selector() {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };
    let namespace = ns.into_inner();
    if query.is_watch() {
        let stream = view.watch_pods(query.resource_version.unwrap_or(0), Some(namespace), selector, state.watch_timeout);
        return streaming_response(stream);
    }
    match view.list_pods(Some(&namespace)) {
        Ok((pods, rv)) => {
            let filtered: Vec<&Pod> = pods.iter().filter(|p| selector.matches(p.labels())).collect();
            HttpResponse::Ok().json(serde_json::json!({"items": filtered, "resourceVersion": rv}))
        }
        Err(e) => error_response(e.into()),
    }
}

pub async fn get_pod(req: HttpRequest, state: web::Data<AppState>, path: web::Path<(String, String)>) -> HttpResponse {
    let (ns, name) = path.into_inner();
    let handle = || -> Result<Pod, ApiError> {
        let view = resolve(&state, &path_view(&req))?;
        Ok(view.get_pod(&ns, &name)?)
    };
    match handle() {
        Ok(p) => HttpResponse::Ok().json(p),
        Err(e) => error_response(e),
    }
}

pub async fn update_pod(req: HttpRequest, state: web::Data<AppState>, path: web::Path<(String, String)>, body: web::Json<Pod>) -> HttpResponse {
    let (ns, _name) = path.into_inner();
    let handle = || -> Result<Pod, ApiError> {
        let view = resolve(&state, &path_view(&req))?;
        let mut pod = body.into_inner();
        pod.metadata.namespace = ns;
        Ok(view.update_pod(pod)?)
    };
    match handle() {
        Ok(p) => HttpResponse::Ok().json(p),
        Err(e) => error_response(e),
    }
}

pub async fn delete_pod(req: HttpRequest, state: web::Data<AppState>, path: web::Path<(String, String)>) -> HttpResponse {
    let (ns, name) = path.into_inner();
    let handle = || -> Result<Pod, ApiError> {
        let view = resolve(&state, &path_view(&req))?;
        Ok(view.delete_pod(&ns, &name)?)
    };
    match handle() {
        Ok(p) => HttpResponse::Ok().json(p),
        Err(e) => error_response(e),
    }
}

async fn do_patch_pod(req: HttpRequest, state: web::Data<AppState>, ns: &str, name: &str, status_only: bool, body: web::Bytes) -> HttpResponse {
    let handle = || -> Result<Pod, ApiError> {
        let content_type = req.headers().get("content-type").and_then(|v| v.to_str().ok()).unwrap_or_default();
        let kind = PatchKind::from_content_type(content_type)?;
        let patch: Value = serde_json::from_slice(&body).map_err(|e| ApiError::PatchParse(e.to_string()))?;
        let view = resolve(&state, &path_view(&req))?;
        Ok(view.patch_pod(ns, name, kind, &patch, status_only)?)
    };
    match handle() {
        Ok(p) => HttpResponse::Ok().json(p),
        Err(e) => error_response(e),
    }
}

pub async fn patch_pod(req: HttpRequest, state: web::Data<AppState>, path: web::Path<(String, String)>, body: web::Bytes) -> HttpResponse {
    let (ns, name) = path.into_inner();
    do_patch_pod(req.clone(), state, &ns, &name, false, body).await
}

pub async fn patch_pod_status(req: HttpRequest, state: web::Data<AppState>, path: web::Path<(String, String)>, body: web::Bytes) -> HttpResponse {
    let (ns, name) = path.into_inner();
    do_patch_pod(req.clone(), state, &ns, &name, true, body).await
}

/// `POST .../pods/{name}/binding` (spec.md §4.5): sets the pod's node binding.
pub async fn create_binding(req: HttpRequest, state: web::Data<AppState>, path: web::Path<(String, String)>, body: web::Json<Binding>) -> HttpResponse {
    let (ns, name) = path.into_inner();
    let handle = || -> Result<Pod, ApiError> {
        let view = resolve(&state, &path_view(&req))?;
        Ok(view.update_pod_node_binding(&ns, &name, &body.target.name)?)
    };
    match handle() {
        Ok(p) => HttpResponse::Created().json(p),
        Err(e) => error_response(e),
    }
}

pub async fn delete_nodes_by_criteria(req: HttpRequest, state: web::Data<AppState>, query: web::Query<ListQuery>) -> HttpResponse {
    let selector = match query.selector() {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };
    let handle = || -> Result<Vec<Node>, ApiError> {
        let view = resolve(&state, &path_view(&req))?;
        Ok(view.delete_nodes(&MatchCriteria {
            namespace: None,
            names: None,
            label_selector: selector,
        })?)
    };
    match handle() {
        Ok(deleted) => HttpResponse::Ok().json(deleted),
        Err(e) => error_response(e),
    }
}

pub async fn delete_pods_by_criteria(req: HttpRequest, state: web::Data<AppState>, ns: web::Path<String>, query: web::Query<ListQuery>) -> HttpResponse {
    let selector = match query.selector() {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };
    let handle = || -> Result<Vec<Pod>, ApiError> {
        let view = resolve(&state, &path_view(&req))?;
        Ok(view.delete_pods(&MatchCriteria {
            namespace: Some(ns.into_inner()),
            names: None,
            label_selector: selector,
        })?)
    };
    match handle() {
        Ok(deleted) => HttpResponse::Ok().json(deleted),
        Err(e) => error_response(e),
    }
}

// ---- Discovery (spec.md §4.5) ----

pub async fn api_versions() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"kind": "APIVersions", "versions": ["v1"]}))
}

pub async fn api_group_list() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"kind": "APIGroupList", "groups": []}))
}

pub async fn core_resource_list() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "kind": "APIResourceList",
        "groupVersion": "v1",
        "resources": [
            {"name": "nodes", "namespaced": false, "kind": "Node"},
            {"name": "pods", "namespaced": true, "kind": "Pod"},
        ],
    }))
}

pub async fn grouped_resource_list(group: web::Path<String>) -> HttpResponse {
    let status = crate::api::status::Status {
        status: "Failure",
        reason: "NotFound",
        message: format!("no such API group: {}", group.into_inner()),
        code: 404,
    };
    HttpResponse::build(StatusCode::NOT_FOUND).json(status)
}
