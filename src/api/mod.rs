//! API Surface (C5): HTTP routing over views (spec.md §4.5), implemented with
//! `actix-web`, the pack's precedent for serving HTTP (`workflow-engine-rs`'s
//! `workflow-engine-api` crate).

pub mod advice;
pub mod handlers;
pub mod state;
pub mod status;

use actix_web::web;

pub use state::AppState;

/// Mounts one `{view}/api/v1/...` route table plus the top-level discovery
/// endpoints. `{view}` is a path segment resolved against [`AppState`] at request
/// time — this is the "strip-prefix routing" spec.md §4.5 requires for the base view
/// and every mounted sandbox to be reachable under their own prefix from one server.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/{view}")
            .route("/api", web::get().to(handlers::api_versions))
            .route("/apis", web::get().to(handlers::api_group_list))
            .route("/apis/{group}/", web::get().to(handlers::grouped_resource_list))
            .route("/api/v1/", web::get().to(handlers::core_resource_list))
            .route("/api/v1/nodes", web::post().to(handlers::create_node))
            .route("/api/v1/nodes", web::get().to(handlers::list_or_watch_nodes))
            .route("/api/v1/nodes", web::delete().to(handlers::delete_nodes_by_criteria))
            .route("/api/v1/nodes/{name}", web::get().to(handlers::get_node))
            .route("/api/v1/nodes/{name}", web::put().to(handlers::update_node))
            .route("/api/v1/nodes/{name}", web::patch().to(handlers::patch_node))
            .route("/api/v1/nodes/{name}", web::delete().to(handlers::delete_node))
            .route("/api/v1/nodes/{name}/status", web::patch().to(handlers::patch_node_status))
            .route("/api/v1/namespaces/{ns}/pods", web::post().to(handlers::create_pod))
            .route("/api/v1/namespaces/{ns}/pods", web::get().to(handlers::list_or_watch_pods))
            .route("/api/v1/namespaces/{ns}/pods", web::delete().to(handlers::delete_pods_by_criteria))
            .route("/api/v1/namespaces/{ns}/pods/{name}", web::get().to(handlers::get_pod))
            .route("/api/v1/namespaces/{ns}/pods/{name}", web::put().to(handlers::update_pod))
            .route("/api/v1/namespaces/{ns}/pods/{name}", web::patch().to(handlers::patch_pod))
            .route("/api/v1/namespaces/{ns}/pods/{name}", web::delete().to(handlers::delete_pod))
            .route("/api/v1/namespaces/{ns}/pods/{name}/status", web::patch().to(handlers::patch_pod_status))
            .route("/api/v1/namespaces/{ns}/pods/{name}/binding", web::post().to(handlers::create_binding))
            .route("/scaling-advice", web::post().to(advice::generate_scaling_advice)),
    );
}
