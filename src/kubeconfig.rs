//! Generated kubeconfig documents (spec.md §6 "Generated files"): one per mounted
//! view, pointing at that view's HTTP endpoint under its own path prefix.

use serde::Serialize;

#[derive(Debug, Serialize)]
struct ClusterEntry {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Serialize)]
struct Cluster {
    server: String,
}

#[derive(Debug, Serialize)]
struct ContextEntry {
    name: String,
    context: Context,
}

#[derive(Debug, Serialize)]
struct Context {
    cluster: String,
    user: String,
}

#[derive(Debug, Serialize)]
struct UserEntry {
    name: String,
    user: serde_yaml::Value,
}

/// A minimal kubeconfig document: `clusters`/`contexts`/`users`, `current-context`
/// set to the view being generated for (spec.md §4.5 "A kubeconfig-style
/// configuration file is generated per view with the view-specific URL").
#[derive(Debug, Serialize)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    api_version: String,
    kind: String,
    clusters: Vec<ClusterEntry>,
    contexts: Vec<ContextEntry>,
    users: Vec<UserEntry>,
    #[serde(rename = "current-context")]
    current_context: String,
}

impl Kubeconfig {
    /// `base_url` is the server's external address (e.g. `http://127.0.0.1:8080`);
    /// `view_prefix` is the path segment the view is mounted under.
    pub fn for_view(base_url: &str, view_prefix: &str) -> Self {
        let name = view_prefix.to_string();
        let server = format!("{}/{}", base_url.trim_end_matches('/'), view_prefix);
        Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: vec![ClusterEntry {
                name: name.clone(),
                cluster: Cluster { server },
            }],
            contexts: vec![ContextEntry {
                name: name.clone(),
                context: Context {
                    cluster: name.clone(),
                    user: name.clone(),
                },
            }],
            users: vec![UserEntry {
                name: name.clone(),
                user: serde_yaml::Value::Mapping(Default::default()),
            }],
            current_context: name,
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn write_to(&self, path: &str) -> std::io::Result<()> {
        std::fs::write(path, self.to_yaml().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_view_points_server_at_the_view_prefix() {
        let kc = Kubeconfig::for_view("http://127.0.0.1:8080", "cluster");
        assert_eq!(kc.clusters[0].cluster.server, "http://127.0.0.1:8080/cluster");
        assert_eq!(kc.current_context, "cluster");
    }

    #[test]
    fn serializes_to_yaml() {
        let kc = Kubeconfig::for_view("http://127.0.0.1:8080", "sandbox-1");
        let yaml = kc.to_yaml().unwrap();
        assert!(yaml.contains("current-context: sandbox-1"));
    }
}
