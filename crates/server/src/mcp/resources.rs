//! Read-only MCP resources

use serde::Serialize;

pub const CLUSTER_INFO_URI: &str = "k8s://cluster/info";
pub const CONTEXTS_URI: &str = "k8s://contexts";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePath {
    ClusterInfo,
    Contexts,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceInfo {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "mimeType")]
    pub mime_type: &'static str,
}

pub fn list_available_resources() -> Vec<ResourceInfo> {
    vec![
        ResourceInfo {
            uri: CLUSTER_INFO_URI,
            name: "Cluster info",
            description: "Control plane and core service endpoints of the active cluster",
            mime_type: "text/plain",
        },
        ResourceInfo {
            uri: CONTEXTS_URI,
            name: "Contexts",
            description: "Contexts of the loaded kubeconfig, with the active one marked",
            mime_type: "application/json",
        },
    ]
}

pub fn parse_resource_uri(uri: &str) -> Option<ResourcePath> {
    match uri.trim_end_matches('/') {
        CLUSTER_INFO_URI => Some(ResourcePath::ClusterInfo),
        CONTEXTS_URI => Some(ResourcePath::Contexts),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resource_uri() {
        assert_eq!(parse_resource_uri("k8s://cluster/info"), Some(ResourcePath::ClusterInfo));
        assert_eq!(parse_resource_uri("k8s://contexts/"), Some(ResourcePath::Contexts));
        assert_eq!(parse_resource_uri("k8s://pods"), None);
    }

    #[test]
    fn test_every_listed_resource_parses() {
        for resource in list_available_resources() {
            assert!(parse_resource_uri(resource.uri).is_some());
        }
    }
}
