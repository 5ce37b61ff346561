//! # Kubeconfig Credentials
//!
//! Extracts the connection details Argo CD needs from a workload cluster's
//! admin kubeconfig.

use crate::controller::capability::CapabilityError;
use kube::config::Kubeconfig;
use secrecy::ExposeSecret;

/// Server address and client certificate credentials of one cluster
///
/// Certificate and key data stay base64-encoded as found in the kubeconfig.
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterCredentials {
    pub server: String,
    pub ca_data: String,
    pub cert_data: String,
    pub key_data: String,
}

impl std::fmt::Debug for ClusterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCredentials")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

/// Name of the user entry holding the cluster's admin credentials
#[must_use]
pub fn admin_user(cluster_name: &str) -> String {
    format!("{cluster_name}-admin")
}

impl ClusterCredentials {
    /// Read the credentials of `cluster_name` from a kubeconfig document
    ///
    /// The cluster entry must be named `cluster_name` and the user entry
    /// `<cluster_name>-admin`.
    pub fn from_kubeconfig(raw: &[u8], cluster_name: &str) -> Result<Self, CapabilityError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| CapabilityError::Other(format!("kubeconfig is not valid UTF-8: {e}")))?;
        let kubeconfig = Kubeconfig::from_yaml(text)
            .map_err(|e| CapabilityError::Other(format!("failed to read kubeconfig data: {e}")))?;

        let cluster = kubeconfig
            .clusters
            .iter()
            .find(|c| c.name == cluster_name)
            .and_then(|c| c.cluster.as_ref())
            .ok_or_else(|| {
                CapabilityError::Other(format!("cluster {cluster_name} not found in kubeconfig"))
            })?;

        let user_name = admin_user(cluster_name);
        let auth_info = kubeconfig
            .auth_infos
            .iter()
            .find(|a| a.name == user_name)
            .and_then(|a| a.auth_info.as_ref())
            .ok_or_else(|| {
                CapabilityError::Other(format!("user {user_name} not found in kubeconfig"))
            })?;

        let server = cluster.server.clone().ok_or_else(|| {
            CapabilityError::Other(format!("cluster {cluster_name} has no server address"))
        })?;

        Ok(Self {
            server,
            ca_data: cluster.certificate_authority_data.clone().unwrap_or_default(),
            cert_data: auth_info.client_certificate_data.clone().unwrap_or_default(),
            key_data: auth_info
                .client_key_data
                .as_ref()
                .map(|key| key.expose_secret().to_string())
                .unwrap_or_default(),
        })
    }
}
