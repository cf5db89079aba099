//! Flow-Host Integration
//!
//! The connection core never inspects the host's flow graph itself; hosts
//! inject a [`FlowLookup`] capability instead. The release helper decides
//! whether a departing device node may tear down its shared uplink or must
//! leave it open for siblings still wired to the same device.

use async_trait::async_trait;
use tracing::debug;

use crate::registry::ConnectionRegistry;


/// Flow-graph queries a host adapter provides.
#[async_trait]
pub trait FlowLookup: Send + Sync {
    /// Id of the nearest downstream node of `node_type` wired after
    /// `node_id`, if any.
    async fn downstream_node_of_type(&self, node_id: &str, node_type: &str) -> Option<String>;

    /// Ids of nodes of `node_type` still wired to the same uplink and
    /// holding the same device identity.
    async fn leftover_nodes(
        &self,
        node_type: &str,
        client_id: &str,
        uplink_node_id: &str,
    ) -> Vec<String>;
}

/// Release a departing device node's hold on its shared uplink.
///
/// While similar nodes remain wired to the uplink for the same device, the
/// connection stays open. Returns true when the hold was released.
pub async fn release_shared_link(
    lookup: &dyn FlowLookup,
    registry: &ConnectionRegistry,
    node_type: &str,
    client_id: &str,
    uplink_node_id: &str,
) -> bool {
    let leftover = lookup
        .leftover_nodes(node_type, client_id, uplink_node_id)
        .await;

    if !leftover.is_empty() {
        debug!(
            client_id,
            leftover = leftover.len(),
            "similar nodes still wired, keeping connection open"
        );
        return false;
    }

    debug!(client_id, "no similar nodes left, releasing connection");
    registry.disconnect_from_output_node(uplink_node_id, client_id);
    true
}
