//! `$ready` and `$stats` notifications.

use std::net::SocketAddr;

use serde_json::json;

use crate::allocator::AllocStats;
use crate::error::Result;
use crate::protocol::PROTOCOL_VERSION;
use crate::server::ServerConfig;

/// Method name of the startup notification.
pub const READY_METHOD: &str = "$ready";

/// Method name of the shutdown notification.
pub const STATS_METHOD: &str = "$stats";

/// Build the `$ready` line.
///
/// Format:
/// ```json
/// {
///   "jsonrpc": "2.0",
///   "method": "$ready",
///   "params": {
///     "address": "127.0.0.1:9999",
///     "protocolVersion": 1,
///     "maxPayload": 16777216,
///     "maxHandles": 1024
///   }
/// }
/// ```
pub fn build_ready_message(address: SocketAddr, config: &ServerConfig) -> Result<String> {
    let msg = json!({
        "jsonrpc": "2.0",
        "method": READY_METHOD,
        "params": {
            "address": address.to_string(),
            "protocolVersion": PROTOCOL_VERSION,
            "maxPayload": config.max_payload_size,
            "maxHandles": config.max_handles,
        }
    });
    Ok(serde_json::to_string(&msg)?)
}

/// Build the `$stats` line from final allocator counters.
pub fn build_stats_message(stats: &AllocStats) -> Result<String> {
    let msg = json!({
        "jsonrpc": "2.0",
        "method": STATS_METHOD,
        "params": stats,
    });
    Ok(serde_json::to_string(&msg)?)
}
