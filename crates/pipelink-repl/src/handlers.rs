//! Built-in RPC handlers exposed to the host application

use pipelink_rpc::{DispatchTable, DispatchTableBuilder};
use serde_json::json;

/// The dispatch table served by this process.
pub fn dispatch_table() -> DispatchTable {
    register_builtin(DispatchTable::builder()).build()
}

/// Registers the built-in methods on an existing builder, so embedders
/// can add their own handlers alongside them.
pub fn register_builtin(builder: DispatchTableBuilder) -> DispatchTableBuilder {
    builder
        .register("get_version", |_params| async {
            Ok(json!(env!("CARGO_PKG_VERSION")))
        })
        .register("get_system_info", |_params| async {
            Ok(json!({
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
                "family": std::env::consts::FAMILY,
                "version": env!("CARGO_PKG_VERSION"),
            }))
        })
}
