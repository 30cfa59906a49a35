//! Cross-crate tests for the RPC client running over the in-process broker.


#[cfg(test)]
mod rpc_e2e;


#[cfg(test)]
pub(crate) fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
