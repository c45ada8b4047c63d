use tracing_subscriber::EnvFilter;

/// Default filter of `--debug`. wgpu internals stay at warn so stage logs remain readable.
const DEBUG_FILTER: &str = "debug,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Installs the global subscriber and bridges `log` records (wgpu, naga and
/// our own `log::` calls) into it. Later calls are ignored.
pub fn init_tracing(enable_debug: bool) {
    let _ = tracing_log::LogTracer::init();

    // Explicit debug flag wins, otherwise RUST_LOG, otherwise warn
    let env_filter = if enable_debug {
        EnvFilter::new(DEBUG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_names(true)
        .finish();

    // `try_init` would register a second LogTracer and fail, so set the default directly.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_tracing(false);
        init_tracing(true);
        tracing::debug!("still alive");
    }
}
