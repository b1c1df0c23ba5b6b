use tracing_subscriber::EnvFilter;
use transport::env;

/// Send the server's own diagnostics to stderr when `GLDB_LOG` is set
///
/// Leaves any subscriber the traced program installed in place.
pub fn init() {
    let Ok(directives) = std::env::var(env::LOG) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .with_writer(std::io::stderr)
        .try_init();
}
