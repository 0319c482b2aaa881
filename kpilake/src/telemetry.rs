use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: OnceCell<()> = OnceCell::new();

/// AWS SDK crates log every retry at info; keep them at warn unless `RUST_LOG` says otherwise.
const DEFAULT_FILTER: &str = "info,aws_config=warn,aws_smithy_runtime=warn";

/// Install the global fmt subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        fmt().with_env_filter(filter).with_target(false).init();
    });
}
