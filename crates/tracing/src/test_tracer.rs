use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::Tracer;

/// Filter used when `RUST_LOG` is unset: sync coordination at debug, everything else quiet.
const DEFAULT_TEST_DIRECTIVES: &str = "warn,net::arb=debug";

/// Tracer for unit and integration tests.
///
/// Output goes to the test writer, so it only shows for failing tests. `RUST_LOG` replaces the
/// default filter. Installing it more than once is a no-op.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct TestTracer;

impl Tracer for TestTracer {
    fn init(self) -> eyre::Result<Option<WorkerGuard>> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_DIRECTIVES));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
        Ok(None)
    }
}
