use tracing_subscriber::{fmt, EnvFilter};

pub struct TestTracing {
    _guard: tracing::subscriber::DefaultGuard,
}

impl TestTracing {
    pub fn init() -> Self {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("brrtscatter=debug"));
        let subscriber = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        Self { _guard: guard }
    }
}
