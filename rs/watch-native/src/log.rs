use tracing_subscriber::EnvFilter;

/// Configure a global tracing subscriber for binaries and examples.
pub struct Log {
	pub level: tracing::Level,
}

impl Log {
	pub fn new(level: tracing::Level) -> Self {
		Self { level }
	}

	pub fn init(self) {
		let filter = EnvFilter::builder()
			.with_default_directive(tracing::level_filters::LevelFilter::from_level(self.level).into())
			.from_env_lossy();

		tracing_subscriber::fmt().with_env_filter(filter).init();
	}
}

impl Default for Log {
	fn default() -> Self {
		Self {
			level: tracing::Level::INFO,
		}
	}
}
