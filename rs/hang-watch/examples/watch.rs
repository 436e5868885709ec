// cargo run --example watch -- https://relay.example/room/demo
//
// Connects to a relay, watches a broadcast, and logs published frames.
// Rendering and audio output are up to the embedder; this example just
// drives the pipeline.

// The example compiles against the FFmpeg decoders when the `decode`
// feature is enabled; there is no playback without a platform decoder.
#[cfg(feature = "decode")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
	use std::time::Duration;

	use hang_watch::{decode, Watch};

	watch_native::Log::new(tracing::Level::DEBUG).init();

	let url = std::env::args().nth(1).unwrap_or_else(|| {
		// The "anon" path is usually configured to bypass authentication; be careful!
		"https://cdn.moq.dev/anon/video-example".to_string()
	});
	let url = url::Url::parse(&url)?;

	// Establish the QUIC connection and MoQ handshake.
	let client = watch_native::ClientConfig::default().init()?;
	let session = client.connect(url).await?;

	// Watch the broadcast at the session root.
	let watch = Watch::new::<decode::FfmpegVideo, decode::FfmpegAudio>(session, hang_watch::moq_sub::Path::default());
	watch.set_latency(Duration::from_millis(200));

	let mut status = watch.status();
	let mut frames = watch.video_frame();

	loop {
		tokio::select! {
			res = status.changed() => {
				res?;
				tracing::info!(status = ?*status.borrow(), "status changed");
			}
			res = frames.changed() => {
				res?;
				if let Some(frame) = frames.borrow().as_ref() {
					tracing::info!(
						timestamp = %frame.timestamp,
						width = frame.width,
						height = frame.height,
						"frame published"
					);
				}
			}
		}
	}
}

#[cfg(not(feature = "decode"))]
fn main() {
	eprintln!("this example requires the `decode` feature: cargo run --example watch --features decode");
}
