use std::{net, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use url::Url;

/// TLS configuration for the client.
#[derive(Clone, Default, Debug, clap::Args, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ClientTls {
	/// Use the TLS root at this path, encoded as PEM.
	///
	/// This value can be provided multiple times for multiple roots.
	/// If this is empty, system roots will be used instead.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	#[arg(id = "tls-root", long = "tls-root", env = "WATCH_TLS_ROOT")]
	pub root: Vec<PathBuf>,

	/// Danger: Disable TLS certificate verification.
	///
	/// Implied by `http://` URLs; fine for local development only.
	#[serde(skip_serializing_if = "std::ops::Not::not")]
	#[arg(id = "tls-disable-verify", long = "tls-disable-verify", env = "WATCH_TLS_DISABLE_VERIFY")]
	pub disable_verify: bool,
}

/// Configuration for the viewer's QUIC client.
#[derive(Clone, Debug, clap::Parser, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	/// Listen for UDP packets on the given address.
	#[arg(id = "client-bind", long = "client-bind", default_value = "[::]:0", env = "WATCH_BIND")]
	pub bind: net::SocketAddr,

	/// Abort connection attempts after this many seconds.
	#[arg(id = "client-timeout", long = "client-timeout", default_value = "10", env = "WATCH_TIMEOUT")]
	pub timeout: u64,

	#[command(flatten)]
	#[serde(default)]
	pub tls: ClientTls,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			bind: "[::]:0".parse().unwrap(),
			timeout: 10,
			tls: ClientTls::default(),
		}
	}
}

impl ClientConfig {
	pub fn init(self) -> anyhow::Result<Client> {
		Client::new(self)
	}
}

/// Dials WebTransport sessions and performs the MoQ handshake.
#[derive(Clone)]
pub struct Client {
	quic: quinn::Endpoint,
	transport: Arc<quinn::TransportConfig>,
	tls: rustls::ClientConfig,
	timeout: Duration,
}

impl Client {
	pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
		let socket = std::net::UdpSocket::bind(config.bind).context("failed to bind UDP socket")?;

		let mut transport = quinn::TransportConfig::default();
		transport.max_idle_timeout(Some(Duration::from_secs(10).try_into().unwrap()));
		transport.keep_alive_interval(Some(Duration::from_secs(4)));
		transport.mtu_discovery_config(None); // Disable MTU discovery
		let transport = Arc::new(transport);

		let runtime = quinn::default_runtime().context("no async runtime")?;
		let quic = quinn::Endpoint::new(quinn::EndpointConfig::default(), None, socket, runtime)
			.context("failed to create QUIC endpoint")?;

		let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

		// Create a list of acceptable root certificates.
		let mut roots = rustls::RootCertStore::empty();

		if config.tls.root.is_empty() {
			let native = rustls_native_certs::load_native_certs();

			for err in native.errors {
				tracing::warn!(%err, "failed to load root cert");
			}

			for cert in native.certs {
				roots.add(cert).context("failed to add root cert")?;
			}
		} else {
			for root in &config.tls.root {
				let root = std::fs::File::open(root).context("failed to open root cert file")?;
				let mut root = std::io::BufReader::new(root);

				let root = rustls_pemfile::certs(&mut root)
					.next()
					.context("no roots found")?
					.context("failed to read root cert")?;

				roots.add(root).context("failed to add root cert")?;
			}
		}

		let mut tls = rustls::ClientConfig::builder_with_provider(provider.clone())
			.with_protocol_versions(&[&rustls::version::TLS13])?
			.with_root_certificates(roots)
			.with_no_client_auth();

		if config.tls.disable_verify {
			tracing::warn!("TLS certificate verification is disabled; development only");
			let noop = NoCertificateVerification(provider);
			tls.dangerous().set_certificate_verifier(Arc::new(noop));
		}

		tls.alpn_protocols = vec![web_transport_quinn::ALPN.as_bytes().to_vec()];

		Ok(Self {
			quic,
			transport,
			tls,
			timeout: Duration::from_secs(config.timeout),
		})
	}

	/// Connect to a relay and perform the MoQ handshake.
	pub async fn connect(&self, url: Url) -> anyhow::Result<moq_sub::Session> {
		let session = tokio::time::timeout(self.timeout, self.connect_transport(url))
			.await
			.context("connection timed out")??;

		let session = moq_sub::Session::connect(session).await?;
		Ok(session)
	}

	async fn connect_transport(&self, url: Url) -> anyhow::Result<web_transport_quinn::Session> {
		let mut url = url;
		let mut tls = self.tls.clone();

		let host = url.host().context("invalid DNS name")?.to_string();
		let port = url.port().unwrap_or(443);

		// Look up the DNS entry.
		let ip = tokio::net::lookup_host((host.clone(), port))
			.await
			.context("failed DNS lookup")?
			.next()
			.context("no DNS entries")?;

		match url.scheme() {
			"https" => {}
			"http" => {
				// Development mode: no certificate validation.
				tracing::warn!("http URL; disabling certificate verification");

				let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
				let noop = NoCertificateVerification(provider);
				tls.dangerous().set_certificate_verifier(Arc::new(noop));

				url.set_scheme("https").expect("failed to set scheme");
			}
			scheme => anyhow::bail!("unsupported URL scheme: {}", scheme),
		}

		let tls: quinn::crypto::rustls::QuicClientConfig = tls.try_into()?;
		let mut config = quinn::ClientConfig::new(Arc::new(tls));
		config.transport_config(self.transport.clone());

		tracing::debug!(%url, %ip, "connecting");

		let connection = self.quic.connect_with(config, ip, &host)?.await?;

		// The path (and any jwt query parameter) rides along in the CONNECT.
		let request = web_transport_quinn::proto::ConnectRequest::new(url);
		let session = web_transport_quinn::Session::connect(connection, request).await?;

		Ok(session)
	}
}

#[derive(Debug)]
struct NoCertificateVerification(Arc<rustls::crypto::CryptoProvider>);

impl rustls::client::danger::ServerCertVerifier for NoCertificateVerification {
	fn verify_server_cert(
		&self,
		_end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		_server_name: &ServerName<'_>,
		_ocsp: &[u8],
		_now: UnixTime,
	) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
		Ok(rustls::client::danger::ServerCertVerified::assertion())
	}

	fn verify_tls12_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &rustls::DigitallySignedStruct,
	) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
	}

	fn verify_tls13_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &rustls::DigitallySignedStruct,
	) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
	}

	fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
		self.0.signature_verification_algorithms.supported_schemes()
	}
}
