//! # HTTPS End-to-End
//!
//! Runs the real listener on an ephemeral port with a self-signed
//! certificate and talks to it with a rustls-backed HTTP client.

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Arc;
    use std::time::Duration;

    use reseed_gateway::domain::config::TlsVersion;
    use reseed_gateway::domain::error::FORBIDDEN_BODY;
    use reseed_gateway::domain::types::{ClientAddr, RateKey};
    use reseed_gateway::{FileReseeder, GatewayError, ReseedConfig, ReseedService};
    use tempfile::NamedTempFile;
    use tokio::task::JoinHandle;

    const AGENT: &str = "Wget/1.11.4";

    struct Fixture {
        service: Arc<ReseedService>,
        server: JoinHandle<Result<(), GatewayError>>,
        addr: SocketAddr,
        cert_pem: String,
        // Held so the files outlive the server
        _files: Vec<NamedTempFile>,
    }

    impl Fixture {
        async fn start(bundle: &[u8], min_version: TlsVersion) -> Self {
            let certified =
                rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
            let cert_pem = certified.cert.pem();

            let mut cert = NamedTempFile::new().unwrap();
            cert.write_all(cert_pem.as_bytes()).unwrap();
            let mut key = NamedTempFile::new().unwrap();
            key.write_all(certified.key_pair.serialize_pem().as_bytes())
                .unwrap();
            let mut su3 = NamedTempFile::new().unwrap();
            su3.write_all(bundle).unwrap();

            let mut config = ReseedConfig::default();
            config.listener.host = IpAddr::V4(Ipv4Addr::LOCALHOST);
            config.listener.port = 0;
            config.listener.shutdown_grace = Duration::from_secs(1);
            config.listener.tls.cert_path = cert.path().to_path_buf();
            config.listener.tls.key_path = key.path().to_path_buf();
            config.listener.tls.min_version = min_version;
            config.rate_limit.max_requests = 2;

            let reseeder = Arc::new(FileReseeder::new(su3.path()));
            let service = Arc::new(ReseedService::new(config, reseeder).unwrap());

            let runner = Arc::clone(&service);
            let server = tokio::spawn(async move { runner.start().await });
            let addr = service
                .handle()
                .listening()
                .await
                .expect("listener bound");

            Self {
                service,
                server,
                addr,
                cert_pem,
                _files: vec![cert, key, su3],
            }
        }

        fn client(&self) -> reqwest::Client {
            reqwest::Client::builder()
                .add_root_certificate(
                    reqwest::Certificate::from_pem(self.cert_pem.as_bytes()).unwrap(),
                )
                .resolve("localhost", self.addr)
                .build()
                .unwrap()
        }

        fn url(&self, path: &str) -> String {
            format!("https://localhost:{}{}", self.addr.port(), path)
        }

        async fn stop(self) {
            self.service.shutdown();
            self.server.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_bundle_over_https() {
        let bundle: Vec<u8> = (0..4096u32).map(|i| (i % 256) as u8).collect();
        let fixture = Fixture::start(&bundle, TlsVersion::Tls12).await;
        let client = fixture.client();

        let response = client
            .get(fixture.url("/i2pseeds.su3"))
            .header(reqwest::header::USER_AGENT, AGENT)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=i2pseeds.su3"
        );
        assert_eq!(response.headers()["content-type"], "application/octet-stream");
        assert_eq!(response.headers()["content-length"], "4096");
        assert_eq!(response.bytes().await.unwrap().to_vec(), bundle);

        // Direct connection: keyed by the peer IP without its port
        let entry = fixture
            .service
            .limiter()
            .entry(&RateKey::from(&ClientAddr::new("127.0.0.1")));
        assert_eq!(entry.map(|e| e.count), Some(1));

        fixture.stop().await;
    }

    #[tokio::test]
    async fn test_rejections_over_https() {
        let fixture = Fixture::start(b"bundle", TlsVersion::Tls12).await;
        let client = fixture.client();

        let forbidden = client
            .get(fixture.url("/i2pseeds.su3"))
            .header(reqwest::header::USER_AGENT, "curl/8.4.0")
            .send()
            .await
            .unwrap();
        assert_eq!(forbidden.status().as_u16(), 403);
        assert_eq!(forbidden.text().await.unwrap(), FORBIDDEN_BODY);

        let not_found = client
            .get(fixture.url("/"))
            .header(reqwest::header::USER_AGENT, AGENT)
            .send()
            .await
            .unwrap();
        assert_eq!(not_found.status().as_u16(), 404);

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let response = client
                .get(fixture.url("/i2pseeds.su3"))
                .header(reqwest::header::USER_AGENT, AGENT)
                .header("x-forwarded-for", "203.0.113.77")
                .send()
                .await
                .unwrap();
            statuses.push(response.status().as_u16());
        }
        assert_eq!(statuses, vec![200, 200, 429]);

        fixture.stop().await;
    }

    #[tokio::test]
    async fn test_tls13_floor_refuses_tls12_client() {
        let fixture = Fixture::start(b"bundle", TlsVersion::Tls13).await;

        let legacy = reqwest::Client::builder()
            .add_root_certificate(
                reqwest::Certificate::from_pem(fixture.cert_pem.as_bytes()).unwrap(),
            )
            .resolve("localhost", fixture.addr)
            .max_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()
            .unwrap();
        let result = legacy
            .get(fixture.url("/i2pseeds.su3"))
            .header(reqwest::header::USER_AGENT, AGENT)
            .send()
            .await;
        assert!(result.is_err());

        let modern = fixture
            .client()
            .get(fixture.url("/i2pseeds.su3"))
            .header(reqwest::header::USER_AGENT, AGENT)
            .send()
            .await
            .unwrap();
        assert_eq!(modern.status().as_u16(), 200);

        fixture.stop().await;
    }
}
