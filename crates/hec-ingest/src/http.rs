// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction for the upload pipeline.

use std::error::Error;
use std::time::Duration;

use reqwest::ClientBuilder;
#[cfg(feature = "fips")]
use tracing::debug;

use crate::config::HecConfig;
use crate::errors::HecError;

/// Installs the process-wide TLS crypto provider.
///
/// A no-op without the `fips` feature; reqwest brings its own provider.
#[cfg(not(feature = "fips"))]
pub fn prepare_client_provider() -> Result<(), HecError> {
    Ok(())
}

/// Installs the AWS-LC FIPS provider as the process-wide rustls default.
///
/// Must run before the first connection. Calling it again is fine as long as
/// the installed provider is FIPS-compliant.
#[cfg(feature = "fips")]
pub fn prepare_client_provider() -> Result<(), HecError> {
    if rustls::crypto::default_fips_provider()
        .install_default()
        .is_ok()
    {
        debug!("HEC | Installed FIPS crypto provider");
        return Ok(());
    }
    match rustls::crypto::CryptoProvider::get_default() {
        Some(provider) if provider.fips() => Ok(()),
        _ => Err(HecError::Config(
            "a non-FIPS crypto provider is already installed".to_string(),
        )),
    }
}

/// Returns a reqwest client builder using reqwest's default rustls TLS.
#[cfg(not(feature = "fips"))]
pub fn create_reqwest_client_builder() -> Result<ClientBuilder, Box<dyn Error>> {
    Ok(reqwest::Client::builder().use_rustls_tls())
}

/// Returns a reqwest client builder with a FIPS-compliant TLS configuration
/// backed by the native root certificates.
#[cfg(feature = "fips")]
pub fn create_reqwest_client_builder() -> Result<ClientBuilder, Box<dyn Error>> {
    // installed by prepare_client_provider
    let provider =
        rustls::crypto::CryptoProvider::get_default().ok_or("No crypto provider configured")?;

    if !provider.fips() {
        return Err("Crypto provider is not FIPS-compliant".into());
    }

    let mut root_cert_store = rustls::RootCertStore::empty();
    let native_certs = rustls_native_certs::load_native_certs();
    let mut valid_count = 0;
    for cert in native_certs.certs {
        match root_cert_store.add(cert) {
            Ok(()) => valid_count += 1,
            Err(err) => {
                debug!("HEC | Skipping unparsable root certificate: {:?}", err);
            }
        }
    }
    if valid_count == 0 {
        return Err("No valid certificates found in native root store".into());
    }

    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(rustls::ALL_VERSIONS)
        .map_err(|_| "Failed to set protocol versions")?
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();

    if !config.fips() {
        return Err("The final TLS configuration is not FIPS-compliant".into());
    }
    debug!("HEC | Client builder is configured with FIPS.");

    Ok(reqwest::Client::builder().use_preconfigured_tls(config))
}

/// Builds the client used for the single streaming upload.
///
/// HTTP/1.1 only, so the body goes out with chunked transfer encoding.
pub fn build_client(config: &HecConfig) -> Result<reqwest::Client, HecError> {
    prepare_client_provider()?;
    let mut builder = create_reqwest_client_builder()
        .map_err(|e| HecError::Request(format!("failed to configure TLS: {e}")))?
        .http1_only()
        .connect_timeout(config.timeout)
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if let Some(request_timeout) = config.request_timeout {
        builder = builder.timeout(request_timeout);
    }

    if let Some(https_uri) = &config.https_proxy {
        let proxy = reqwest::Proxy::https(https_uri.as_str())
            .map_err(|e| HecError::Request(format!("invalid HTTPS proxy '{https_uri}': {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| HecError::Request(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_client_provider_is_repeatable() {
        assert!(prepare_client_provider().is_ok());
        assert!(prepare_client_provider().is_ok());
    }

    #[test]
    fn test_build_client_default() {
        prepare_client_provider().unwrap();
        let config = HecConfig::new("http://127.0.0.1:8088/services/collector", "token");
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn test_build_client_with_proxy_and_timeout() {
        prepare_client_provider().unwrap();
        let config = HecConfig {
            https_proxy: Some("http://proxy.example:3128".to_string()),
            request_timeout: Some(Duration::from_secs(30)),
            ..HecConfig::new("https://collector.example/services/collector", "token")
        };
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn test_build_client_rejects_bad_proxy() {
        prepare_client_provider().unwrap();
        let config = HecConfig {
            https_proxy: Some("not a url".to_string()),
            ..HecConfig::new("https://collector.example/services/collector", "token")
        };
        assert!(matches!(build_client(&config), Err(HecError::Request(_))));
    }
}
