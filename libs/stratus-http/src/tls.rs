//! Trust anchors and crypto provider for cloud endpoints.

use std::sync::{Arc, OnceLock};

use rustls_pki_types::CertificateDer;

use crate::error::HttpError;

/// OS trust store, read at most once per process. May be empty.
static OS_TRUST_STORE: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

pub fn os_trust_store() -> &'static [CertificateDer<'static>] {
    OS_TRUST_STORE.get_or_init(|| {
        let loaded = rustls_native_certs::load_native_certs();
        for err in &loaded.errors {
            tracing::warn!(error = %err, "skipping unreadable OS root certificate");
        }
        tracing::debug!(count = loaded.certs.len(), "read OS trust store");
        loaded.certs
    })
}

/// The process-wide provider when the host installed one, else aws-lc-rs.
pub fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// rustls config trusting the OS store.
///
/// # Errors
/// `Tls` when the store yields no usable certificate, so a host without CA
/// bundles fails when the client is built rather than on the first call.
pub fn os_roots_config() -> Result<rustls::ClientConfig, HttpError> {
    let mut anchors = rustls::RootCertStore::empty();
    let (usable, rejected) = anchors.add_parsable_certificates(os_trust_store().iter().cloned());
    if rejected > 0 {
        tracing::warn!(usable, rejected, "OS root certificates rejected by rustls");
    }
    if usable == 0 {
        return Err(HttpError::Tls(
            format!("OS trust store has no usable root certificate ({rejected} rejected)").into(),
        ));
    }

    let builder = rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(Box::new(e)))?;
    Ok(builder.with_root_certificates(anchors).with_no_client_auth())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn trust_store_is_read_once() {
        assert!(std::ptr::eq(os_trust_store(), os_trust_store()));
    }

    #[test]
    fn provider_offers_cipher_suites() {
        assert!(!crypto_provider().cipher_suites.is_empty());
    }
}
