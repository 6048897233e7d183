//! Certificate pinning.

use std::fmt;
use std::path::Path;

use rustls::RootCertStore;
use rustls_pki_types::CertificateDer;
use rustls_pki_types::pem::PemObject;

use crate::error::ClientError;

/// A single certificate trusted for TLS verification of one request.
///
/// When attached to a [`Request`](crate::Request) it replaces the built-in
/// trust store for that request only, and the target must use `https`.
/// Construction checks that the certificate can act as a trust anchor, so a
/// `TrustedRoot` that exists is always usable.
#[derive(Clone)]
pub struct TrustedRoot {
    der: CertificateDer<'static>,
}

impl TrustedRoot {
    /// Load the first certificate of a PEM document.
    ///
    /// # Errors
    /// Returns [`ClientError::Configuration`] when no certificate can be
    /// decoded or it cannot be used as a trust anchor.
    pub fn from_pem(pem: &[u8]) -> Result<Self, ClientError> {
        let der = CertificateDer::from_pem_slice(pem)
            .map_err(|e| ClientError::config(format!("invalid PEM certificate: {e}")))?;
        Self::from_certificate(der)
    }

    /// Load a DER-encoded certificate.
    ///
    /// # Errors
    /// Returns [`ClientError::Configuration`] when the certificate cannot be
    /// used as a trust anchor.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self, ClientError> {
        Self::from_certificate(CertificateDer::from(der.into()))
    }

    /// Load a PEM certificate from a file.
    ///
    /// # Errors
    /// Returns [`ClientError::Configuration`] when the file cannot be read or
    /// holds no usable certificate.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|e| {
            ClientError::config(format!("cannot read certificate {}: {e}", path.display()))
        })?;
        Self::from_pem(&pem)
    }

    fn from_certificate(der: CertificateDer<'static>) -> Result<Self, ClientError> {
        let mut store = RootCertStore::empty();
        store.add(der.clone()).map_err(|e| {
            ClientError::config(format!("certificate cannot be used as a trust anchor: {e}"))
        })?;
        Ok(Self { der })
    }

    /// DER bytes of the pinned certificate
    #[must_use]
    pub fn der(&self) -> &[u8] {
        self.der.as_ref()
    }

    pub(crate) fn to_reqwest(&self) -> Result<reqwest::Certificate, ClientError> {
        reqwest::Certificate::from_der(self.der.as_ref())
            .map_err(|e| ClientError::config(format!("cannot install trusted root: {e}")))
    }
}

impl fmt::Debug for TrustedRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedRoot")
            .field("der_len", &self.der.len())
            .finish()
    }
}
