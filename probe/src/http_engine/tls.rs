//! TLS connector with `rejectUnauthorized:false` semantics (spec §4.E): we
//! still complete and record the handshake and certificate details, we just
//! never fail the test over an untrusted chain — the probe reports what it
//! saw, it doesn't gatekeep it.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigestAlgorithm, DistinguishedName, SignatureScheme};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug)]
pub struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn requires_raw_public_keys(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

pub fn client_config(alpn: &[&str]) -> rustls::ClientConfig {
    let mut config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
    config
}

/// Peer certificate details surfaced in the final HTTP result (spec §4.E).
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TlsInfo {
    pub protocol: Option<String>,
    pub cipher_name: Option<String>,
    pub authorized: bool,
    pub issuer: CertName,
    pub subject: CertSubject,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    pub key_type: Option<String>,
    pub key_bits: Option<u32>,
    pub serial_number: Option<String>,
    pub fingerprint256: Option<String>,
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CertName {
    #[serde(rename = "C")]
    pub c: Option<String>,
    #[serde(rename = "O")]
    pub o: Option<String>,
    #[serde(rename = "CN")]
    pub cn: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CertSubject {
    #[serde(rename = "CN")]
    pub cn: Option<String>,
}

/// Certificate validity timestamps as ISO-8601 strings (spec §4.E "validFrom/
/// validTo as ISO strings").
fn to_iso8601(unix_secs: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(unix_secs, 0).map(|dt| dt.to_rfc3339())
}

/// Parses the leaf certificate DER into the subset of fields the spec's
/// result shape names. Best-effort: any single field that can't be
/// extracted is left `None` rather than failing the whole test.
pub fn describe_cert(der: &[u8]) -> TlsInfo {
    use sha2::{Digest, Sha256};
    use x509_parser::prelude::*;

    let mut info = TlsInfo::default();

    let mut hasher = Sha256::new();
    hasher.update(der);
    info.fingerprint256 = Some(
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":"),
    );

    let Ok((_, cert)) = X509Certificate::from_der(der) else {
        return info;
    };

    info.issuer.cn = cert
        .issuer()
        .iter_common_name()
        .next()
        .and_then(|a| a.as_str().ok())
        .map(str::to_string);
    info.issuer.o = cert
        .issuer()
        .iter_organization()
        .next()
        .and_then(|a| a.as_str().ok())
        .map(str::to_string);
    info.issuer.c = cert
        .issuer()
        .iter_country()
        .next()
        .and_then(|a| a.as_str().ok())
        .map(str::to_string);

    info.subject.cn = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|a| a.as_str().ok())
        .map(str::to_string);

    info.valid_from = to_iso8601(cert.validity().not_before.timestamp());
    info.valid_to = to_iso8601(cert.validity().not_after.timestamp());

    info.serial_number = Some(
        cert.raw_serial()
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":"),
    );

    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::EC(point)) => {
            info.key_type = Some("EC".to_string());
            let point_len = point.data().len();
            info.key_bits = Some((point_len.saturating_sub(1) as u32 * 8) / 2);
        }
        Ok(PublicKey::RSA(rsa)) => {
            info.key_type = Some("RSA".to_string());
            info.key_bits = Some(rsa.key_size() as u32);
        }
        _ => {}
    }
    info.public_key = Some(hex::encode(spki.raw));

    info.authorized = false; // rejectUnauthorized:false: never asserted as trusted
    info
}
